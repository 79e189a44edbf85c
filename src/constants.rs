// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const WS_PATH: &str = "ws";

// Hard minimums; CLI overrides below these are silently ignored
pub const MIN_CHANNELS: usize = 1;
pub const MIN_CLIENTS: usize = 10;
pub const MIN_THREADS: usize = 5;

// Thread pool configuration constants
pub const DEFAULT_MAX_QUEUED_TASKS: usize = 1000;

// Channel limits
pub const CHANNEL_CAPACITY: usize = 50;
pub const MAX_MODERATORS: usize = 5;
pub const CHANNEL_NAME_MIN: usize = 1;
pub const CHANNEL_NAME_MAX: usize = 64;
pub const RENAME_MIN: usize = 6;
pub const RENAME_MAX: usize = 24;

/// Environment variable holding the plaintext admin password.
pub const ADMIN_SECRET_ENV: &str = "CHAT_RELAY_ADMIN_SECRET";
