//! Server configuration module
//! Handles the process-wide tunables for the relay

use std::env;

use crate::constants::{
    ADMIN_SECRET_ENV, DEFAULT_MAX_QUEUED_TASKS, DEFAULT_PORT, MIN_CHANNELS, MIN_CLIENTS,
    MIN_THREADS,
};

/// Server configuration parameters
///
/// Defaults are the hard minimums; command-line overrides below a minimum
/// are silently ignored.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub debug: bool,
    pub max_clients: usize,
    pub max_channels: usize,
    /// Number of worker threads in the thread pool
    pub thread_pool_size: usize,
    /// Maximum number of tasks that can be queued
    pub max_queued_tasks: usize,
    /// Plaintext admin password; clients presenting it on connect gain
    /// global moderation rights. None disables admin logins entirely.
    pub admin_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            debug: false,
            max_clients: MIN_CLIENTS,
            max_channels: MIN_CHANNELS,
            thread_pool_size: MIN_THREADS,
            max_queued_tasks: DEFAULT_MAX_QUEUED_TASKS,
            admin_secret: env::var(ADMIN_SECRET_ENV).ok().filter(|s| !s.is_empty()),
        }
    }
}

impl ServerConfig {
    /// Build a configuration from command-line arguments.
    ///
    /// Recognized flags: `--debug`, `--channels=N`, `--clients=N`,
    /// `--threads=N`, `--port=N`. Unknown flags and values below the
    /// minimums are ignored without comment.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();

        for arg in args {
            if arg == "--debug" {
                config.debug = true;
            } else if let Some(value) = arg.strip_prefix("--channels=") {
                if let Some(n) = parse_at_least(value, MIN_CHANNELS) {
                    config.max_channels = n;
                }
            } else if let Some(value) = arg.strip_prefix("--clients=") {
                if let Some(n) = parse_at_least(value, MIN_CLIENTS) {
                    config.max_clients = n;
                }
            } else if let Some(value) = arg.strip_prefix("--threads=") {
                if let Some(n) = parse_at_least(value, MIN_THREADS) {
                    config.thread_pool_size = n;
                }
            } else if let Some(value) = arg.strip_prefix("--port=") {
                if let Ok(port) = value.parse() {
                    config.port = port;
                }
            }
        }

        config
    }

    /// Configuration for tests: small limits, a known admin secret.
    pub fn for_testing() -> Self {
        Self {
            port: 0,
            debug: true,
            max_clients: MIN_CLIENTS,
            max_channels: 4,
            thread_pool_size: MIN_THREADS,
            max_queued_tasks: 100,
            admin_secret: Some("hunter2".to_string()),
        }
    }
}

fn parse_at_least(value: &str, min: usize) -> Option<usize> {
    value.parse().ok().filter(|n| *n >= min)
}
