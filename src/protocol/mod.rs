//! Wire grammar and request routing

pub mod packet;
pub mod router;

pub use packet::{PacketType, Request, Response};
pub use router::Router;
