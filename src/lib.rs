//! A reliable, connection-oriented, unidirectional file-transfer protocol
//! over UDP: packet codec, handshake/teardown state machines for both
//! endpoints, and a sent-time-ordered retransmission registry.
//!
//! The two binaries, `rdps` (sender) and `rdpr` (receiver), are thin CLI
//! wrappers around [`sender::run`] and [`receiver::run`].

pub mod err;
pub mod packet;
pub mod receiver;
pub mod registry;
pub mod sender;
pub mod trace;
pub mod transport;

pub use err::{Error, Result};
