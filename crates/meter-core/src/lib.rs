//! meter-core: shared types, wire format, and configuration.
//! All other Meter crates depend on this one.

pub mod config;
pub mod envelope;
pub mod payment;
pub mod peer;
pub mod wire;

pub use envelope::{Block, BlockPresence, Envelope, WantEntry};
pub use payment::PaymentMessage;
pub use peer::{PeerId, PeerIdError};
