//! Shared model for the P2P settlement engine.
//!
//! Every crate in the workspace speaks in these types: signed bid terms,
//! orders and their status, saved payment accounts and the snapshots taken
//! from them, chain receipts and logs, engine events, and the decimal
//! conversion rule shared by the codec and the balance guard.

pub mod amount;
pub mod bid;
pub mod delivery;
pub mod events;
pub mod intent;
pub mod order;
pub mod payment;
pub mod validation;

pub use amount::*;
pub use bid::*;
pub use delivery::*;
pub use events::*;
pub use intent::*;
pub use order::*;
pub use payment::*;
pub use validation::*;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// Lowercase `0x` hex form used wherever an address keys a record.
pub fn address_key(address: &alloy::primitives::Address) -> String {
	format!("{:#x}", address)
}
