//! Client-side shopping cart.
//!
//! Two cooperating pieces:
//!
//! - [`store`] - the authoritative in-memory state container with named
//!   transition operations and subscriber notification
//! - [`persistence`] - the adapter serializing that state to a durable
//!   key/value substrate with a 7-day lazy expiration policy
//!
//! On boot the store hydrates from a valid persisted snapshot (or starts
//! empty); every item mutation saves through the adapter, and clearing the
//! cart purges the durable entry.

pub mod persistence;
pub mod store;

pub use persistence::{CartPersistence, FileStore, MemoryStore, SnapshotStore};
pub use store::{CartLineItem, CartState, CartStore};
