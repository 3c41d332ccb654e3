//! Channel metadata and membership.
//!
//! - `registry` - authoritative channel store with a write-coherent cache
//! - `subscriptions` - opt-in principal -> channel follow relation

pub mod registry;
pub mod subscriptions;

pub use registry::{ChannelRegistry, RegistryError, UpsertOutcome};
pub use subscriptions::SubscriptionStore;
