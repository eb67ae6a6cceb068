//! Tagged resource cache.
//!
//! Reads are stored under a key together with the tags they provide.
//! Mutations and pushed events invalidate tags; matching entries go stale
//! and are refetched right away when someone is subscribed, lazily
//! otherwise.

pub mod query;
pub mod store;
pub mod tag;

pub use query::Query;
pub use store::{EntrySnapshot, Freshness, Subscription, TaggedCache};
pub use tag::Tag;
