//! release-history-store — append-only deployment and release event log.
//!
//! Events are never updated or deleted. Reads reconstruct point-in-time
//! state: the full history up to an instant, or the latest event per
//! identity key as of that instant (see [`resolver`]). Releases are served
//! together with the prod deployments that were live when they were cut
//! (see [`aggregator`]).
//!
//! # Backends
//!
//! | URL | Backend |
//! |---|---|
//! | `postgres://…` | [`PgStore`] (sqlx pool) |
//! | `redb://<path>` | [`RedbStore`] on disk |
//! | `memory://` | [`RedbStore`] in memory |
//!
//! All backends implement [`EventStore`] and are shared as [`SharedStore`]
//! (`Arc<dyn EventStore>`).

pub mod aggregator;
pub mod embedded;
pub mod error;
pub mod postgres;
pub mod resolver;
pub mod store;
pub mod tables;
pub mod types;

pub use embedded::RedbStore;
pub use error::{StoreError, StoreResult};
pub use postgres::PgStore;
pub use store::{EventStore, SharedStore, StoreUrl, open};
pub use types::*;
