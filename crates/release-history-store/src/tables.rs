//! redb table definitions for the embedded event store.
//!
//! Each table is keyed by the event id (`u64`, ascending in insertion order)
//! and holds the JSON-serialized event. Key order is therefore log order.

use redb::TableDefinition;

/// An append-only event table.
pub type EventTable = TableDefinition<'static, u64, &'static [u8]>;

/// Deployment events keyed by id.
pub const DEPLOYMENTS: EventTable = TableDefinition::new("deployment");

/// Release events keyed by id.
pub const RELEASES: EventTable = TableDefinition::new("release");
