//! RedbStore — embedded event log backed by redb.
//!
//! Events are JSON-serialized into `u64 -> &[u8]` tables. The next id is the
//! table's last key plus one, computed inside the same write transaction as
//! the insert, so ids stay strictly increasing. Supports on-disk and
//! in-memory backends (the latter for tests and throwaway local runs).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::resolver;
use crate::store::EventStore;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Thread-safe event store backed by redb.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a persistent event store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "event store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory event store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory event store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        txn.open_table(RELEASES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Assign the next id and a date, build the event, and persist it.
    fn append_row<T, F>(
        &self,
        table_def: EventTable,
        date: Option<DateTime<Utc>>,
        build: F,
    ) -> StoreResult<T>
    where
        T: Serialize,
        F: FnOnce(EventId, DateTime<Utc>) -> T,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let event;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            let next_id = table
                .last()
                .map_err(map_err!(Read))?
                .map(|(key, _)| key.value() + 1)
                .unwrap_or(1);
            let id = EventId::try_from(next_id)
                .map_err(|_| StoreError::Write(format!("event id {next_id} out of range")))?;
            event = build(id, date.unwrap_or_else(Utc::now));
            let value = serde_json::to_vec(&event).map_err(map_err!(Serialize))?;
            table
                .insert(next_id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(event)
    }

    /// Read a whole table in key (insertion) order.
    fn scan<T, P>(&self, table_def: EventTable, mut keep: P) -> StoreResult<Vec<T>>
    where
        T: DeserializeOwned,
        P: FnMut(&T) -> bool,
    {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let event: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if keep(&event) {
                results.push(event);
            }
        }
        Ok(results)
    }
}

#[async_trait]
impl EventStore for RedbStore {
    async fn append_deployment(&self, input: NewDeployment) -> StoreResult<Deployment> {
        input.validate()?;
        let date = input.date;
        let deployment = self.append_row(DEPLOYMENTS, date, |id, date| input.into_event(id, date))?;
        debug!(
            id = deployment.id,
            project = %deployment.project,
            service = %deployment.service,
            environment = %deployment.environment,
            "deployment appended"
        );
        Ok(deployment)
    }

    async fn append_release(&self, input: NewRelease) -> StoreResult<Release> {
        input.validate()?;
        let date = input.date;
        let release = self.append_row(RELEASES, date, |id, date| input.into_event(id, date))?;
        debug!(id = release.id, project = %release.project, number = %release.number, "release appended");
        Ok(release)
    }

    async fn list_deployments(&self, filter: &DeploymentFilter) -> StoreResult<Vec<Deployment>> {
        let matching = self.scan(DEPLOYMENTS, |d: &Deployment| filter.matches(d))?;
        Ok(resolver::visible_as_of(matching, filter.as_of))
    }

    async fn list_releases(&self, filter: &ReleaseFilter) -> StoreResult<Vec<Release>> {
        let matching = self.scan(RELEASES, |r: &Release| filter.matches(r))?;
        Ok(resolver::visible_as_of(matching, filter.as_of))
    }

    async fn releases_by_number(&self, project: &str, number: &str) -> StoreResult<Vec<Release>> {
        self.scan(RELEASES, |r: &Release| r.project == project && r.number == number)
    }
}
