//! The `EventStore` trait and backend selection.
//!
//! A store appends immutable events and answers two kinds of reads per event
//! kind: the full filtered history up to an instant, and the point-in-time
//! latest event per identity key. Backends only have to provide the history
//! scan; the latest-per-key read defaults to running the in-process resolver
//! over it, and backends with a query engine may push the grouping down.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::embedded::RedbStore;
use crate::error::{StoreError, StoreResult};
use crate::postgres::PgStore;
use crate::resolver;
use crate::types::*;

/// Shared handle to whichever backend the process opened at startup.
pub type SharedStore = Arc<dyn EventStore>;

/// Append-only log of deployment and release events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Validate and persist a deployment, returning it with id and date assigned.
    async fn append_deployment(&self, input: NewDeployment) -> StoreResult<Deployment>;

    /// Validate and persist a release, returning it with id and date assigned.
    async fn append_release(&self, input: NewRelease) -> StoreResult<Release>;

    /// Every matching deployment dated at or before `filter.as_of`, in insertion order.
    async fn list_deployments(&self, filter: &DeploymentFilter) -> StoreResult<Vec<Deployment>>;

    /// The latest matching deployment per (service, environment) as of `filter.as_of`.
    async fn latest_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> StoreResult<Vec<Deployment>> {
        let history = self.list_deployments(filter).await?;
        Ok(resolver::latest_per_key(history, filter.as_of))
    }

    /// Every matching release dated at or before `filter.as_of`, in insertion order.
    async fn list_releases(&self, filter: &ReleaseFilter) -> StoreResult<Vec<Release>>;

    /// The latest release of the project as of `filter.as_of`.
    async fn latest_releases(&self, filter: &ReleaseFilter) -> StoreResult<Vec<Release>> {
        let history = self.list_releases(filter).await?;
        Ok(resolver::latest_per_key(history, filter.as_of))
    }

    /// Releases matching project and number exactly, regardless of date.
    async fn releases_by_number(&self, project: &str, number: &str) -> StoreResult<Vec<Release>>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Release backend resources. The store must not be used afterwards.
    async fn close(&self) {}
}

/// Where the event log lives, parsed from a connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUrl {
    /// `postgres://` or `postgresql://` connection string.
    Postgres(String),
    /// `redb://<path>` on-disk embedded database.
    RedbFile(PathBuf),
    /// `memory://` ephemeral embedded database.
    Memory,
}

impl StoreUrl {
    pub fn parse(url: &str) -> StoreResult<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(Self::Postgres(url.to_string()));
        }
        if let Some(path) = url.strip_prefix("redb://") {
            if path.is_empty() {
                return Err(StoreError::InvalidUrl("redb url has no path".to_string()));
            }
            return Ok(Self::RedbFile(PathBuf::from(path)));
        }
        if url == "memory://" {
            return Ok(Self::Memory);
        }
        Err(StoreError::InvalidUrl(format!(
            "unsupported scheme in {url:?} (expected postgres://, redb:// or memory://)"
        )))
    }

    /// Short backend label for logs; never includes credentials.
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::RedbFile(_) => "redb",
            Self::Memory => "memory",
        }
    }
}

/// Open the store named by `url`, creating tables if they are absent.
pub async fn open(url: &StoreUrl, max_connections: u32) -> StoreResult<SharedStore> {
    let store: SharedStore = match url {
        StoreUrl::Postgres(conn) => Arc::new(PgStore::connect(conn, max_connections).await?),
        StoreUrl::RedbFile(path) => Arc::new(RedbStore::open(path)?),
        StoreUrl::Memory => Arc::new(RedbStore::open_in_memory()?),
    };
    store.ping().await?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_postgres_urls() {
        let url = "postgres://u:p@localhost:5432/db?sslmode=disable";
        assert_eq!(StoreUrl::parse(url).unwrap(), StoreUrl::Postgres(url.to_string()));
        assert_eq!(
            StoreUrl::parse("postgresql://localhost/db").unwrap().backend(),
            "postgres"
        );
    }

    #[test]
    fn parses_embedded_urls() {
        assert_eq!(
            StoreUrl::parse("redb:///var/lib/releases.redb").unwrap(),
            StoreUrl::RedbFile(PathBuf::from("/var/lib/releases.redb"))
        );
        assert_eq!(StoreUrl::parse("memory://").unwrap(), StoreUrl::Memory);
    }

    #[test]
    fn rejects_unknown_schemes() {
        assert!(matches!(
            StoreUrl::parse("mysql://localhost/db"),
            Err(StoreError::InvalidUrl(_))
        ));
        assert!(StoreUrl::parse("redb://").is_err());
    }

    #[tokio::test]
    async fn open_memory_store() {
        let store = open(&StoreUrl::Memory, 1).await.unwrap();
        let filter = ReleaseFilter::new(DEFAULT_PROJECT, chrono::Utc::now());
        assert!(store.list_releases(&filter).await.unwrap().is_empty());
    }
}
