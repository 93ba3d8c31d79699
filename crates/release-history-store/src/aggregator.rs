//! Release aggregation: attach the prod deployment snapshot to releases.
//!
//! A release's snapshot is resolved against the deployment log at the
//! release's own stored date, always in the `prod` environment, so repeated
//! reads of the same release keep returning the same deployments.

use crate::error::StoreResult;
use crate::store::EventStore;
use crate::types::*;

/// Resolve the prod deployments live at `release.date` and attach them.
pub async fn attach_deployments(
    store: &dyn EventStore,
    release: Release,
) -> StoreResult<ReleaseWithDeployments> {
    let filter = DeploymentFilter::prod(release.project.clone(), release.date);
    let deployments = store.latest_deployments(&filter).await?;
    Ok(ReleaseWithDeployments::new(release, deployments))
}

/// Attach snapshots to each release in order, stopping at the first failure.
pub async fn attach_all(
    store: &dyn EventStore,
    releases: Vec<Release>,
) -> StoreResult<Vec<ReleaseWithDeployments>> {
    let mut attached = Vec::with_capacity(releases.len());
    for release in releases {
        attached.push(attach_deployments(store, release).await?);
    }
    Ok(attached)
}

/// Append a release and return it with its snapshot.
pub async fn record_release(
    store: &dyn EventStore,
    input: NewRelease,
) -> StoreResult<ReleaseWithDeployments> {
    let release = store.append_release(input).await?;
    attach_deployments(store, release).await
}

/// Releases exactly matching project and number, each with its snapshot.
pub async fn find_by_number(
    store: &dyn EventStore,
    project: &str,
    number: &str,
) -> StoreResult<Vec<ReleaseWithDeployments>> {
    let releases = store.releases_by_number(project, number).await?;
    attach_all(store, releases).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedded::RedbStore;
    use chrono::{DateTime, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_600_000_000 + secs, 0).unwrap()
    }

    async fn seed(store: &RedbStore) {
        for (service, env, tag, secs) in [
            ("api", "prod", "a1", 10),
            ("web", "prod", "w1", 20),
            ("api", "staging", "a2-rc", 25),
            ("api", "prod", "a2", 30),
        ] {
            store
                .append_deployment(NewDeployment::new("p", service, env, tag).backfilled(at(secs)))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn snapshot_matches_resolver_at_release_date() {
        let store = RedbStore::open_in_memory().unwrap();
        seed(&store).await;

        let release = record_release(&store, NewRelease::new("p", "42").backfilled(at(25)))
            .await
            .unwrap();

        let expected = store
            .latest_deployments(&DeploymentFilter::prod("p", at(25)))
            .await
            .unwrap();
        assert_eq!(release.deployments, expected);

        let tags: Vec<_> = release.deployments.iter().map(|d| d.tag.as_str()).collect();
        assert_eq!(tags, vec!["a1", "w1"]);
    }

    #[tokio::test]
    async fn snapshot_is_stable_across_reads() {
        let store = RedbStore::open_in_memory().unwrap();
        seed(&store).await;
        let release = store
            .append_release(NewRelease::new("p", "42").backfilled(at(25)))
            .await
            .unwrap();

        let first = attach_deployments(&store, release.clone()).await.unwrap();
        // Later deployments must not leak into an earlier release.
        store
            .append_deployment(NewDeployment::new("p", "web", "prod", "w2"))
            .await
            .unwrap();
        let second = attach_deployments(&store, release).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn snapshot_ignores_other_projects_and_environments() {
        let store = RedbStore::open_in_memory().unwrap();
        store
            .append_deployment(NewDeployment::new("p", "api", "staging", "s1").backfilled(at(1)))
            .await
            .unwrap();
        store
            .append_deployment(NewDeployment::new("q", "api", "prod", "q1").backfilled(at(1)))
            .await
            .unwrap();

        let release = record_release(&store, NewRelease::new("p", "1")).await.unwrap();
        assert!(release.deployments.is_empty());
    }

    #[tokio::test]
    async fn find_by_number_attaches_each_match() {
        let store = RedbStore::open_in_memory().unwrap();
        seed(&store).await;
        store
            .append_release(NewRelease::new("p", "42").backfilled(at(15)))
            .await
            .unwrap();
        store
            .append_release(NewRelease::new("p", "42").backfilled(at(35)))
            .await
            .unwrap();
        store.append_release(NewRelease::new("p", "43")).await.unwrap();

        let found = find_by_number(&store, "p", "42").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].deployments.len(), 1);
        assert_eq!(found[0].deployments[0].tag, "a1");
        let tags: Vec<_> = found[1].deployments.iter().map(|d| d.tag.as_str()).collect();
        assert_eq!(tags, vec!["w1", "a2"]);
    }

    #[tokio::test]
    async fn record_release_rejects_invalid_input() {
        let store = RedbStore::open_in_memory().unwrap();
        let err = record_release(&store, NewRelease::new("p", "")).await.unwrap_err();
        assert!(err.is_validation());
        assert!(find_by_number(&store, "p", "").await.unwrap().is_empty());
    }
}
