//! REST API handlers.
//!
//! Each handler maps one request onto the event store and returns JSON.
//! Request bodies are decoded by hand so that a missing or wrong
//! `Content-Type` is not an error; malformed JSON is a 400.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::error;

use release_history_store::aggregator;
use release_history_store::*;

use crate::ApiState;
use crate::error::{ApiError, ApiResult};
use crate::query::{DeploymentQuery, ReleaseQuery, ReleaseSelection};

fn decode_body<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Wrap a store error, logging backend failures with the filters in play.
fn store_failure(
    operation: &'static str,
    project: &str,
    environment: Option<&str>,
    as_of: Option<DateTime<Utc>>,
    err: StoreError,
) -> ApiError {
    if !err.is_validation() {
        error!(
            operation,
            project,
            environment = ?environment,
            as_of = ?as_of,
            error = %err,
            "store operation failed"
        );
    }
    ApiError::Store(err)
}

// ── Health ─────────────────────────────────────────────────────

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ── Deployments ────────────────────────────────────────────────

/// POST /deployment
pub async fn create_deployment(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<Json<Deployment>> {
    let input: NewDeployment = decode_body(&body)?;

    let project = input.project.clone();
    let environment = input.environment.clone();
    let deployment = state
        .store
        .append_deployment(input)
        .await
        .map_err(|e| store_failure("append_deployment", &project, Some(&environment), None, e))?;
    Ok(Json(deployment))
}

/// GET /deployment
pub async fn list_deployments(
    State(state): State<ApiState>,
    Query(query): Query<DeploymentQuery>,
) -> ApiResult<Json<Vec<Deployment>>> {
    let filter = DeploymentFilter::new(query.project(), query.environment(), query.as_of()?);

    let result = if query.show_all() {
        state.store.list_deployments(&filter).await
    } else {
        state.store.latest_deployments(&filter).await
    };
    let deployments = result.map_err(|e| {
        store_failure(
            "list_deployments",
            &filter.project,
            Some(&filter.environment),
            Some(filter.as_of),
            e,
        )
    })?;
    Ok(Json(deployments))
}

// ── Releases ───────────────────────────────────────────────────

/// POST /release
pub async fn create_release(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<Json<ReleaseWithDeployments>> {
    let input: NewRelease = decode_body(&body)?;

    let project = input.project.clone();
    let release = aggregator::record_release(state.store.as_ref(), input)
        .await
        .map_err(|e| store_failure("record_release", &project, Some(PROD_ENVIRONMENT), None, e))?;
    Ok(Json(release))
}

/// GET /release
pub async fn list_releases(
    State(state): State<ApiState>,
    Query(query): Query<ReleaseQuery>,
) -> ApiResult<Json<Vec<ReleaseWithDeployments>>> {
    let project = query.project();
    let store = state.store.as_ref();

    let releases = match query.selection()? {
        ReleaseSelection::ByNumber(number) => aggregator::find_by_number(store, project, &number)
            .await
            .map_err(|e| store_failure("find_by_number", project, None, None, e))?,
        ReleaseSelection::All(as_of) => {
            let filter = ReleaseFilter::new(project, as_of);
            let history = store
                .list_releases(&filter)
                .await
                .map_err(|e| store_failure("list_releases", project, None, Some(as_of), e))?;
            aggregator::attach_all(store, history).await.map_err(|e| {
                store_failure("attach_deployments", project, Some(PROD_ENVIRONMENT), None, e)
            })?
        }
        ReleaseSelection::Latest(as_of) => {
            let filter = ReleaseFilter::new(project, as_of);
            let latest = store
                .latest_releases(&filter)
                .await
                .map_err(|e| store_failure("latest_releases", project, None, Some(as_of), e))?;
            aggregator::attach_all(store, latest).await.map_err(|e| {
                store_failure("attach_deployments", project, Some(PROD_ENVIRONMENT), None, e)
            })?
        }
    };
    Ok(Json(releases))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::response::IntoResponse;

    fn test_state() -> ApiState {
        let store = RedbStore::open_in_memory().unwrap();
        ApiState {
            store: Arc::new(store),
        }
    }

    fn body(json: &str) -> Bytes {
        Bytes::from(json.to_string())
    }

    #[tokio::test]
    async fn health_is_ok() {
        assert_eq!(health().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn create_deployment_returns_materialized_event() {
        let state = test_state();
        let Json(d) = create_deployment(
            State(state),
            body(r#"{"project":"p","service":"s","environment":"prod","tag":"v1"}"#),
        )
        .await
        .unwrap();
        assert_eq!(d.id, 1);
        assert_eq!(d.tag, "v1");
    }

    #[tokio::test]
    async fn create_deployment_missing_field_is_bad_request() {
        let state = test_state();
        let resp = create_deployment(
            State(state.clone()),
            body(r#"{"project":"p","service":"s","environment":"prod","tag":""}"#),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        // Nothing was persisted.
        let Json(all) = list_deployments(
            State(state),
            Query(DeploymentQuery {
                project: Some("p".into()),
                show_all: Some("true".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn create_deployment_malformed_json_is_bad_request() {
        let state = test_state();
        let resp = create_deployment(State(state), body("{not json"))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_deployments_bad_date_is_bad_request() {
        let state = test_state();
        let resp = list_deployments(
            State(state),
            Query(DeploymentQuery {
                date: Some("2019-13-40".into()),
                ..Default::default()
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_deployments_latest_vs_all() {
        let state = test_state();
        for tag in ["v1", "v2"] {
            state
                .store
                .append_deployment(NewDeployment::new("p", "s", "prod", tag))
                .await
                .unwrap();
        }

        let latest = DeploymentQuery {
            project: Some("p".into()),
            ..Default::default()
        };
        let Json(latest) = list_deployments(State(state.clone()), Query(latest)).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].tag, "v2");

        let all = DeploymentQuery {
            project: Some("p".into()),
            show_all: Some("true".into()),
            ..Default::default()
        };
        let Json(all) = list_deployments(State(state), Query(all)).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn create_release_attaches_prod_snapshot() {
        let state = test_state();
        state
            .store
            .append_deployment(NewDeployment::new("p", "s", "prod", "v1"))
            .await
            .unwrap();
        state
            .store
            .append_deployment(NewDeployment::new("p", "s", "staging", "v2"))
            .await
            .unwrap();

        let Json(release) = create_release(State(state), body(r#"{"project":"p","number":"42"}"#))
            .await
            .unwrap();
        assert_eq!(release.number, "42");
        assert_eq!(release.deployments.len(), 1);
        assert_eq!(release.deployments[0].tag, "v1");
    }

    #[tokio::test]
    async fn create_release_missing_number_is_bad_request() {
        let state = test_state();
        let resp = create_release(State(state), body(r#"{"project":"p"}"#))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_releases_defaults_to_latest() {
        let state = test_state();
        for number in ["1", "2"] {
            state
                .store
                .append_release(NewRelease::new("alt", number))
                .await
                .unwrap();
        }

        let Json(releases) = list_releases(State(state), Query(ReleaseQuery::default()))
            .await
            .unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].number, "2");
    }

    #[tokio::test]
    async fn list_releases_by_number() {
        let state = test_state();
        for number in ["1", "2", "1"] {
            state
                .store
                .append_release(NewRelease::new("p", number))
                .await
                .unwrap();
        }

        let query = ReleaseQuery {
            project: Some("p".into()),
            number: Some("1".into()),
            ..Default::default()
        };
        let Json(releases) = list_releases(State(state), Query(query)).await.unwrap();
        assert_eq!(releases.len(), 2);
        assert!(releases.iter().all(|r| r.number == "1"));
    }
}
