//! Domain types for the release history event log.
//!
//! Two kinds of events are recorded: deployments (a tag of a service landed
//! in an environment) and releases (a numbered release was cut for a
//! project). Both are immutable once appended; ids and dates are assigned
//! by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Store-assigned event identifier. Strictly increasing in insertion order.
pub type EventId = i64;

/// Environment whose deployments are attached to every release.
pub const PROD_ENVIRONMENT: &str = "prod";

/// Project used when a query does not name one.
pub const DEFAULT_PROJECT: &str = "alt";

// ── Deployment ─────────────────────────────────────────────────────

/// A deployment to be appended to the log.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewDeployment {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub tag: String,
    /// Backfilled event time. `None` lets the store stamp the current instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl NewDeployment {
    pub fn new(
        project: impl Into<String>,
        service: impl Into<String>,
        environment: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            service: service.into(),
            environment: environment.into(),
            tag: tag.into(),
            date: None,
        }
    }

    /// Set an explicit event time instead of the store clock.
    pub fn backfilled(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Reject deployments with any empty required field.
    pub fn validate(&self) -> StoreResult<()> {
        if self.project.is_empty()
            || self.service.is_empty()
            || self.tag.is_empty()
            || self.environment.is_empty()
        {
            return Err(StoreError::Validation(
                "invalid deployment, missing required field".to_string(),
            ));
        }
        Ok(())
    }

    /// Materialize the persisted event once the store has assigned id and date.
    pub fn into_event(self, id: EventId, date: DateTime<Utc>) -> Deployment {
        Deployment {
            id,
            project: self.project,
            service: self.service,
            environment: self.environment,
            tag: self.tag,
            date,
        }
    }
}

/// A persisted deployment event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deployment {
    pub id: EventId,
    pub project: String,
    pub service: String,
    pub environment: String,
    pub tag: String,
    pub date: DateTime<Utc>,
}

// ── Release ────────────────────────────────────────────────────────

/// A release to be appended to the log.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewRelease {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl NewRelease {
    pub fn new(project: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            number: number.into(),
            date: None,
        }
    }

    pub fn backfilled(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.project.is_empty() || self.number.is_empty() {
            return Err(StoreError::Validation(
                "invalid release, missing required field".to_string(),
            ));
        }
        Ok(())
    }

    pub fn into_event(self, id: EventId, date: DateTime<Utc>) -> Release {
        Release {
            id,
            project: self.project,
            number: self.number,
            date,
        }
    }
}

/// A persisted release event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Release {
    pub id: EventId,
    pub project: String,
    pub number: String,
    pub date: DateTime<Utc>,
}

/// A release together with the prod deployments live at its date.
///
/// The snapshot is derived on every read and never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseWithDeployments {
    pub id: EventId,
    pub project: String,
    pub number: String,
    pub deployments: Vec<Deployment>,
    pub date: DateTime<Utc>,
}

impl ReleaseWithDeployments {
    pub fn new(release: Release, deployments: Vec<Deployment>) -> Self {
        Self {
            id: release.id,
            project: release.project,
            number: release.number,
            deployments,
            date: release.date,
        }
    }
}

// ── Filters ────────────────────────────────────────────────────────

/// Selects deployments of one project in one environment up to `as_of`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentFilter {
    pub project: String,
    pub environment: String,
    pub as_of: DateTime<Utc>,
}

impl DeploymentFilter {
    pub fn new(
        project: impl Into<String>,
        environment: impl Into<String>,
        as_of: DateTime<Utc>,
    ) -> Self {
        Self {
            project: project.into(),
            environment: environment.into(),
            as_of,
        }
    }

    /// Prod deployments of a project as of the given instant.
    pub fn prod(project: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        Self::new(project, PROD_ENVIRONMENT, as_of)
    }

    /// Project/environment match. The `as_of` bound is applied by the resolver.
    pub fn matches(&self, deployment: &Deployment) -> bool {
        deployment.project == self.project && deployment.environment == self.environment
    }
}

/// Selects releases of one project up to `as_of`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFilter {
    pub project: String,
    pub as_of: DateTime<Utc>,
}

impl ReleaseFilter {
    pub fn new(project: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        Self {
            project: project.into(),
            as_of,
        }
    }

    pub fn matches(&self, release: &Release) -> bool {
        release.project == self.project
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_requires_every_field() {
        assert!(NewDeployment::new("p", "s", "prod", "v1").validate().is_ok());

        for input in [
            NewDeployment::new("", "s", "prod", "v1"),
            NewDeployment::new("p", "", "prod", "v1"),
            NewDeployment::new("p", "s", "", "v1"),
            NewDeployment::new("p", "s", "prod", ""),
        ] {
            let err = input.validate().unwrap_err();
            assert!(err.is_validation());
        }
    }

    #[test]
    fn release_requires_project_and_number() {
        assert!(NewRelease::new("p", "42").validate().is_ok());
        assert!(NewRelease::new("", "42").validate().is_err());
        assert!(NewRelease::new("p", "").validate().is_err());
    }

    #[test]
    fn missing_json_fields_deserialize_as_empty() {
        let input: NewDeployment = serde_json::from_str(r#"{"project":"p"}"#).unwrap();
        assert_eq!(input.service, "");
        assert!(input.date.is_none());
        assert!(input.validate().is_err());
    }

    #[test]
    fn release_snapshot_serializes_in_wire_order() {
        let release = Release {
            id: 7,
            project: "p".to_string(),
            number: "42".to_string(),
            date: DateTime::parse_from_rfc3339("2019-04-09T15:39:05Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let json = serde_json::to_string(&ReleaseWithDeployments::new(release, vec![])).unwrap();
        assert_eq!(
            json,
            r#"{"id":7,"project":"p","number":"42","deployments":[],"date":"2019-04-09T15:39:05Z"}"#
        );
    }
}
