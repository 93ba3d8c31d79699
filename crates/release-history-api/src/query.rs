//! Query-string parameters for the list endpoints.
//!
//! A parameter only counts when it appears exactly once; a repeated key is
//! treated as absent and falls back to its default.

use chrono::{DateTime, Utc};
use release_history_store::{DEFAULT_PROJECT, PROD_ENVIRONMENT};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};

/// Raw `key=value` pairs in request order.
type Pairs = Vec<(String, String)>;

/// The value of `key` if it occurs exactly once.
fn single(pairs: &[(String, String)], key: &str) -> Option<String> {
    let mut values = pairs.iter().filter(|(k, _)| k == key).map(|(_, v)| v);
    match (values.next(), values.next()) {
        (Some(value), None) => Some(value.clone()),
        _ => None,
    }
}

/// `GET /deployment` parameters. Everything is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(from = "Pairs")]
pub struct DeploymentQuery {
    pub date: Option<String>,
    pub environment: Option<String>,
    pub project: Option<String>,
    /// `showAll`
    pub show_all: Option<String>,
}

impl From<Pairs> for DeploymentQuery {
    fn from(pairs: Pairs) -> Self {
        Self {
            date: single(&pairs, "date"),
            environment: single(&pairs, "environment"),
            project: single(&pairs, "project"),
            show_all: single(&pairs, "showAll"),
        }
    }
}

impl DeploymentQuery {
    pub fn as_of(&self) -> ApiResult<DateTime<Utc>> {
        parse_as_of(self.date.as_deref())
    }

    pub fn environment(&self) -> &str {
        self.environment.as_deref().unwrap_or(PROD_ENVIRONMENT)
    }

    pub fn project(&self) -> &str {
        self.project.as_deref().unwrap_or(DEFAULT_PROJECT)
    }

    pub fn show_all(&self) -> bool {
        is_true(self.show_all.as_deref())
    }
}

/// `GET /release` parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(from = "Pairs")]
pub struct ReleaseQuery {
    pub date: Option<String>,
    pub project: Option<String>,
    /// `showAll`
    pub show_all: Option<String>,
    pub number: Option<String>,
}

impl From<Pairs> for ReleaseQuery {
    fn from(pairs: Pairs) -> Self {
        Self {
            date: single(&pairs, "date"),
            project: single(&pairs, "project"),
            show_all: single(&pairs, "showAll"),
            number: single(&pairs, "number"),
        }
    }
}

/// How a release listing is resolved, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseSelection {
    /// Exact match on project and number, any date.
    ByNumber(String),
    /// Full history up to the instant.
    All(DateTime<Utc>),
    /// Latest release of the project as of the instant.
    Latest(DateTime<Utc>),
}

impl ReleaseQuery {
    pub fn project(&self) -> &str {
        self.project.as_deref().unwrap_or(DEFAULT_PROJECT)
    }

    /// A non-empty `number` wins over `showAll`, which wins over latest.
    ///
    /// `date` is validated even when `number` makes it irrelevant.
    pub fn selection(&self) -> ApiResult<ReleaseSelection> {
        let as_of = parse_as_of(self.date.as_deref())?;
        if let Some(number) = self.number.as_deref().filter(|n| !n.is_empty()) {
            return Ok(ReleaseSelection::ByNumber(number.to_string()));
        }
        if is_true(self.show_all.as_deref()) {
            return Ok(ReleaseSelection::All(as_of));
        }
        Ok(ReleaseSelection::Latest(as_of))
    }
}

/// Parse an RFC 3339 instant, defaulting to now when absent.
pub fn parse_as_of(date: Option<&str>) -> ApiResult<DateTime<Utc>> {
    match date {
        None => Ok(Utc::now()),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| ApiError::BadRequest(format!("invalid date {raw:?}: {e}"))),
    }
}

fn is_true(flag: Option<&str>) -> bool {
    flag == Some("true")
}
