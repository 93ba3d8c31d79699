//! PostgreSQL event store.
//!
//! Keeps the `deployment` / `release` tables with `d_` / `r_` prefixed
//! columns and database-assigned `SERIAL` ids and `clock_timestamp()` dates.
//! The latest-per-key read runs as a `max(id) ... GROUP BY` join in the
//! database instead of in process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::EventStore;
use crate::types::*;

macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

const CREATE_DEPLOYMENT_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS deployment
    (
        d_id          SERIAL,
        d_project     TEXT                     NOT NULL,
        d_service     TEXT                     NOT NULL,
        d_environment TEXT                     NOT NULL,
        d_tag         TEXT                     NOT NULL,
        d_date        TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT clock_timestamp(),
        CONSTRAINT pk_deployment PRIMARY KEY (d_id)
    )
"#;

const CREATE_RELEASE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS release
    (
        r_id      SERIAL,
        r_project TEXT                     NOT NULL,
        r_number  TEXT                     NOT NULL,
        r_date    TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT clock_timestamp(),
        CONSTRAINT pk_release PRIMARY KEY (r_id)
    )
"#;

const INSERT_DEPLOYMENT: &str = r#"
    INSERT INTO deployment (d_project, d_service, d_environment, d_tag, d_date)
    VALUES ($1, $2, $3, $4, COALESCE($5, clock_timestamp()))
    RETURNING d_id::BIGINT AS id, d_project AS project, d_service AS service,
              d_environment AS environment, d_tag AS tag, d_date AS date
"#;

const SELECT_DEPLOYMENTS: &str = r#"
    SELECT d_id::BIGINT AS id, d_project AS project, d_service AS service,
           d_environment AS environment, d_tag AS tag, d_date AS date
    FROM deployment
    WHERE d_date <= $1
    AND d_environment = $2
    AND d_project = $3
    ORDER BY d_id
"#;

const SELECT_LATEST_DEPLOYMENTS: &str = r#"
    SELECT d1.d_id::BIGINT AS id, d1.d_project AS project, d1.d_service AS service,
           d1.d_environment AS environment, d1.d_tag AS tag, d1.d_date AS date
    FROM deployment d1
    INNER JOIN (
        SELECT d_service, d_environment, max(d_id) AS d_id
        FROM deployment
        WHERE d_date <= $1
        AND d_environment = $2
        AND d_project = $3
        GROUP BY 1, 2
    ) d2 ON d1.d_id = d2.d_id
    ORDER BY d1.d_id
"#;

const INSERT_RELEASE: &str = r#"
    INSERT INTO release (r_project, r_number, r_date)
    VALUES ($1, $2, COALESCE($3, clock_timestamp()))
    RETURNING r_id::BIGINT AS id, r_project AS project, r_number AS number, r_date AS date
"#;

const SELECT_RELEASES: &str = r#"
    SELECT r_id::BIGINT AS id, r_project AS project, r_number AS number, r_date AS date
    FROM release
    WHERE r_date <= $1
    AND r_project = $2
    ORDER BY r_id
"#;

const SELECT_LATEST_RELEASES: &str = r#"
    SELECT r1.r_id::BIGINT AS id, r1.r_project AS project, r1.r_number AS number,
           r1.r_date AS date
    FROM release r1
    INNER JOIN (
        SELECT r_project, max(r_id) AS r_id
        FROM release
        WHERE r_date <= $1
        AND r_project = $2
        GROUP BY 1
    ) r2 ON r1.r_id = r2.r_id
    ORDER BY r1.r_id
"#;

const SELECT_RELEASES_BY_NUMBER: &str = r#"
    SELECT r_id::BIGINT AS id, r_project AS project, r_number AS number, r_date AS date
    FROM release
    WHERE r_number = $1
    AND r_project = $2
    ORDER BY r_id
"#;

/// Event store over a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database and create the event tables if they don't exist.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(map_err!(Open))?;

        let store = Self::from_pool(pool);
        store.ensure_tables().await?;
        Ok(store)
    }

    /// Wrap an existing pool. Tables are not created.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_tables(&self) -> StoreResult<()> {
        for ddl in [CREATE_DEPLOYMENT_TABLE, CREATE_RELEASE_TABLE] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(map_err!(Table))?;
        }
        debug!("event tables ensured");
        Ok(())
    }

    async fn fetch_deployments(
        &self,
        query: &str,
        filter: &DeploymentFilter,
    ) -> StoreResult<Vec<Deployment>> {
        let rows = sqlx::query(query)
            .bind(filter.as_of)
            .bind(&filter.environment)
            .bind(&filter.project)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err!(Database))?;
        rows.iter().map(deployment_from_row).collect()
    }

    async fn fetch_releases(&self, query: &str, filter: &ReleaseFilter) -> StoreResult<Vec<Release>> {
        let rows = sqlx::query(query)
            .bind(filter.as_of)
            .bind(&filter.project)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err!(Database))?;
        rows.iter().map(release_from_row).collect()
    }
}

fn deployment_from_row(row: &PgRow) -> StoreResult<Deployment> {
    Ok(Deployment {
        id: row.try_get("id").map_err(map_err!(Deserialize))?,
        project: row.try_get("project").map_err(map_err!(Deserialize))?,
        service: row.try_get("service").map_err(map_err!(Deserialize))?,
        environment: row.try_get("environment").map_err(map_err!(Deserialize))?,
        tag: row.try_get("tag").map_err(map_err!(Deserialize))?,
        date: row.try_get::<DateTime<Utc>, _>("date").map_err(map_err!(Deserialize))?,
    })
}

fn release_from_row(row: &PgRow) -> StoreResult<Release> {
    Ok(Release {
        id: row.try_get("id").map_err(map_err!(Deserialize))?,
        project: row.try_get("project").map_err(map_err!(Deserialize))?,
        number: row.try_get("number").map_err(map_err!(Deserialize))?,
        date: row.try_get::<DateTime<Utc>, _>("date").map_err(map_err!(Deserialize))?,
    })
}

#[async_trait]
impl EventStore for PgStore {
    async fn append_deployment(&self, input: NewDeployment) -> StoreResult<Deployment> {
        input.validate()?;
        let row = sqlx::query(INSERT_DEPLOYMENT)
            .bind(&input.project)
            .bind(&input.service)
            .bind(&input.environment)
            .bind(&input.tag)
            .bind(input.date)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err!(Write))?;
        let deployment = deployment_from_row(&row)?;
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
        let row = sqlx::query(INSERT_RELEASE)
            .bind(&input.project)
            .bind(&input.number)
            .bind(input.date)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err!(Write))?;
        let release = release_from_row(&row)?;
        debug!(id = release.id, project = %release.project, number = %release.number, "release appended");
        Ok(release)
    }

    async fn list_deployments(&self, filter: &DeploymentFilter) -> StoreResult<Vec<Deployment>> {
        self.fetch_deployments(SELECT_DEPLOYMENTS, filter).await
    }

    async fn latest_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> StoreResult<Vec<Deployment>> {
        self.fetch_deployments(SELECT_LATEST_DEPLOYMENTS, filter).await
    }

    async fn list_releases(&self, filter: &ReleaseFilter) -> StoreResult<Vec<Release>> {
        self.fetch_releases(SELECT_RELEASES, filter).await
    }

    async fn latest_releases(&self, filter: &ReleaseFilter) -> StoreResult<Vec<Release>> {
        self.fetch_releases(SELECT_LATEST_RELEASES, filter).await
    }

    async fn releases_by_number(&self, project: &str, number: &str) -> StoreResult<Vec<Release>> {
        let rows = sqlx::query(SELECT_RELEASES_BY_NUMBER)
            .bind(number)
            .bind(project)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err!(Database))?;
        rows.iter().map(release_from_row).collect()
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_err!(Database))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
