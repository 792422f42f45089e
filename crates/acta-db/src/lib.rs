//! Postgres collaborator: executes the authoritative activity pull and maps
//! rows into the core handoff contract. sqlx stays contained here.

use acta_core::ActivityRow;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use tracing::info;

pub const CRATE_NAME: &str = "acta-db";

/// The full pull: one row per project activity, every column nullable at the
/// source.
const ACTIVITY_QUERY: &str = "\
SELECT program, project_id, activity_id, \
       col1, col2, col3, col4, col5, col6, \
       date1, date2, date3, date4, type \
FROM ops.project_activity";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("connecting to database: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("executing activity query: {0}")]
    Query(#[source] sqlx::Error),
}

#[derive(Debug, sqlx::FromRow)]
struct PgActivityRow {
    program: Option<String>,
    project_id: Option<String>,
    activity_id: Option<String>,
    col1: Option<f64>,
    col2: Option<String>,
    col3: Option<String>,
    col4: Option<String>,
    col5: Option<String>,
    col6: Option<String>,
    date1: Option<NaiveDate>,
    date2: Option<NaiveDate>,
    date3: Option<NaiveDate>,
    date4: Option<NaiveDate>,
    #[sqlx(rename = "type")]
    activity_type: Option<String>,
}

impl From<PgActivityRow> for ActivityRow {
    fn from(row: PgActivityRow) -> Self {
        ActivityRow {
            program: row.program,
            project_id: row.project_id,
            activity_id: row.activity_id,
            col1: row.col1,
            col2: row.col2,
            col3: row.col3,
            col4: row.col4,
            col5: row.col5,
            col6: row.col6,
            date1: row.date1,
            date2: row.date2,
            date3: row.date3,
            date4: row.date4,
            activity_type: row.activity_type,
        }
    }
}

/// Thin pool wrapper around the activity table.
#[derive(Debug, Clone)]
pub struct ActivityStore {
    pool: PgPool,
}

impl ActivityStore {
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .map_err(DbError::Connect)?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Pull the full authoritative record set. Any failure here is fatal to
    /// the run; no remote call may happen without this data.
    pub async fn fetch_activity_rows(&self) -> Result<Vec<ActivityRow>, DbError> {
        let rows: Vec<PgActivityRow> = sqlx::query_as(ACTIVITY_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)?;
        info!(rows = rows.len(), "fetched activity rows");
        Ok(rows.into_iter().map(ActivityRow::from).collect())
    }
}
