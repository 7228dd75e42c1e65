//! Job repository: row-level CRUD for the `jobs` table.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Database, DatabaseError};
use crate::model::JobRecord;

/// A raw job row from the database.
///
/// Structured fields are stored as JSON text, timestamps as fixed-width
/// RFC 3339 strings so that lexical order matches chronological order.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub job_id: String,
    pub source: String,
    pub mode: String,
    pub status: String,
    pub job_posting: Option<String>,
    pub raw_input: Option<String>,
    pub generated_document: Option<String>,
    pub rendered_file_path: Option<String>,
    pub application_url: Option<String>,
    pub application_type: Option<String>,
    pub application_result: Option<String>,
    pub user_feedback: Option<String>,
    pub retry_count: i64,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub applied_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            source: row.get("source")?,
            mode: row.get("mode")?,
            status: row.get("status")?,
            job_posting: row.get("job_posting")?,
            raw_input: row.get("raw_input")?,
            generated_document: row.get("generated_document")?,
            rendered_file_path: row.get("rendered_file_path")?,
            application_url: row.get("application_url")?,
            application_type: row.get("application_type")?,
            application_result: row.get("application_result")?,
            user_feedback: row.get("user_feedback")?,
            retry_count: row.get("retry_count")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            applied_at: row.get("applied_at")?,
        })
    }

    /// Encodes a domain record into its stored form.
    pub fn from_record(record: &JobRecord) -> Result<Self, DatabaseError> {
        let id = record.job_id.as_str();
        Ok(Self {
            job_id: record.job_id.clone(),
            source: record.source.as_str().to_string(),
            mode: record.mode.as_str().to_string(),
            status: record.status.as_str().to_string(),
            job_posting: encode_json(id, "job_posting", &record.job_posting)?,
            raw_input: encode_json(id, "raw_input", &record.raw_input)?,
            generated_document: encode_json(
                id,
                "generated_document",
                &record.generated_document,
            )?,
            rendered_file_path: record.rendered_file_path.clone(),
            application_url: record.application_url.clone(),
            application_type: record.application_type.map(|t| t.as_str().to_string()),
            application_result: encode_json(
                id,
                "application_result",
                &record.application_result,
            )?,
            user_feedback: record.user_feedback.clone(),
            retry_count: i64::from(record.retry_count),
            error_message: record.error_message.clone(),
            created_at: format_timestamp(&record.created_at),
            updated_at: format_timestamp(&record.updated_at),
            applied_at: record.applied_at.as_ref().map(format_timestamp),
        })
    }

    /// Decodes the stored form back into a domain record.
    pub fn into_record(self) -> Result<JobRecord, DatabaseError> {
        let id = self.job_id.clone();
        let corrupt = |column: &'static str, reason: String| DatabaseError::Corrupt {
            job_id: id.clone(),
            column,
            reason,
        };

        Ok(JobRecord {
            source: self
                .source
                .parse()
                .map_err(|e: crate::model::UnknownVariant| corrupt("source", e.to_string()))?,
            mode: self
                .mode
                .parse()
                .map_err(|e: crate::model::UnknownVariant| corrupt("mode", e.to_string()))?,
            status: self
                .status
                .parse()
                .map_err(|e: crate::model::UnknownVariant| corrupt("status", e.to_string()))?,
            job_posting: decode_json(&id, "job_posting", self.job_posting.as_deref())?,
            raw_input: decode_json(&id, "raw_input", self.raw_input.as_deref())?,
            generated_document: decode_json(
                &id,
                "generated_document",
                self.generated_document.as_deref(),
            )?,
            rendered_file_path: self.rendered_file_path,
            application_url: self.application_url,
            application_type: self
                .application_type
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(|e: crate::model::UnknownVariant| {
                    corrupt("application_type", e.to_string())
                })?,
            application_result: decode_json(
                &id,
                "application_result",
                self.application_result.as_deref(),
            )?,
            user_feedback: self.user_feedback,
            retry_count: u32::try_from(self.retry_count)
                .map_err(|e| corrupt("retry_count", e.to_string()))?,
            error_message: self.error_message,
            created_at: parse_timestamp(&self.created_at)
                .map_err(|e| corrupt("created_at", e))?,
            updated_at: parse_timestamp(&self.updated_at)
                .map_err(|e| corrupt("updated_at", e))?,
            applied_at: self
                .applied_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()
                .map_err(|e| corrupt("applied_at", e))?,
            job_id: self.job_id,
        })
    }
}

/// Sortable timestamp columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl SortColumn {
    fn column(&self) -> &'static str {
        match self {
            SortColumn::CreatedAt => "created_at",
            SortColumn::UpdatedAt => "updated_at",
        }
    }
}

/// Query parameters for job listing.
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    /// Restrict to these statuses; empty means any status.
    pub statuses: Vec<String>,
    pub application_url: Option<String>,
    pub order_by: SortColumn,
    pub descending: bool,
    pub limit: Option<u64>,
    pub offset: u64,
}

// ─── Helpers ────────────────────────────────────────────────────────────────

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

fn encode_json<T: Serialize>(
    job_id: &str,
    column: &'static str,
    value: &Option<T>,
) -> Result<Option<String>, DatabaseError> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DatabaseError::Corrupt {
            job_id: job_id.to_string(),
            column,
            reason: e.to_string(),
        })
}

fn decode_json<T: DeserializeOwned>(
    job_id: &str,
    column: &'static str,
    value: Option<&str>,
) -> Result<Option<T>, DatabaseError> {
    value
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| DatabaseError::Corrupt {
            job_id: job_id.to_string(),
            column,
            reason: e.to_string(),
        })
}

// ─── Connection-level operations ────────────────────────────────────────────

/// Inserts a row unless one with the same `job_id` exists.
/// Returns `false` when the id was already taken; the existing row is untouched.
pub fn insert_new(conn: &Connection, job: &JobRow) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO jobs (job_id, source, mode, status, job_posting, raw_input,
         generated_document, rendered_file_path, application_url, application_type,
         application_result, user_feedback, retry_count, error_message, created_at,
         updated_at, applied_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            job.job_id,
            job.source,
            job.mode,
            job.status,
            job.job_posting,
            job.raw_input,
            job.generated_document,
            job.rendered_file_path,
            job.application_url,
            job.application_type,
            job.application_result,
            job.user_feedback,
            job.retry_count,
            job.error_message,
            job.created_at,
            job.updated_at,
            job.applied_at,
        ],
    )?;
    Ok(changed == 1)
}

/// Overwrites every column except `job_id` and `created_at`.
pub fn overwrite(conn: &Connection, job: &JobRow) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET source=?2, mode=?3, status=?4, job_posting=?5, raw_input=?6,
         generated_document=?7, rendered_file_path=?8, application_url=?9,
         application_type=?10, application_result=?11, user_feedback=?12, retry_count=?13,
         error_message=?14, updated_at=?15, applied_at=?16
         WHERE job_id=?1",
        params![
            job.job_id,
            job.source,
            job.mode,
            job.status,
            job.job_posting,
            job.raw_input,
            job.generated_document,
            job.rendered_file_path,
            job.application_url,
            job.application_type,
            job.application_result,
            job.user_feedback,
            job.retry_count,
            job.error_message,
            job.updated_at,
            job.applied_at,
        ],
    )?;
    Ok(changed == 1)
}

pub fn select_by_id(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM jobs WHERE job_id = ?1",
            params![id],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

// ─── Database-level operations ──────────────────────────────────────────────

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| select_by_id(conn, id))
}

/// Deletes a job. Returns whether a row was removed.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM jobs WHERE job_id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

/// Queries jobs with filters and ordering.
pub fn query(db: &Database, query: &JobQuery) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if !query.statuses.is_empty() {
            let placeholders: Vec<String> = query
                .statuses
                .iter()
                .map(|status| {
                    param_values.push(Box::new(status.clone()));
                    format!("?{}", param_values.len())
                })
                .collect();
            conditions.push(format!("status IN ({})", placeholders.join(", ")));
        }
        if let Some(ref url) = query.application_url {
            param_values.push(Box::new(url.clone()));
            conditions.push(format!("application_url = ?{}", param_values.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        // SQLite treats a negative LIMIT as unbounded.
        let limit = query.limit.map(|l| l as i64).unwrap_or(-1);
        param_values.push(Box::new(limit));
        param_values.push(Box::new(query.offset as i64));
        let direction = if query.descending { "DESC" } else { "ASC" };
        let query_sql = format!(
            "SELECT * FROM jobs {} ORDER BY {} {}, job_id {} LIMIT ?{} OFFSET ?{}",
            where_clause,
            query.order_by.column(),
            direction,
            direction,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<JobRow> = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    })
}

/// Deletes rows created before `cutoff` whose status is in `statuses`.
pub fn delete_older_than(
    db: &Database,
    cutoff: &DateTime<Utc>,
    statuses: &[String],
) -> Result<usize, DatabaseError> {
    if statuses.is_empty() {
        return Ok(0);
    }

    db.with_conn(|conn| {
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(format_timestamp(cutoff))];
        let placeholders: Vec<String> = statuses
            .iter()
            .map(|status| {
                param_values.push(Box::new(status.clone()));
                format!("?{}", param_values.len())
            })
            .collect();

        let sql = format!(
            "DELETE FROM jobs WHERE created_at < ?1 AND status IN ({})",
            placeholders.join(", ")
        );
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let deleted = conn.execute(&sql, params_ref.as_slice())?;
        Ok(deleted)
    })
}
