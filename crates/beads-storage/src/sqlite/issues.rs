//! Issue CRUD operations for [`SqliteStore`].

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use beads_core::enums::{EventType, IssueType, Status};
use beads_core::issue::Issue;

use crate::error::{Result, StorageError};
use crate::sqlite::labels::get_labels_on_conn;
use crate::sqlite::store::{SqliteStore, begin_immediate, commit};
use crate::traits::IssueFilter;

/// All issue columns in a deterministic order for SELECT and INSERT.
pub(crate) const ISSUE_COLUMNS: &str = "id, title, description, status, priority, issue_type, \
     assignee, created_at, created_by, updated_at, closed_at, close_reason, is_template, \
     source_formula";

// ---------------------------------------------------------------------------
// Row scanning
// ---------------------------------------------------------------------------

/// Deserialises a row selected with [`ISSUE_COLUMNS`] into an [`Issue`].
/// Labels are filled in separately.
pub(crate) fn scan_issue(row: &Row<'_>) -> rusqlite::Result<Issue> {
    let closed_at: Option<String> = row.get("closed_at")?;
    Ok(Issue {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: Status::from(row.get::<_, String>("status")?),
        priority: row.get("priority")?,
        issue_type: IssueType::from(row.get::<_, String>("issue_type")?),
        assignee: row.get("assignee")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        created_by: row.get("created_by")?,
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
        closed_at: closed_at.as_deref().map(parse_datetime),
        close_reason: row.get("close_reason")?,
        is_template: row.get::<_, i32>("is_template")? != 0,
        source_formula: row.get("source_formula")?,
        labels: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Formats a `DateTime<Utc>` as ISO 8601 TEXT for SQLite.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parses an ISO 8601 TEXT string from SQLite into a `DateTime<Utc>`.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    s.parse::<DateTime<Utc>>().unwrap_or_else(|_| {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
            .map(|ndt| ndt.and_utc())
            .unwrap_or_else(|_| Utc::now())
    })
}

/// Emits an event row into the events table.
#[allow(clippy::too_many_arguments)]
pub(crate) fn emit_event(
    conn: &Connection,
    issue_id: &str,
    event_type: EventType,
    actor: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
    comment: Option<&str>,
    created_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO events (issue_id, event_type, actor, old_value, new_value, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            issue_id,
            event_type.as_str(),
            actor,
            old_value,
            new_value,
            comment,
            created_at,
        ],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Connection-level helpers (used by both SqliteStore and Transaction)
// ---------------------------------------------------------------------------

/// Inserts a single issue and its labels.
pub(crate) fn insert_issue(conn: &Connection, issue: &Issue, actor: &str) -> Result<()> {
    if issue.id.is_empty() {
        return Err(StorageError::validation("issue id must not be empty"));
    }
    if issue.title.trim().is_empty() {
        return Err(StorageError::validation(format!(
            "issue {} must have a title",
            issue.id
        )));
    }

    conn.execute(
        &format!(
            "INSERT INTO issues ({ISSUE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            issue.id,
            issue.title,
            issue.description,
            issue.status.as_str(),
            issue.priority,
            issue.issue_type.as_str(),
            issue.assignee,
            format_datetime(&issue.created_at),
            issue.created_by,
            format_datetime(&issue.updated_at),
            issue.closed_at.as_ref().map(format_datetime),
            issue.close_reason,
            issue.is_template as i32,
            issue.source_formula,
        ],
    )?;

    for label in &issue.labels {
        conn.execute(
            "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?1, ?2)",
            params![issue.id, label],
        )?;
    }

    emit_event(
        conn,
        &issue.id,
        EventType::Created,
        actor,
        None,
        None,
        None,
        &format_datetime(&Utc::now()),
    )
}

/// Retrieves a single issue by ID, with labels.
pub(crate) fn get_issue_on_conn(conn: &Connection, id: &str) -> Result<Issue> {
    let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1");
    let mut issue = conn
        .query_row(&sql, params![id], scan_issue)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StorageError::not_found("issue", id),
            other => StorageError::Query(other),
        })?;
    issue.labels = get_labels_on_conn(conn, id)?;
    Ok(issue)
}

pub(crate) fn close_issue_on_conn(
    conn: &Connection,
    id: &str,
    reason: &str,
    actor: &str,
) -> Result<()> {
    let now_str = format_datetime(&Utc::now());

    let affected = conn.execute(
        "UPDATE issues SET status = 'closed', closed_at = ?1, close_reason = ?2, updated_at = ?1
         WHERE id = ?3",
        params![now_str, reason, id],
    )?;
    if affected == 0 {
        return Err(StorageError::not_found("issue", id));
    }

    emit_event(
        conn,
        id,
        EventType::Closed,
        actor,
        None,
        Some(reason),
        None,
        &now_str,
    )
}

pub(crate) fn reopen_issue_on_conn(conn: &Connection, id: &str, actor: &str) -> Result<()> {
    let now_str = format_datetime(&Utc::now());

    let affected = conn.execute(
        "UPDATE issues SET status = 'open', closed_at = NULL, close_reason = '', updated_at = ?1
         WHERE id = ?2",
        params![now_str, id],
    )?;
    if affected == 0 {
        return Err(StorageError::not_found("issue", id));
    }

    emit_event(
        conn,
        id,
        EventType::Reopened,
        actor,
        Some("closed"),
        Some("open"),
        None,
        &now_str,
    )
}

pub(crate) fn list_issues_on_conn(conn: &Connection, filter: &IssueFilter) -> Result<Vec<Issue>> {
    let mut where_clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<String> = Vec::new();

    if let Some(status) = &filter.status {
        param_values.push(status.as_str().to_owned());
        where_clauses.push(format!("status = ?{}", param_values.len()));
    }
    if let Some(issue_type) = &filter.issue_type {
        param_values.push(issue_type.as_str().to_owned());
        where_clauses.push(format!("issue_type = ?{}", param_values.len()));
    }
    if let Some(formula) = &filter.source_formula {
        param_values.push(formula.clone());
        where_clauses.push(format!("source_formula = ?{}", param_values.len()));
    }
    if !filter.include_templates {
        where_clauses.push("is_template = 0".into());
    }

    let where_sql = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {ISSUE_COLUMNS} FROM issues {where_sql} ORDER BY priority ASC, created_at ASC, id ASC"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(param_values.iter()), scan_issue)?;
    let mut issues = Vec::new();
    for row in rows {
        let mut issue = row?;
        issue.labels = get_labels_on_conn(conn, &issue.id)?;
        issues.push(issue);
    }
    Ok(issues)
}

// ---------------------------------------------------------------------------
// SqliteStore issue methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    pub fn create_issue_impl(&self, issue: &Issue, actor: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        insert_issue(&conn, issue, actor)
    }

    /// Creates multiple issues in a single transaction.
    pub fn create_issues_impl(&self, issues: &[Issue], actor: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        let tx = begin_immediate(&conn)?;
        for issue in issues {
            insert_issue(&tx, issue, actor)?;
        }
        commit(tx)
    }

    pub fn get_issue_impl(&self, id: &str) -> Result<Issue> {
        let conn = self.lock_conn()?;
        get_issue_on_conn(&conn, id)
    }

    pub fn list_issues_impl(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let conn = self.lock_conn()?;
        list_issues_on_conn(&conn, filter)
    }

    pub fn count_issues_impl(&self) -> Result<usize> {
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn close_issue_impl(&self, id: &str, reason: &str, actor: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        close_issue_on_conn(&conn, id, reason, actor)
    }

    pub fn reopen_issue_impl(&self, id: &str, actor: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        reopen_issue_on_conn(&conn, id, actor)
    }
}
