//! Project namespacing.
//!
//! Every entity, relationship, embedding, and feedback row is scoped to a
//! project. The persistence layer gives each project its own logical tables
//! by prefixing table names with the sanitized project name:
//! `{project}_entities`, `{project}_relationships`, `{project}_embeddings`,
//! `{project}_feedback`.
//!
//! Sanitization maps names onto `[A-Za-z0-9_]`. Two distinct project names
//! that sanitize to the same prefix would silently share tables, so a
//! registry table records the raw name per prefix and a mismatch fails
//! initialization with [`Error::Invariant`].

use super::sqlite::{acquire_lock, storage_err};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Mutex;

/// Table name set for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectTables {
    /// Sanitized prefix.
    pub prefix: String,
    /// Entities table name.
    pub entities: String,
    /// Relationships table name.
    pub relationships: String,
    /// Embeddings table name.
    pub embeddings: String,
    /// Feedback table name.
    pub feedback: String,
}

impl ProjectTables {
    fn from_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            entities: format!("{prefix}_entities"),
            relationships: format!("{prefix}_relationships"),
            embeddings: format!("{prefix}_embeddings"),
            feedback: format!("{prefix}_feedback"),
        }
    }
}

/// Sanitizes a project name to a table prefix.
///
/// Characters outside `[A-Za-z0-9_]` become `_`; a leading digit gains a
/// `p` prefix so the result is a valid `SQLite` identifier head.
#[must_use]
pub fn sanitize_project_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if sanitized.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        sanitized.insert(0, 'p');
    }
    sanitized
}

/// Initializes the per-project tables and returns their names.
///
/// Idempotent for a fixed project name. Also maintains the `projects`
/// registry used for collision detection.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for an empty name,
/// [`Error::Invariant`] when another project already owns the sanitized
/// prefix, and storage errors otherwise.
pub fn initialize_project(conn: &Mutex<Connection>, project: &str) -> Result<ProjectTables> {
    if project.trim().is_empty() {
        return Err(Error::InvalidInput("project name is empty".to_string()));
    }

    let prefix = sanitize_project_name(project);
    let tables = ProjectTables::from_prefix(&prefix);
    let conn = acquire_lock(conn, "projects");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS projects (
            prefix TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| storage_err("create_projects_table", &e))?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT name FROM projects WHERE prefix = ?1",
            params![prefix],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| storage_err("lookup_project", &e))?;

    match existing {
        Some(ref name) if name != project => {
            return Err(Error::Invariant(format!(
                "project '{project}' collides with '{name}' on table prefix '{prefix}'"
            )));
        },
        Some(_) => {},
        None => {
            conn.execute(
                "INSERT INTO projects (prefix, name, created_at) VALUES (?1, ?2, ?3)",
                params![prefix, project, crate::current_timestamp()],
            )
            .map_err(|e| storage_err("register_project", &e))?;
        },
    }

    create_project_tables(&conn, &tables)?;
    Ok(tables)
}

fn create_project_tables(conn: &Connection, tables: &ProjectTables) -> Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                entity_type TEXT NOT NULL,
                name TEXT NOT NULL,
                qualified_name TEXT NOT NULL,
                file_path TEXT,
                start_line INTEGER,
                end_line INTEGER,
                content TEXT,
                summary TEXT,
                metadata TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (entity_type, qualified_name)
            )",
            tables.entities
        ),
        [],
    )
    .map_err(|e| storage_err("create_entities_table", &e))?;

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                relationship TEXT NOT NULL,
                weight REAL NOT NULL DEFAULT 1.0,
                metadata TEXT,
                created_at INTEGER NOT NULL,
                UNIQUE (source_id, target_id, relationship)
            )",
            tables.relationships
        ),
        [],
    )
    .map_err(|e| storage_err("create_relationships_table", &e))?;

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (
                entity_id TEXT NOT NULL,
                model TEXT NOT NULL,
                dimensions INTEGER NOT NULL,
                vector BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (entity_id, model)
            )",
            tables.embeddings
        ),
        [],
    )
    .map_err(|e| storage_err("create_embeddings_table", &e))?;

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                query_id TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                signal TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            tables.feedback
        ),
        [],
    )
    .map_err(|e| storage_err("create_feedback_table", &e))?;

    create_indexes(conn, tables);
    Ok(())
}

fn create_indexes(conn: &Connection, tables: &ProjectTables) {
    let p = &tables.prefix;
    let statements = [
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{p}_entities_name ON {} (name)",
            tables.entities
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{p}_entities_qualified ON {} (qualified_name)",
            tables.entities
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{p}_entities_type ON {} (entity_type)",
            tables.entities
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{p}_entities_file ON {} (file_path)",
            tables.entities
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{p}_rel_source ON {} (source_id)",
            tables.relationships
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{p}_rel_target ON {} (target_id)",
            tables.relationships
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{p}_rel_type ON {} (relationship)",
            tables.relationships
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{p}_feedback_entity ON {} (entity_id)",
            tables.feedback
        ),
    ];
    for sql in &statements {
        let _ = conn.execute(sql, []);
    }
}
