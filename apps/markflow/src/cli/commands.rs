//! # CLI Command Implementations
//!
//! Each command opens its own session against the chosen backend,
//! performs one operation, and prints either human-readable text or JSON
//! (`--json-mode`).

use crate::api::{AuditEntryJson, RecordJson, run_server};
use crate::config::AcademicConfig;
use markflow_core::{MarkflowError, RecordId, Session};
use std::path::Path;

/// Open a session against the selected backend.
fn open_session(database: &Path, backend: &str) -> Result<Session, MarkflowError> {
    match backend {
        "redb" => Session::with_redb(database),
        "memory" => Ok(Session::new()),
        other => Err(MarkflowError::IoError(format!(
            "unknown backend '{other}' (expected \"redb\" or \"memory\")"
        ))),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, MarkflowError> {
    serde_json::to_string_pretty(value).map_err(|e| MarkflowError::SerializationError(e.to_string()))
}

// =============================================================================
// SERVER
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    database: &Path,
    backend: &str,
    host: &str,
    port: u16,
    config: Option<&Path>,
) -> Result<(), MarkflowError> {
    let academic = match config {
        Some(path) => {
            let academic = AcademicConfig::load(path)?;
            tracing::info!(
                "Loaded academic configuration v{} ({} subjects, {} COs, {} POs)",
                academic.outcome.version.0,
                academic.schemes.len(),
                academic.outcome.cos.len(),
                academic.outcome.pos.len(),
            );
            academic
        }
        None => {
            tracing::warn!(
                "No academic configuration supplied - smart marks and attainment endpoints \
                 will report insufficient configuration"
            );
            AcademicConfig::default()
        }
    };

    let session = open_session(database, backend)?;
    let addr = format!("{host}:{port}");
    run_server(&addr, session, academic).await
}

// =============================================================================
// INIT
// =============================================================================

/// Initialize a new empty record database.
pub fn cmd_init(database: &Path, force: bool) -> Result<(), MarkflowError> {
    if database.exists() && !force {
        return Err(MarkflowError::IoError(format!(
            "database {} already exists (use --force to reinitialize)",
            database.display()
        )));
    }
    if database.exists() {
        std::fs::remove_file(database).map_err(|e| MarkflowError::IoError(e.to_string()))?;
    }

    let session = Session::with_redb(database)?;
    println!(
        "Initialized record database at {} (records: {})",
        database.display(),
        session.record_count()
    );
    Ok(())
}

// =============================================================================
// STATUS
// =============================================================================

/// Show store status.
pub fn cmd_status(database: &Path, backend: &str, json_mode: bool) -> Result<(), MarkflowError> {
    let session = open_session(database, backend)?;

    if json_mode {
        let status = serde_json::json!({
            "record_count": session.record_count(),
            "audit_count": session.audit_count(),
            "data_version": session.data_version(),
            "persistent": session.is_persistent(),
        });
        println!("{}", to_json(&status)?);
    } else {
        println!("Store status");
        println!("  records:      {}", session.record_count());
        println!("  audit trail:  {} entries", session.audit_count());
        println!("  data version: {}", session.data_version());
        println!(
            "  backend:      {}",
            if session.is_persistent() { "redb" } else { "memory" }
        );
    }
    Ok(())
}

// =============================================================================
// SHOW
// =============================================================================

/// Show one mark record.
pub fn cmd_show(
    database: &Path,
    backend: &str,
    json_mode: bool,
    record: u64,
) -> Result<(), MarkflowError> {
    let session = open_session(database, backend)?;
    let id = RecordId(record);
    let record = session
        .get(id)?
        .ok_or(MarkflowError::RecordNotFound(id))?;

    if json_mode {
        println!("{}", to_json(&RecordJson::from_record(&record))?);
    } else {
        println!("Record {}", record.id.0);
        println!(
            "  tuple:   student {} / assignment {} / {}",
            record.key.student.0,
            record.key.assignment.0,
            record.key.component.name()
        );
        println!("  marks:   {}/{}", record.marks.value(), record.max_marks.value());
        println!("  state:   {}", record.state);
        println!("  version: {}", record.version);
        println!("  owner:   actor {}", record.owner.0);
        if let Some(reason) = &record.rejection_reason {
            println!("  rejected: {reason}");
        }
    }
    Ok(())
}

// =============================================================================
// AUDIT
// =============================================================================

/// Show a record's audit trail.
pub fn cmd_audit(
    database: &Path,
    backend: &str,
    json_mode: bool,
    record: u64,
) -> Result<(), MarkflowError> {
    let session = open_session(database, backend)?;
    let entries = session.audit_trail(RecordId(record))?;

    if json_mode {
        let rows: Vec<AuditEntryJson> = entries.iter().map(AuditEntryJson::from_entry).collect();
        println!("{}", to_json(&rows)?);
    } else if entries.is_empty() {
        println!("No audit entries for record {record}");
    } else {
        println!("Audit trail for record {record}");
        for entry in entries {
            let note = entry
                .note
                .as_deref()
                .map(|n| format!(" ({n})"))
                .unwrap_or_default();
            println!(
                "  #{:<4} {} -> {} by actor {} [{}] at {}{}",
                entry.seq,
                entry.from,
                entry.to,
                entry.actor.0,
                entry.role,
                entry.at.value(),
                note
            );
        }
    }
    Ok(())
}
