use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, types::Type, Connection, ErrorCode, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;
use crate::error::AppError;
use crate::models::{
    AiInsights, Analysis, AnalysisEntry, ChartType, ExportRecord, OwnerSummary, Page, Role,
    Upload, UploadEntry, UploadStatus, UploadSummary, User,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        role TEXT NOT NULL,
        is_active INTEGER NOT NULL,
        upload_count INTEGER NOT NULL DEFAULT 0,
        total_storage_used INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS uploads (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        filename TEXT NOT NULL,
        original_name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        file_size INTEGER NOT NULL,
        mime_type TEXT NOT NULL,
        status TEXT NOT NULL,
        sheets TEXT NOT NULL,
        error_message TEXT,
        upload_date TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_uploads_user ON uploads(user_id);
    CREATE TABLE IF NOT EXISTS analyses (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        upload_id TEXT NOT NULL,
        sheet_name TEXT NOT NULL,
        chart_type TEXT NOT NULL,
        x_axis TEXT NOT NULL,
        y_axis TEXT NOT NULL,
        chart_data TEXT NOT NULL,
        chart_config TEXT NOT NULL,
        export_history TEXT NOT NULL,
        ai_insights TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_analyses_user ON analyses(user_id);
    CREATE INDEX IF NOT EXISTS idx_analyses_upload ON analyses(upload_id);
";

const USER_COLUMNS: &str =
    "id, name, email, role, is_active, upload_count, total_storage_used, created_at";
const UPLOAD_COLUMNS: &str = "id, user_id, filename, original_name, file_path, file_size, \
    mime_type, status, sheets, error_message, upload_date";
const ANALYSIS_COLUMNS: &str = "id, user_id, upload_id, sheet_name, chart_type, x_axis, y_axis, \
    chart_data, chart_config, export_history, ai_insights, created_at";

/// Prefixes every column in a column list with a table alias, for joined queries.
fn qualified(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|col| format!("{alias}.{}", col.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error)]
#[error("unexpected stored value {0:?}")]
struct UnexpectedValue(String);

fn conversion_err<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn json_col<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

fn time_col(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn enum_col<T>(row: &Row, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| conversion_err(idx, UnexpectedValue(raw)))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, AppError> {
    Ok(serde_json::to_string(value)?)
}

// Fixed-width UTC timestamps sort chronologically as text.
fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: enum_col(row, 3, Role::parse)?,
        is_active: row.get(4)?,
        upload_count: row.get(5)?,
        total_storage_used: row.get(6)?,
        created_at: time_col(row, 7)?,
    })
}

fn upload_from_row(row: &Row) -> rusqlite::Result<Upload> {
    let file_size: i64 = row.get(5)?;
    Ok(Upload {
        id: row.get(0)?,
        user_id: row.get(1)?,
        filename: row.get(2)?,
        original_name: row.get(3)?,
        file_path: row.get(4)?,
        file_size: file_size.max(0) as u64,
        mime_type: row.get(6)?,
        status: enum_col(row, 7, UploadStatus::parse)?,
        sheets: json_col(row, 8)?,
        error_message: row.get(9)?,
        upload_date: time_col(row, 10)?,
    })
}

fn analysis_from_row(row: &Row) -> rusqlite::Result<Analysis> {
    let insights: Option<String> = row.get(10)?;
    Ok(Analysis {
        id: row.get(0)?,
        user_id: row.get(1)?,
        upload_id: row.get(2)?,
        sheet_name: row.get(3)?,
        chart_type: enum_col(row, 4, ChartType::parse)?,
        x_axis: json_col(row, 5)?,
        y_axis: json_col(row, 6)?,
        chart_data: json_col(row, 7)?,
        chart_config: json_col(row, 8)?,
        export_history: json_col(row, 9)?,
        ai_insights: insights
            .map(|raw| serde_json::from_str(&raw).map_err(|e| conversion_err(10, e)))
            .transpose()?,
        created_at: time_col(row, 11)?,
    })
}

// Owner columns come from a LEFT JOIN, so all three are NULL when the user is gone.
fn owner_from_row(row: &Row, idx: usize) -> rusqlite::Result<Option<OwnerSummary>> {
    let Some(id) = row.get::<_, Option<String>>(idx)? else {
        return Ok(None);
    };
    Ok(Some(OwnerSummary {
        id,
        name: row.get(idx + 1)?,
        email: row.get(idx + 2)?,
    }))
}

fn upload_entry_from_row(row: &Row) -> rusqlite::Result<UploadEntry> {
    Ok(UploadEntry {
        upload: upload_from_row(row)?,
        user: owner_from_row(row, 11)?,
    })
}

fn analysis_entry_from_row(row: &Row) -> rusqlite::Result<AnalysisEntry> {
    let analysis = analysis_from_row(row)?;
    let original_name: Option<String> = row.get(12)?;
    let upload = original_name.map(|original_name| UploadSummary {
        id: analysis.upload_id.clone(),
        original_name,
    });
    Ok(AnalysisEntry {
        analysis,
        upload,
        user: owner_from_row(row, 13)?,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentUpload {
    pub id: String,
    pub filename: String,
    pub user: String,
    pub upload_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartTypeCount {
    pub chart_type: ChartType,
    pub count: u64,
}

#[derive(Debug, Clone)]
pub struct PlatformStats {
    pub total_users: u64,
    pub active_users: u64,
    pub total_uploads: u64,
    pub total_analyses: u64,
    pub storage_used_bytes: i64,
    pub recent_uploads: Vec<RecentUpload>,
    pub chart_type_stats: Vec<ChartTypeCount>,
}

/// Users, uploads and analyses in SQLite.
///
/// References between records are plain id columns; deleting a parent removes its
/// dependents in the same transaction.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self, AppError> {
        info!("Opening database at {}", path);
        if path == ":memory:" {
            return Self::open_in_memory();
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, AppError> {
        conn.execute_batch(SCHEMA)?;
        debug!("Database schema ready");
        Ok(Self { conn: Mutex::new(conn) })
    }

    // ---- users ----

    pub fn create_user(&self, name: &str, email: &str, role: Role) -> Result<User, AppError> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            role,
            is_active: true,
            upload_count: 0,
            total_storage_used: 0,
            created_at: Utc::now(),
        };

        let conn = self.conn.lock();
        let inserted = conn.execute(
            &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6)"),
            params![
                user.id,
                user.name,
                user.email,
                user.role.as_str(),
                user.is_active,
                timestamp(&user.created_at)
            ],
        );
        match inserted {
            Ok(_) => Ok(user),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(AppError::Conflict(format!("email {} is already registered", email)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                user_from_row,
            )
            .optional()?)
    }

    /// Lists users newest first; `search` matches name or email, ignoring ASCII case.
    pub fn list_users(&self, search: Option<&str>, page: Page) -> Result<(Vec<User>, u64), AppError> {
        let pattern = search.filter(|s| !s.is_empty()).map(|s| {
            let escaped = s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
            format!("%{escaped}%")
        });
        let filter = "(?1 IS NULL OR name LIKE ?1 ESCAPE '\\' OR email LIKE ?1 ESCAPE '\\')";

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {filter} \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let users = stmt
            .query_map(params![pattern, page.limit, page.offset()], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM users WHERE {filter}"),
            params![pattern],
            |row| row.get(0),
        )?;
        Ok((users, total as u64))
    }

    pub fn set_user_active(&self, id: &str, is_active: bool) -> Result<Option<User>, AppError> {
        {
            let conn = self.conn.lock();
            let changed =
                conn.execute("UPDATE users SET is_active = ?2 WHERE id = ?1", params![id, is_active])?;
            if changed == 0 {
                return Ok(None);
            }
        }
        self.get_user(id)
    }

    pub fn set_user_role(&self, id: &str, role: Role) -> Result<Option<User>, AppError> {
        {
            let conn = self.conn.lock();
            let changed =
                conn.execute("UPDATE users SET role = ?2 WHERE id = ?1", params![id, role.as_str()])?;
            if changed == 0 {
                return Ok(None);
            }
        }
        self.get_user(id)
    }

    /// Deletes a user with all their uploads and analyses.
    ///
    /// Returns the storage paths of the removed uploads, or `None` if the user did not exist.
    pub fn delete_user(&self, id: &str) -> Result<Option<Vec<String>>, AppError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let exists = tx
            .query_row("SELECT 1 FROM users WHERE id = ?1", [id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Ok(None);
        }

        let paths = {
            let mut stmt = tx.prepare("SELECT file_path FROM uploads WHERE user_id = ?1")?;
            let paths = stmt
                .query_map([id], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            paths
        };
        let analyses = tx.execute("DELETE FROM analyses WHERE user_id = ?1", [id])?;
        let uploads = tx.execute("DELETE FROM uploads WHERE user_id = ?1", [id])?;
        tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
        tx.commit()?;

        info!("Deleted user {} with {} uploads and {} analyses", id, uploads, analyses);
        Ok(Some(paths))
    }

    // ---- uploads ----

    /// Saves a processed upload and charges its size to the owner.
    pub fn insert_upload(&self, upload: &Upload) -> Result<(), AppError> {
        let sheets = to_json(&upload.sheets)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO uploads ({UPLOAD_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                upload.id,
                upload.user_id,
                upload.filename,
                upload.original_name,
                upload.file_path,
                upload.file_size as i64,
                upload.mime_type,
                upload.status.as_str(),
                sheets,
                upload.error_message,
                timestamp(&upload.upload_date)
            ],
        )?;
        tx.execute(
            "UPDATE users SET upload_count = upload_count + 1, \
             total_storage_used = total_storage_used + ?2 WHERE id = ?1",
            params![upload.user_id, upload.file_size as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Fetches an upload, restricted to `owner` when given.
    pub fn get_upload(&self, id: &str, owner: Option<&str>) -> Result<Option<Upload>, AppError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {UPLOAD_COLUMNS} FROM uploads \
                     WHERE id = ?1 AND (?2 IS NULL OR user_id = ?2)"
                ),
                params![id, owner],
                upload_from_row,
            )
            .optional()?)
    }

    /// Lists uploads newest first, each with its owner's name and email.
    pub fn list_uploads(
        &self,
        owner: Option<&str>,
        page: Page,
    ) -> Result<(Vec<UploadEntry>, u64), AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, us.id, us.name, us.email \
             FROM uploads u LEFT JOIN users us ON us.id = u.user_id \
             WHERE (?1 IS NULL OR u.user_id = ?1) \
             ORDER BY u.upload_date DESC, u.rowid DESC LIMIT ?2 OFFSET ?3",
            qualified(UPLOAD_COLUMNS, "u")
        ))?;
        let uploads = stmt
            .query_map(params![owner, page.limit, page.offset()], upload_entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM uploads WHERE (?1 IS NULL OR user_id = ?1)",
            params![owner],
            |row| row.get(0),
        )?;
        Ok((uploads, total as u64))
    }

    /// Deletes an upload and its analyses and credits its size back to the owner.
    ///
    /// Returns the removed record so the caller can release the stored file.
    pub fn delete_upload(&self, id: &str, owner: Option<&str>) -> Result<Option<Upload>, AppError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let upload = tx
            .query_row(
                &format!(
                    "SELECT {UPLOAD_COLUMNS} FROM uploads \
                     WHERE id = ?1 AND (?2 IS NULL OR user_id = ?2)"
                ),
                params![id, owner],
                upload_from_row,
            )
            .optional()?;
        let Some(upload) = upload else {
            return Ok(None);
        };

        let analyses = tx.execute("DELETE FROM analyses WHERE upload_id = ?1", [id])?;
        tx.execute("DELETE FROM uploads WHERE id = ?1", [id])?;
        tx.execute(
            "UPDATE users SET upload_count = MAX(upload_count - 1, 0), \
             total_storage_used = MAX(total_storage_used - ?2, 0) WHERE id = ?1",
            params![upload.user_id, upload.file_size as i64],
        )?;
        tx.commit()?;

        info!("Deleted upload {} and {} dependent analyses", id, analyses);
        Ok(Some(upload))
    }

    // ---- analyses ----

    pub fn insert_analysis(&self, analysis: &Analysis) -> Result<(), AppError> {
        let insights = analysis.ai_insights.as_ref().map(to_json).transpose()?;
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO analyses ({ANALYSIS_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                analysis.id,
                analysis.user_id,
                analysis.upload_id,
                analysis.sheet_name,
                analysis.chart_type.as_str(),
                to_json(&analysis.x_axis)?,
                to_json(&analysis.y_axis)?,
                to_json(&analysis.chart_data)?,
                to_json(&analysis.chart_config)?,
                to_json(&analysis.export_history)?,
                insights,
                timestamp(&analysis.created_at)
            ],
        )?;
        Ok(())
    }

    pub fn get_analysis(&self, id: &str, owner: Option<&str>) -> Result<Option<Analysis>, AppError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {ANALYSIS_COLUMNS} FROM analyses \
                     WHERE id = ?1 AND (?2 IS NULL OR user_id = ?2)"
                ),
                params![id, owner],
                analysis_from_row,
            )
            .optional()?)
    }

    /// Lists analyses newest first, each with its source file name and owner.
    pub fn list_analyses(
        &self,
        owner: Option<&str>,
        page: Page,
    ) -> Result<(Vec<AnalysisEntry>, u64), AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, up.original_name, us.id, us.name, us.email \
             FROM analyses a \
             LEFT JOIN uploads up ON up.id = a.upload_id \
             LEFT JOIN users us ON us.id = a.user_id \
             WHERE (?1 IS NULL OR a.user_id = ?1) \
             ORDER BY a.created_at DESC, a.rowid DESC LIMIT ?2 OFFSET ?3",
            qualified(ANALYSIS_COLUMNS, "a")
        ))?;
        let analyses = stmt
            .query_map(params![owner, page.limit, page.offset()], analysis_entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM analyses WHERE (?1 IS NULL OR user_id = ?1)",
            params![owner],
            |row| row.get(0),
        )?;
        Ok((analyses, total as u64))
    }

    /// Appends to an analysis' export history and returns the updated record.
    pub fn append_export(
        &self,
        id: &str,
        owner: &str,
        record: ExportRecord,
    ) -> Result<Option<Analysis>, AppError> {
        self.update_analysis(id, owner, |analysis| analysis.export_history.push(record))
    }

    /// Replaces the insights block of an analysis and returns the updated record.
    pub fn set_insights(
        &self,
        id: &str,
        owner: &str,
        insights: AiInsights,
    ) -> Result<Option<Analysis>, AppError> {
        self.update_analysis(id, owner, |analysis| analysis.ai_insights = Some(insights))
    }

    fn update_analysis(
        &self,
        id: &str,
        owner: &str,
        apply: impl FnOnce(&mut Analysis),
    ) -> Result<Option<Analysis>, AppError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let analysis = tx
            .query_row(
                &format!("SELECT {ANALYSIS_COLUMNS} FROM analyses WHERE id = ?1 AND user_id = ?2"),
                params![id, owner],
                analysis_from_row,
            )
            .optional()?;
        let Some(mut analysis) = analysis else {
            return Ok(None);
        };

        apply(&mut analysis);
        let insights = analysis.ai_insights.as_ref().map(to_json).transpose()?;
        tx.execute(
            "UPDATE analyses SET export_history = ?2, ai_insights = ?3 WHERE id = ?1",
            params![id, to_json(&analysis.export_history)?, insights],
        )?;
        tx.commit()?;
        Ok(Some(analysis))
    }

    pub fn delete_analysis(&self, id: &str, owner: Option<&str>) -> Result<bool, AppError> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM analyses WHERE id = ?1 AND (?2 IS NULL OR user_id = ?2)",
            params![id, owner],
        )?;
        Ok(removed > 0)
    }

    // ---- aggregates ----

    pub fn platform_stats(&self, recent: u32) -> Result<PlatformStats, AppError> {
        let conn = self.conn.lock();
        let count = |sql: &str| -> rusqlite::Result<u64> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0)).map(|n| n.max(0) as u64)
        };

        let total_users = count("SELECT COUNT(*) FROM users")?;
        let active_users = count("SELECT COUNT(*) FROM users WHERE is_active = 1")?;
        let total_uploads = count("SELECT COUNT(*) FROM uploads")?;
        let total_analyses = count("SELECT COUNT(*) FROM analyses")?;
        let storage_used_bytes: i64 = conn.query_row(
            "SELECT COALESCE(SUM(total_storage_used), 0) FROM users",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT u.id, u.original_name, COALESCE(us.name, ''), u.upload_date \
             FROM uploads u LEFT JOIN users us ON us.id = u.user_id \
             ORDER BY u.upload_date DESC, u.rowid DESC LIMIT ?1",
        )?;
        let recent_uploads = stmt
            .query_map([recent], |row| {
                Ok(RecentUpload {
                    id: row.get(0)?,
                    filename: row.get(1)?,
                    user: row.get(2)?,
                    upload_date: time_col(row, 3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT chart_type, COUNT(*) AS n FROM analyses \
             GROUP BY chart_type ORDER BY n DESC, chart_type ASC",
        )?;
        let chart_type_stats = stmt
            .query_map([], |row| {
                Ok(ChartTypeCount {
                    chart_type: enum_col(row, 0, ChartType::parse)?,
                    count: row.get::<_, i64>(1)?.max(0) as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(PlatformStats {
            total_users,
            active_users,
            total_uploads,
            total_analyses,
            storage_used_bytes,
            recent_uploads,
            chart_type_stats,
        })
    }
}
