use crate::session::error::SessionResult;
use crate::session::types::{SessionStatus, UploadSession};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

/// Durable checkpoints of [`UploadSession`]s, one row per session.
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    /// Open (or create) the SQLite database at `db_url`
    pub async fn new(db_url: &str) -> SessionResult<Self> {
        let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::init(pool).await
    }

    /// Create session store with in-memory database (for testing)
    pub async fn new_in_memory() -> SessionResult<Self> {
        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> SessionResult<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS upload_sessions (
                session_id TEXT PRIMARY KEY,
                upload_id TEXT,
                full_hash TEXT,
                status TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_upload_sessions_status ON upload_sessions(status)")
            .execute(&pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_upload_sessions_hash ON upload_sessions(full_hash)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Save or update a session snapshot
    pub async fn save(&self, session: &UploadSession) -> SessionResult<()> {
        let state_json = serde_json::to_string(session)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO upload_sessions
            (session_id, upload_id, full_hash, status, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.session_id)
        .bind(session.upload_id())
        .bind(session.fingerprint.as_ref().map(|f| f.full_hash.as_str()))
        .bind(session.status.label())
        .bind(state_json)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn load(&self, session_id: &str) -> SessionResult<Option<UploadSession>> {
        let row = sqlx::query("SELECT state FROM upload_sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(serde_json::from_str(&row.try_get::<String, _>("state")?)?)),
            None => Ok(None),
        }
    }

    /// Sessions that [`UploadSession::can_resume`], most recent first
    pub async fn list_resumable(&self) -> SessionResult<Vec<UploadSession>> {
        let rows = sqlx::query(
            "SELECT state FROM upload_sessions WHERE status IN ('UPLOADING', 'FAILED', 'CANCELLED') ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut sessions = Vec::new();
        for row in rows {
            let session: UploadSession = serde_json::from_str(&row.try_get::<String, _>("state")?)?;
            if session.can_resume() {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    /// Most recent resumable session for identical content, if any
    pub async fn find_resumable_by_hash(
        &self,
        full_hash: &str,
    ) -> SessionResult<Option<UploadSession>> {
        let rows = sqlx::query(
            "SELECT state FROM upload_sessions WHERE full_hash = ? ORDER BY updated_at DESC",
        )
        .bind(full_hash)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let session: UploadSession = serde_json::from_str(&row.try_get::<String, _>("state")?)?;
            if session.can_resume() {
                return Ok(Some(session));
            }
        }
        Ok(None)
    }

    pub async fn delete(&self, session_id: &str) -> SessionResult<bool> {
        let result = sqlx::query("DELETE FROM upload_sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete COMPLETED and CANCELLED sessions not touched for `days` days.
    /// FAILED sessions are kept since they may still be resumed or finalized.
    pub async fn cleanup_terminal_sessions(&self, days: i64) -> SessionResult<u64> {
        let cutoff = chrono::Utc::now().timestamp() - (days * 86400);

        let result = sqlx::query(
            "DELETE FROM upload_sessions WHERE updated_at < ? AND status IN (?, ?)",
        )
        .bind(cutoff)
        .bind(SessionStatus::Completed.label())
        .bind(SessionStatus::Cancelled.label())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> SessionResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM upload_sessions")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("count")?)
    }

    /// Close database connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
