pub mod models;


use crate::error::Result;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::Path;

pub use models::*;

/// Handle on the transcode pipeline's SQLite store.
///
/// The `Metadata`, `Ingests`, `Transcodes` and `Outputs` tables belong to the
/// transcoder and are only read here. `YTUpload` is ours.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        // The transcoder may still hold the file; wait for its locks
        conn.busy_timeout(std::time::Duration::from_secs(30))?;
        conn.execute_batch("PRAGMA synchronous=FULL;")?;

        let db = Self { conn };
        db.init_schema()?;

        log::info!("Opened local store at {}", db_path.display());
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS YTUpload (
                id INTEGER PRIMARY KEY,
                ingest_id INTEGER NOT NULL,
                ytid TEXT,
                uploaded_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_ytupload_ingest ON YTUpload(ingest_id);
            "#,
        )?;

        // Older stores were created without the timestamp column
        if !self.has_column("YTUpload", "uploaded_at")? {
            self.conn
                .execute("ALTER TABLE YTUpload ADD COLUMN uploaded_at TEXT", [])?;
            log::info!("Added uploaded_at column to YTUpload");
        }

        Ok(())
    }

    fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", table))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names.iter().any(|name| name == column))
    }

    // =========================================================================
    // Pending submissions
    // =========================================================================

    /// Every submission without a non-null `YTUpload.ytid`, in the join's
    /// natural order. Rows lacking a transcode or output still come back,
    /// with `track` unset. Metadata without an ingest has nothing to upload
    /// and nothing to key a record on, so it is skipped.
    ///
    /// An ingest with several transcodes joins to several rows; only the
    /// first is kept so one run never publishes the same ingest twice.
    pub fn pending_submissions(&self) -> Result<Vec<Submission>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT Ingests.id, Metadata.title, Metadata.description, Metadata.url,
                   Metadata.urlinfo, Metadata.paper_keywords, Metadata.social_tags,
                   Metadata.social_handles, Metadata.summary, Ingests.authors,
                   Outputs.track, Ingests.video_file, Ingests.sub_file, Metadata.doi
            FROM Metadata
            LEFT JOIN Ingests ON Metadata.ingest_id = Ingests.id
            LEFT JOIN Transcodes ON Transcodes.ingest_id = Ingests.id
            LEFT JOIN Outputs ON Outputs.id = Transcodes.output_id
            LEFT JOIN YTUpload ON YTUpload.ingest_id = Ingests.id
            WHERE YTUpload.ytid IS NULL AND Ingests.id IS NOT NULL
            "#,
        )?;

        let submissions = stmt
            .query_map([], |row| {
                Ok(Submission {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    url: row.get(3)?,
                    url_info: row.get(4)?,
                    paper_keywords: row.get(5)?,
                    social_tags: row.get(6)?,
                    social_handles: row.get(7)?,
                    summary: row.get(8)?,
                    authors: row.get(9)?,
                    track: row.get(10)?,
                    video_file: row.get(11)?,
                    sub_file: row.get(12)?,
                    doi: row.get(13)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        let total_rows = submissions.len();
        let submissions: Vec<Submission> = submissions
            .into_iter()
            .filter(|s| seen.insert(s.id))
            .collect();
        if submissions.len() < total_rows {
            log::warn!(
                "Skipped {} duplicate row(s) from ingests with multiple transcodes",
                total_rows - submissions.len()
            );
        }

        Ok(submissions)
    }

    // =========================================================================
    // Upload records
    // =========================================================================

    /// Persist the remote id for a submission and commit before returning.
    pub fn record_upload(&mut self, ingest_id: i64, video_id: &str) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO YTUpload (ingest_id, ytid, uploaded_at) VALUES (?, ?, ?)",
            params![ingest_id, video_id, now],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    pub fn upload_records(&self) -> Result<Vec<UploadRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, ingest_id, ytid, uploaded_at FROM YTUpload ORDER BY id")?;
        let records = stmt
            .query_map([], |row| {
                Ok(UploadRecord {
                    id: row.get(0)?,
                    ingest_id: row.get(1)?,
                    video_id: row.get(2)?,
                    uploaded_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Number of submissions with a recorded remote id.
    pub fn upload_count(&self) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(DISTINCT ingest_id) FROM YTUpload WHERE ytid IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Release the connection, surfacing any error SQLite reports on close.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}
