use serde::{Deserialize, Serialize};

/// One talk awaiting publication, joined from the transcode pipeline's tables.
///
/// Text columns coming out of a LEFT JOIN may be NULL, so everything but the
/// id is optional. The formatter decides what an absent value renders as.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Submission {
    /// `Ingests.id`, the key recorded in `YTUpload.ingest_id`.
    pub id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub url_info: Option<String>,
    pub paper_keywords: Option<String>,
    pub social_tags: Option<String>,
    pub social_handles: Option<String>,
    pub summary: Option<String>,
    pub authors: Option<String>,
    pub track: Option<String>,
    pub video_file: Option<String>,
    pub sub_file: Option<String>,
    pub doi: Option<String>,
}

/// Durable proof that a submission was published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: i64,
    pub ingest_id: i64,
    pub video_id: Option<String>,
    pub uploaded_at: Option<String>,
}
