//! Upload driver
//!
//! Takes pending submissions one at a time through video upload, caption
//! attach, playlist insert and the local write-back. The first error ends
//! the run; everything recorded before it stays committed.
//!
//! A failure after the video insert leaves an orphaned remote video with no
//! local record, and the next run uploads that submission again.


use crate::config::PlaylistMap;
use crate::database::{Database, Submission};
use crate::error::{Result, UploadError};
use crate::formatter::format_submission;
use crate::youtube::VideoHost;
use std::path::Path;

/// Where a submission is in its publication sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Pending,
    VideoUploading,
    VideoUploaded,
    CaptionUploading,
    CaptionUploaded,
    Playlisted,
    Recorded,
}

impl std::fmt::Display for UploadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::VideoUploading => write!(f, "video_uploading"),
            Self::VideoUploaded => write!(f, "video_uploaded"),
            Self::CaptionUploading => write!(f, "caption_uploading"),
            Self::CaptionUploaded => write!(f, "caption_uploaded"),
            Self::Playlisted => write!(f, "playlisted"),
            Self::Recorded => write!(f, "recorded"),
        }
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Submissions pending when the run started.
    pub pending: usize,
    pub uploaded: usize,
    /// Submissions left for the next run.
    pub remaining: usize,
}

pub struct Uploader<H> {
    host: H,
    playlists: PlaylistMap,
    batch_size: usize,
    event_name: String,
}

impl<H: VideoHost> Uploader<H> {
    pub fn new(host: H, playlists: PlaylistMap, batch_size: usize, event_name: String) -> Self {
        Self {
            host,
            playlists,
            batch_size,
            event_name,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Publish up to `batch_size` pending submissions.
    pub async fn run(&self, db: &mut Database) -> Result<RunSummary> {
        let pending = db.pending_submissions()?;
        log::info!("{} submission(s) pending upload", pending.len());

        self.playlists.validate(
            pending
                .iter()
                .take(self.batch_size)
                .map(|s| s.track.as_deref()),
        )?;

        let mut uploaded = 0usize;
        for submission in &pending {
            log::info!("uploading {} of {}", uploaded, self.batch_size);
            if uploaded >= self.batch_size {
                break;
            }

            let video_id = self.publish(submission).await?;
            db.record_upload(submission.id, &video_id)?;
            log_stage(submission, UploadStage::Recorded);
            uploaded += 1;
        }

        log::info!("terminate {}", uploaded);
        Ok(RunSummary {
            pending: pending.len(),
            uploaded,
            remaining: pending.len() - uploaded,
        })
    }

    /// Drive one submission through the remote calls and return its video id.
    async fn publish(&self, submission: &Submission) -> Result<String> {
        log_stage(submission, UploadStage::Pending);

        let playlist_id = self
            .playlists
            .resolve(submission.track.as_deref().unwrap_or_default())?;
        let video_file = media_path(submission, submission.video_file.as_deref(), "video")?;
        let caption_file = media_path(submission, submission.sub_file.as_deref(), "caption")?;
        let metadata = format_submission(submission, &self.event_name);

        log_stage(submission, UploadStage::VideoUploading);
        let video_id = self.host.insert_video(&metadata, video_file).await?;
        log::info!("check id {}", video_id);
        log_stage(submission, UploadStage::VideoUploaded);

        log_stage(submission, UploadStage::CaptionUploading);
        self.host.insert_caption(&video_id, caption_file).await?;
        log_stage(submission, UploadStage::CaptionUploaded);

        self.host.insert_playlist_item(playlist_id, &video_id).await?;
        log_stage(submission, UploadStage::Playlisted);

        Ok(video_id)
    }
}

fn media_path<'a>(submission: &Submission, path: Option<&'a str>, kind: &str) -> Result<&'a Path> {
    match path.filter(|p| !p.trim().is_empty()) {
        Some(p) => Ok(Path::new(p)),
        None => Err(UploadError::Other(format!(
            "Submission {} has no {} file",
            submission.id, kind
        ))),
    }
}

fn log_stage(submission: &Submission, stage: UploadStage) {
    log::debug!("Submission {} -> {}", submission.id, stage);
}
