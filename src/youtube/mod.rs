//! YouTube Data API v3 client
//!
//! Covers the three calls the uploader needs: a resumable video insert,
//! a caption insert and a playlist item insert.

use crate::auth::AccessToken;
use crate::config::Config;
use crate::error::{Result, UploadError};
use crate::formatter::VideoMetadata;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const CAPTION_BOUNDARY: &str = "talk_uploader_caption_part";
/// Google's "Resume Incomplete" status for a partially received chunk.
const RESUME_INCOMPLETE: u16 = 308;

/// The remote operations the upload driver consumes.
#[allow(async_fn_in_trait)]
pub trait VideoHost {
    /// Upload the video file with its metadata and return the new video id.
    async fn insert_video(&self, metadata: &VideoMetadata, video_file: &Path) -> Result<String>;

    /// Attach a caption track to an uploaded video.
    async fn insert_caption(&self, video_id: &str, caption_file: &Path) -> Result<()>;

    /// Add the video to a playlist at the top.
    async fn insert_playlist_item(&self, playlist_id: &str, video_id: &str) -> Result<()>;
}

pub struct YouTubeClient {
    client: reqwest::Client,
    token: AccessToken,
    api_base_url: String,
    upload_base_url: String,
    chunk_size: u64,
    category_id: String,
    privacy_status: String,
    caption_language: String,
    caption_name: String,
}

impl YouTubeClient {
    pub fn new(config: &Config, token: AccessToken) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout())
            // 308 is "resume incomplete" here, not a redirect
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| UploadError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            upload_base_url: config.upload_base_url.trim_end_matches('/').to_string(),
            chunk_size: config.chunk_size_bytes(),
            category_id: config.category_id.clone(),
            privacy_status: config.privacy_status.clone(),
            caption_language: config.caption_language.clone(),
            caption_name: config.caption_name.clone(),
        })
    }

    fn video_body(&self, metadata: &VideoMetadata) -> VideoInsert {
        VideoInsert {
            snippet: VideoSnippet {
                category_id: self.category_id.clone(),
                description: metadata.description.clone(),
                title: metadata.title.clone(),
                tags: metadata.tags.clone(),
            },
            status: VideoStatus {
                privacy_status: self.privacy_status.clone(),
            },
        }
    }

    /// Open a resumable session and return its upload URL.
    async fn start_session(
        &self,
        metadata: &VideoMetadata,
        total: u64,
        content_type: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/videos?uploadType=resumable&part=snippet,status",
            self.upload_base_url
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token.as_str())
            .header("X-Upload-Content-Length", total)
            .header("X-Upload-Content-Type", content_type)
            .json(&self.video_body(metadata))
            .send()
            .await?;
        let response = check_status(response).await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| UploadError::Http("Resumable session response has no Location header".into()))
    }

    /// Send the file in chunks until the API answers with the video resource.
    async fn send_chunks(
        &self,
        session_url: &str,
        video_file: &Path,
        total: u64,
        content_type: &str,
    ) -> Result<Option<VideoResource>> {
        let mut file = tokio::fs::File::open(video_file).await?;
        let mut offset = 0u64;

        while offset < total {
            let len = self.chunk_size.min(total - offset);
            let mut chunk = vec![0u8; len as usize];
            file.seek(std::io::SeekFrom::Start(offset)).await?;
            file.read_exact(&mut chunk).await?;

            let response = self
                .client
                .put(session_url)
                .bearer_auth(self.token.as_str())
                .header(CONTENT_TYPE, content_type)
                .header(CONTENT_LENGTH, len)
                .header(CONTENT_RANGE, content_range(offset, len, total))
                .body(chunk)
                .send()
                .await?;

            let range = response.headers().get(RANGE).and_then(|v| v.to_str().ok());
            match chunk_outcome(response.status(), range, offset) {
                ChunkOutcome::Finished => {
                    log::info!("Uploaded 100%");
                    return Ok(Some(response.json().await?));
                }
                ChunkOutcome::Continue(next) => {
                    offset = next;
                    log::info!("Uploaded {}%", offset * 100 / total);
                }
                ChunkOutcome::Stalled => {
                    log::error!("Upload session stopped accepting data at byte {}", offset);
                    return Ok(None);
                }
                ChunkOutcome::Rejected => {
                    check_status(response).await?;
                    return Ok(None);
                }
            }
        }

        Ok(None)
    }
}

impl VideoHost for YouTubeClient {
    async fn insert_video(&self, metadata: &VideoMetadata, video_file: &Path) -> Result<String> {
        let total = tokio::fs::metadata(video_file)
            .await
            .map_err(|e| UploadError::Io(format!("Cannot read {}: {}", video_file.display(), e)))?
            .len();
        if total == 0 {
            return Err(UploadError::Io(format!("{} is empty", video_file.display())));
        }
        let content_type = media_type(video_file);

        log::info!(
            "Starting resumable upload of {} ({} bytes, {} byte chunks)",
            video_file.display(),
            total,
            self.chunk_size
        );
        let session_url = self.start_session(metadata, total, content_type).await?;

        let resource = self
            .send_chunks(&session_url, video_file, total, content_type)
            .await?;
        uploaded_video_id(resource, video_file)
    }

    async fn insert_caption(&self, video_id: &str, caption_file: &Path) -> Result<()> {
        let caption = tokio::fs::read(caption_file)
            .await
            .map_err(|e| UploadError::Io(format!("Cannot read {}: {}", caption_file.display(), e)))?;

        let snippet = CaptionInsert {
            snippet: CaptionSnippet {
                language: self.caption_language.clone(),
                name: self.caption_name.clone(),
                video_id: video_id.to_string(),
                is_draft: false,
            },
        };
        let body = multipart_related(
            CAPTION_BOUNDARY,
            &serde_json::to_vec(&snippet)?,
            media_type(caption_file),
            &caption,
        );

        let url = format!(
            "{}/captions?uploadType=multipart&part=snippet",
            self.upload_base_url
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token.as_str())
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={}", CAPTION_BOUNDARY),
            )
            .body(body)
            .send()
            .await?;
        check_status(response).await?;

        log::info!("Caption track attached to {}", video_id);
        Ok(())
    }

    async fn insert_playlist_item(&self, playlist_id: &str, video_id: &str) -> Result<()> {
        let url = format!("{}/playlistItems?part=snippet", self.api_base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token.as_str())
            .json(&playlist_item_body(playlist_id, video_id))
            .send()
            .await?;
        check_status(response).await?;

        log::info!("Added {} to playlist {}", video_id, playlist_id);
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(UploadError::Api { status, body })
}

/// What to do after the API answers one chunk.
#[derive(Debug, PartialEq, Eq)]
enum ChunkOutcome {
    /// The body carries the video resource.
    Finished,
    /// Send again starting at this byte.
    Continue(u64),
    /// 308 that acknowledged nothing new, or a 2xx without a resource.
    Stalled,
    /// Error status; surfaced as `UploadError::Api`.
    Rejected,
}

fn chunk_outcome(status: StatusCode, range: Option<&str>, offset: u64) -> ChunkOutcome {
    match status {
        StatusCode::OK | StatusCode::CREATED => ChunkOutcome::Finished,
        status if status.as_u16() == RESUME_INCOMPLETE => {
            let next = next_offset(range);
            if next <= offset {
                ChunkOutcome::Stalled
            } else {
                ChunkOutcome::Continue(next)
            }
        }
        status if status.is_success() => ChunkOutcome::Stalled,
        _ => ChunkOutcome::Rejected,
    }
}

/// A session that ended without a resource carrying an id never produced a video.
fn uploaded_video_id(resource: Option<VideoResource>, video_file: &Path) -> Result<String> {
    match resource {
        Some(VideoResource { id: Some(id) }) => Ok(id),
        _ => Err(UploadError::UploadIncomplete(video_file.display().to_string())),
    }
}

fn content_range(offset: u64, len: u64, total: u64) -> String {
    format!("bytes {}-{}/{}", offset, offset + len - 1, total)
}

/// Next byte to send after a 308. The `Range` header names the bytes the
/// server holds (`bytes=0-N`); without it nothing was kept.
fn next_offset(range: Option<&str>) -> u64 {
    range
        .and_then(|r| r.rsplit('-').next())
        .and_then(|end| end.trim().parse::<u64>().ok())
        .map(|end| end + 1)
        .unwrap_or(0)
}

fn media_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("vtt") => "text/vtt",
        Some("srt") => "application/x-subrip",
        _ => "application/octet-stream",
    }
}

/// A `multipart/related` body: JSON metadata part followed by the media part.
fn multipart_related(boundary: &str, metadata: &[u8], media_type: &str, media: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + media.len() + 256);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n",
            boundary
        )
        .as_bytes(),
    );
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{}\r\nContent-Type: {}\r\n\r\n", boundary, media_type).as_bytes());
    body.extend_from_slice(media);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

fn playlist_item_body(playlist_id: &str, video_id: &str) -> PlaylistItemInsert {
    PlaylistItemInsert {
        snippet: PlaylistItemSnippet {
            playlist_id: playlist_id.to_string(),
            position: 0,
            resource_id: ResourceId {
                kind: "youtube#video".to_string(),
                video_id: video_id.to_string(),
            },
        },
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct VideoInsert {
    snippet: VideoSnippet,
    status: VideoStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    category_id: String,
    description: String,
    title: String,
    tags: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatus {
    privacy_status: String,
}

#[derive(Debug, Deserialize)]
struct VideoResource {
    id: Option<String>,
}

#[derive(Debug, Serialize)]
struct CaptionInsert {
    snippet: CaptionSnippet,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CaptionSnippet {
    language: String,
    name: String,
    video_id: String,
    is_draft: bool,
}

#[derive(Debug, Serialize)]
struct PlaylistItemInsert {
    snippet: PlaylistItemSnippet,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemSnippet {
    playlist_id: String,
    position: u32,
    resource_id: ResourceId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    kind: String,
    video_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> YouTubeClient {
        let config = Config::from_yaml("playlists:\n  OOPSLA: PL1\n").unwrap();
        YouTubeClient::new(&config, AccessToken::new("t")).unwrap()
    }

    #[test]
    fn test_video_body_shape() {
        let metadata = VideoMetadata {
            title: "Title".to_string(),
            description: "Desc".to_string(),
            tags: vec!["a".to_string(), "b".to_string()],
        };
        let body = serde_json::to_value(client().video_body(&metadata)).unwrap();
        assert_eq!(
            body,
            json!({
                "snippet": {
                    "categoryId": "28",
                    "description": "Desc",
                    "title": "Title",
                    "tags": ["a", "b"]
                },
                "status": { "privacyStatus": "private" }
            })
        );
    }

    #[test]
    fn test_playlist_item_inserted_at_top() {
        let body = serde_json::to_value(playlist_item_body("PL1", "vid")).unwrap();
        assert_eq!(
            body,
            json!({
                "snippet": {
                    "playlistId": "PL1",
                    "position": 0,
                    "resourceId": { "kind": "youtube#video", "videoId": "vid" }
                }
            })
        );
    }

    #[test]
    fn test_caption_body_is_multipart_related() {
        let snippet = CaptionInsert {
            snippet: CaptionSnippet {
                language: "en".to_string(),
                name: "English captions".to_string(),
                video_id: "vid".to_string(),
                is_draft: false,
            },
        };
        let json = serde_json::to_vec(&snippet).unwrap();
        let body = multipart_related("B", &json, "text/vtt", b"WEBVTT\n");
        let text = String::from_utf8(body).unwrap();

        assert!(text.starts_with("--B\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n"));
        assert!(text.contains(r#""videoId":"vid""#));
        assert!(text.contains(r#""isDraft":false"#));
        assert!(text.contains("\r\n--B\r\nContent-Type: text/vtt\r\n\r\nWEBVTT\n"));
        assert!(text.ends_with("\r\n--B--\r\n"));
    }

    #[test]
    fn test_content_range_is_inclusive() {
        assert_eq!(content_range(0, 10, 25), "bytes 0-9/25");
        assert_eq!(content_range(20, 5, 25), "bytes 20-24/25");
    }

    #[test]
    fn test_next_offset_from_range_header() {
        assert_eq!(next_offset(Some("bytes=0-67108863")), 67108864);
        assert_eq!(next_offset(Some("garbage")), 0);
        assert_eq!(next_offset(None), 0);
    }

    #[test]
    fn test_chunk_outcome_finishes_on_resource_status() {
        assert_eq!(chunk_outcome(StatusCode::OK, None, 0), ChunkOutcome::Finished);
        assert_eq!(chunk_outcome(StatusCode::CREATED, None, 64), ChunkOutcome::Finished);
    }

    #[test]
    fn test_chunk_outcome_continues_from_acknowledged_range() {
        let resume = StatusCode::from_u16(RESUME_INCOMPLETE).unwrap();
        assert_eq!(
            chunk_outcome(resume, Some("bytes=0-1023"), 0),
            ChunkOutcome::Continue(1024)
        );
        // Server kept only part of the chunk
        assert_eq!(
            chunk_outcome(resume, Some("bytes=0-1535"), 1024),
            ChunkOutcome::Continue(1536)
        );
    }

    #[test]
    fn test_chunk_outcome_stalls_when_nothing_acknowledged() {
        let resume = StatusCode::from_u16(RESUME_INCOMPLETE).unwrap();
        assert_eq!(chunk_outcome(resume, None, 0), ChunkOutcome::Stalled);
        assert_eq!(chunk_outcome(resume, Some("bytes=0-1023"), 1024), ChunkOutcome::Stalled);
        assert_eq!(chunk_outcome(StatusCode::NO_CONTENT, None, 0), ChunkOutcome::Stalled);
    }

    #[test]
    fn test_chunk_outcome_rejects_error_statuses() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::FORBIDDEN, StatusCode::SERVICE_UNAVAILABLE] {
            assert_eq!(chunk_outcome(status, None, 0), ChunkOutcome::Rejected);
        }
    }

    #[test]
    fn test_finished_session_without_id_is_incomplete() {
        let path = Path::new("/media/talk.mp4");
        let empty: VideoResource = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            uploaded_video_id(Some(empty), path),
            Err(UploadError::UploadIncomplete(p)) if p == "/media/talk.mp4"
        ));
        assert!(matches!(
            uploaded_video_id(None, path),
            Err(UploadError::UploadIncomplete(_))
        ));

        let done: VideoResource = serde_json::from_str(r#"{"id": "dQw4w9WgXcQ", "kind": "youtube#video"}"#).unwrap();
        assert_eq!(uploaded_video_id(Some(done), path).unwrap(), "dQw4w9WgXcQ");
    }

    #[tokio::test]
    async fn test_error_status_becomes_api_error() {
        let response: reqwest::Response = http::Response::builder()
            .status(403)
            .body("quotaExceeded")
            .unwrap()
            .into();
        match check_status(response).await {
            Err(UploadError::Api { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "quotaExceeded");
            }
            other => panic!("expected Api error, got {:?}", other.map(|r| r.status())),
        }
    }

    #[test]
    fn test_media_type_by_extension() {
        assert_eq!(media_type(Path::new("/a/talk.MP4")), "video/mp4");
        assert_eq!(media_type(Path::new("/a/talk.vtt")), "text/vtt");
        assert_eq!(media_type(Path::new("/a/talk")), "application/octet-stream");
    }

    #[test]
    fn test_base_urls_lose_trailing_slash() {
        let config = Config::from_yaml(
            "api_base_url: https://example.test/v3/\nplaylists:\n  OOPSLA: PL1\n",
        )
        .unwrap();
        let client = YouTubeClient::new(&config, AccessToken::new("t")).unwrap();
        assert_eq!(client.api_base_url, "https://example.test/v3");
    }
}
