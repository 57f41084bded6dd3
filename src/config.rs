//! Run configuration loaded from `config.yaml`.

use crate::error::{Result, UploadError};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Set to `1` to allow plain `http://` endpoints while testing the
/// credential flow against a local server. Never set this against Google.
pub const INSECURE_TRANSPORT_ENV: &str = "UPLOADER_INSECURE_TRANSPORT";

/// Resumable upload chunks must be a multiple of 256 KiB.
const CHUNK_GRANULARITY: u64 = 256 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_client_secrets_file")]
    pub client_secrets_file: PathBuf,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_event_name")]
    pub event_name: String,
    #[serde(default = "default_category_id")]
    pub category_id: String,
    #[serde(default = "default_privacy_status")]
    pub privacy_status: String,
    #[serde(default = "default_chunk_size_mib")]
    pub chunk_size_mib: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_caption_language")]
    pub caption_language: String,
    #[serde(default = "default_caption_name")]
    pub caption_name: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_upload_base_url")]
    pub upload_base_url: String,
    pub playlists: PlaylistMap,
    /// Populated from the environment, not the file.
    #[serde(skip)]
    pub insecure_transport: bool,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("transcode.sqlite")
}
fn default_client_secrets_file() -> PathBuf {
    PathBuf::from("client_secrets.json")
}
fn default_batch_size() -> usize {
    8
}
fn default_event_name() -> String {
    "SPLASH 2020".to_string()
}
fn default_category_id() -> String {
    // Science & Technology
    "28".to_string()
}
fn default_privacy_status() -> String {
    "private".to_string()
}
fn default_chunk_size_mib() -> u64 {
    64
}
fn default_request_timeout_secs() -> u64 {
    600
}
fn default_caption_language() -> String {
    "en".to_string()
}
fn default_caption_name() -> String {
    "English captions".to_string()
}
fn default_api_base_url() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}
fn default_upload_base_url() -> String {
    "https://www.googleapis.com/upload/youtube/v3".to_string()
}

impl Config {
    /// Load and validate the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UploadError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.insecure_transport = insecure_transport_from_env();
        if config.insecure_transport {
            log::warn!(
                "{} is set: plain http endpoints are allowed. Do not use against the real API.",
                INSECURE_TRANSPORT_ENV
            );
        }
        config.client_secrets_file = expand_home(&config.client_secrets_file);
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(UploadError::Config("batch_size must be at least 1".into()));
        }
        let chunk = self.chunk_size_bytes();
        if chunk == 0 || chunk % CHUNK_GRANULARITY != 0 {
            return Err(UploadError::Config(format!(
                "chunk_size_mib must be a positive multiple of 256 KiB (got {} MiB)",
                self.chunk_size_mib
            )));
        }
        if self.playlists.is_empty() {
            return Err(UploadError::Config("playlists must not be empty".into()));
        }
        check_endpoint("api_base_url", &self.api_base_url, self.insecure_transport)?;
        check_endpoint("upload_base_url", &self.upload_base_url, self.insecure_transport)?;
        Ok(())
    }

    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_mib * 1024 * 1024
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

/// Rejects non-https endpoints unless the insecure transport toggle is on.
pub fn check_endpoint(name: &str, url: &str, insecure_transport: bool) -> Result<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| UploadError::Config(format!("{} is not a valid URL ({}): {}", name, url, e)))?;
    match parsed.scheme() {
        "https" => Ok(()),
        "http" if insecure_transport => Ok(()),
        scheme => Err(UploadError::Config(format!(
            "{} must use https (got {}://); set {}=1 only for local testing",
            name, scheme, INSECURE_TRANSPORT_ENV
        ))),
    }
}

fn insecure_transport_from_env() -> bool {
    matches!(
        std::env::var(INSECURE_TRANSPORT_ENV).as_deref(),
        Ok("1") | Ok("true")
    )
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// Track name → playlist id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct PlaylistMap(HashMap<String, String>);

impl PlaylistMap {
    pub fn resolve(&self, track: &str) -> Result<&str> {
        self.0
            .get(track)
            .map(String::as_str)
            .ok_or_else(|| UploadError::UnknownTrack(vec![track.to_string()]))
    }

    /// Check every track up front so a missing mapping is reported before
    /// anything is sent to the API. `None` is a submission without a track.
    pub fn validate<'a, I>(&self, tracks: I) -> Result<()>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let missing: BTreeSet<String> = tracks
            .into_iter()
            .filter(|track| track.map_or(true, |t| !self.0.contains_key(t)))
            .map(|track| track.unwrap_or("<none>").to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(UploadError::UnknownTrack(missing.into_iter().collect()))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(String, String)> for PlaylistMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
database_path: data/transcode.sqlite
batch_size: 3
playlists:
  OOPSLA: PLyrlk8Xaylp5UkqDkIEMdtooA6Ktusc_x
  "ECOOP 2020": PLyrlk8Xaylp6P3MKkGw-rOO3fQMz4kbJs
"#;

    #[test]
    fn test_parse_applies_defaults() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.database_path, PathBuf::from("data/transcode.sqlite"));
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.chunk_size_mib, 64);
        assert_eq!(config.category_id, "28");
        assert_eq!(config.privacy_status, "private");
        assert_eq!(config.event_name, "SPLASH 2020");
        assert_eq!(config.playlists.len(), 2);
        assert!(config.refresh_token.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_playlists_is_an_error() {
        assert!(Config::from_yaml("batch_size: 2\n").is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.batch_size = 0;
        assert!(matches!(config.validate(), Err(UploadError::Config(_))));
    }

    #[test]
    fn test_http_endpoint_needs_toggle() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.api_base_url = "http://localhost:8080/youtube/v3".to_string();
        assert!(config.validate().is_err());

        config.insecure_transport = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_known_and_unknown_track() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(
            config.playlists.resolve("ECOOP 2020").unwrap(),
            "PLyrlk8Xaylp6P3MKkGw-rOO3fQMz4kbJs"
        );
        match config.playlists.resolve("POPL") {
            Err(UploadError::UnknownTrack(tracks)) => assert_eq!(tracks, vec!["POPL"]),
            other => panic!("expected UnknownTrack, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_reports_all_missing_tracks_sorted() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        let result = config
            .playlists
            .validate([Some("SAS"), Some("OOPSLA"), None, Some("DLS"), Some("SAS")]);
        match result {
            Err(UploadError::UnknownTrack(tracks)) => {
                assert_eq!(tracks, vec!["<none>", "DLS", "SAS"])
            }
            other => panic!("expected UnknownTrack, got {:?}", other),
        }
    }

    #[test]
    fn test_expand_home_leaves_relative_paths() {
        assert_eq!(
            expand_home(Path::new("client_secrets.json")),
            PathBuf::from("client_secrets.json")
        );
    }
}
