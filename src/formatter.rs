//! Builds the title, description and tags sent with each video.

use crate::database::Submission;
use regex::Regex;
use std::sync::OnceLock;

/// YouTube rejects titles longer than this.
pub const MAX_TITLE_CHARS: usize = 100;

/// Source URLs on this host are search results, not preprints.
const SCHOLAR_HOST: &str = "scholar.google.com";

/// Everything the video insert needs besides the media itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// Cut the title to its first [`MAX_TITLE_CHARS`] characters.
pub fn truncate_title(title: &str) -> String {
    match title.char_indices().nth(MAX_TITLE_CHARS) {
        Some((byte_idx, _)) => title[..byte_idx].to_string(),
        None => title.to_string(),
    }
}

fn keyword_separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new("[,;]").expect("valid keyword separator pattern"))
}

fn split_keywords(raw: &str) -> impl Iterator<Item = String> + '_ {
    keyword_separator()
        .split(raw)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

/// Split both sources on `,` or `;`, trim, drop empties and concatenate.
/// Tags appearing in both sources are kept twice.
pub fn merge_keywords(first: Option<&str>, second: Option<&str>) -> Vec<String> {
    let mut keywords: Vec<String> = split_keywords(first.unwrap_or_default()).collect();
    keywords.extend(split_keywords(second.unwrap_or_default()));
    keywords
}

pub fn render_description(submission: &Submission, event_name: &str) -> String {
    let text = |field: &Option<String>| field.clone().unwrap_or_default();

    let mut lines = vec![
        String::new(),
        text(&submission.summary),
        String::new(),
        text(&submission.title),
        format!("Paper DOI: {}", text(&submission.doi)),
    ];

    if let Some(url) = submission.url.as_deref().filter(|u| !u.is_empty()) {
        if !url.contains(SCHOLAR_HOST) {
            lines.push(format!("preprint url: {}", url));
        }
    }
    if let Some(info) = submission.url_info.as_deref().filter(|u| !u.is_empty()) {
        lines.push(format!("more info: {}", info));
    }

    lines.push(format!(
        "Presented at {}, part of {}",
        text(&submission.track),
        event_name
    ));
    lines.push(format!("By {}", text(&submission.authors)));

    lines.join("\n")
}

/// Missing fields render as empty strings rather than failing the item.
pub fn format_submission(submission: &Submission, event_name: &str) -> VideoMetadata {
    VideoMetadata {
        title: truncate_title(submission.title.as_deref().unwrap_or_default()),
        description: render_description(submission, event_name),
        tags: merge_keywords(
            submission.social_tags.as_deref(),
            submission.paper_keywords.as_deref(),
        ),
    }
}
