//! Catalog synchronization from a storage backend file listing.
//!
//! A listing is the JSON a Drive-style `files.list` call returns, either the
//! full `{"files": [...]}` object or a bare array. Each video file becomes a
//! catalog entry keyed by a cleaned-up, unique title.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

use super::{MemoryCatalog, VideoResource, DEFAULT_CONTENT_TYPE};
use crate::error::Result;

/// Download URL used when the listing carries no content link.
const FALLBACK_DOWNLOAD_URL: &str = "https://drive.google.com/uc?export=download&id=";

/// One file of a remote listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub web_content_link: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Drive reports sizes as strings; plain numbers are accepted too.
    #[serde(default, deserialize_with = "size_from_string_or_number")]
    pub size: Option<u64>,
}

impl RemoteFile {
    fn is_video(&self) -> bool {
        self.mime_type
            .as_deref()
            .map_or(true, |mime| mime.contains("video/"))
    }

    fn download_url(&self) -> String {
        match self.web_content_link.as_deref() {
            Some(link) if !link.is_empty() => link.to_string(),
            _ => format!("{}{}", FALLBACK_DOWNLOAD_URL, self.id),
        }
    }
}

fn size_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Size>::deserialize(deserializer)? {
        Some(Size::Number(n)) => Some(n),
        Some(Size::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Listing {
    Wrapped { files: Vec<RemoteFile> },
    Bare(Vec<RemoteFile>),
}

/// Read a listing file.
pub fn read_listing<P: AsRef<Path>>(path: P) -> Result<Vec<RemoteFile>> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let listing: Listing = serde_json::from_str(&content)?;
    Ok(match listing {
        Listing::Wrapped { files } => files,
        Listing::Bare(files) => files,
    })
}

/// Outcome of a synchronization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// New entries added to the catalog.
    pub inserted: usize,
    /// Files already present, or not videos.
    pub skipped: usize,
}

/// Turn a file name into a display title.
///
/// Strips the extension and upload timestamps (`-` followed by 10+ digits),
/// turns underscores into spaces and title-cases the result. Drive's generic
/// `videoplayback` name becomes `Video <index + 1>`.
pub fn clean_title(file_name: &str, index: usize) -> String {
    let title = regex!(r"\.[^.]+$").replace(file_name, "");
    let title = regex!(r"-\d{10,}").replace_all(&title, "");
    let title = title_case(&title.trim().replace('_', " "));

    if title.to_lowercase() == "videoplayback" {
        format!("Video {}", index + 1)
    } else {
        title
    }
}

/// Uppercase the first letter of every word, lowercase the rest. A word
/// starts after any non-alphabetic character.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(c);
            word_start = true;
        }
    }
    out
}

/// Merge a listing into the catalog. Files whose id is already known are
/// skipped; a title collision gets ` (<index + 1>)` appended.
pub fn sync_listing(catalog: &MemoryCatalog, files: &[RemoteFile]) -> SyncReport {
    let mut report = SyncReport::default();

    for (index, file) in files.iter().enumerate() {
        if !file.is_video() {
            tracing::debug!("Skipping non-video file '{}'", file.name);
            report.skipped += 1;
            continue;
        }

        if catalog.contains_source(&file.id) {
            tracing::info!("Video '{}' already in catalog", file.name);
            report.skipped += 1;
            continue;
        }

        let mut title = clean_title(&file.name, index);
        if catalog.contains_identifier(&title) {
            title = format!("{} ({})", title, index + 1);
        }

        let resource = VideoResource {
            identifier: title.clone(),
            title: title.clone(),
            url: Some(file.download_url()),
            size: file.size,
            content_type: file
                .mime_type
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            source_id: Some(file.id.clone()),
        };

        if catalog.insert(resource) {
            tracing::info!("Video '{}' added to catalog", title);
            report.inserted += 1;
        } else {
            tracing::warn!("Title '{}' still taken, skipping '{}'", title, file.name);
            report.skipped += 1;
        }
    }

    report
}
