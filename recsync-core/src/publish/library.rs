use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::store::MetadataSnapshot;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("could not find file: {0}")]
    NotFound(String),
}

/// One browsable leaf: the latest asset of a camera, addressed by its
/// stable file name.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryEntry {
    pub title: String,
    pub identifier: String,
    pub can_play: bool,
}

/// Root listing of the local library: one playable entry per camera with a
/// downloaded recording, sorted by title. The path maps are dual-keyed, so
/// entries pointing at an already-listed file are collapsed.
pub fn browse_root(assets: &MetadataSnapshot) -> Vec<LibraryEntry> {
    let mut seen = HashSet::new();
    let mut entries: Vec<LibraryEntry> = assets
        .recordings
        .iter()
        .filter_map(|(camera, path)| {
            let identifier = basename(path);
            seen.insert(identifier.clone()).then(|| LibraryEntry {
                title: camera.clone(),
                identifier,
                can_play: true,
            })
        })
        .collect();
    entries.sort_by(|a, b| a.title.cmp(&b.title));
    entries
}

/// Resolves a leaf identifier (a file name) to the absolute local path and
/// its MIME type. Videos and derived previews are all addressable.
pub fn resolve(assets: &MetadataSnapshot, identifier: &str) -> Result<(PathBuf, &'static str), LibraryError> {
    let maps = [&assets.recordings, &assets.snapshots, &assets.animated];
    for map in maps {
        for path in map.values() {
            if basename(path) == identifier {
                return Ok((PathBuf::from(path), mime_for(identifier)));
            }
        }
    }
    Err(LibraryError::NotFound(identifier.to_string()))
}

/// Static classification by extension; the asset set is fixed.
fn mime_for(file_name: &str) -> &'static str {
    match file_name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("mp4") => "video/mp4",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

fn basename(path: &str) -> String {
    std::path::Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}
