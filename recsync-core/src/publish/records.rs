use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::locator::RecordingDescriptor;
use crate::config::SnapshotFormat;
use crate::store::MetadataSnapshot;

/// URL prefix under which the host serves the storage directory.
pub const LOCAL_URL_BASE: &str = "/local/recsync/recordings";

/// Queryable per-camera state materialized from the engine's maps.
///
/// Errored cameras are published explicitly unavailable rather than
/// omitted, so "no camera" and "camera fetch failed" stay distinguishable.
#[derive(Debug, Clone, Serialize)]
pub struct CameraRecord {
    pub camera: String,
    pub available: bool,
    pub state: Option<String>,
    pub error: Option<String>,
    pub attributes: Option<RecordAttributes>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordAttributes {
    pub date: String,
    pub timestamp: String,
    pub duration: String,
    pub event_type: String,
    pub file_path: String,
    pub file_name: String,
    pub media_url: String,
    pub picture_url: Option<String>,
    pub alternate_picture_url: Option<String>,
    pub last_updated: String,
}

pub fn build_records(
    cameras: &[RecordingDescriptor],
    assets: &MetadataSnapshot,
    format: SnapshotFormat,
    now: DateTime<Utc>,
) -> Vec<CameraRecord> {
    cameras
        .iter()
        .map(|descriptor| build_record(descriptor, assets, format, now))
        .collect()
}

fn build_record(
    descriptor: &RecordingDescriptor,
    assets: &MetadataSnapshot,
    format: SnapshotFormat,
    now: DateTime<Utc>,
) -> CameraRecord {
    let camera = descriptor.camera_name.clone();
    if let Some(error) = &descriptor.error {
        return CameraRecord {
            camera,
            available: false,
            state: None,
            error: Some(error.clone()),
            attributes: None,
        };
    }

    let state = format!(
        "{} {} - {}",
        descriptor.date, descriptor.timestamp, descriptor.event_type
    );
    let Some(file_path) = assets.recordings.get(&camera) else {
        return CameraRecord {
            camera,
            available: false,
            state: Some(state),
            error: None,
            attributes: None,
        };
    };

    let bust = now.timestamp().to_string();
    let file_name = basename(file_path);
    let media_url = cache_busted_url(&file_name, &bust);
    let still_url = assets
        .snapshots
        .get(&camera)
        .map(|path| cache_busted_url(&basename(path), &bust));
    let animated_url = assets
        .animated
        .get(&camera)
        .map(|path| cache_busted_url(&basename(path), &bust));

    let (picture_url, alternate_picture_url) = select_picture(format, still_url, animated_url);

    CameraRecord {
        camera,
        available: true,
        state: Some(state),
        error: None,
        attributes: Some(RecordAttributes {
            date: descriptor.date.clone(),
            timestamp: descriptor.timestamp.clone(),
            duration: descriptor.duration.clone(),
            event_type: descriptor.event_type.clone(),
            file_path: file_path.clone(),
            file_name,
            picture_url: picture_url.or_else(|| Some(media_url.clone())),
            alternate_picture_url,
            media_url,
            last_updated: now.to_rfc3339(),
        }),
    }
}

/// Picks the primary preview per the snapshot policy. Under `both` the
/// animated preview wins with the still exposed as an alternate, falling
/// back to the still when animation generation failed.
fn select_picture(
    format: SnapshotFormat,
    still: Option<String>,
    animated: Option<String>,
) -> (Option<String>, Option<String>) {
    match format {
        SnapshotFormat::Still => (still, None),
        SnapshotFormat::Animated => (animated, None),
        SnapshotFormat::Both => match (animated, still) {
            (Some(animated), still) => (Some(animated), still),
            (None, still) => (still, None),
        },
    }
}

fn cache_busted_url(file_name: &str, bust: &str) -> String {
    format!("{LOCAL_URL_BASE}/{file_name}?t={bust}")
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}
