use serde::Serialize;

use super::{CatalogBrowser, CatalogChild, CatalogResult, CATALOG_ROOT};

/// Change-detection key for a clip: two descriptors with the same index,
/// timestamp, and duration are the same physical recording.
pub fn recording_id(camera_index: u32, timestamp: &str, duration: &str) -> String {
    format!("{camera_index}_{timestamp}_{duration}")
}

/// Outcome of one camera's catalog walk. An `error` value marks a failed
/// lookup; such a descriptor never participates in caching, downloading,
/// or record emission.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingDescriptor {
    pub camera_index: u32,
    pub camera_name: String,
    pub date: String,
    pub timestamp: String,
    pub duration: String,
    pub event_type: String,
    pub content_id: String,
    pub recording_id: String,
    pub can_play: bool,
    pub error: Option<String>,
}

impl RecordingDescriptor {
    pub fn failed(camera_index: u32, camera_name: &str, error: impl Into<String>) -> Self {
        Self {
            camera_index,
            camera_name: camera_name.to_string(),
            date: String::new(),
            timestamp: String::new(),
            duration: String::new(),
            event_type: String::new(),
            content_id: String::new(),
            recording_id: String::new(),
            can_play: false,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct RecordingLocator;

impl RecordingLocator {
    /// Descends quality tier -> date -> clip for one camera and returns the
    /// most recent recording. Failures inside the walk never escape: they
    /// come back as an error descriptor so the other cameras keep going.
    pub async fn locate(
        browser: &dyn CatalogBrowser,
        hub_id: &str,
        camera_index: u32,
        camera_name: &str,
    ) -> RecordingDescriptor {
        match Self::walk(browser, hub_id, camera_index, camera_name).await {
            Ok(descriptor) => descriptor,
            Err(err) => RecordingDescriptor::failed(camera_index, camera_name, err.to_string()),
        }
    }

    async fn walk(
        browser: &dyn CatalogBrowser,
        hub_id: &str,
        camera_index: u32,
        camera_name: &str,
    ) -> CatalogResult<RecordingDescriptor> {
        let camera_node = format!("{CATALOG_ROOT}/CAM|{hub_id}|{camera_index}");
        let qualities = browser.browse(&camera_node).await?;
        if qualities.is_empty() {
            return Ok(RecordingDescriptor::failed(
                camera_index,
                camera_name,
                "no resolution options found",
            ));
        }
        let stream = select_stream(&qualities);

        let mut dates = browser.browse(&stream.content_id).await?;
        if dates.is_empty() {
            return Ok(RecordingDescriptor::failed(
                camera_index,
                camera_name,
                "no dates found",
            ));
        }
        sort_titles_descending(&mut dates);
        let latest_date = &dates[0];

        let mut clips = browser.browse(&latest_date.content_id).await?;
        if clips.is_empty() {
            let mut descriptor =
                RecordingDescriptor::failed(camera_index, camera_name, "no recordings found");
            descriptor.date = latest_date.title.clone();
            return Ok(descriptor);
        }
        sort_titles_descending(&mut clips);
        let clip = &clips[0];

        let (timestamp, duration, event_type) = parse_clip_title(&clip.title);
        Ok(RecordingDescriptor {
            camera_index,
            camera_name: camera_name.to_string(),
            date: latest_date.title.clone(),
            recording_id: recording_id(camera_index, &timestamp, &duration),
            timestamp,
            duration,
            event_type,
            content_id: clip.content_id.clone(),
            can_play: clip.can_play,
            error: None,
        })
    }
}

/// Quality tiers carry the stream name inside the content id; "main" is
/// the high-fidelity stream. Any stream beats none.
fn select_stream(children: &[CatalogChild]) -> &CatalogChild {
    children
        .iter()
        .find(|child| child.content_id.contains("main"))
        .unwrap_or(&children[0])
}

/// Date titles are fixed-width and clip titles lead with a sortable time
/// prefix, so lexicographic descending puts the most recent first.
fn sort_titles_descending(children: &mut [CatalogChild]) {
    children.sort_by(|a, b| b.title.cmp(&a.title));
}

/// "HH:MM:SS D:DD:DD Event..." - missing fields degrade to placeholders
/// instead of aborting the camera's lookup.
fn parse_clip_title(title: &str) -> (String, String, String) {
    let parts: Vec<&str> = title.split_whitespace().collect();
    let timestamp = parts.first().copied().unwrap_or("Unknown").to_string();
    let duration = parts.get(1).copied().unwrap_or("Unknown").to_string();
    let event_type = if parts.len() > 2 {
        parts[2..].join(" ")
    } else {
        "Motion".to_string()
    };
    (timestamp, duration, event_type)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::catalog::identity::DEFAULT_HUB_ID;
    use crate::catalog::CatalogError;

    struct FakeCatalog {
        nodes: HashMap<String, Vec<CatalogChild>>,
    }

    impl FakeCatalog {
        fn new() -> Self {
            Self {
                nodes: HashMap::new(),
            }
        }

        fn node(mut self, id: &str, children: Vec<(&str, &str)>) -> Self {
            self.nodes.insert(
                id.to_string(),
                children
                    .into_iter()
                    .map(|(title, content_id)| CatalogChild {
                        title: title.to_string(),
                        content_id: content_id.to_string(),
                        can_play: true,
                        content_type: String::new(),
                    })
                    .collect(),
            );
            self
        }
    }

    #[async_trait]
    impl CatalogBrowser for FakeCatalog {
        async fn browse(&self, node_id: &str) -> CatalogResult<Vec<CatalogChild>> {
            self.nodes.get(node_id).cloned().ok_or_else(|| {
                CatalogError::MalformedResponse(format!("unknown node {node_id}"))
            })
        }

        async fn resolve_source(&self, content_id: &str) -> CatalogResult<String> {
            Ok(format!("file:///tmp/{content_id}"))
        }
    }

    fn camera_node(index: u32) -> String {
        format!("{CATALOG_ROOT}/CAM|{DEFAULT_HUB_ID}|{index}")
    }

    #[tokio::test]
    async fn picks_the_latest_date_and_clip() {
        let catalog = FakeCatalog::new()
            .node(
                &camera_node(0),
                vec![("Low res", "sub|0"), ("High res", "main|0")],
            )
            .node(
                "main|0",
                vec![
                    ("2024-01-01", "d|2024-01-01"),
                    ("2024-01-10", "d|2024-01-10"),
                    ("2024-01-02", "d|2024-01-02"),
                ],
            )
            .node(
                "d|2024-01-10",
                vec![
                    ("09:00:00 0:00:03 Person", "clip|a"),
                    ("10:00:00 0:00:05 Vehicle", "clip|b"),
                ],
            );

        let descriptor =
            RecordingLocator::locate(&catalog, DEFAULT_HUB_ID, 0, "Driveway").await;
        assert!(descriptor.is_ok());
        assert_eq!(descriptor.date, "2024-01-10");
        assert_eq!(descriptor.timestamp, "10:00:00");
        assert_eq!(descriptor.duration, "0:00:05");
        assert_eq!(descriptor.event_type, "Vehicle");
        assert_eq!(descriptor.content_id, "clip|b");
        assert_eq!(descriptor.recording_id, "0_10:00:00_0:00:05");
    }

    #[tokio::test]
    async fn falls_back_to_the_first_stream_without_a_main_tier() {
        let catalog = FakeCatalog::new()
            .node(&camera_node(1), vec![("Only res", "sub|1")])
            .node("sub|1", vec![("2024-02-02", "d|2024-02-02")])
            .node("d|2024-02-02", vec![("08:15:00 0:00:10", "clip|c")]);

        let descriptor = RecordingLocator::locate(&catalog, DEFAULT_HUB_ID, 1, "Porch").await;
        assert!(descriptor.is_ok());
        assert_eq!(descriptor.timestamp, "08:15:00");
        // No event field on the clip title: classification defaults.
        assert_eq!(descriptor.event_type, "Motion");
    }

    #[tokio::test]
    async fn empty_levels_become_error_descriptors() {
        let catalog = FakeCatalog::new().node(&camera_node(2), vec![]);
        let descriptor = RecordingLocator::locate(&catalog, DEFAULT_HUB_ID, 2, "Garage").await;
        assert_eq!(
            descriptor.error.as_deref(),
            Some("no resolution options found")
        );

        let catalog = FakeCatalog::new()
            .node(&camera_node(2), vec![("High res", "main|2")])
            .node("main|2", vec![]);
        let descriptor = RecordingLocator::locate(&catalog, DEFAULT_HUB_ID, 2, "Garage").await;
        assert_eq!(descriptor.error.as_deref(), Some("no dates found"));

        let catalog = FakeCatalog::new()
            .node(&camera_node(2), vec![("High res", "main|2")])
            .node("main|2", vec![("2024-03-03", "d|2024-03-03")])
            .node("d|2024-03-03", vec![]);
        let descriptor = RecordingLocator::locate(&catalog, DEFAULT_HUB_ID, 2, "Garage").await;
        assert_eq!(descriptor.error.as_deref(), Some("no recordings found"));
        assert_eq!(descriptor.date, "2024-03-03");
    }

    #[tokio::test]
    async fn a_failing_walk_is_contained_as_an_error_descriptor() {
        // Browsing an unknown node raises inside the walk.
        let catalog = FakeCatalog::new();
        let descriptor = RecordingLocator::locate(&catalog, DEFAULT_HUB_ID, 3, "Side").await;
        assert!(!descriptor.is_ok());
    }

    #[test]
    fn recording_id_changes_with_each_component() {
        let base = recording_id(1, "10:00:00", "0:00:05");
        assert_eq!(base, recording_id(1, "10:00:00", "0:00:05"));
        assert_ne!(base, recording_id(2, "10:00:00", "0:00:05"));
        assert_ne!(base, recording_id(1, "10:00:01", "0:00:05"));
        assert_ne!(base, recording_id(1, "10:00:00", "0:00:06"));
    }

    #[test]
    fn clip_title_parsing_degrades_gracefully() {
        assert_eq!(
            parse_clip_title("14:30:00 0:00:20 Person"),
            (
                "14:30:00".to_string(),
                "0:00:20".to_string(),
                "Person".to_string()
            )
        );
        assert_eq!(
            parse_clip_title("14:30:00"),
            (
                "14:30:00".to_string(),
                "Unknown".to_string(),
                "Motion".to_string()
            )
        );
        assert_eq!(
            parse_clip_title("14:30:00 0:00:20 Person Vehicle"),
            (
                "14:30:00".to_string(),
                "0:00:20".to_string(),
                "Person Vehicle".to_string()
            )
        );
    }
}
