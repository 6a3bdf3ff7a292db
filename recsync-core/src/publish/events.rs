use serde::Serialize;

/// Payload emitted once per updated camera after a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingUpdate {
    pub camera: String,
    pub event_type: String,
}

/// Normalized camera name: lower-cased, spaces to underscores. Used for
/// asset filenames and for trigger matching, so both sides agree.
pub fn camera_slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Downstream trigger categories filtering the update stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Fires for every update of the camera.
    AnyUpdate,
    Vehicle,
    Person,
    /// Motion events that are not vehicle or person detections.
    Motion,
}

impl TriggerKind {
    pub fn matches(self, update: &RecordingUpdate, camera_name: &str) -> bool {
        if camera_slug(&update.camera) != camera_slug(camera_name) {
            return false;
        }
        let event = update.event_type.to_lowercase();
        match self {
            TriggerKind::AnyUpdate => true,
            TriggerKind::Vehicle => event.contains("vehicle"),
            TriggerKind::Person => event.contains("person"),
            TriggerKind::Motion => {
                !event.contains("vehicle") && !event.contains("person") && event.contains("motion")
            }
        }
    }
}
