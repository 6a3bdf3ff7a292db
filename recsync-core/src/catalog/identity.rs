use std::collections::BTreeMap;

use tracing::warn;

use super::CatalogChild;

/// Hub id used until one has been observed in a real content identifier.
pub const DEFAULT_HUB_ID: &str = "01JZW5GP7HJAVQNQXD498N4SKV";

/// Authoritative `{camera index -> display name}` map for one discovery
/// phase.
///
/// The upstream catalog reorders its children between polls, so a child's
/// list position is never a safe key. The index is parsed out of the
/// content identifier payload instead, and the whole map is rebuilt from
/// scratch each cycle rather than merged.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    names: BTreeMap<u32, String>,
    order: Vec<u32>,
    hub_id: Option<String>,
}

impl IdentityMap {
    pub fn rebuild(children: &[CatalogChild]) -> Self {
        let mut map = IdentityMap::default();
        for child in children {
            match parse_content_id(&child.content_id) {
                Some((hub, index)) => {
                    if map.hub_id.is_none() {
                        map.hub_id = Some(hub);
                    }
                    if !map.names.contains_key(&index) {
                        map.order.push(index);
                    }
                    map.names.insert(index, child.title.clone());
                }
                None => {
                    warn!(
                        title = %child.title,
                        content_id = %child.content_id,
                        "skipping catalog child with unparseable content id"
                    );
                }
            }
        }
        map
    }

    pub fn hub_id(&self) -> &str {
        self.hub_id.as_deref().unwrap_or(DEFAULT_HUB_ID)
    }

    pub fn name_of(&self, index: u32) -> Option<&str> {
        self.names.get(&index).map(String::as_str)
    }

    /// Cameras in discovery order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, &str)> {
        self.order
            .iter()
            .filter_map(|index| self.names.get(index).map(|name| (*index, name.as_str())))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// `"<kind>|<hub_id>|<index>"` with at least three fields; the third must
/// parse as the camera index.
fn parse_content_id(content_id: &str) -> Option<(String, u32)> {
    let mut fields = content_id.split('|');
    let _kind = fields.next()?;
    let hub = fields.next()?;
    let index = fields.next()?.parse().ok()?;
    Some((hub.to_string(), index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(title: &str, content_id: &str) -> CatalogChild {
        CatalogChild {
            title: title.to_string(),
            content_id: content_id.to_string(),
            can_play: false,
            content_type: String::new(),
        }
    }

    #[test]
    fn index_is_parsed_from_content_not_position() {
        let first = [
            child("Driveway", "CAM|HUB|2"),
            child("Porch", "CAM|HUB|0"),
        ];
        let swapped = [
            child("Porch", "CAM|HUB|0"),
            child("Driveway", "CAM|HUB|2"),
        ];

        let before = IdentityMap::rebuild(&first);
        let after = IdentityMap::rebuild(&swapped);

        assert_eq!(before.name_of(2), Some("Driveway"));
        assert_eq!(after.name_of(2), Some("Driveway"));
        assert_eq!(before.name_of(0), Some("Porch"));
        assert_eq!(after.name_of(0), Some("Porch"));
    }

    #[test]
    fn unparseable_children_are_skipped_not_fatal() {
        let children = [
            child("Driveway", "CAM|HUB|0"),
            child("Garbage", "not-an-identifier"),
            child("Porch", "CAM|HUB|nine"),
        ];
        let map = IdentityMap::rebuild(&children);
        assert_eq!(map.len(), 1);
        assert_eq!(map.name_of(0), Some("Driveway"));
    }

    #[test]
    fn hub_id_falls_back_to_default_until_observed() {
        let empty = IdentityMap::rebuild(&[]);
        assert_eq!(empty.hub_id(), DEFAULT_HUB_ID);

        let map = IdentityMap::rebuild(&[child("Driveway", "CAM|HUB42|0")]);
        assert_eq!(map.hub_id(), "HUB42");
    }

    #[test]
    fn entries_preserve_discovery_order() {
        let children = [
            child("Driveway", "CAM|HUB|5"),
            child("Porch", "CAM|HUB|1"),
            child("Garage", "CAM|HUB|3"),
        ];
        let map = IdentityMap::rebuild(&children);
        let order: Vec<u32> = map.entries().map(|(index, _)| index).collect();
        assert_eq!(order, vec![5, 1, 3]);
    }

    #[test]
    fn rebuild_replaces_rather_than_merges() {
        let map = IdentityMap::rebuild(&[child("Driveway", "CAM|HUB|0")]);
        assert_eq!(map.len(), 1);
        let map = IdentityMap::rebuild(&[child("Porch", "CAM|HUB|1")]);
        assert_eq!(map.name_of(0), None);
        assert_eq!(map.name_of(1), Some("Porch"));
    }
}
