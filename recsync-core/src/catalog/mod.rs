pub mod identity;
pub mod locator;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::transport::{MessageChannel, TransportClient, TransportError, TransportResult};

/// Scheme root of the upstream camera catalog.
pub const CATALOG_ROOT: &str = "media-source://reolink";

const BROWSE_SERVICE: &str = "/api/services/media_player/browse_media?return_response=true";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed browse response: {0}")]
    MalformedResponse(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// One child of a catalog node: a camera, quality tier, date, or clip.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogChild {
    pub title: String,
    #[serde(rename = "media_content_id")]
    pub content_id: String,
    #[serde(default)]
    pub can_play: bool,
    #[serde(default, rename = "media_content_type")]
    pub content_type: String,
}

/// Walks one catalog level at a time and resolves clips to byte-stream
/// URLs. The engine only talks to this seam, so tests can swap in an
/// in-memory catalog.
#[async_trait]
pub trait CatalogBrowser: Send + Sync {
    /// Fetches the children of `node_id`. An empty listing is a valid,
    /// non-error result; a response without a children field is not.
    async fn browse(&self, node_id: &str) -> CatalogResult<Vec<CatalogChild>>;

    /// Resolves a playable clip's content id to a downloadable URL.
    async fn resolve_source(&self, content_id: &str) -> CatalogResult<String>;
}

/// Production browser: one authenticated service call per browse, a fresh
/// channel per resolve. No connection reuse across calls; call volume is
/// O(cameras x 3) per cycle.
pub struct HttpCatalogBrowser {
    transport: Arc<TransportClient>,
    entity_id: String,
    correlation: AtomicU64,
}

impl HttpCatalogBrowser {
    pub fn new(transport: Arc<TransportClient>, entity_id: impl Into<String>) -> Self {
        Self {
            transport,
            entity_id: entity_id.into(),
            correlation: AtomicU64::new(1),
        }
    }

    fn next_correlation_id(&self) -> u64 {
        self.correlation.fetch_add(1, Ordering::Relaxed)
    }

    async fn resolve_over_channel(
        &self,
        channel: &mut MessageChannel,
        content_id: &str,
    ) -> TransportResult<String> {
        channel.authenticate(self.transport.token()).await?;
        channel
            .resolve_media(content_id, self.next_correlation_id())
            .await
    }
}

#[async_trait]
impl CatalogBrowser for HttpCatalogBrowser {
    async fn browse(&self, node_id: &str) -> CatalogResult<Vec<CatalogChild>> {
        let body = json!({
            "entity_id": self.entity_id,
            "media_content_id": node_id,
            "media_content_type": "playlist",
        });
        let response = self.transport.post_json(BROWSE_SERVICE, &body).await?;
        extract_children(&response, &self.entity_id)
    }

    async fn resolve_source(&self, content_id: &str) -> CatalogResult<String> {
        let direct = self.transport.proxy_url(content_id);
        match self.transport.probe(&direct).await {
            Ok(true) => return Ok(direct),
            Ok(false) => {
                debug!(url = %direct, "direct proxy probe rejected, resolving over channel")
            }
            Err(error) => debug!(%error, "direct proxy probe failed, resolving over channel"),
        }

        let mut channel = self.transport.open_channel().await?;
        let outcome = self.resolve_over_channel(&mut channel, content_id).await;
        channel.close().await;
        let path = outcome?;
        Ok(self.transport.absolute_url(&path))
    }
}

fn extract_children(response: &Value, entity_id: &str) -> CatalogResult<Vec<CatalogChild>> {
    let envelope = response
        .get("service_response")
        .and_then(|value| value.get(entity_id))
        .ok_or_else(|| {
            CatalogError::MalformedResponse("missing service_response envelope".to_string())
        })?;
    let children = envelope.get("children").ok_or_else(|| {
        CatalogError::MalformedResponse("browse result missing children field".to_string())
    })?;
    serde_json::from_value(children.clone())
        .map_err(|err| CatalogError::MalformedResponse(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTITY: &str = "media_player.recsync_browser";

    #[test]
    fn extracts_children_from_the_service_envelope() {
        let response = json!({
            "service_response": {
                ENTITY: {
                    "children": [
                        { "title": "Driveway", "media_content_id": "CAM|HUB|0", "can_play": false },
                        { "title": "Porch", "media_content_id": "CAM|HUB|1" },
                    ]
                }
            }
        });
        let children = extract_children(&response, ENTITY).unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].title, "Driveway");
        assert_eq!(children[1].content_id, "CAM|HUB|1");
        assert!(!children[1].can_play);
    }

    #[test]
    fn empty_children_is_a_valid_empty_listing() {
        let response = json!({
            "service_response": { ENTITY: { "children": [] } }
        });
        let children = extract_children(&response, ENTITY).unwrap();
        assert!(children.is_empty());
    }

    #[test]
    fn missing_children_field_is_malformed() {
        let response = json!({
            "service_response": { ENTITY: { "title": "root" } }
        });
        let err = extract_children(&response, ENTITY).unwrap_err();
        assert!(matches!(err, CatalogError::MalformedResponse(_)));
    }

    #[test]
    fn missing_envelope_is_malformed() {
        let response = json!({ "service_response": {} });
        assert!(extract_children(&response, ENTITY).is_err());
    }
}
