use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::catalog::identity::IdentityMap;
use crate::catalog::locator::{RecordingDescriptor, RecordingLocator};
use crate::catalog::{CatalogBrowser, CatalogError, CATALOG_ROOT};
use crate::config::{RecsyncConfig, SnapshotFormat};
use crate::notify::{ListenerHandle, ListenerRegistry};
use crate::publish::events::{camera_slug, RecordingUpdate};
use crate::publish::library::{self, LibraryEntry, LibraryError};
use crate::publish::records::{self, CameraRecord};
use crate::store::{CacheEntry, MetadataSnapshot, MetadataStore, StoreError};
use crate::transcode::{CommandExecutor, Transcoder};
use crate::transport::{TransportClient, TransportError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Drives one full refresh cycle across all discovered cameras: identity
/// rebuild, latest-recording location, cache-checked download, preview
/// transcode, persistence, and listener fan-out.
///
/// One logical worker per instance: cycles are serialized by the caller's
/// scheduler, and an internal guard turns any overlapping `refresh()` into
/// a logged no-op instead of interleaved state.
pub struct SyncEngine {
    browser: Arc<dyn CatalogBrowser>,
    transport: Arc<TransportClient>,
    transcoder: Transcoder,
    store: MetadataStore,
    snapshot_format: SnapshotFormat,
    enable_caching: bool,
    recordings_dir: PathBuf,
    state: Mutex<EngineState>,
    listeners: ListenerRegistry,
    cycle_guard: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct EngineState {
    loaded: bool,
    identity: IdentityMap,
    cameras: Vec<RecordingDescriptor>,
    assets: MetadataSnapshot,
    last_updates: Vec<RecordingUpdate>,
}

#[derive(Default)]
struct PreviewPaths {
    still: Option<PathBuf>,
    animated: Option<PathBuf>,
}

impl SyncEngine {
    pub fn new(
        config: &RecsyncConfig,
        browser: Arc<dyn CatalogBrowser>,
        transport: Arc<TransportClient>,
        executor: Option<Arc<dyn CommandExecutor>>,
    ) -> SyncResult<Self> {
        let storage_dir = PathBuf::from(&config.paths.storage_dir);
        let recordings_dir = storage_dir.join("recordings");
        let metadata_dir = storage_dir.join("metadata");
        for dir in [&recordings_dir, &metadata_dir] {
            std::fs::create_dir_all(dir).map_err(|source| SyncError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(Self {
            browser,
            transport,
            transcoder: Transcoder::new(&config.transcode, executor),
            store: MetadataStore::new(metadata_dir.join("recordings.json")),
            snapshot_format: config.sync.snapshot_format,
            enable_caching: config.sync.enable_caching,
            recordings_dir,
            state: Mutex::new(EngineState::default()),
            listeners: ListenerRegistry::new(),
            cycle_guard: tokio::sync::Mutex::new(()),
        })
    }

    /// One cycle. The boolean result is the only thing that escapes: no
    /// per-camera failure, transcode failure, or persistence failure makes
    /// it past here, and the engine always returns to idle.
    pub async fn refresh(&self) -> bool {
        let Ok(_running) = self.cycle_guard.try_lock() else {
            warn!("refresh already in flight, skipping overlapping cycle");
            return false;
        };
        match self.run_cycle().await {
            Ok(cameras) => {
                info!(cameras, "refreshed camera recordings");
                true
            }
            Err(err) => {
                error!(error = %err, "refresh cycle failed");
                false
            }
        }
    }

    /// On-demand variant of the scheduled tick.
    pub async fn request_immediate_refresh(&self) -> bool {
        self.refresh().await
    }

    pub fn add_listener(
        &self,
        callback: impl Fn(&[RecordingUpdate]) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.listeners.subscribe(callback)
    }

    pub fn remove_listener(&self, handle: ListenerHandle) {
        self.listeners.unsubscribe(handle);
    }

    pub fn cameras(&self) -> Vec<RecordingDescriptor> {
        self.state.lock().unwrap().cameras.clone()
    }

    pub fn identity(&self) -> IdentityMap {
        self.state.lock().unwrap().identity.clone()
    }

    pub fn metadata(&self) -> MetadataSnapshot {
        self.state.lock().unwrap().assets.clone()
    }

    pub fn last_updates(&self) -> Vec<RecordingUpdate> {
        self.state.lock().unwrap().last_updates.clone()
    }

    /// Queryable per-camera records for the host's entity surface.
    pub fn records(&self) -> Vec<CameraRecord> {
        let state = self.state.lock().unwrap();
        records::build_records(
            &state.cameras,
            &state.assets,
            self.snapshot_format,
            Utc::now(),
        )
    }

    /// Browsable root of the local asset library.
    pub fn library_root(&self) -> Vec<LibraryEntry> {
        library::browse_root(&self.state.lock().unwrap().assets)
    }

    /// Resolves a library leaf identifier to a local path and MIME type.
    pub fn resolve_identifier(
        &self,
        identifier: &str,
    ) -> Result<(PathBuf, &'static str), LibraryError> {
        library::resolve(&self.state.lock().unwrap().assets, identifier)
    }

    pub fn recordings_dir(&self) -> &Path {
        &self.recordings_dir
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    async fn run_cycle(&self) -> SyncResult<usize> {
        self.ensure_loaded();

        // Discovery: full identity rebuild, then one locator walk per
        // camera in discovery order.
        let root_children = self.browser.browse(CATALOG_ROOT).await?;
        let identity = IdentityMap::rebuild(&root_children);
        if identity.is_empty() {
            warn!("no cameras found in catalog root");
        }
        let mut descriptors = Vec::with_capacity(identity.len());
        for (index, name) in identity.entries() {
            debug!(camera = name, index, "processing camera");
            descriptors.push(
                RecordingLocator::locate(self.browser.as_ref(), identity.hub_id(), index, name)
                    .await,
            );
        }

        let mut updates = Vec::new();
        for descriptor in &descriptors {
            if let Some(err) = &descriptor.error {
                warn!(camera = %descriptor.camera_name, error = %err, "skipping camera with failed lookup");
                continue;
            }
            if let Some(update) = self.sync_camera(&identity, descriptor).await {
                updates.push(update);
            }
        }

        let camera_count = descriptors.len();
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.identity = identity;
            state.cameras = descriptors;
            state.assets.last_update = Some(Utc::now().to_rfc3339());
            state.last_updates = updates.clone();
            state.assets.clone()
        };
        if let Err(err) = self.store.save(&snapshot) {
            warn!(error = %err, "failed to persist metadata, keeping in-memory state");
        }
        self.listeners.notify(&updates);
        Ok(camera_count)
    }

    fn ensure_loaded(&self) {
        let mut state = self.state.lock().unwrap();
        if state.loaded {
            return;
        }
        state.assets = self.store.load();
        state.loaded = true;
    }

    /// Cache check, download, transcode, and map update for one camera.
    /// Failures stay inside this boundary: the previous cycle's files and
    /// cache entry remain authoritative and the other cameras carry on.
    async fn sync_camera(
        &self,
        identity: &IdentityMap,
        descriptor: &RecordingDescriptor,
    ) -> Option<RecordingUpdate> {
        let canonical = identity
            .name_of(descriptor.camera_index)
            .unwrap_or(descriptor.camera_name.as_str())
            .to_string();
        let slug = camera_slug(&canonical);
        let video_path = self.recordings_dir.join(format!("{slug}_latest.mp4"));

        if self.enable_caching && self.cache_is_current(&canonical, descriptor, &video_path) {
            return None;
        }

        let source = match self.browser.resolve_source(&descriptor.content_id).await {
            Ok(url) => url,
            Err(err) => {
                error!(camera = %canonical, error = %err, "could not resolve recording source");
                return None;
            }
        };
        if let Err(err) = self.transport.download(&source, &video_path).await {
            error!(camera = %canonical, error = %err, "recording download failed");
            return None;
        }
        info!(camera = %canonical, path = %video_path.display(), "downloaded recording");

        let previews = self.generate_previews(&canonical, &slug, &video_path).await;
        self.commit_camera(descriptor, &canonical, &video_path, previews);
        Some(RecordingUpdate {
            camera: canonical,
            event_type: descriptor.event_type.clone(),
        })
    }

    /// A matching cache entry skips the download, provided the expected
    /// video actually exists on disk; the in-memory path maps are
    /// repopulated so a cache that survived a restart still publishes
    /// paths.
    fn cache_is_current(
        &self,
        canonical: &str,
        descriptor: &RecordingDescriptor,
        video_path: &Path,
    ) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(entry) = state.assets.recording_cache.get(canonical) else {
            return false;
        };
        if entry.recording_id != descriptor.recording_id {
            return false;
        }
        if !video_path.exists() {
            debug!(camera = %canonical, "cache entry matches but file is missing, re-downloading");
            return false;
        }
        debug!(
            camera = %canonical,
            recording_id = %descriptor.recording_id,
            "recording unchanged, skipping download"
        );

        let slug = camera_slug(canonical);
        let video = video_path.to_string_lossy().to_string();
        let still = self.recordings_dir.join(format!("{slug}_latest.jpg"));
        let animated = self.recordings_dir.join(format!("{slug}_latest.gif"));
        for key in dual_keys(canonical, &descriptor.camera_name) {
            state.assets.recordings.insert(key.clone(), video.clone());
            if still.exists() {
                state
                    .assets
                    .snapshots
                    .insert(key.clone(), still.to_string_lossy().to_string());
            }
            if animated.exists() {
                state
                    .assets
                    .animated
                    .insert(key, animated.to_string_lossy().to_string());
            }
        }
        true
    }

    /// Derived imagery per the configured snapshot policy. A transcoder
    /// failure is logged and leaves the downloaded video in place.
    async fn generate_previews(&self, canonical: &str, slug: &str, video: &Path) -> PreviewPaths {
        let mut previews = PreviewPaths::default();
        if self.snapshot_format.wants_still() {
            let dest = self.recordings_dir.join(format!("{slug}_latest.jpg"));
            match self.transcoder.still(video, &dest).await {
                Ok(()) => previews.still = Some(dest),
                Err(err) => {
                    warn!(camera = %canonical, error = %err, "still preview generation failed")
                }
            }
        }
        if self.snapshot_format.wants_animated() {
            let dest = self.recordings_dir.join(format!("{slug}_latest.gif"));
            match self.transcoder.animated(video, &dest).await {
                Ok(()) => previews.animated = Some(dest),
                Err(err) => {
                    warn!(camera = %canonical, error = %err, "animated preview generation failed")
                }
            }
        }
        previews
    }

    /// Runs only after a successful download, so the file on disk and the
    /// cache entry always move together. Maps are written under both the
    /// discovered and canonical names for compatibility with older stored
    /// data.
    fn commit_camera(
        &self,
        descriptor: &RecordingDescriptor,
        canonical: &str,
        video: &Path,
        previews: PreviewPaths,
    ) {
        let mut state = self.state.lock().unwrap();
        let video_str = video.to_string_lossy().to_string();
        let entry = CacheEntry {
            recording_id: descriptor.recording_id.clone(),
            timestamp: descriptor.timestamp.clone(),
            event_type: descriptor.event_type.clone(),
            duration: descriptor.duration.clone(),
            path: video_str.clone(),
        };
        for key in dual_keys(canonical, &descriptor.camera_name) {
            state.assets.recordings.insert(key.clone(), video_str.clone());
            state
                .assets
                .recording_cache
                .insert(key.clone(), entry.clone());
            if let Some(still) = &previews.still {
                state
                    .assets
                    .snapshots
                    .insert(key.clone(), still.to_string_lossy().to_string());
            }
            if let Some(animated) = &previews.animated {
                state
                    .assets
                    .animated
                    .insert(key, animated.to_string_lossy().to_string());
            }
        }
    }
}

fn dual_keys(canonical: &str, discovered: &str) -> Vec<String> {
    if canonical == discovered {
        vec![canonical.to_string()]
    } else {
        vec![canonical.to_string(), discovered.to_string()]
    }
}
