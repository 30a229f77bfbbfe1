//! ClusterController - Public lifecycle API of the clustering engine
//!
//! The controller is the single owner of the item set and of the host surface. Calls made on
//! it directly run on the owning thread; every other thread talks to it through the
//! [`ClusterHandle`] returned by [`ClusterController::new`], whose events are applied by
//! [`ClusterController::pump`] or [`ClusterController::run_until_closed`].

use crate::channel::{ClusterEvent, ClusterHandle, ItemDescriptor};
use crate::renderer::ApplyStats;
use crate::{
    ClusterError, ClusterItem, ClusterManager, GridClusterAlgorithm, Identity, IconPainter,
    ImageLoader, MapSurface, MarkerHandle, PainterConfig, PainterStats, Renderer, Result,
    ZoomThreshold,
};
use geo::Point;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Cell side in screen pixels
    pub grid_size: u32,
    /// Width of a zoom bucket; zoom changes inside one bucket never re-partition
    pub zoom_step: f64,
    pub initial_zoom: f64,
    pub painter: PainterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grid_size: 100,
            zoom_step: 1.0,
            initial_zoom: 0.0,
            painter: PainterConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(self.zoom_step.is_finite() && self.zoom_step > 0.0) {
            return Err(ClusterError::InvalidConfig(format!(
                "zoom step must be positive, got {}",
                self.zoom_step
            )));
        }
        if !self.initial_zoom.is_finite() {
            return Err(ClusterError::InvalidConfig(
                "initial zoom must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Receiver of tap notifications
pub trait ClusterListener {
    /// A singleton marker was tapped
    fn on_marker_tap(&mut self, id: &str);

    /// A cluster was tapped; `ids` are its sorted members
    fn on_cluster_tap(&mut self, ids: &[String]);
}

/// Listener that ignores every notification
impl ClusterListener for () {
    fn on_marker_tap(&mut self, _id: &str) {}
    fn on_cluster_tap(&mut self, _ids: &[String]) {}
}

/// Outcome of one add-or-update batch
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Ids that were not live before
    pub inserted: usize,
    /// Ids that overwrote a live item
    pub updated: usize,
    /// Rejected entries, the rest of the batch still applied
    pub rejected: Vec<ClusterError>,
}

impl BatchReport {
    pub fn applied(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Owner of the manager, the renderer and the event queue
pub struct ClusterController<S: MapSurface> {
    manager: ClusterManager,
    renderer: Renderer<S>,
    listener: Box<dyn ClusterListener>,
    events: mpsc::UnboundedReceiver<ClusterEvent>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<S: MapSurface> ClusterController<S> {
    /// Build a controller drawing on `surface`, plus a handle for other threads
    pub fn new(
        config: Config,
        surface: S,
        loader: Box<dyn ImageLoader>,
        listener: Box<dyn ClusterListener>,
    ) -> Result<(Self, ClusterHandle)> {
        config.validate()?;
        let algorithm = GridClusterAlgorithm::new(config.grid_size)?;
        let painter = IconPainter::new(config.painter, loader)?;
        let manager = ClusterManager::new(
            algorithm,
            ZoomThreshold {
                step: config.zoom_step,
            },
            config.initial_zoom,
        );
        let (handle, events) = ClusterHandle::channel();

        tracing::info!(
            grid_size = config.grid_size,
            zoom_step = config.zoom_step,
            "Cluster controller ready"
        );

        let controller = Self {
            manager,
            renderer: Renderer::new(surface, painter),
            listener,
            events,
        };
        Ok((controller, handle))
    }

    /// Insert or overwrite items; nothing is drawn until the next pass
    pub fn add_or_update(&mut self, items: Vec<ClusterItem>) -> BatchReport {
        let mut report = BatchReport::default();
        for item in items {
            let item = match item.validated() {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!("Rejected item: {}", e);
                    report.rejected.push(e);
                    continue;
                }
            };
            if self.manager.insert_or_update(item) {
                report.inserted += 1;
            } else {
                report.updated += 1;
            }
        }
        report
    }

    /// Decode flat descriptors, then insert or overwrite them
    pub fn add_or_update_descriptors(&mut self, descriptors: &[Value]) -> BatchReport {
        let mut rejected = Vec::new();
        let mut items = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            match ItemDescriptor::parse(descriptor) {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!("Rejected descriptor: {}", e);
                    rejected.push(e);
                }
            }
        }
        let mut report = self.add_or_update(items);
        report.rejected.extend(rejected);
        report
    }

    /// Remove items by id; unknown ids are ignored. Returns how many were live.
    pub fn remove<I, T>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        ids.into_iter()
            .filter(|id| self.manager.remove(id.as_ref()).is_some())
            .count()
    }

    #[inline]
    pub fn exists(&self, id: &str) -> bool {
        self.manager.contains(id)
    }

    pub fn get(&self, id: &str) -> Option<&ClusterItem> {
        self.manager.get(id)
    }

    /// Number of live items
    pub fn len(&self) -> usize {
        self.manager.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manager.is_empty()
    }

    /// Resolve a tap on an item
    ///
    /// Returns `false` when `id` is not a live, visible item. Otherwise the listener hears about
    /// the marker (or the cluster currently containing it) and the item's tap-consumption flag
    /// is returned.
    pub fn on_tap(&mut self, id: &str) -> bool {
        let Some(item) = self.manager.get(id) else {
            return false;
        };
        if !item.visual.visible {
            return false;
        }
        let consume = item.visual.consume_tap_events;

        match self.manager.identity_of(id).and_then(|identity| self.manager.node(identity)) {
            Some(crate::RenderNode::Cluster(cluster)) => {
                let members = cluster.members.clone();
                self.listener.on_cluster_tap(&members);
            }
            _ => self.listener.on_marker_tap(id),
        }
        consume
    }

    /// Resolve a tap on a host screen object
    pub fn on_surface_tap(&mut self, handle: MarkerHandle) -> bool {
        match self.renderer.identity_for_handle(handle).cloned() {
            Some(Identity::Item(id)) => self.on_tap(&id),
            Some(identity @ Identity::Cluster(_)) => {
                let members = self
                    .manager
                    .node(&identity)
                    .map(crate::RenderNode::member_ids)
                    .unwrap_or_default();
                self.listener.on_cluster_tap(&members);
                true
            }
            None => {
                tracing::debug!(?handle, "Tap on an unknown screen object");
                false
            }
        }
    }

    /// Ask the host to move its camera; clustering follows the zoom notifications it sends
    pub fn move_camera(&mut self, position: Point<f64>, zoom: f64) {
        self.renderer.move_camera(position, zoom);
    }

    /// Host zoom notification; re-partitions only when the zoom bucket changed
    pub fn on_zoom_changed(&mut self, zoom: f64) -> Option<ApplyStats> {
        let reconciliation = self.manager.on_zoom_changed(zoom)?;
        Some(self.renderer.apply(&reconciliation))
    }

    /// Host camera-idle notification; applies the zoom and any pending mutations
    pub fn on_camera_idle(&mut self, _position: Point<f64>, zoom: f64) -> Option<ApplyStats> {
        let zoom_stats = self.on_zoom_changed(zoom);
        self.flush().or(zoom_stats)
    }

    /// Run a pass if mutations are pending or the zoom bucket changed
    pub fn flush(&mut self) -> Option<ApplyStats> {
        let reconciliation = self.manager.flush()?;
        Some(self.renderer.apply(&reconciliation))
    }

    /// Apply every queued event, then run at most one pass
    ///
    /// Returns the number of events applied.
    pub fn pump(&mut self) -> usize {
        let applied = self.drain();
        if applied > 0 {
            self.flush();
        }
        applied
    }

    /// Apply events as they arrive until every [`ClusterHandle`] is dropped
    ///
    /// Events queued while a pass runs are drained before the follow-up pass.
    pub async fn run_until_closed(&mut self) {
        while let Some(event) = self.events.recv().await {
            self.handle_event(event);
            self.drain();
            self.flush();
        }
        tracing::debug!("Cluster event channel closed");
    }

    fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            applied += 1;
        }
        applied
    }

    fn handle_event(&mut self, event: ClusterEvent) {
        match event {
            ClusterEvent::AddOrUpdateMarkers(descriptors) => {
                let report = self.add_or_update_descriptors(&descriptors);
                tracing::debug!(
                    inserted = report.inserted,
                    updated = report.updated,
                    rejected = report.rejected.len(),
                    "Applied marker batch"
                );
            }
            ClusterEvent::RemoveMarkers(ids) => {
                self.remove(&ids);
            }
            ClusterEvent::ZoomChanged(zoom) => {
                self.on_zoom_changed(zoom);
            }
            ClusterEvent::CameraIdle { position, zoom } => {
                self.on_camera_idle(position, zoom);
            }
            ClusterEvent::MarkerTapped(handle) => {
                self.on_surface_tap(handle);
            }
            ClusterEvent::ItemTapped(id) => {
                self.on_tap(&id);
            }
            ClusterEvent::MoveCamera { position, zoom } => self.move_camera(position, zoom),
            ClusterEvent::Flush => {
                self.flush();
            }
        }
    }

    /// Latest zoom reported by the host
    pub fn zoom(&self) -> f64 {
        self.manager.zoom()
    }

    /// Number of screen objects currently drawn
    pub fn rendered_len(&self) -> usize {
        self.renderer.len()
    }

    pub fn painter_stats(&self) -> PainterStats {
        self.renderer.painter().stats()
    }

    pub fn painter(&self) -> &IconPainter {
        self.renderer.painter()
    }

    pub fn surface(&self) -> &S {
        self.renderer.surface()
    }

    pub fn surface_mut(&mut self) -> &mut S {
        self.renderer.surface_mut()
    }

    /// Undraw everything and hand the surface back
    pub fn into_surface(mut self) -> S {
        self.renderer.clear();
        let Self { renderer, .. } = self;
        renderer.into_surface()
    }
}
