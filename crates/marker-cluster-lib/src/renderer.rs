//! Renderer - Applies reconciliations to the host map surface
//!
//! The renderer owns the [`IconPainter`] and the arena of screen objects currently drawn, keyed
//! by [`Identity`]. Each pass adds and updates before it removes, all inside one surface batch,
//! so a node being replaced is never observably missing.

use crate::{Anchor, Bitmap, Identity, IconPainter, IconCacheKey, Reconciliation, RenderNode};
use geo::Point;
use std::collections::HashMap;
use std::sync::Arc;

/// Opaque handle of a screen object, issued by the host surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerHandle(pub u64);

/// Everything the host needs to draw one screen object
#[derive(Debug, Clone)]
pub struct DrawRequest {
    pub bitmap: Bitmap,
    pub position: Point<f64>,
    pub anchor: Anchor,
    /// Degrees
    pub rotation: f32,
    pub alpha: f32,
    pub z_index: i32,
    pub flat: bool,
    pub draggable: bool,
}

impl DrawRequest {
    /// Whether drawing `other` would produce the same screen object
    pub fn same_as(&self, other: &DrawRequest) -> bool {
        (Arc::ptr_eq(&self.bitmap, &other.bitmap) || self.bitmap.data() == other.bitmap.data())
            && self.bitmap.width() == other.bitmap.width()
            && self.position == other.position
            && self.anchor == other.anchor
            && self.rotation == other.rotation
            && self.alpha == other.alpha
            && self.z_index == other.z_index
            && self.flat == other.flat
            && self.draggable == other.draggable
    }
}

/// Host map surface the engine draws on
///
/// All calls happen on the thread owning the controller.
pub trait MapSurface {
    /// Create a screen object
    fn draw(&mut self, request: &DrawRequest) -> MarkerHandle;

    /// Replace a screen object in place, returning its (possibly new) handle
    ///
    /// The default draws the replacement before discarding the old object.
    fn update(&mut self, handle: MarkerHandle, request: &DrawRequest) -> MarkerHandle {
        let replacement = self.draw(request);
        self.undraw(handle);
        replacement
    }

    /// Discard a screen object
    fn undraw(&mut self, handle: MarkerHandle);

    /// Move the camera; fire-and-forget
    fn move_camera(&mut self, target: Point<f64>, zoom: f64);

    /// Start a group of calls the host may present atomically
    fn begin_batch(&mut self) {}

    /// End the group started by [`MapSurface::begin_batch`]
    fn commit_batch(&mut self) {}
}

/// A screen object currently drawn
#[derive(Debug, Clone)]
pub struct RenderedEntry {
    pub handle: MarkerHandle,
    pub node: RenderNode,
    pub request: DrawRequest,
}

/// Draw-call counters of one applied reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub drawn: usize,
    pub updated: usize,
    pub skipped: usize,
    pub undrawn: usize,
}

/// Owner of the drawn screen objects and of the icon painter
pub struct Renderer<S: MapSurface> {
    surface: S,
    painter: IconPainter,
    entries: HashMap<Identity, RenderedEntry>,
    by_handle: HashMap<MarkerHandle, Identity>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<S: MapSurface> Renderer<S> {
    pub fn new(surface: S, painter: IconPainter) -> Self {
        Self {
            surface,
            painter,
            entries: HashMap::new(),
            by_handle: HashMap::new(),
        }
    }

    /// Apply one reconciliation to the surface
    pub fn apply(&mut self, reconciliation: &Reconciliation) -> ApplyStats {
        #[cfg(feature = "profiling")]
        profiling::scope!("renderer::apply");

        let mut stats = ApplyStats::default();
        if reconciliation.is_empty() {
            return stats;
        }

        // Paint every missing icon up front so draw calls never wait on a decode
        let keys: Vec<IconCacheKey> = reconciliation
            .to_add
            .iter()
            .chain(&reconciliation.to_update)
            .map(|node| self.icon_key(node))
            .collect();
        self.painter.prefetch(keys);

        let mut entries = std::mem::take(&mut self.entries);
        self.surface.begin_batch();

        for node in &reconciliation.to_add {
            let identity = node.identity();
            let request = self.request_for(node);
            if let Some(existing) = entries.get(&identity) {
                tracing::error!(?identity, "Add of an identity that is already drawn");
                let handle = self.surface.update(existing.handle, &request);
                stats.updated += 1;
                entries.insert(identity, RenderedEntry { handle, node: node.clone(), request });
                continue;
            }
            tracing::trace!(?identity, "draw");
            let handle = self.surface.draw(&request);
            stats.drawn += 1;
            entries.insert(identity, RenderedEntry { handle, node: node.clone(), request });
        }

        for node in &reconciliation.to_update {
            let identity = node.identity();
            let request = self.request_for(node);
            let handle = match entries.get(&identity) {
                Some(existing) if existing.request.same_as(&request) => {
                    stats.skipped += 1;
                    existing.handle
                }
                Some(existing) => {
                    tracing::trace!(?identity, "update");
                    stats.updated += 1;
                    self.surface.update(existing.handle, &request)
                }
                None => {
                    tracing::error!(?identity, "Update of an identity that is not drawn");
                    stats.drawn += 1;
                    self.surface.draw(&request)
                }
            };
            entries.insert(identity, RenderedEntry { handle, node: node.clone(), request });
        }

        for identity in &reconciliation.to_remove {
            match entries.remove(identity) {
                Some(entry) => {
                    tracing::trace!(?identity, "undraw");
                    self.surface.undraw(entry.handle);
                    stats.undrawn += 1;
                }
                None => tracing::error!(?identity, "Remove of an identity that is not drawn"),
            }
        }

        self.surface.commit_batch();

        self.by_handle = entries
            .iter()
            .map(|(identity, entry)| (entry.handle, identity.clone()))
            .collect();
        self.entries = entries;
        stats
    }

    /// Undraw every screen object
    pub fn clear(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        self.surface.begin_batch();
        for (_, entry) in self.entries.drain() {
            self.surface.undraw(entry.handle);
        }
        self.surface.commit_batch();
        self.by_handle.clear();
    }

    pub fn move_camera(&mut self, target: Point<f64>, zoom: f64) {
        self.surface.move_camera(target, zoom);
    }

    fn icon_key(&self, node: &RenderNode) -> IconCacheKey {
        match node {
            RenderNode::Singleton(item) => IconCacheKey::for_visual(&item.visual),
            RenderNode::Cluster(cluster) => self.painter.cluster_key(cluster.size()),
        }
    }

    fn request_for(&mut self, node: &RenderNode) -> DrawRequest {
        match node {
            RenderNode::Singleton(item) => {
                let visual = &item.visual;
                DrawRequest {
                    bitmap: self.painter.marker_icon(visual),
                    position: item.position,
                    anchor: visual.anchor,
                    rotation: visual.rotation,
                    alpha: visual.alpha,
                    z_index: visual.z_index,
                    flat: visual.flat,
                    draggable: visual.draggable,
                }
            }
            RenderNode::Cluster(cluster) => DrawRequest {
                bitmap: self.painter.cluster_icon(cluster.size()),
                position: cluster.centroid,
                anchor: Anchor::CENTER,
                rotation: 0.0,
                alpha: 1.0,
                z_index: cluster.z_index,
                flat: false,
                draggable: false,
            },
        }
    }

    /// Identity drawn under a host handle
    pub fn identity_for_handle(&self, handle: MarkerHandle) -> Option<&Identity> {
        self.by_handle.get(&handle)
    }

    pub fn entry(&self, identity: &Identity) -> Option<&RenderedEntry> {
        self.entries.get(identity)
    }

    /// Number of screen objects currently drawn
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn painter(&self) -> &IconPainter {
        &self.painter
    }

    pub fn into_surface(self) -> S {
        self.surface
    }
}

/// In-memory surface recording every call, shared by the crate's tests
#[cfg(test)]
pub(crate) mod recording {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum SurfaceCall {
        Draw(MarkerHandle),
        Update(MarkerHandle, MarkerHandle),
        Undraw(MarkerHandle),
        MoveCamera(Point<f64>, f64),
        Begin,
        Commit,
    }

    #[derive(Debug, Default)]
    pub struct RecordingSurface {
        next: u64,
        pub calls: Vec<SurfaceCall>,
        pub live: HashMap<MarkerHandle, DrawRequest>,
        /// Fewest live objects seen while a batch was open
        pub min_live_in_batch: Option<usize>,
        in_batch: bool,
    }

    impl RecordingSurface {
        fn observe(&mut self) {
            if self.in_batch {
                let live = self.live.len();
                self.min_live_in_batch = Some(self.min_live_in_batch.map_or(live, |m| m.min(live)));
            }
        }

        pub fn draw_calls(&self) -> usize {
            self.calls
                .iter()
                .filter(|call| !matches!(call, SurfaceCall::Begin | SurfaceCall::Commit))
                .count()
        }
    }

    impl MapSurface for RecordingSurface {
        fn draw(&mut self, request: &DrawRequest) -> MarkerHandle {
            self.next += 1;
            let handle = MarkerHandle(self.next);
            self.live.insert(handle, request.clone());
            self.calls.push(SurfaceCall::Draw(handle));
            self.observe();
            handle
        }

        fn update(&mut self, handle: MarkerHandle, request: &DrawRequest) -> MarkerHandle {
            self.live.insert(handle, request.clone());
            self.calls.push(SurfaceCall::Update(handle, handle));
            self.observe();
            handle
        }

        fn undraw(&mut self, handle: MarkerHandle) {
            self.live.remove(&handle);
            self.calls.push(SurfaceCall::Undraw(handle));
            self.observe();
        }

        fn move_camera(&mut self, target: Point<f64>, zoom: f64) {
            self.calls.push(SurfaceCall::MoveCamera(target, zoom));
        }

        fn begin_batch(&mut self) {
            self.in_batch = true;
            self.min_live_in_batch = None;
            self.calls.push(SurfaceCall::Begin);
        }

        fn commit_batch(&mut self) {
            self.in_batch = false;
            self.calls.push(SurfaceCall::Commit);
        }
    }
}
