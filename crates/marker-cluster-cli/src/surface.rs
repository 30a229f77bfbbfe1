//! Headless host surface that logs draw calls and optionally dumps bitmaps

use geo::Point;
use marker_cluster_lib::channel::lat_lng_value;
use marker_cluster_lib::{Bitmap, DrawRequest, MapSurface, MarkerHandle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy)]
pub struct SurfaceStats {
    pub draws: usize,
    pub updates: usize,
    pub undraws: usize,
    pub batches: usize,
    pub camera_moves: usize,
}

/// Surface keeping screen objects in memory and logging every call
pub struct LoggingSurface {
    next: u64,
    live: HashMap<MarkerHandle, DrawRequest>,
    dump_dir: Option<PathBuf>,
    /// Bitmaps already written, by allocation address; held so addresses are never reused
    dumped: HashMap<usize, Bitmap>,
    camera: Option<(Point<f64>, f64)>,
    stats: SurfaceStats,
}

impl LoggingSurface {
    pub fn new(dump_dir: Option<PathBuf>) -> std::io::Result<Self> {
        if let Some(dir) = &dump_dir {
            std::fs::create_dir_all(dir)?;
        }
        Ok(Self {
            next: 0,
            live: HashMap::new(),
            dump_dir,
            dumped: HashMap::new(),
            camera: None,
            stats: SurfaceStats::default(),
        })
    }

    pub fn live(&self) -> usize {
        self.live.len()
    }

    pub fn camera(&self) -> Option<(Point<f64>, f64)> {
        self.camera
    }

    pub fn stats(&self) -> SurfaceStats {
        self.stats
    }

    fn dump(&mut self, bitmap: &Bitmap) {
        let Some(dir) = &self.dump_dir else {
            return;
        };
        let address = Arc::as_ptr(bitmap) as usize;
        if self.dumped.contains_key(&address) {
            return;
        }
        let path = dir.join(format!(
            "icon-{:03}-{}x{}.png",
            self.dumped.len(),
            bitmap.width(),
            bitmap.height()
        ));
        match bitmap.save_png(&path) {
            Ok(()) => {
                tracing::debug!("Wrote {}", path.display());
                self.dumped.insert(address, bitmap.clone());
            }
            Err(e) => tracing::warn!("Failed to write {}: {}", path.display(), e),
        }
    }
}

impl MapSurface for LoggingSurface {
    fn draw(&mut self, request: &DrawRequest) -> MarkerHandle {
        self.next += 1;
        let handle = MarkerHandle(self.next);
        tracing::trace!(
            handle = handle.0,
            lat = request.position.y(),
            lng = request.position.x(),
            z = request.z_index,
            "draw {}x{}",
            request.bitmap.width(),
            request.bitmap.height()
        );
        self.dump(&request.bitmap);
        self.live.insert(handle, request.clone());
        self.stats.draws += 1;
        handle
    }

    fn update(&mut self, handle: MarkerHandle, request: &DrawRequest) -> MarkerHandle {
        tracing::trace!(handle = handle.0, "update");
        self.dump(&request.bitmap);
        self.live.insert(handle, request.clone());
        self.stats.updates += 1;
        handle
    }

    fn undraw(&mut self, handle: MarkerHandle) {
        tracing::trace!(handle = handle.0, "undraw");
        if self.live.remove(&handle).is_none() {
            tracing::warn!(handle = handle.0, "Undraw of an unknown screen object");
        }
        self.stats.undraws += 1;
    }

    fn move_camera(&mut self, target: Point<f64>, zoom: f64) {
        tracing::info!("Camera moved to {} at zoom {zoom}", lat_lng_value(&target));
        self.camera = Some((target, zoom));
        self.stats.camera_moves += 1;
    }

    fn begin_batch(&mut self) {
        self.stats.batches += 1;
    }

    fn commit_batch(&mut self) {
        tracing::trace!(live = self.live.len(), "commit");
    }
}
