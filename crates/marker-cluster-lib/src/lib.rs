//! Marker Cluster Library - Clustering Engine for Large Map Marker Sets
//!
//! This library keeps a large, frequently updated set of geo-positioned markers and groups
//! nearby markers into clusters as the zoom level changes. Successive clustering results are
//! reconciled into a minimal set of draw operations against a host map surface, and every
//! bitmap is produced by a deterministic, cached icon painter.
//!
//! # Architecture
//!
//! - **[`ClusterController`]**: Public lifecycle API (add/update/remove, taps, camera moves)
//! - **[`ClusterManager`]**: Authoritative item set, zoom tracking and partition diffing
//! - **[`GridClusterAlgorithm`]**: Web-Mercator grid bucketing of items per zoom level
//! - **[`Renderer`]**: Applies a [`Reconciliation`] to a [`MapSurface`] in one batch
//! - **[`IconPainter`]**: Pure visual-to-bitmap mapping behind an LRU cache
//! - **[`ClusterHandle`]**: Cross-thread event queue feeding the owning controller
//!
//! # Performance Characteristics
//!
//! - **Partition**: O(N) per pass (single bucketing sweep)
//! - **Reconciliation**: O(N log N) over identities (ordered diff)
//! - **Icons**: painted once per distinct [`IconCacheKey`], misses painted in parallel

mod algorithm;
pub mod channel;
mod controller;
mod item;
mod manager;
mod painter;
mod renderer;
pub mod utils;

// Public API exports
pub use algorithm::{Cluster, GridClusterAlgorithm, Identity, Partition, RenderNode};
pub use channel::{ClusterEvent, ClusterHandle, ItemDescriptor};
pub use controller::{BatchReport, ClusterController, ClusterListener, Config};
pub use item::{Anchor, ClusterItem, IconSource, MAX_RATIO, MarkerVisual, StatusBadge, status};
pub use manager::{ClusterManager, Reconciliation, ZoomThreshold};
pub use painter::{
    Bitmap, FsImageLoader, IconCacheKey, IconPainter, ImageLoader, PainterConfig, PainterStats,
    Rgba,
};
pub use renderer::{ApplyStats, DrawRequest, MapSurface, MarkerHandle, RenderedEntry, Renderer};

/// Error types for the clustering engine
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("Invalid item '{id}': {reason}")]
    InvalidItem { id: String, reason: String },

    #[error("Icon load failure for {origin}: {reason}")]
    IconLoad { origin: String, reason: String },

    #[error("Invalid marker descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cluster event channel closed")]
    ChannelClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClusterError>;
