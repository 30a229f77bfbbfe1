//! IconPainter - Deterministic marker and cluster bitmaps behind an LRU cache
//!
//! Every bitmap is a pure function of its [`IconCacheKey`] (plus the painter's fixed
//! configuration), so a cache hit is indistinguishable from a fresh paint. Rotation and alpha
//! are left to the host surface and never enter the key.
//!
//! Marker composition order is fixed: base bitmap, then the status badge at the top-right
//! corner, then the urgent (or highlight) halo.

mod glyphs;
mod loader;

pub use loader::{FsImageLoader, ImageLoader};

use crate::item::{IconSource, MarkerVisual, StatusBadge, status};
use crate::{ClusterError, Result};
use lru::LruCache;
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tiny_skia::{
    FillRule, FilterQuality, Paint, PathBuilder, Pattern, Pixmap, PixmapPaint, SpreadMode, Stroke,
    Transform,
};

/// Shared, immutable bitmap handed to the host surface
pub type Bitmap = Arc<Pixmap>;

/// Avatar diameter in density-independent pixels
const AVATAR_SIZE: f32 = 48.0;
/// White ring around avatars
const AVATAR_BORDER: f32 = 4.0;
/// Status badge diameter
const STATUS_BADGE_SIZE: f32 = 24.0;
/// Padding around an avatar when a status badge is composited
const STATUS_PADDING: f32 = 3.0;
/// Halo margin for urgent markers
const URGENT_MARGIN: f32 = 8.0;
/// Halo margin for highlighted markers
const HIGHLIGHT_MARGIN: f32 = 10.0;
/// Default pin diameter
const PIN_SIZE: f32 = 32.0;
/// Concentric rings used to fake a soft halo
const HALO_RINGS: u32 = 4;
/// Largest bitmap the painter allocates, in pixels
const MAX_BITMAP_PIXELS: u64 = 2048 * 2048;

/// Count thresholds shown on cluster badges, largest first
const CLUSTER_BUCKETS: [u32; 9] = [1000, 500, 200, 100, 50, 40, 30, 20, 10];

/// 8-bit straight-alpha color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Color with alpha given as a fraction in [0, 1]
    pub fn with_alpha(r: u8, g: u8, b: u8, alpha: f32) -> Self {
        Self::new(r, g, b, (alpha.clamp(0.0, 1.0) * 255.0).round() as u8)
    }

    fn paint(self) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color_rgba8(self.r, self.g, self.b, self.a);
        paint.anti_alias = true;
        paint
    }
}

/// Painter configuration, fixed for the painter's lifetime
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PainterConfig {
    /// Physical pixels per density-independent pixel
    pub density: f32,
    /// Maximum number of cached bitmaps
    pub max_entries: usize,
    /// Maximum total size of cached bitmaps in bytes
    pub max_bytes: usize,
    /// Cluster badge fill
    pub cluster_background: Rgba,
    /// Cluster badge text
    pub cluster_foreground: Rgba,
    /// Asset names of status badge images by status code; missing codes are drawn
    #[cfg_attr(feature = "serde", serde(default))]
    pub status_assets: BTreeMap<i32, String>,
}

impl Default for PainterConfig {
    fn default() -> Self {
        Self {
            density: 1.0,
            max_entries: 256,
            max_bytes: 4 * 1024 * 1024,
            cluster_background: Rgba::with_alpha(8, 27, 51, 0.6),
            cluster_foreground: Rgba::WHITE,
            status_assets: BTreeMap::new(),
        }
    }
}

impl PainterConfig {
    fn validate(&self) -> Result<()> {
        if !(self.density.is_finite() && self.density > 0.0) {
            return Err(ClusterError::InvalidConfig(format!(
                "density must be positive, got {}",
                self.density
            )));
        }
        if self.max_entries == 0 {
            return Err(ClusterError::InvalidConfig(
                "icon cache must hold at least one entry".to_string(),
            ));
        }
        Ok(())
    }
}

/// Every input that affects the pixels of a painted icon
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IconCacheKey {
    Marker {
        source: IconSource,
        /// Ratio in thousandths
        ratio_milli: u32,
        status: i32,
        highlight: bool,
    },
    Cluster {
        /// Displayed count bucket, see [`IconPainter::count_bucket`]
        bucket: u32,
        background: Rgba,
        foreground: Rgba,
    },
}

impl IconCacheKey {
    /// Key of a marker visual
    pub fn for_visual(visual: &MarkerVisual) -> Self {
        IconCacheKey::Marker {
            source: visual.icon.clone(),
            ratio_milli: (visual.ratio.max(0.0) * 1000.0).round() as u32,
            status: visual.status,
            highlight: visual.highlight,
        }
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PainterStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Uncached painting, shared read-only with the painting thread pool
struct IconFactory {
    config: PainterConfig,
    loader: Box<dyn ImageLoader>,
    placeholder: Bitmap,
}

impl IconFactory {
    /// Paint the bitmap for `key`, falling back to the placeholder on failure
    fn paint(&self, key: &IconCacheKey) -> Bitmap {
        match self.render(key) {
            Ok(pixmap) => Arc::new(pixmap),
            Err(e) => {
                tracing::warn!("Using placeholder icon: {}", e);
                self.placeholder.clone()
            }
        }
    }

    fn render(&self, key: &IconCacheKey) -> Result<Pixmap> {
        match key {
            IconCacheKey::Marker {
                source,
                ratio_milli,
                status: code,
                highlight,
            } => {
                let scale = self.config.density * (*ratio_milli as f32 / 1000.0);
                let mut pixmap = self.base(source, scale)?;
                if let Some(badge) = StatusBadge::from_status(*code) {
                    let badge = self.status_badge(badge, *code)?;
                    pixmap = with_status(&pixmap, &badge, self.config.density)?;
                }
                if *code == status::URGENT {
                    pixmap = with_halo(&pixmap, URGENT_MARGIN * scale, Rgba::new(230, 30, 30, 70))?;
                } else if *highlight {
                    pixmap =
                        with_halo(&pixmap, HIGHLIGHT_MARGIN * scale, Rgba::new(40, 200, 80, 60))?;
                }
                Ok(pixmap)
            }
            IconCacheKey::Cluster {
                bucket,
                background,
                foreground,
            } => cluster_badge(*bucket, *background, *foreground, self.config.density),
        }
    }

    fn base(&self, source: &IconSource, scale: f32) -> Result<Pixmap> {
        match source {
            IconSource::Path(path) => {
                let photo = self.loader.load_path(path)?;
                to_avatar(&photo, scale)
            }
            IconSource::Asset(name) => {
                let asset = self.loader.load_asset(name)?;
                scaled(&asset, scale)
            }
            IconSource::Text(text) => text_avatar(text, scale),
            IconSource::Avatar { path, name } => match self.loader.load_path(path) {
                Ok(photo) => to_avatar(&photo, scale),
                Err(e) => {
                    tracing::debug!("Avatar photo unavailable, drawing initials: {}", e);
                    text_avatar(name, scale)
                }
            },
            IconSource::Default => default_pin(scale),
        }
    }

    fn status_badge(&self, badge: StatusBadge, code: i32) -> Result<Pixmap> {
        let size = dp(STATUS_BADGE_SIZE, self.config.density);
        if let Some(name) = self.config.status_assets.get(&code) {
            match self.loader.load_asset(name) {
                Ok(asset) => {
                    let ratio = (size as f32 / asset.width() as f32)
                        .max(size as f32 / asset.height() as f32);
                    return scaled(&asset, ratio);
                }
                Err(e) => tracing::warn!("Status badge asset unavailable, drawing it: {}", e),
            }
        }
        drawn_status_badge(badge, size, self.config.density)
    }
}

/// Marker and cluster bitmaps with a bounded LRU cache
pub struct IconPainter {
    factory: IconFactory,
    cache: LruCache<IconCacheKey, Bitmap>,
    cached_bytes: usize,
    stats: PainterStats,
}

impl std::fmt::Debug for IconPainter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IconPainter")
            .field("config", &self.factory.config)
            .field("entries", &self.cache.len())
            .field("cached_bytes", &self.cached_bytes)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl IconPainter {
    pub fn new(config: PainterConfig, loader: Box<dyn ImageLoader>) -> Result<Self> {
        config.validate()?;
        let placeholder = Arc::new(default_pin(config.density)?);
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            factory: IconFactory {
                config,
                loader,
                placeholder,
            },
            cache: LruCache::new(capacity),
            cached_bytes: 0,
            stats: PainterStats::default(),
        })
    }

    pub fn config(&self) -> &PainterConfig {
        &self.factory.config
    }

    /// Displayed count bucket for a cluster of `count` items
    pub fn count_bucket(count: usize) -> u32 {
        CLUSTER_BUCKETS
            .iter()
            .copied()
            .find(|&bucket| count >= bucket as usize)
            .unwrap_or(count as u32)
    }

    /// Key of a cluster badge
    pub fn cluster_key(&self, count: usize) -> IconCacheKey {
        IconCacheKey::Cluster {
            bucket: Self::count_bucket(count),
            background: self.factory.config.cluster_background,
            foreground: self.factory.config.cluster_foreground,
        }
    }

    pub fn marker_icon(&mut self, visual: &MarkerVisual) -> Bitmap {
        self.icon(&IconCacheKey::for_visual(visual))
    }

    pub fn cluster_icon(&mut self, count: usize) -> Bitmap {
        let key = self.cluster_key(count);
        self.icon(&key)
    }

    /// Cached bitmap for `key`, painting it on a miss
    pub fn icon(&mut self, key: &IconCacheKey) -> Bitmap {
        if let Some(bitmap) = self.cache.get(key).cloned() {
            self.stats.hits += 1;
            return bitmap;
        }
        self.stats.misses += 1;
        let bitmap = self.factory.paint(key);
        self.insert(key.clone(), bitmap.clone());
        bitmap
    }

    /// Paint all uncached keys in parallel and insert them into the cache
    pub fn prefetch(&mut self, keys: impl IntoIterator<Item = IconCacheKey>) {
        #[cfg(feature = "profiling")]
        profiling::scope!("painter::prefetch");

        let mut seen = HashSet::new();
        let missing: Vec<IconCacheKey> = keys
            .into_iter()
            .filter(|key| !self.cache.contains(key) && seen.insert(key.clone()))
            .collect();
        if missing.is_empty() {
            return;
        }

        let factory = &self.factory;
        let painted: Vec<(IconCacheKey, Bitmap)> = missing
            .into_par_iter()
            .map(|key| {
                let bitmap = factory.paint(&key);
                (key, bitmap)
            })
            .collect();

        tracing::trace!("Prefetched {} icons", painted.len());
        for (key, bitmap) in painted {
            self.stats.misses += 1;
            self.insert(key, bitmap);
        }
    }

    /// Paint `key` without consulting or filling the cache
    pub fn paint_uncached(&self, key: &IconCacheKey) -> Bitmap {
        self.factory.paint(key)
    }

    fn insert(&mut self, key: IconCacheKey, bitmap: Bitmap) {
        let size = bitmap.data().len();
        if size > self.factory.config.max_bytes {
            tracing::debug!(
                "Not caching a {}x{} icon larger than the cache",
                bitmap.width(),
                bitmap.height()
            );
            return;
        }
        self.cached_bytes += size;
        if let Some((old_key, old)) = self.cache.push(key.clone(), bitmap) {
            self.cached_bytes = self.cached_bytes.saturating_sub(old.data().len());
            if old_key != key {
                self.stats.evictions += 1;
            }
        }
        while self.cached_bytes > self.factory.config.max_bytes {
            match self.cache.pop_lru() {
                Some((_, old)) => {
                    self.cached_bytes = self.cached_bytes.saturating_sub(old.data().len());
                    self.stats.evictions += 1;
                }
                None => break,
            }
        }
    }

    /// Number of cached bitmaps
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Total size of cached bitmaps in bytes
    pub fn cached_bytes(&self) -> usize {
        self.cached_bytes
    }

    pub fn stats(&self) -> PainterStats {
        self.stats
    }
}

/// Density-independent pixels to physical pixels, rounded up
#[inline]
fn dp(value: f32, scale: f32) -> u32 {
    (value * scale).ceil().max(1.0) as u32
}

fn new_pixmap(width: u32, height: u32) -> Result<Pixmap> {
    let too_large = |reason: String| ClusterError::IconLoad {
        origin: format!("{width}x{height} bitmap"),
        reason,
    };
    if width as u64 * height as u64 > MAX_BITMAP_PIXELS {
        return Err(too_large(format!("exceeds {MAX_BITMAP_PIXELS} pixels")));
    }
    Pixmap::new(width, height).ok_or_else(|| too_large("cannot allocate".to_string()))
}

fn fill_circle(pixmap: &mut Pixmap, cx: f32, cy: f32, radius: f32, paint: &Paint) {
    if let Some(path) = PathBuilder::from_circle(cx, cy, radius) {
        pixmap.fill_path(&path, paint, FillRule::Winding, Transform::identity(), None);
    }
}

fn stroke_circle(pixmap: &mut Pixmap, cx: f32, cy: f32, radius: f32, width: f32, color: Rgba) {
    if let Some(path) = PathBuilder::from_circle(cx, cy, radius) {
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &color.paint(), &stroke, Transform::identity(), None);
    }
}

/// Copy `source` into a new bitmap scaled uniformly by `ratio`
fn scaled(source: &Pixmap, ratio: f32) -> Result<Pixmap> {
    let width = (source.width() as f32 * ratio).ceil().max(1.0) as u32;
    let height = (source.height() as f32 * ratio).ceil().max(1.0) as u32;
    let mut output = new_pixmap(width, height)?;
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    output.draw_pixmap(
        0,
        0,
        source.as_ref(),
        &paint,
        Transform::from_scale(ratio, ratio),
        None,
    );
    Ok(output)
}

/// Round photo avatar with a white ring; the photo is scaled to cover the circle
fn to_avatar(photo: &Pixmap, scale: f32) -> Result<Pixmap> {
    let size = dp(AVATAR_SIZE, scale) as f32;
    let border = dp(AVATAR_BORDER, scale) as f32;
    let total = size + border * 2.0;
    let mut output = new_pixmap(total as u32, total as u32)?;

    let ratio = (size / photo.width() as f32).max(size / photo.height() as f32);
    let offset_x = border + (size - photo.width() as f32 * ratio) / 2.0;
    let offset_y = border + (size - photo.height() as f32 * ratio) / 2.0;
    let paint = Paint {
        shader: Pattern::new(
            photo.as_ref(),
            SpreadMode::Pad,
            FilterQuality::Bilinear,
            1.0,
            Transform::from_row(ratio, 0.0, 0.0, ratio, offset_x, offset_y),
        ),
        anti_alias: true,
        ..Paint::default()
    };

    let center = total / 2.0;
    fill_circle(&mut output, center, center, size / 2.0, &paint);
    stroke_circle(&mut output, center, center, size / 2.0, border, Rgba::WHITE);
    Ok(output)
}

/// Gray round avatar showing the label's initials
fn text_avatar(label: &str, scale: f32) -> Result<Pixmap> {
    let size = dp(AVATAR_SIZE, scale) as f32;
    let border = dp(AVATAR_BORDER, scale) as f32;
    let total = size + border * 2.0;
    let mut output = new_pixmap(total as u32, total as u32)?;

    let center = total / 2.0;
    fill_circle(
        &mut output,
        center,
        center,
        size / 2.0,
        &Rgba::new(0x95, 0x95, 0x95, 255).paint(),
    );
    stroke_circle(&mut output, center, center, size / 2.0, border, Rgba::WHITE);

    let cell = (18.0 * scale / 9.0).max(1.0).round();
    glyphs::draw_text(
        &mut output,
        &glyphs::initials(label),
        center,
        center,
        cell,
        &Rgba::WHITE.paint(),
    );
    Ok(output)
}

/// Plain pin drawn for markers without an icon and for failed loads
fn default_pin(scale: f32) -> Result<Pixmap> {
    let size = dp(PIN_SIZE, scale);
    let mut output = new_pixmap(size, size)?;
    let radius = size as f32 / 2.0;
    let ring = (3.0 * scale).max(1.0);
    fill_circle(
        &mut output,
        radius,
        radius,
        radius - ring / 2.0,
        &Rgba::new(234, 67, 53, 255).paint(),
    );
    stroke_circle(&mut output, radius, radius, radius - ring / 2.0, ring, Rgba::WHITE);
    fill_circle(&mut output, radius, radius, radius / 4.0, &Rgba::WHITE.paint());
    Ok(output)
}

fn drawn_status_badge(badge: StatusBadge, size: u32, density: f32) -> Result<Pixmap> {
    let color = match badge {
        StatusBadge::Paused => Rgba::new(255, 176, 32, 255),
        StatusBadge::Disconnected => Rgba::new(150, 150, 150, 255),
        StatusBadge::Left => Rgba::new(230, 70, 60, 255),
    };
    let mut output = new_pixmap(size, size)?;
    let radius = size as f32 / 2.0;
    let ring = (2.0 * density).max(1.0);
    fill_circle(&mut output, radius, radius, radius - ring / 2.0, &color.paint());
    stroke_circle(&mut output, radius, radius, radius - ring / 2.0, ring, Rgba::WHITE);
    Ok(output)
}

/// Pad `base` and composite `badge` at the top-right corner
fn with_status(base: &Pixmap, badge: &Pixmap, density: f32) -> Result<Pixmap> {
    let padding = dp(STATUS_PADDING, density);
    let width = base.width() + padding * 2;
    let height = base.height() + padding * 2;
    let mut output = new_pixmap(width, height)?;

    let paint = PixmapPaint::default();
    output.draw_pixmap(
        padding as i32,
        padding as i32,
        base.as_ref(),
        &paint,
        Transform::identity(),
        None,
    );
    let badge_x = width as i32 - badge.width() as i32 - padding as i32;
    output.draw_pixmap(badge_x, 0, badge.as_ref(), &paint, Transform::identity(), None);
    Ok(output)
}

/// Surround `base` with a soft colored halo of the given margin
fn with_halo(base: &Pixmap, margin: f32, color: Rgba) -> Result<Pixmap> {
    let margin = margin.ceil().max(1.0) as u32;
    let width = base.width() + margin * 2;
    let height = base.height() + margin * 2;
    let mut output = new_pixmap(width, height)?;

    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let inner = base.width().min(base.height()) as f32 / 2.0;
    let paint = color.paint();
    for ring in 0..HALO_RINGS {
        let radius = inner + margin as f32 * (HALO_RINGS - ring) as f32 / HALO_RINGS as f32;
        fill_circle(&mut output, cx, cy, radius, &paint);
    }

    output.draw_pixmap(
        margin as i32,
        margin as i32,
        base.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
    Ok(output)
}

/// Badge diameter in density-independent pixels for a count bucket
fn cluster_diameter(bucket: u32) -> f32 {
    match bucket {
        1000.. => 80.0,
        500.. => 72.0,
        100.. => 64.0,
        50.. => 56.0,
        _ => 48.0,
    }
}

fn cluster_badge(bucket: u32, background: Rgba, foreground: Rgba, density: f32) -> Result<Pixmap> {
    let size = dp(cluster_diameter(bucket), density);
    let mut output = new_pixmap(size, size)?;
    let center = size as f32 / 2.0;
    fill_circle(&mut output, center, center, center, &background.paint());

    let label = if bucket >= 10 {
        format!("{bucket}+")
    } else {
        bucket.to_string()
    };
    let font_size = if bucket >= 100 { 18.0 } else { 16.0 };
    let cell = (font_size * density / 9.0).max(1.0).round();
    glyphs::draw_text(&mut output, &label, center, center, cell, &foreground.paint());
    Ok(output)
}
