//! Marker items and their visual description
//!
//! A [`ClusterItem`] is one logical marker. Its [`MarkerVisual`] carries every field the host
//! surface needs to draw it, split between fields that change pixels (and therefore the icon
//! cache key) and render-time transforms like rotation and alpha.

use crate::{ClusterError, Result, utils};
use geo::Point;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Largest accepted [`MarkerVisual::ratio`]
pub const MAX_RATIO: f32 = 16.0;

/// Well-known status codes carried by markers
pub mod status {
    /// No status overlay
    pub const NONE: i32 = 0;
    /// Paused badge
    pub const PAUSED: i32 = 1;
    /// Connection lost badge
    pub const DISCONNECTED: i32 = 2;
    /// Left-the-group badge
    pub const LEFT: i32 = 3;
    /// Urgent (SOS) halo
    pub const URGENT: i32 = 5;
}

/// Status badge drawn at the top-right corner of a marker icon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusBadge {
    Paused,
    Disconnected,
    Left,
}

impl StatusBadge {
    /// Badge for a status code, if that code draws one
    pub fn from_status(code: i32) -> Option<Self> {
        match code {
            status::PAUSED => Some(Self::Paused),
            status::DISCONNECTED => Some(Self::Disconnected),
            status::LEFT => Some(Self::Left),
            _ => None,
        }
    }
}

/// Where the base bitmap of a marker comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IconSource {
    /// Image file on disk
    Path(PathBuf),
    /// Image bundled with the embedding application, looked up by name
    Asset(String),
    /// Text label rendered into a round avatar
    Text(String),
    /// Round photo avatar, falling back to a text avatar of `name` when the photo is missing
    Avatar { path: PathBuf, name: String },
    /// Default placeholder pin
    #[default]
    Default,
}

/// Normalized anchor point within the icon bounds
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Anchor {
    pub u: f32,
    pub v: f32,
}

impl Anchor {
    /// Anchor clamped to the icon bounds
    pub fn new(u: f32, v: f32) -> Self {
        Self {
            u: u.clamp(0.0, 1.0),
            v: v.clamp(0.0, 1.0),
        }
    }

    /// Icon center, used for cluster badges
    pub const CENTER: Anchor = Anchor { u: 0.5, v: 0.5 };
}

impl Default for Anchor {
    /// Bottom-center, the usual pin anchor
    fn default() -> Self {
        Self { u: 0.5, v: 1.0 }
    }
}

/// Visual description of a single marker
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MarkerVisual {
    /// Base bitmap source
    pub icon: IconSource,
    /// Uniform scale applied to the painted bitmap (default 1.0)
    pub ratio: f32,
    /// Rotation in degrees, applied by the host surface
    pub rotation: f32,
    /// Opacity in [0, 1], applied by the host surface
    pub alpha: f32,
    pub anchor: Anchor,
    /// Flat against the map (billboard) instead of screen-aligned
    pub flat: bool,
    pub visible: bool,
    pub z_index: i32,
    pub draggable: bool,
    /// Whether a tap on this marker is consumed instead of falling through to the map
    pub consume_tap_events: bool,
    /// Status code, see [`status`]
    pub status: i32,
    /// Draw a highlight halo around the icon
    pub highlight: bool,
}

impl Default for MarkerVisual {
    fn default() -> Self {
        Self {
            icon: IconSource::Default,
            ratio: 1.0,
            rotation: 0.0,
            alpha: 1.0,
            anchor: Anchor::default(),
            flat: false,
            visible: true,
            z_index: 0,
            draggable: false,
            consume_tap_events: false,
            status: status::NONE,
            highlight: false,
        }
    }
}

impl MarkerVisual {
    /// Visual with the given icon source and defaults for everything else
    pub fn with_icon(icon: IconSource) -> Self {
        Self {
            icon,
            ..Self::default()
        }
    }

    /// Whether the status code requests the urgent halo
    #[inline]
    pub fn is_urgent(&self) -> bool {
        self.status == status::URGENT
    }
}

/// One logical marker
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterItem {
    /// Unique among live items
    pub id: String,
    /// x = longitude, y = latitude, in degrees
    pub position: Point<f64>,
    pub visual: MarkerVisual,
}

impl ClusterItem {
    /// Create an item with a default visual
    pub fn new(id: impl Into<String>, position: Point<f64>) -> Self {
        Self {
            id: id.into(),
            position,
            visual: MarkerVisual::default(),
        }
    }

    /// Replace the visual
    pub fn with_visual(mut self, visual: MarkerVisual) -> Self {
        self.visual = visual;
        self
    }

    /// Check the invariants enforced at the controller boundary.
    ///
    /// Alpha and anchor are clamped into range; non-finite floats, empty ids, positions out
    /// of range and ratios outside `(0, MAX_RATIO]` are rejected.
    pub fn validated(mut self) -> Result<Self> {
        if self.id.is_empty() {
            return Err(self.invalid("empty id".to_string()));
        }
        if !utils::is_valid_position(&self.position) {
            let reason = format!(
                "position out of range: ({}, {})",
                self.position.y(),
                self.position.x()
            );
            return Err(self.invalid(reason));
        }
        let visual = &self.visual;
        let floats = [
            ("ratio", visual.ratio),
            ("rotation", visual.rotation),
            ("alpha", visual.alpha),
            ("anchor.u", visual.anchor.u),
            ("anchor.v", visual.anchor.v),
        ];
        if let Some((name, value)) = floats.into_iter().find(|(_, value)| !value.is_finite()) {
            return Err(self.invalid(format!("{name} must be finite, got {value}")));
        }
        if !(visual.ratio > 0.0 && visual.ratio <= MAX_RATIO) {
            let reason = format!("ratio must be in (0, {MAX_RATIO}], got {}", visual.ratio);
            return Err(self.invalid(reason));
        }

        self.visual.alpha = self.visual.alpha.clamp(0.0, 1.0);
        self.visual.anchor = Anchor::new(self.visual.anchor.u, self.visual.anchor.v);
        Ok(self)
    }

    fn invalid(&self, reason: String) -> ClusterError {
        ClusterError::InvalidItem {
            id: self.id.clone(),
            reason,
        }
    }
}
