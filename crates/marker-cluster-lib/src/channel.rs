//! Channel boundary: flat marker descriptors, method calls and cross-thread marshaling
//!
//! The embedding application talks to the engine through versionless key-value payloads.
//! Unknown keys are ignored and missing optional keys take the [`MarkerVisual`] defaults.
//! Events from any thread are queued on a [`ClusterHandle`] and applied by the controller on
//! its owning thread.

use crate::{Anchor, ClusterError, ClusterItem, IconSource, MarkerHandle, MarkerVisual, Result};
use geo::Point;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use tokio::sync::mpsc;

pub const METHOD_ADD_OR_UPDATE: &str = "markers#addOrUpdate";
pub const METHOD_REMOVE: &str = "markers#remove";
pub const METHOD_MOVE_CAMERA: &str = "camera#move";
pub const METHOD_MARKER_TAP: &str = "marker#onTap";
pub const METHOD_CLUSTER_TAP: &str = "cluster#onTap";

/// Read-only view over one flat marker descriptor
#[derive(Debug, Clone, Copy)]
pub struct ItemDescriptor<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> ItemDescriptor<'a> {
    pub fn new(value: &'a Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(ClusterError::InvalidDescriptor(format!(
                "expected an object, got {other}"
            ))),
        }
    }

    /// Decode a descriptor into an item in one step
    pub fn parse(value: &Value) -> Result<ClusterItem> {
        ItemDescriptor::new(value)?.to_item()
    }

    pub fn marker_id(&self) -> Result<&'a str> {
        self.str("markerId")?
            .ok_or_else(|| ClusterError::InvalidDescriptor("missing markerId".to_string()))
    }

    /// `[lat, lng]` in degrees
    pub fn position(&self) -> Result<Point<f64>> {
        let value = self
            .fields
            .get("position")
            .ok_or_else(|| ClusterError::InvalidDescriptor("missing position".to_string()))?;
        parse_lat_lng(value)
    }

    pub fn to_item(&self) -> Result<ClusterItem> {
        let id = self.marker_id()?;
        let position = self.position()?;
        let defaults = MarkerVisual::default();

        let anchor = match self.fields.get("anchor") {
            None | Some(Value::Null) => defaults.anchor,
            Some(value) => {
                let [u, v] = number_pair(value, "anchor")?;
                Anchor::new(u as f32, v as f32)
            }
        };

        let visual = MarkerVisual {
            icon: self.icon_source()?,
            ratio: self.f32("ratio")?.unwrap_or(defaults.ratio),
            rotation: self.f32("rotation")?.unwrap_or(defaults.rotation),
            alpha: self.f32("alpha")?.unwrap_or(defaults.alpha),
            anchor,
            flat: self.bool("flat")?.unwrap_or(defaults.flat),
            visible: self.bool("visible")?.unwrap_or(defaults.visible),
            z_index: self.i32("zIndex")?.unwrap_or(defaults.z_index),
            draggable: self.bool("draggable")?.unwrap_or(defaults.draggable),
            consume_tap_events: self
                .bool("consumeTapEvents")?
                .unwrap_or(defaults.consume_tap_events),
            status: self.i32("status")?.unwrap_or(defaults.status),
            highlight: self.bool("highlight")?.unwrap_or(defaults.highlight),
        };

        ClusterItem::new(id, position).with_visual(visual).validated()
    }

    /// Base bitmap source inferred from the keys present
    pub fn icon_source(&self) -> Result<IconSource> {
        let label = match self.str("name")? {
            Some(name) => Some(name),
            None => self.str("text")?,
        };
        if let Some(asset) = self.str("asset")? {
            return Ok(IconSource::Asset(asset.to_string()));
        }
        Ok(match (self.str("path")?, label) {
            (Some(path), Some(name)) => IconSource::Avatar {
                path: PathBuf::from(path),
                name: name.to_string(),
            },
            (Some(path), None) => IconSource::Path(PathBuf::from(path)),
            (None, Some(text)) => IconSource::Text(text.to_string()),
            (None, None) => IconSource::Default,
        })
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        match self.fields.get(key) {
            Some(Value::Null) | None => None,
            Some(value) => Some(value),
        }
    }

    fn str(&self, key: &str) -> Result<Option<&'a str>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(type_error(key, "a string", other)),
        }
    }

    fn f32(&self, key: &str) -> Result<Option<f32>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_f64()
                .map(|v| Some(v as f32))
                .ok_or_else(|| type_error(key, "a number", value)),
        }
    }

    fn i32(&self, key: &str) -> Result<Option<i32>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Some)
                .ok_or_else(|| type_error(key, "a 32-bit integer", value)),
        }
    }

    fn bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(type_error(key, "a boolean", other)),
        }
    }
}

fn type_error(key: &str, expected: &str, found: &Value) -> ClusterError {
    ClusterError::InvalidDescriptor(format!("{key} must be {expected}, got {found}"))
}

fn number_pair(value: &Value, key: &str) -> Result<[f64; 2]> {
    match value.as_array().map(Vec::as_slice) {
        Some([a, b]) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => Ok([a, b]),
            _ => Err(type_error(key, "a pair of numbers", value)),
        },
        _ => Err(type_error(key, "a pair of numbers", value)),
    }
}

/// Decode a `[lat, lng]` pair into a position
pub fn parse_lat_lng(value: &Value) -> Result<Point<f64>> {
    let [lat, lng] = number_pair(value, "position")?;
    Ok(crate::utils::lat_lon(lat, lng))
}

/// Encode a position as `[lat, lng]`
pub fn lat_lng_value(position: &Point<f64>) -> Value {
    json!([position.y(), position.x()])
}

/// Outbound method call reporting a tap on a singleton
pub fn marker_tap_message(id: &str) -> (&'static str, Value) {
    (METHOD_MARKER_TAP, json!({ "markerId": id }))
}

/// Outbound method call reporting a tap on a cluster
pub fn cluster_tap_message(ids: &[String]) -> (&'static str, Value) {
    (METHOD_CLUSTER_TAP, json!({ "markerIds": ids }))
}

/// Everything that can be marshaled onto the controller's owning thread
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterEvent {
    AddOrUpdateMarkers(Vec<Value>),
    RemoveMarkers(Vec<String>),
    ZoomChanged(f64),
    CameraIdle { position: Point<f64>, zoom: f64 },
    /// Tap on a host screen object
    MarkerTapped(MarkerHandle),
    /// Tap on an item, by id
    ItemTapped(String),
    MoveCamera { position: Point<f64>, zoom: f64 },
    /// Run a pass now if anything is pending
    Flush,
}

impl ClusterEvent {
    /// Decode an inbound method call
    ///
    /// List payloads may be passed bare or wrapped in an object under `markers` / `markerIds`.
    pub fn from_method_call(method: &str, arguments: &Value) -> Result<Self> {
        match method {
            METHOD_ADD_OR_UPDATE => {
                let list = unwrap_list(arguments, "markers")?;
                Ok(ClusterEvent::AddOrUpdateMarkers(list.to_vec()))
            }
            METHOD_REMOVE => {
                let ids = unwrap_list(arguments, "markerIds")?
                    .iter()
                    .map(|id| match id {
                        Value::String(id) => Ok(id.clone()),
                        Value::Object(_) => ItemDescriptor::new(id)?
                            .marker_id()
                            .map(str::to_string),
                        other => Err(type_error("markerIds", "a list of strings", other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(ClusterEvent::RemoveMarkers(ids))
            }
            METHOD_MOVE_CAMERA => {
                let position = arguments
                    .get("position")
                    .ok_or_else(|| ClusterError::InvalidDescriptor("missing position".to_string()))
                    .and_then(parse_lat_lng)?;
                let zoom = arguments
                    .get("zoom")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| ClusterError::InvalidDescriptor("missing zoom".to_string()))?;
                Ok(ClusterEvent::MoveCamera { position, zoom })
            }
            other => Err(ClusterError::InvalidDescriptor(format!(
                "unknown method {other}"
            ))),
        }
    }
}

fn unwrap_list<'a>(arguments: &'a Value, key: &str) -> Result<&'a [Value]> {
    match arguments {
        Value::Array(list) => Ok(list),
        Value::Object(map) => match map.get(key) {
            Some(Value::Array(list)) => Ok(list),
            _ => Err(ClusterError::InvalidDescriptor(format!("missing {key} list"))),
        },
        other => Err(type_error(key, "a list", other)),
    }
}

/// Cloneable, thread-safe sender of events to one controller
#[derive(Debug, Clone)]
pub struct ClusterHandle {
    sender: mpsc::UnboundedSender<ClusterEvent>,
}

impl ClusterHandle {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<ClusterEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Queue an event; fails once the controller is gone
    pub fn send(&self, event: ClusterEvent) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|_| ClusterError::ChannelClosed)
    }

    /// Decode and queue an inbound method call
    pub fn method_call(&self, method: &str, arguments: &Value) -> Result<()> {
        self.send(ClusterEvent::from_method_call(method, arguments)?)
    }

    pub fn add_or_update(&self, descriptors: Vec<Value>) -> Result<()> {
        self.send(ClusterEvent::AddOrUpdateMarkers(descriptors))
    }

    pub fn remove(&self, ids: Vec<String>) -> Result<()> {
        self.send(ClusterEvent::RemoveMarkers(ids))
    }

    pub fn zoom_changed(&self, zoom: f64) -> Result<()> {
        self.send(ClusterEvent::ZoomChanged(zoom))
    }

    pub fn camera_idle(&self, position: Point<f64>, zoom: f64) -> Result<()> {
        self.send(ClusterEvent::CameraIdle { position, zoom })
    }

    pub fn marker_tapped(&self, handle: MarkerHandle) -> Result<()> {
        self.send(ClusterEvent::MarkerTapped(handle))
    }

    pub fn tap(&self, id: impl Into<String>) -> Result<()> {
        self.send(ClusterEvent::ItemTapped(id.into()))
    }

    pub fn move_camera(&self, position: Point<f64>, zoom: f64) -> Result<()> {
        self.send(ClusterEvent::MoveCamera { position, zoom })
    }

    pub fn flush(&self) -> Result<()> {
        self.send(ClusterEvent::Flush)
    }
}
