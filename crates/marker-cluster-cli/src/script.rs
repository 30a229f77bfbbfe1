//! Channel scripts: ordered channel calls and camera events replayed against a controller

use marker_cluster_lib::channel::{
    METHOD_ADD_OR_UPDATE, METHOD_MOVE_CAMERA, METHOD_REMOVE, cluster_tap_message,
    marker_tap_message,
};
use marker_cluster_lib::utils::lat_lon;
use marker_cluster_lib::{ClusterEvent, ClusterHandle, ClusterListener, MarkerHandle};
use serde::Deserialize;
use serde_json::{Value, json};

/// One script step
///
/// ```json
/// [
///   {"type": "call", "method": "markers#addOrUpdate", "arguments": [{"markerId": "a", "position": [48.85, 2.35]}]},
///   {"type": "zoom", "zoom": 12.0},
///   {"type": "cameraIdle", "position": [48.85, 2.35], "zoom": 12.5},
///   {"type": "tap", "markerId": "a"},
///   {"type": "flush"}
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Step {
    Call {
        method: String,
        #[serde(default)]
        arguments: Value,
    },
    Zoom {
        zoom: f64,
    },
    #[serde(rename_all = "camelCase")]
    CameraIdle {
        position: [f64; 2],
        zoom: f64,
    },
    #[serde(rename_all = "camelCase")]
    Tap {
        marker_id: String,
    },
    TapHandle {
        handle: u64,
    },
    Flush,
}

impl Step {
    pub fn into_event(self) -> marker_cluster_lib::Result<ClusterEvent> {
        Ok(match self {
            Step::Call { method, arguments } => {
                ClusterEvent::from_method_call(&method, &arguments)?
            }
            Step::Zoom { zoom } => ClusterEvent::ZoomChanged(zoom),
            Step::CameraIdle {
                position: [lat, lng],
                zoom,
            } => ClusterEvent::CameraIdle {
                position: lat_lon(lat, lng),
                zoom,
            },
            Step::Tap { marker_id } => ClusterEvent::ItemTapped(marker_id),
            Step::TapHandle { handle } => ClusterEvent::MarkerTapped(MarkerHandle(handle)),
            Step::Flush => ClusterEvent::Flush,
        })
    }
}

pub fn parse(source: &str) -> serde_json::Result<Vec<Step>> {
    serde_json::from_str(source)
}

/// Queue every step on `handle`, in order; undecodable steps are skipped
pub fn send_all(steps: Vec<Step>, handle: &ClusterHandle) -> marker_cluster_lib::Result<usize> {
    let mut sent = 0;
    for (index, step) in steps.into_iter().enumerate() {
        match step.into_event() {
            Ok(event) => {
                handle.send(event)?;
                sent += 1;
            }
            Err(e) => tracing::warn!("Skipping script step {}: {}", index, e),
        }
    }
    Ok(sent)
}

/// Mostly plain riders, plus one of each badge and the urgent halo
const DEMO_STATUSES: [i32; 7] = [0, 0, 0, 1, 2, 3, 5];

/// Riders spread around a city, zoomed from country level down to street level
pub fn demo(markers: usize) -> Vec<Step> {
    let descriptors: Vec<Value> = (0..markers)
        .map(|i| {
            let t = i as f64 / markers.max(1) as f64;
            let lat = 45.76 + (t * 811.0).sin() * 0.15;
            let lng = 4.84 + (t * 577.0).cos() * 0.2;
            let status = DEMO_STATUSES[i % DEMO_STATUSES.len()];
            json!({
                "markerId": format!("rider-{i}"),
                "position": [lat, lng],
                "name": format!("Rider {i}"),
                "status": status,
                "consumeTapEvents": true,
                "zIndex": (i % 3) as i64,
            })
        })
        .collect();

    let mut steps = vec![
        Step::Call {
            method: METHOD_MOVE_CAMERA.to_string(),
            arguments: json!({"position": [45.76, 4.84], "zoom": 6.0}),
        },
        Step::Zoom { zoom: 6.0 },
        Step::Call {
            method: METHOD_ADD_OR_UPDATE.to_string(),
            arguments: Value::Array(descriptors),
        },
    ];
    for zoom in 7..=16 {
        steps.push(Step::CameraIdle {
            position: [45.76, 4.84],
            zoom: zoom as f64,
        });
    }
    steps.push(Step::Tap {
        marker_id: "rider-0".to_string(),
    });
    let removed: Vec<Value> = (0..markers / 2)
        .map(|i| Value::String(format!("rider-{i}")))
        .collect();
    steps.push(Step::Call {
        method: METHOD_REMOVE.to_string(),
        arguments: Value::Array(removed),
    });
    steps.push(Step::Zoom { zoom: 10.0 });
    steps
}

/// Listener logging the outbound channel messages a host would receive
#[derive(Debug, Default)]
pub struct LoggingListener;

impl ClusterListener for LoggingListener {
    fn on_marker_tap(&mut self, id: &str) {
        let (method, arguments) = marker_tap_message(id);
        tracing::info!("-> {} {}", method, arguments);
    }

    fn on_cluster_tap(&mut self, ids: &[String]) {
        let (method, arguments) = cluster_tap_message(ids);
        tracing::info!("-> {} {}", method, arguments);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_steps() {
        let steps = parse(
            r#"[
                {"type": "call", "method": "markers#remove", "arguments": ["a"]},
                {"type": "zoom", "zoom": 3.5},
                {"type": "cameraIdle", "position": [1.0, 2.0], "zoom": 4.0},
                {"type": "tap", "markerId": "a"},
                {"type": "tapHandle", "handle": 7},
                {"type": "flush"}
            ]"#,
        )
        .unwrap();
        assert_eq!(steps.len(), 6);
        assert_eq!(steps[1], Step::Zoom { zoom: 3.5 });
        assert_eq!(
            steps[2].clone().into_event().unwrap(),
            ClusterEvent::CameraIdle {
                position: lat_lon(1.0, 2.0),
                zoom: 4.0
            }
        );
        assert_eq!(
            steps[4].clone().into_event().unwrap(),
            ClusterEvent::MarkerTapped(MarkerHandle(7))
        );
    }

    #[test]
    fn test_unknown_step_type_is_rejected() {
        assert!(parse(r#"[{"type": "explode"}]"#).is_err());
    }

    #[test]
    fn test_demo_decodes() {
        let steps = demo(20);
        let events: Vec<ClusterEvent> = steps
            .into_iter()
            .map(|step| step.into_event().unwrap())
            .collect();
        assert!(matches!(
            &events[2],
            ClusterEvent::AddOrUpdateMarkers(list) if list.len() == 20
        ));
    }
}
