//! End-to-end behavior of the clustering engine through its public API

use geo::Point;
use marker_cluster_lib::utils::lat_lon;
use marker_cluster_lib::{
    ClusterController, ClusterItem, ClusterListener, Config, DrawRequest, FsImageLoader,
    GridClusterAlgorithm, IconCacheKey, IconPainter, IconSource, MapSurface, MarkerHandle,
    MarkerVisual, PainterConfig, RenderNode, status,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MapDouble {
    next: u64,
    live: HashMap<MarkerHandle, DrawRequest>,
    camera: Option<(Point<f64>, f64)>,
}

impl MapSurface for MapDouble {
    fn draw(&mut self, request: &DrawRequest) -> MarkerHandle {
        self.next += 1;
        self.live.insert(MarkerHandle(self.next), request.clone());
        MarkerHandle(self.next)
    }

    fn undraw(&mut self, handle: MarkerHandle) {
        assert!(self.live.remove(&handle).is_some(), "undraw of unknown handle");
    }

    fn move_camera(&mut self, target: Point<f64>, zoom: f64) {
        self.camera = Some((target, zoom));
    }
}

#[derive(Clone, Default)]
struct Taps(Arc<Mutex<Vec<Vec<String>>>>);

impl ClusterListener for Taps {
    fn on_marker_tap(&mut self, id: &str) {
        self.0.lock().unwrap().push(vec![id.to_string()]);
    }

    fn on_cluster_tap(&mut self, ids: &[String]) {
        self.0.lock().unwrap().push(ids.to_vec());
    }
}

fn controller(zoom: f64) -> ClusterController<MapDouble> {
    let config = Config {
        initial_zoom: zoom,
        ..Config::default()
    };
    ClusterController::new(
        config,
        MapDouble::default(),
        Box::new(FsImageLoader::default()),
        Box::new(()),
    )
    .unwrap()
    .0
}

#[test]
fn test_nearby_items_cluster_and_far_item_stays_alone() {
    // Cell boundaries at zoom 12 sit on multiples of ~0.0879 degrees of longitude
    let cells = 256.0 * 2f64.powi(12) / 100.0;
    let lon = ((cells / 2.0).floor() + 0.5) / cells * 360.0 - 180.0;

    let mut controller = controller(12.0);
    controller.add_or_update(vec![
        ClusterItem::new("a", lat_lon(0.0, lon)),
        ClusterItem::new("b", lat_lon(0.0003, lon)),
        ClusterItem::new("c", lat_lon(0.0, lon + 0.0003)),
        ClusterItem::new("far", lat_lon(0.0, lon + 0.09)),
    ]);
    controller.flush();

    assert_eq!(controller.rendered_len(), 2);
    let bitmaps: Vec<u32> = controller
        .surface()
        .live
        .values()
        .map(|request| request.bitmap.width())
        .collect();
    // One 48px cluster badge and one default pin
    assert!(bitmaps.contains(&48));
}

#[test]
fn test_zooming_in_never_merges() {
    let items: Vec<ClusterItem> = (0..400)
        .map(|i| {
            let position = lat_lon((i / 20) as f64 * 0.02, (i % 20) as f64 * 0.02);
            ClusterItem::new(format!("p{i}"), position)
        })
        .collect();
    let algorithm = GridClusterAlgorithm::new(100).unwrap();

    let mut last_clustered = usize::MAX;
    let mut last_nodes = 0;
    for zoom in 0..=20 {
        let partition = algorithm.cluster(&items, zoom as f64);
        assert!(partition.clustered_item_count() <= last_clustered);
        assert!(partition.nodes.len() >= last_nodes);
        last_clustered = partition.clustered_item_count();
        last_nodes = partition.nodes.len();
    }
}

#[test]
fn test_every_item_is_in_exactly_one_node() {
    let items: Vec<ClusterItem> = (0..250)
        .map(|i| {
            let t = i as f64;
            let position = lat_lon((t * 1.7).sin() * 60.0, (t * 2.3).cos() * 170.0);
            ClusterItem::new(format!("m{i}"), position)
        })
        .collect();
    let algorithm = GridClusterAlgorithm::new(80).unwrap();
    for zoom in [0.0, 2.0, 5.0, 9.0] {
        let partition = algorithm.cluster(&items, zoom);
        let mut seen: Vec<String> = partition
            .nodes
            .iter()
            .flat_map(RenderNode::member_ids)
            .collect();
        seen.sort();
        let mut expected: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }
}

#[test]
fn test_existence_round_trip() {
    let mut controller = controller(10.0);
    controller.add_or_update(vec![ClusterItem::new("a", lat_lon(1.0, 1.0))]);
    assert!(controller.exists("a"));
    controller.remove(["a"]);
    assert!(!controller.exists("a"));
}

#[test]
fn test_add_and_remove_hundred_leaves_nothing_drawn() {
    let mut controller = controller(14.0);
    let descriptors: Vec<_> = (0..100)
        .map(|i| {
            json!({
                "markerId": format!("rider-{i}"),
                "position": [45.0 + (i % 10) as f64 * 0.001, 6.0 + (i / 10) as f64 * 0.001],
                "text": format!("Rider {i}"),
                "status": i % 6,
            })
        })
        .collect();
    let report = controller.add_or_update_descriptors(&descriptors);
    assert_eq!(report.inserted, 100);
    controller.flush();
    assert!(controller.rendered_len() > 0);

    let ids: Vec<String> = (0..100).map(|i| format!("rider-{i}")).collect();
    controller.remove(&ids);
    controller.flush();
    assert_eq!(controller.len(), 0);
    assert_eq!(controller.rendered_len(), 0);
    assert!(controller.surface().live.is_empty());
    let painter = controller.painter();
    assert!(painter.len() <= painter.config().max_entries);
    assert!(painter.cached_bytes() <= painter.config().max_bytes);
}

#[test]
fn test_equal_keys_paint_identical_bitmaps() {
    let painter = || {
        IconPainter::new(PainterConfig::default(), Box::new(FsImageLoader::default())).unwrap()
    };
    let mut a = painter();
    let mut b = painter();
    let mut visual = MarkerVisual::with_icon(IconSource::Text("Marie Curie".to_string()));
    visual.status = status::URGENT;
    let key = IconCacheKey::for_visual(&visual);
    assert_eq!(a.icon(&key).data(), b.icon(&key).data());
    assert_eq!(a.icon(&key).data(), b.paint_uncached(&key).data());
}

#[test]
fn test_status_only_update_redraws_one_marker() {
    let mut controller = controller(15.0);
    controller.add_or_update(vec![
        ClusterItem::new("a", lat_lon(10.0, 10.0)),
        ClusterItem::new("b", lat_lon(20.0, 20.0)),
    ]);
    controller.flush();
    let before = controller.surface().live.clone();

    let mut changed = ClusterItem::new("a", lat_lon(10.0, 10.0));
    changed.visual.status = status::LEFT;
    let key_before = IconCacheKey::for_visual(&MarkerVisual::default());
    assert_ne!(IconCacheKey::for_visual(&changed.visual), key_before);
    controller.add_or_update(vec![changed]);
    let stats = controller.flush().unwrap();
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.drawn, 0);
    assert_eq!(stats.undrawn, 0);

    // The default update path draws the replacement and discards the old object
    assert_eq!(controller.surface().live.len(), before.len());
}

#[test]
fn test_taps_reach_the_listener() {
    let taps = Taps::default();
    let (mut controller, _handle) = ClusterController::new(
        Config {
            initial_zoom: 2.0,
            ..Config::default()
        },
        MapDouble::default(),
        Box::new(FsImageLoader::default()),
        Box::new(taps.clone()),
    )
    .unwrap();
    controller.add_or_update(vec![
        ClusterItem::new("a", lat_lon(0.0, 0.0)),
        ClusterItem::new("b", lat_lon(0.1, 0.1)),
        ClusterItem::new("c", lat_lon(-60.0, -120.0)),
    ]);
    controller.flush();

    controller.on_tap("b");
    controller.on_tap("c");
    assert_eq!(
        *taps.0.lock().unwrap(),
        vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string()]
        ]
    );
}

#[test]
fn test_camera_moves_do_not_recluster() {
    let mut controller = controller(5.0);
    controller.add_or_update(vec![ClusterItem::new("a", lat_lon(0.0, 0.0))]);
    controller.flush();
    controller.move_camera(lat_lon(48.0, 2.0), 12.0);
    assert_eq!(controller.surface().camera, Some((lat_lon(48.0, 2.0), 12.0)));
    assert_eq!(controller.zoom(), 5.0);
    assert!(controller.flush().is_none());
}
