//! Performance benchmarks for marker-cluster-lib
//!
//! Run with: cargo bench --package marker-cluster-lib

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use geo::Point;
use marker_cluster_lib::utils::lat_lon;
use marker_cluster_lib::{
    ClusterController, ClusterItem, ClusterManager, Config, DrawRequest, FsImageLoader,
    GridClusterAlgorithm, MapSurface, MarkerHandle, ZoomThreshold,
};

/// Surface that only hands out handles
#[derive(Default)]
struct NullSurface {
    next: u64,
}

impl MapSurface for NullSurface {
    fn draw(&mut self, _request: &DrawRequest) -> MarkerHandle {
        self.next += 1;
        MarkerHandle(self.next)
    }

    fn update(&mut self, handle: MarkerHandle, _request: &DrawRequest) -> MarkerHandle {
        handle
    }

    fn undraw(&mut self, _handle: MarkerHandle) {}

    fn move_camera(&mut self, _target: Point<f64>, _zoom: f64) {}
}

/// Markers scattered over a metropolitan-sized area around a base position
fn generate_items(count: usize, base_lat: f64, base_lon: f64) -> Vec<ClusterItem> {
    (0..count)
        .map(|i| {
            let t = i as f64 / count as f64;
            let lat = base_lat + (t * 977.0).sin() * 0.2;
            let lon = base_lon + (t * 613.0).cos() * 0.3;
            ClusterItem::new(format!("m{i}"), lat_lon(lat, lon))
        })
        .collect()
}

// ============================================================================
// Core Benchmarks - Key performance indicators
// ============================================================================

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    let algorithm = GridClusterAlgorithm::new(100).unwrap();

    for count in [1_000, 10_000, 100_000] {
        let items = generate_items(count, 51.5, -0.1);
        group.throughput(Throughput::Elements(count as u64));
        for zoom in [4.0, 10.0, 16.0] {
            group.bench_with_input(
                BenchmarkId::new(format!("z{zoom}"), count),
                &items,
                |b, items| b.iter(|| algorithm.cluster(items, zoom)),
            );
        }
    }

    group.finish();
}

fn bench_reconciliation(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciliation");
    group.sample_size(20);

    let items = generate_items(20_000, 51.5, -0.1);
    group.throughput(Throughput::Elements(items.len() as u64));

    // Alternate between two zoom buckets so every iteration diffs a real change
    group.bench_function("zoom_toggle_20k", |b| {
        let mut manager = ClusterManager::new(
            GridClusterAlgorithm::new(100).unwrap(),
            ZoomThreshold::default(),
            10.0,
        );
        for item in items.iter().cloned() {
            manager.insert_or_update(item);
        }
        manager.flush();
        let mut zoom_in = true;
        b.iter(|| {
            let zoom = if zoom_in { 11.0 } else { 10.0 };
            zoom_in = !zoom_in;
            manager.on_zoom_changed(zoom)
        });
    });

    // Move one percent of the items, then flush
    group.bench_function("move_1pct_20k", |b| {
        let mut manager = ClusterManager::new(
            GridClusterAlgorithm::new(100).unwrap(),
            ZoomThreshold::default(),
            12.0,
        );
        for item in items.iter().cloned() {
            manager.insert_or_update(item);
        }
        manager.flush();
        let mut offset = 0.0;
        b.iter(|| {
            offset += 0.0001;
            for item in items.iter().step_by(100) {
                let mut moved = item.clone();
                moved.position = lat_lon(item.position.y() + offset, item.position.x());
                manager.insert_or_update(moved);
            }
            manager.flush()
        });
    });

    group.finish();
}

fn bench_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("controller");
    group.sample_size(10);

    let items = generate_items(10_000, 51.5, -0.1);
    group.throughput(Throughput::Elements(items.len() as u64));
    group.bench_function("zoom_sweep_10k", |b| {
        let (mut controller, _handle) = ClusterController::new(
            Config::default(),
            NullSurface::default(),
            Box::new(FsImageLoader::default()),
            Box::new(()),
        )
        .unwrap();
        controller.add_or_update(items.clone());
        b.iter(|| {
            for zoom in 4..=16 {
                controller.on_zoom_changed(zoom as f64);
            }
        });
    });

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(benches, bench_partition, bench_reconciliation, bench_end_to_end);

criterion_main!(benches);
