//! Marker Cluster - Headless driver for the clustering engine
//!
//! Replays a script of channel calls and camera events through a [`ClusterHandle`] from a
//! producer task, while the controller applies them on the main task against a logging surface.
//!
//! [`ClusterHandle`]: marker_cluster_lib::ClusterHandle

mod logging;
mod script;
mod settings;
mod surface;

use marker_cluster_lib::channel::lat_lng_value;
use marker_cluster_lib::{ClusterController, ClusterError, FsImageLoader};
use settings::Settings;
use surface::LoggingSurface;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Failed to read script {path}: {source}")]
    Script {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid script: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("Event producer task failed: {0}")]
    Producer(#[from] tokio::task::JoinError),
}

async fn run(settings: Settings) -> Result<(), CliError> {
    let steps = match &settings.script {
        Some(path) => {
            let source = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| CliError::Script {
                    path: path.display().to_string(),
                    source,
                })?;
            script::parse(&source)?
        }
        None => {
            tracing::info!(
                "No script given, running a demo with {} markers",
                settings.demo_markers
            );
            script::demo(settings.demo_markers)
        }
    };

    let surface = LoggingSurface::new(settings.dump_icons.clone()).map_err(ClusterError::from)?;
    let (mut controller, handle) = ClusterController::new(
        settings.config(),
        surface,
        Box::new(FsImageLoader::new(&settings.asset_root)),
        Box::new(script::LoggingListener),
    )?;

    let producer = tokio::spawn(async move {
        let sent = script::send_all(steps, &handle);
        // Dropping the handle here closes the queue once the controller has drained it
        drop(handle);
        sent
    });

    controller.run_until_closed().await;
    let sent = producer.await??;

    let stats = controller.surface().stats();
    let painter = controller.painter_stats();
    tracing::info!(
        events = sent,
        items = controller.len(),
        rendered = controller.rendered_len(),
        draws = stats.draws,
        updates = stats.updates,
        undraws = stats.undraws,
        batches = stats.batches,
        "Replay finished"
    );
    tracing::info!(
        hits = painter.hits,
        misses = painter.misses,
        evictions = painter.evictions,
        cached = controller.painter().len(),
        cached_bytes = controller.painter().cached_bytes(),
        "Icon cache"
    );
    if let Some((position, zoom)) = controller.surface().camera() {
        tracing::info!("Final camera {} at zoom {zoom}", lat_lng_value(&position));
    }
    Ok(())
}

fn main() {
    logging::setup_logging();
    let settings = Settings::from_cli();

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start the async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run(settings)) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
