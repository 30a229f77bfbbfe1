use clap::Parser;
use marker_cluster_lib::{Config, PainterConfig};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Marker Cluster - Replays marker channel scripts against the clustering engine
pub struct Settings {
    /// JSON script of channel calls and camera events; a generated demo runs when omitted
    #[clap(short, long, value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Number of markers in the generated demo
    #[clap(long, default_value = "500")]
    pub demo_markers: usize,

    /// Grid cell side in screen pixels
    #[clap(short, long, default_value = "100")]
    pub grid_size: u32,

    /// Width of a zoom bucket (1.0 = re-cluster on every integer zoom change)
    #[clap(long, default_value = "1.0")]
    pub zoom_step: f64,

    /// Zoom level before the first camera event
    #[clap(long, default_value = "0.0")]
    pub initial_zoom: f64,

    /// Display density (physical pixels per density-independent pixel)
    #[clap(short, long, default_value = "1.0")]
    pub density: f32,

    /// Maximum number of cached icons
    #[clap(long, default_value = "256")]
    pub cache_entries: usize,

    /// Maximum total size of cached icons in bytes
    #[clap(long, default_value = "4194304")]
    pub cache_bytes: usize,

    /// Directory bundled assets are resolved against
    #[clap(long, value_name = "DIR", default_value = "assets")]
    pub asset_root: PathBuf,

    /// Write every drawn bitmap as a PNG file into this directory
    #[clap(long, value_name = "DIR")]
    pub dump_icons: Option<PathBuf>,
}

impl Settings {
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Engine configuration described by these settings
    pub fn config(&self) -> Config {
        Config {
            grid_size: self.grid_size,
            zoom_step: self.zoom_step,
            initial_zoom: self.initial_zoom,
            painter: PainterConfig {
                density: self.density,
                max_entries: self.cache_entries,
                max_bytes: self.cache_bytes,
                ..PainterConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_defaults() {
        let settings = Settings::parse_from(["marker-cluster"]);
        assert_eq!(settings.config(), Config::default());
    }

    #[test]
    fn test_flags_reach_config() {
        let settings = Settings::parse_from([
            "marker-cluster",
            "--grid-size",
            "64",
            "--density",
            "2",
            "--cache-entries",
            "16",
        ]);
        let config = settings.config();
        assert_eq!(config.grid_size, 64);
        assert_eq!(config.painter.density, 2.0);
        assert_eq!(config.painter.max_entries, 16);
    }
}
