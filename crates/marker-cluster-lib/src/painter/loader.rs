//! Image loading seam between the painter and the embedding application

use crate::{ClusterError, Result};
use std::path::{Component, Path, PathBuf};
use tiny_skia::Pixmap;

/// Source of decoded images for file paths and bundled assets.
///
/// Shared across the painting thread pool, so implementations must be `Send + Sync`.
pub trait ImageLoader: Send + Sync {
    /// Decode the image stored at a file path
    fn load_path(&self, path: &Path) -> Result<Pixmap>;

    /// Decode an image bundled with the application, looked up by name
    fn load_asset(&self, name: &str) -> Result<Pixmap>;
}

/// Loads PNG images from the filesystem, resolving assets relative to a root directory
#[derive(Debug, Clone)]
pub struct FsImageLoader {
    asset_root: PathBuf,
}

impl FsImageLoader {
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: asset_root.into(),
        }
    }

    fn decode(path: &Path) -> Result<Pixmap> {
        let bytes = std::fs::read(path).map_err(|e| ClusterError::IconLoad {
            origin: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Pixmap::decode_png(&bytes).map_err(|e| ClusterError::IconLoad {
            origin: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

impl Default for FsImageLoader {
    fn default() -> Self {
        Self::new("assets")
    }
}

impl ImageLoader for FsImageLoader {
    fn load_path(&self, path: &Path) -> Result<Pixmap> {
        Self::decode(path)
    }

    fn load_asset(&self, name: &str) -> Result<Pixmap> {
        let relative = Path::new(name);
        // Assets never escape the asset root
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(ClusterError::IconLoad {
                origin: name.to_string(),
                reason: "asset name must be a relative path inside the asset root".to_string(),
            });
        }
        Self::decode(&self.asset_root.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_icon_load_error() {
        let loader = FsImageLoader::new("/nonexistent-asset-root");
        let err = loader.load_path(Path::new("/nonexistent/avatar.png")).unwrap_err();
        assert!(matches!(err, ClusterError::IconLoad { .. }));
    }

    #[test]
    fn test_asset_names_cannot_escape_root() {
        let loader = FsImageLoader::default();
        assert!(loader.load_asset("../secret.png").is_err());
        assert!(loader.load_asset("/etc/passwd").is_err());
    }

    #[test]
    fn test_roundtrip_png_asset() {
        let dir = std::env::temp_dir()
            .join(format!("marker-cluster-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut pixmap = Pixmap::new(4, 3).unwrap();
        pixmap.fill(tiny_skia::Color::from_rgba8(10, 20, 30, 255));
        pixmap.save_png(dir.join("dot.png")).unwrap();

        let loader = FsImageLoader::new(&dir);
        let loaded = loader.load_asset("dot.png").unwrap();
        assert_eq!(loaded.width(), 4);
        assert_eq!(loaded.height(), 3);
        assert_eq!(loaded.data(), pixmap.data());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
