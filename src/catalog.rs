//! Asset directory listing
//!
//! Lets a diagnostics view offer every loadable scene under an assets root.

use crate::error::{AssetError, Result};
use crate::loader::ModelFormat;
use crate::texture::is_texture_file;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Models and textures found under a directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetCatalog {
    pub root: PathBuf,
    /// Files with a supported mesh extension, in walk order
    pub models: Vec<PathBuf>,
    /// Files with a supported image extension, in walk order
    pub textures: Vec<PathBuf>,
}

impl AssetCatalog {
    /// Walk `root` recursively, each directory sorted by file name
    ///
    /// A missing or non-directory root is an error; unreadable entries below
    /// it are skipped with a warning.
    pub fn scan(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let mut catalog = Self {
            root: root.to_path_buf(),
            ..Default::default()
        };

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(AssetError::io(root, io::Error::from(e))),
                Err(e) => {
                    log::warn!("Skipping entry under {}: {e}", root.display());
                    continue;
                }
            };
            if entry.depth() == 0 && !entry.file_type().is_dir() {
                return Err(AssetError::io(root, io::Error::other("not a directory")));
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.into_path();
            if ModelFormat::from_path(&path).is_ok() {
                catalog.models.push(path);
            } else if is_texture_file(&path) {
                catalog.textures.push(path);
            }
        }

        log::debug!(
            "Catalogued {} models and {} textures under {}",
            catalog.models.len(),
            catalog.textures.len(),
            root.display()
        );
        Ok(catalog)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty() && self.textures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_scan_sorts_and_classifies() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("props/textures")).unwrap();
        for file in [
            "b.obj",
            "a.GLB",
            "props/crate.ply",
            "props/textures/crate.PNG",
            "props/textures/crate_n.tga",
            "notes.txt",
        ] {
            fs::write(root.join(file), b"").unwrap();
        }

        let catalog = AssetCatalog::scan(root).unwrap();
        assert_eq!(
            catalog.models,
            vec![root.join("a.GLB"), root.join("b.obj"), root.join("props/crate.ply")]
        );
        assert_eq!(
            catalog.textures,
            vec![
                root.join("props/textures/crate.PNG"),
                root.join("props/textures/crate_n.tga")
            ]
        );
    }

    #[test]
    fn test_missing_root() {
        let err = AssetCatalog::scan("/definitely/not/here").unwrap_err();
        assert!(matches!(err, AssetError::Io { .. }));
    }

    #[test]
    fn test_file_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("scene.obj");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            AssetCatalog::scan(&file),
            Err(AssetError::Io { .. })
        ));
    }

    #[test]
    fn test_nested_directories_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("b/deep")).unwrap();
        fs::create_dir_all(root.join("a")).unwrap();
        for file in ["b/deep/z.gltf", "b/c.obj", "a/y.ply"] {
            fs::write(root.join(file), b"").unwrap();
        }

        let catalog = AssetCatalog::scan(root).unwrap();
        assert_eq!(
            catalog.models,
            vec![root.join("a/y.ply"), root.join("b/c.obj"), root.join("b/deep/z.gltf")]
        );
    }

    #[test]
    fn test_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AssetCatalog::scan(dir.path()).unwrap().is_empty());
    }
}
