//! Loader module for mesh format handling
//!
//! Every supported format implements [`ModelLoader`]. The set of formats is
//! closed ([`ModelFormat`]) and chosen from the file extension.

pub mod gltf;
pub mod obj;
pub mod ply;

use crate::config::PipelineConfig;
use crate::error::{AssetError, Result};
use crate::model::{MaterialInfo, MeshRecord};
use std::path::{Path, PathBuf};

pub use self::gltf::GltfLoader;
pub use self::obj::ObjLoader;
pub use self::ply::PlyLoader;

/// A mesh file format reader
pub trait ModelLoader: Send + Sync {
    /// Load geometry and materials
    ///
    /// Fails with [`AssetError::Io`] when the file cannot be read and
    /// [`AssetError::Parse`] when its contents are malformed.
    fn load(&self, path: &Path) -> Result<MeshRecord>;

    /// Discover material texture paths without reading geometry
    ///
    /// Best effort: any failure yields an empty list and the full load
    /// stays authoritative.
    fn pre_parse_texture_paths(&self, path: &Path) -> Vec<MaterialInfo>;

    /// Lowercase extensions (without dot) handled by this loader
    fn supported_extensions(&self) -> &'static [&'static str];

    /// Name of the format (for logging)
    fn format_name(&self) -> &'static str;
}

/// The closed set of mesh formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    Obj,
    Gltf,
    Ply,
}

impl ModelFormat {
    pub const ALL: [ModelFormat; 3] = [ModelFormat::Obj, ModelFormat::Gltf, ModelFormat::Ply];

    /// Extensions recognised for this format
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Obj => self::obj::EXTENSIONS,
            Self::Gltf => self::gltf::EXTENSIONS,
            Self::Ply => self::ply::EXTENSIONS,
        }
    }

    /// Detect the format from a path's extension (case-insensitive)
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| {
                AssetError::UnsupportedFormat(format!("{} has no extension", path.display()))
            })?;

        Self::ALL
            .into_iter()
            .find(|format| format.extensions().contains(&ext.as_str()))
            .ok_or_else(|| AssetError::UnsupportedFormat(format!(".{ext}")))
    }

    /// Construct the loader for this format
    pub fn loader(self, resolver: TextureResolver) -> Box<dyn ModelLoader> {
        match self {
            Self::Obj => Box::new(ObjLoader::new(resolver)),
            Self::Gltf => Box::new(GltfLoader::new(resolver)),
            Self::Ply => Box::new(PlyLoader::new(resolver)),
        }
    }
}

/// Pick the loader for `path` using the search directories from `config`
pub fn loader_for_path(path: &Path, config: &PipelineConfig) -> Result<Box<dyn ModelLoader>> {
    let format = ModelFormat::from_path(path)?;
    Ok(format.loader(TextureResolver::new(config.texture_search_dirs.clone())))
}

/// Every mesh extension any loader accepts
pub fn supported_model_extensions() -> impl Iterator<Item = &'static str> {
    ModelFormat::ALL
        .into_iter()
        .flat_map(|format| format.extensions().iter().copied())
}

/// Turns texture references found in model files into existing paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureResolver {
    search_dirs: Vec<String>,
}

impl Default for TextureResolver {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_TEXTURE_SEARCH_DIRS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

impl TextureResolver {
    pub fn new(search_dirs: Vec<String>) -> Self {
        Self { search_dirs }
    }

    /// Resolve `raw` relative to the directory of the model file
    pub fn resolve(&self, raw: &str, model_dir: &Path) -> Option<PathBuf> {
        resolve_texture_path(raw, model_dir, &self.search_dirs)
    }
}

/// Locate a referenced texture on disk
///
/// Tries, in order: `raw` itself, `model_dir/raw`, `model_dir/<file name>`,
/// then `model_dir/<sub>/<file name>` for each search subdirectory.
/// Returns `None` when nothing exists.
pub fn resolve_texture_path(raw: &str, model_dir: &Path, search_dirs: &[String]) -> Option<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    // Exporters on Windows write backslash separators
    let normalized = raw.replace('\\', "/");
    let raw_path = Path::new(&normalized);

    if raw_path.is_file() {
        return Some(raw_path.to_path_buf());
    }

    let joined = model_dir.join(raw_path);
    if joined.is_file() {
        return Some(joined);
    }

    let file_name = raw_path.file_name()?;
    let direct = model_dir.join(file_name);
    if direct.is_file() {
        return Some(direct);
    }

    search_dirs
        .iter()
        .map(|sub| model_dir.join(sub).join(file_name))
        .find(|candidate| candidate.is_file())
}

/// Last whitespace-separated token of a texture statement, dropping any
/// leading option flags such as `-bm 1.0`
pub(crate) fn last_token(value: &str) -> Option<&str> {
    value.split_whitespace().last()
}
