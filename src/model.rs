//! Format-neutral mesh representation produced by every loader
//!
//! A [`MeshRecord`] holds deduplicated vertices, a triangle-list index
//! buffer and the per-material texture references discovered while loading.
//! It is built once per load, uploaded, and then discarded or kept for
//! inspection until the next reload.

use crate::error::{AssetError, Result};
use crate::vertex::{Vertex, VertexKey};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::Xxh3Builder;

/// One of the four texture roles a material can fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureChannel {
    Diffuse,
    Normal,
    Metallic,
    Roughness,
}

impl TextureChannel {
    /// All channels in slot order
    pub const ALL: [TextureChannel; 4] = [
        TextureChannel::Diffuse,
        TextureChannel::Normal,
        TextureChannel::Metallic,
        TextureChannel::Roughness,
    ];

    /// Position of this channel inside a material's block of slots
    pub const fn ordinal(self) -> u32 {
        match self {
            Self::Diffuse => 0,
            Self::Normal => 1,
            Self::Metallic => 2,
            Self::Roughness => 3,
        }
    }

    /// Color data is sampled as sRGB; everything else is linear data
    pub const fn is_srgb(self) -> bool {
        matches!(self, Self::Diffuse)
    }

    /// The 1x1 RGBA value used whenever this channel has no usable image
    pub const fn fallback_color(self) -> [u8; 4] {
        match self {
            Self::Diffuse => [255, 255, 255, 255],
            Self::Normal => [128, 128, 255, 255],
            Self::Metallic => [0, 0, 0, 255],
            Self::Roughness => [128, 128, 128, 255],
        }
    }

    /// Short lowercase name for labels and logs
    pub const fn name(self) -> &'static str {
        match self {
            Self::Diffuse => "diffuse",
            Self::Normal => "normal",
            Self::Metallic => "metallic",
            Self::Roughness => "roughness",
        }
    }
}

impl fmt::Display for TextureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Texture references of one material; `None` means "use the fallback"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialInfo {
    pub diffuse: Option<PathBuf>,
    pub normal: Option<PathBuf>,
    pub metallic: Option<PathBuf>,
    pub roughness: Option<PathBuf>,
}

impl MaterialInfo {
    /// Path recorded for a channel
    pub fn path(&self, channel: TextureChannel) -> Option<&Path> {
        match channel {
            TextureChannel::Diffuse => self.diffuse.as_deref(),
            TextureChannel::Normal => self.normal.as_deref(),
            TextureChannel::Metallic => self.metallic.as_deref(),
            TextureChannel::Roughness => self.roughness.as_deref(),
        }
    }

    /// Replace the path recorded for a channel
    pub fn set_path(&mut self, channel: TextureChannel, path: Option<PathBuf>) {
        let slot = match channel {
            TextureChannel::Diffuse => &mut self.diffuse,
            TextureChannel::Normal => &mut self.normal,
            TextureChannel::Metallic => &mut self.metallic,
            TextureChannel::Roughness => &mut self.roughness,
        };
        *slot = path;
    }

    /// Iterate over `(channel, path)` for every channel that has a path
    pub fn paths(&self) -> impl Iterator<Item = (TextureChannel, &Path)> + '_ {
        TextureChannel::ALL
            .into_iter()
            .filter_map(move |channel| self.path(channel).map(|p| (channel, p)))
    }

    /// True when no channel references a texture
    pub fn is_empty(&self) -> bool {
        self.paths().next().is_none()
    }
}

/// Deduplicated triangle mesh plus its material table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshRecord {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub materials: Vec<MaterialInfo>,
}

impl MeshRecord {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Check index bounds and material references
    ///
    /// `source` is only used to attribute the error.
    pub fn validate(&self, source: &Path) -> Result<()> {
        let vertex_count = self.vertices.len();
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(AssetError::parse(
                source,
                format!("index {bad} out of range for {vertex_count} vertices"),
            ));
        }

        let material_count = self.materials.len();
        if let Some(v) = self
            .vertices
            .iter()
            .find(|v| v.material_index >= 0 && v.material_index as usize >= material_count)
        {
            return Err(AssetError::parse(
                source,
                format!(
                    "material index {} out of range for {material_count} materials",
                    v.material_index
                ),
            ));
        }

        Ok(())
    }
}

/// Builds a [`MeshRecord`], collapsing identical vertices into one entry
#[derive(Debug, Default)]
pub struct MeshBuilder {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    lookup: HashMap<VertexKey, u32, Xxh3Builder>,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size for roughly `corners` emitted vertices
    pub fn with_capacity(corners: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(corners / 2),
            indices: Vec::with_capacity(corners),
            lookup: HashMap::with_capacity_and_hasher(corners / 2, Xxh3Builder::new()),
        }
    }

    /// Append one triangle corner, reusing an existing vertex when equal
    pub fn push(&mut self, vertex: Vertex) -> u32 {
        let next = self.vertices.len() as u32;
        let index = *self.lookup.entry(vertex.key()).or_insert_with(|| {
            self.vertices.push(vertex);
            next
        });
        self.indices.push(index);
        index
    }

    /// Append a whole triangle
    pub fn push_triangle(&mut self, corners: [Vertex; 3]) {
        for corner in corners {
            self.push(corner);
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Finish the mesh with its material table
    pub fn build(self, materials: Vec<MaterialInfo>) -> MeshRecord {
        MeshRecord {
            vertices: self.vertices,
            indices: self.indices,
            materials,
        }
    }
}

/// Flat normal of a counter-clockwise triangle, or +Z for degenerate ones
pub(crate) fn face_normal(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> [f32; 3] {
    let a = glam::Vec3::from(a);
    let n = (glam::Vec3::from(b) - a).cross(glam::Vec3::from(c) - a);
    n.try_normalize().unwrap_or(glam::Vec3::Z).to_array()
}
