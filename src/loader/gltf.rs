//! glTF / GLB model loading
//!
//! Geometry is collected by walking the default scene's node tree. Node
//! transforms are not applied; vertices stay in mesh space.

use super::{ModelLoader, TextureResolver};
use crate::error::{AssetError, Result};
use crate::model::{MaterialInfo, MeshBuilder, MeshRecord, TextureChannel};
use crate::vertex::{Vertex, NO_MATERIAL};
use gltf::{Document, Gltf};
use std::path::{Path, PathBuf};

pub(crate) const EXTENSIONS: &[&str] = &["gltf", "glb"];

/// glTF 2.0 loader (`.gltf` with external buffers, or binary `.glb`)
#[derive(Debug, Clone, Default)]
pub struct GltfLoader {
    resolver: TextureResolver,
}

impl GltfLoader {
    pub fn new(resolver: TextureResolver) -> Self {
        Self { resolver }
    }

    fn open(path: &Path) -> Result<Gltf> {
        std::fs::metadata(path).map_err(|e| AssetError::io(path, e))?;
        Gltf::open(path).map_err(|e| map_gltf_error(path, e))
    }

    /// Only external, local image files can be decoded; embedded images
    /// (buffer views, data URIs) and remote URIs fall back
    fn texture_path(&self, texture: gltf::Texture<'_>, base_dir: &Path) -> Option<PathBuf> {
        match texture.source().source() {
            gltf::image::Source::Uri { uri, .. } => {
                if uri.starts_with("data:") || uri.contains("://") {
                    return None;
                }
                self.resolver
                    .resolve(uri, base_dir)
                    .or_else(|| self.resolver.resolve(&percent_decode(uri), base_dir))
            }
            gltf::image::Source::View { .. } => None,
        }
    }

    fn materials(&self, document: &Document, base_dir: &Path) -> Vec<MaterialInfo> {
        document
            .materials()
            .map(|material| {
                let pbr = material.pbr_metallic_roughness();
                let mut info = MaterialInfo::default();

                if let Some(base) = pbr.base_color_texture() {
                    info.set_path(
                        TextureChannel::Diffuse,
                        self.texture_path(base.texture(), base_dir),
                    );
                }
                // One packed texture serves both channels
                if let Some(mr) = pbr.metallic_roughness_texture() {
                    let path = self.texture_path(mr.texture(), base_dir);
                    info.set_path(TextureChannel::Metallic, path.clone());
                    info.set_path(TextureChannel::Roughness, path);
                }
                if let Some(normal) = material.normal_texture() {
                    info.set_path(
                        TextureChannel::Normal,
                        self.texture_path(normal.texture(), base_dir),
                    );
                }

                log::debug!(
                    "glTF material {:?}: {} texture(s)",
                    material.name().unwrap_or("unnamed"),
                    info.paths().count()
                );
                info
            })
            .collect()
    }
}

impl ModelLoader for GltfLoader {
    fn load(&self, path: &Path) -> Result<MeshRecord> {
        let Gltf { document, blob, .. } = Self::open(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let buffers = gltf::import_buffers(&document, Some(base_dir), blob)
            .map_err(|e| map_gltf_error(path, e))?;

        let materials = self.materials(&document, base_dir);
        let mut collector = PrimitiveCollector {
            path,
            buffers: &buffers,
            material_count: materials.len(),
            builder: MeshBuilder::new(),
        };

        let scene = document.default_scene().or_else(|| document.scenes().next());
        match scene {
            Some(scene) => {
                for node in scene.nodes() {
                    collector.visit_node(&node)?;
                }
            }
            None => {
                for mesh in document.meshes() {
                    collector.visit_mesh(&mesh)?;
                }
            }
        }

        let builder = collector.builder;
        log::debug!(
            "glTF {}: {} vertices, {} indices, {} materials",
            path.display(),
            builder.vertex_count(),
            builder.index_count(),
            materials.len()
        );
        Ok(builder.build(materials))
    }

    fn pre_parse_texture_paths(&self, path: &Path) -> Vec<MaterialInfo> {
        match Self::open(path) {
            Ok(gltf) => {
                let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
                self.materials(&gltf.document, base_dir)
            }
            Err(e) => {
                log::debug!("glTF pre-parse of {} skipped: {e}", path.display());
                Vec::new()
            }
        }
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    fn format_name(&self) -> &'static str {
        "glTF"
    }
}

struct PrimitiveCollector<'a> {
    path: &'a Path,
    buffers: &'a [gltf::buffer::Data],
    material_count: usize,
    builder: MeshBuilder,
}

impl PrimitiveCollector<'_> {
    fn visit_node(&mut self, node: &gltf::Node<'_>) -> Result<()> {
        if let Some(mesh) = node.mesh() {
            self.visit_mesh(&mesh)?;
        }
        for child in node.children() {
            self.visit_node(&child)?;
        }
        Ok(())
    }

    fn visit_mesh(&mut self, mesh: &gltf::Mesh<'_>) -> Result<()> {
        for (prim_idx, primitive) in mesh.primitives().enumerate() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::debug!(
                    "Skipping {:?} primitive {prim_idx} of mesh {}",
                    primitive.mode(),
                    mesh.name().unwrap_or("unnamed")
                );
                continue;
            }
            self.add_primitive(&primitive)?;
        }
        Ok(())
    }

    fn add_primitive(&mut self, primitive: &gltf::Primitive<'_>) -> Result<()> {
        let buffers = self.buffers;
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));

        let Some(positions) = reader.read_positions() else {
            log::debug!("Primitive without positions skipped");
            return Ok(());
        };
        let positions: Vec<[f32; 3]> = positions.collect();
        let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(|iter| iter.collect());
        let uvs: Option<Vec<[f32; 2]>> = reader.read_tex_coords(0).map(|iter| iter.into_f32().collect());
        let colors: Option<Vec<[f32; 3]>> = reader.read_colors(0).map(|iter| iter.into_rgb_f32().collect());

        let material_index = match primitive.material().index() {
            Some(i) if i < self.material_count => i as i32,
            _ => NO_MATERIAL,
        };

        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };

        for index in indices {
            let i = index as usize;
            let position = *positions.get(i).ok_or_else(|| {
                AssetError::parse(
                    self.path,
                    format!("index {i} out of range for {} positions", positions.len()),
                )
            })?;
            let normal = normals
                .as_ref()
                .and_then(|n| n.get(i).copied())
                .unwrap_or([0.0, 0.0, 1.0]);
            let uv = uvs.as_ref().and_then(|t| t.get(i).copied()).unwrap_or([0.0, 0.0]);
            let mut vertex = Vertex::new(position, normal, uv).with_material(material_index);
            if let Some(color) = colors.as_ref().and_then(|c| c.get(i).copied()) {
                vertex = vertex.with_color(color);
            }
            self.builder.push(vertex);
        }
        Ok(())
    }
}

fn map_gltf_error(path: &Path, error: gltf::Error) -> AssetError {
    match error {
        gltf::Error::Io(e) => AssetError::io(path, e),
        other => AssetError::parse(path, other.to_string()),
    }
}

/// Decode `%XX` escapes in a relative URI
fn percent_decode(uri: &str) -> String {
    percent_encoding::percent_decode_str(uri)
        .decode_utf8_lossy()
        .into_owned()
}
