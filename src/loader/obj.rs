//! Wavefront OBJ (+MTL) loading via `tobj`

use super::{last_token, ModelLoader, TextureResolver};
use crate::error::{AssetError, Result};
use crate::model::{face_normal, MaterialInfo, MeshBuilder, MeshRecord, TextureChannel};
use crate::vertex::{Vertex, NO_MATERIAL};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub(crate) const EXTENSIONS: &[&str] = &["obj"];

/// MTL keys tobj leaves in `unknown_param`, per channel
const NORMAL_KEYS: &[&str] = &["map_Bump", "map_bump", "bump", "norm"];
const METALLIC_KEYS: &[&str] = &["map_Pm"];
const ROUGHNESS_KEYS: &[&str] = &["map_Pr"];

/// OBJ loader
#[derive(Debug, Clone, Default)]
pub struct ObjLoader {
    resolver: TextureResolver,
}

impl ObjLoader {
    pub fn new(resolver: TextureResolver) -> Self {
        Self { resolver }
    }

    fn load_options() -> tobj::LoadOptions {
        tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ignore_points: true,
            ignore_lines: true,
            ..Default::default()
        }
    }

    /// Map tobj materials onto texture paths resolved next to the OBJ file
    fn convert_materials(&self, materials: &[tobj::Material], model_dir: &Path) -> Vec<MaterialInfo> {
        materials
            .iter()
            .map(|material| {
                let mut info = MaterialInfo::default();
                let resolve = |value: Option<&String>| {
                    value
                        .and_then(|v| last_token(v))
                        .and_then(|raw| self.resolver.resolve(raw, model_dir))
                };
                let param = |keys: &[&str]| keys.iter().find_map(|k| material.unknown_param.get(*k));

                info.set_path(TextureChannel::Diffuse, resolve(material.diffuse_texture.as_ref()));
                info.set_path(
                    TextureChannel::Normal,
                    resolve(material.normal_texture.as_ref().or_else(|| param(NORMAL_KEYS))),
                );
                info.set_path(TextureChannel::Metallic, resolve(param(METALLIC_KEYS)));
                info.set_path(TextureChannel::Roughness, resolve(param(ROUGHNESS_KEYS)));

                log::debug!(
                    "OBJ material '{}': {} texture(s)",
                    material.name,
                    info.paths().count()
                );
                info
            })
            .collect()
    }
}

impl ModelLoader for ObjLoader {
    fn load(&self, path: &Path) -> Result<MeshRecord> {
        std::fs::metadata(path).map_err(|e| AssetError::io(path, e))?;

        let (models, materials) = tobj::load_obj(path, &Self::load_options()).map_err(|e| match e {
            tobj::LoadError::OpenFileFailed | tobj::LoadError::ReadError => {
                AssetError::io(path, std::io::Error::other(e.to_string()))
            }
            other => AssetError::parse(path, other.to_string()),
        })?;

        let materials = match materials {
            Ok(materials) => materials,
            Err(e) => {
                log::warn!("Material library for {} not loaded: {e}", path.display());
                Vec::new()
            }
        };
        let model_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let material_infos = self.convert_materials(&materials, model_dir);

        let corner_count: usize = models.iter().map(|m| m.mesh.indices.len()).sum();
        let mut builder = MeshBuilder::with_capacity(corner_count);

        for model in &models {
            let mesh = &model.mesh;
            let material_index = match mesh.material_id {
                Some(id) if id < material_infos.len() => id as i32,
                _ => NO_MATERIAL,
            };
            let has_normals = !mesh.normals.is_empty();
            let has_uvs = !mesh.texcoords.is_empty();
            let has_colors = mesh.vertex_color.len() == mesh.positions.len();

            let vertex_count = mesh.positions.len() / 3;
            let position = |i: usize| -> Result<[f32; 3]> {
                if i >= vertex_count {
                    return Err(AssetError::parse(
                        path,
                        format!("index {i} out of range in object '{}'", model.name),
                    ));
                }
                Ok([
                    mesh.positions[3 * i],
                    mesh.positions[3 * i + 1],
                    mesh.positions[3 * i + 2],
                ])
            };

            for triangle in mesh.indices.chunks_exact(3) {
                let ids = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
                let positions = [position(ids[0])?, position(ids[1])?, position(ids[2])?];
                let flat = (!has_normals).then(|| face_normal(positions[0], positions[1], positions[2]));

                for (corner, &i) in ids.iter().enumerate() {
                    let normal = match flat {
                        Some(n) => n,
                        None => [
                            mesh.normals[3 * i],
                            mesh.normals[3 * i + 1],
                            mesh.normals[3 * i + 2],
                        ],
                    };
                    let uv = if has_uvs {
                        // OBJ puts the texture origin bottom-left
                        [mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1]]
                    } else {
                        [0.0, 0.0]
                    };
                    let mut vertex = Vertex::new(positions[corner], normal, uv)
                        .with_material(material_index);
                    if has_colors {
                        vertex = vertex.with_color([
                            mesh.vertex_color[3 * i],
                            mesh.vertex_color[3 * i + 1],
                            mesh.vertex_color[3 * i + 2],
                        ]);
                    }
                    builder.push(vertex);
                }
            }
        }

        log::debug!(
            "OBJ {}: {} objects, {} vertices, {} indices, {} materials",
            path.display(),
            models.len(),
            builder.vertex_count(),
            builder.index_count(),
            material_infos.len()
        );

        Ok(builder.build(material_infos))
    }

    fn pre_parse_texture_paths(&self, path: &Path) -> Vec<MaterialInfo> {
        let libraries = match material_libraries(path) {
            Ok(libs) => libs,
            Err(e) => {
                log::debug!("OBJ pre-parse of {} skipped: {e}", path.display());
                return Vec::new();
            }
        };

        let model_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut infos = Vec::new();
        for library in libraries {
            match tobj::load_mtl(&library) {
                Ok((materials, _)) => infos.extend(self.convert_materials(&materials, model_dir)),
                Err(e) => log::debug!("MTL {} unreadable during pre-parse: {e}", library.display()),
            }
        }
        infos
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    fn format_name(&self) -> &'static str {
        "OBJ"
    }
}

/// `mtllib` targets declared before the first vertex statement
fn material_libraries(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    let reader = BufReader::new(File::open(path)?);
    let model_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut libraries = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim_start();
        if line.starts_with("v ") || line.starts_with("vt ") || line.starts_with("vn ") {
            break;
        }
        if let Some(rest) = line.strip_prefix("mtllib") {
            let name = rest.trim();
            if !name.is_empty() {
                libraries.push(model_dir.join(name));
            }
        }
    }

    Ok(libraries)
}
