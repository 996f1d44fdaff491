//! Fixture helpers shared by the integration tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn write_png(path: &Path, width: u32, height: u32, rgba: [u8; 4]) {
    image::RgbaImage::from_pixel(width, height, image::Rgba(rgba))
        .save(path)
        .expect("Failed to write fixture image");
}

/// 4x4 diffuse and 2x2 normal texture
pub const DIFFUSE_BYTES: u64 = 4 * 4 * 4;
pub const NORMAL_BYTES: u64 = 2 * 2 * 4;

/// Two quads sharing an edge; material 0 has diffuse+normal, material 1 nothing
pub fn two_material_obj(dir: &Path) -> PathBuf {
    write_png(&dir.join("diffuse.png"), 4, 4, [200, 10, 10, 255]);
    write_png(&dir.join("normal.png"), 2, 2, [120, 130, 250, 255]);
    fs::write(
        dir.join("scene.mtl"),
        "newmtl painted\nmap_Kd diffuse.png\nmap_Bump -bm 1.0 normal.png\n\n\
         newmtl plain\nKd 0.5 0.5 0.5\n",
    )
    .unwrap();
    let obj = dir.join("scene.obj");
    fs::write(
        &obj,
        "mtllib scene.mtl\n\
         v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nv 2 0 0\nv 2 1 0\n\
         vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
         usemtl painted\nf 1/1 2/2 3/3 4/4\n\
         usemtl plain\nf 2/1 5/2 6/3 3/4\n",
    )
    .unwrap();
    obj
}

/// A single triangle with no material library
pub fn untextured_obj(dir: &Path) -> PathBuf {
    let obj = dir.join("bare.obj");
    fs::write(&obj, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
    obj
}

/// Quad whose base colour and metallic-roughness textures live in `textures/`
pub fn textured_gltf(dir: &Path) -> PathBuf {
    fs::create_dir_all(dir.join("textures")).unwrap();
    write_png(&dir.join("textures/base.png"), 2, 2, [10, 20, 30, 255]);
    write_png(&dir.join("textures/orm.png"), 1, 1, [0, 90, 180, 255]);

    let mut bin = Vec::new();
    for p in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]] {
        for c in p {
            bin.extend_from_slice(&c.to_le_bytes());
        }
    }
    for i in [0u16, 1, 2, 0, 2, 3] {
        bin.extend_from_slice(&i.to_le_bytes());
    }
    fs::write(dir.join("quad.bin"), &bin).unwrap();

    let gltf = r#"{
  "asset": { "version": "2.0" },
  "scenes": [ { "nodes": [0] } ],
  "nodes": [ { "mesh": 0 } ],
  "meshes": [ { "primitives": [ { "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 } ] } ],
  "materials": [ {
    "pbrMetallicRoughness": {
      "baseColorTexture": { "index": 0 },
      "metallicRoughnessTexture": { "index": 1 }
    }
  } ],
  "textures": [ { "source": 0 }, { "source": 1 } ],
  "images": [ { "uri": "base.png" }, { "uri": "orm.png" } ],
  "buffers": [ { "uri": "quad.bin", "byteLength": 60 } ],
  "bufferViews": [
    { "buffer": 0, "byteOffset": 0, "byteLength": 48 },
    { "buffer": 0, "byteOffset": 48, "byteLength": 12 }
  ],
  "accessors": [
    { "bufferView": 0, "componentType": 5126, "count": 4, "type": "VEC3",
      "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
    { "bufferView": 1, "componentType": 5123, "count": 6, "type": "SCALAR" }
  ]
}"#;
    let path = dir.join("quad.gltf");
    fs::write(&path, gltf).unwrap();
    path
}

/// Ascii PLY quad with one `TextureFile` material
pub fn textured_ply(dir: &Path) -> PathBuf {
    write_png(&dir.join("tiles.png"), 8, 2, [255, 255, 0, 255]);
    let path = dir.join("floor.ply");
    fs::write(
        &path,
        "ply\nformat ascii 1.0\ncomment TextureFile tiles.png\n\
         element vertex 4\nproperty float x\nproperty float y\nproperty float z\n\
         property float u\nproperty float v\n\
         element face 2\nproperty list uchar int vertex_indices\nend_header\n\
         0 0 0 0 0\n1 0 0 1 0\n1 1 0 1 1\n0 1 0 0 1\n\
         3 0 1 2\n3 0 2 3\n",
    )
    .unwrap();
    path
}
