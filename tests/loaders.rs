//! Format loaders feeding the full pipeline

mod common;

use bindless_streamer::loader::{GltfLoader, ObjLoader, PlyLoader, TextureResolver};
use bindless_streamer::{
    AssetError, MockGpu, MockSpawner, ModelLoader, PipelineConfig, ResourceManager, TextureChannel,
};
use common::*;
use std::fs;

fn load_with_mock(path: &std::path::Path) -> (ResourceManager<MockGpu, MockSpawner>, MockSpawner) {
    let spawner = MockSpawner::new();
    let mut manager = ResourceManager::new(MockGpu::new(), spawner.clone(), PipelineConfig::default());
    manager.load_initial(path).unwrap();
    (manager, spawner)
}

fn base_pixel(manager: &ResourceManager<MockGpu, MockSpawner>, slot: usize) -> Vec<u8> {
    let pixels = manager.textures()[slot].image().unwrap().level_pixels(0).unwrap();
    pixels[..4].to_vec()
}

#[test]
fn test_obj_quad_is_deduplicated() {
    let dir = tempfile::tempdir().unwrap();
    let obj = dir.path().join("quad.obj");
    fs::write(&obj, "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n").unwrap();

    let mesh = ObjLoader::default().load(&obj).unwrap();
    assert_eq!(mesh.vertex_count(), 4);
    assert_eq!(mesh.index_count(), 6);
    assert!(mesh.materials.is_empty());
    assert!(mesh.vertices.iter().all(|v| v.normal == [0.0, 0.0, 1.0]));
}

#[test]
fn test_obj_pre_parse_matches_full_load() {
    let dir = tempfile::tempdir().unwrap();
    let obj = two_material_obj(dir.path());
    let loader = ObjLoader::default();

    let pre = loader.pre_parse_texture_paths(&obj);
    let full = loader.load(&obj).unwrap();
    assert_eq!(pre, full.materials);
    assert_eq!(
        pre[0].path(TextureChannel::Normal),
        Some(dir.path().join("normal.png").as_path())
    );
    assert!(pre[1].is_empty());
}

#[test]
fn test_gltf_through_manager() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let gltf = textured_gltf(dir.path());
    let (manager, spawner) = load_with_mock(&gltf);

    let report = manager.last_report().unwrap();
    assert_eq!(report.vertex_count, 4);
    assert_eq!(report.index_count, 6);
    assert_eq!(report.texture_count, 8);
    // The packed metallic-roughness file is decoded once but staged twice
    assert_eq!(spawner.spawn_count(), 2);
    assert_eq!(report.staging_bytes, 16 + 2 * 4);
    assert_eq!(report.decoded_textures, 3);
    assert_eq!(report.fallback_textures, 1);

    assert_eq!(base_pixel(&manager, 4), vec![10, 20, 30, 255]);
    assert_eq!(base_pixel(&manager, 5), vec![128, 128, 255, 255]);
    assert_eq!(base_pixel(&manager, 6), vec![0, 90, 180, 255]);
    assert_eq!(base_pixel(&manager, 7), vec![0, 90, 180, 255]);
}

#[test]
fn test_gltf_texture_in_search_dir() {
    let dir = tempfile::tempdir().unwrap();
    let gltf = textured_gltf(dir.path());
    let materials = GltfLoader::new(TextureResolver::default()).pre_parse_texture_paths(&gltf);

    assert_eq!(materials.len(), 1);
    assert_eq!(
        materials[0].path(TextureChannel::Diffuse),
        Some(dir.path().join("textures").join("base.png").as_path())
    );
    assert_eq!(
        materials[0].path(TextureChannel::Metallic),
        materials[0].path(TextureChannel::Roughness)
    );

    // Without the search directory the references cannot be found
    let bare = GltfLoader::new(TextureResolver::new(Vec::new())).pre_parse_texture_paths(&gltf);
    assert!(bare[0].is_empty());
}

#[test]
fn test_ply_through_manager() {
    let dir = tempfile::tempdir().unwrap();
    let ply = textured_ply(dir.path());
    let (manager, spawner) = load_with_mock(&ply);

    let report = manager.last_report().unwrap();
    assert_eq!(report.material_count, 1);
    assert_eq!(report.vertex_count, 4);
    assert_eq!(spawner.spawn_count(), 1);
    assert_eq!(report.staging_bytes, 8 * 2 * 4);

    let diffuse = &manager.textures()[4];
    assert_eq!((diffuse.width(), diffuse.height()), (8, 2));
    assert_eq!(diffuse.mip_levels(), 4);
    let image = diffuse.image().unwrap();
    assert_eq!(image.level_extent(3), Some((1, 1)));
    assert_eq!(image.level_pixels(3).unwrap(), vec![255, 255, 0, 255]);
}

#[test]
fn test_ply_vertices_reference_material() {
    let dir = tempfile::tempdir().unwrap();
    let ply = textured_ply(dir.path());
    let mesh = PlyLoader::default().load(&ply).unwrap();

    assert_eq!(mesh.index_count(), 6);
    assert!(mesh.vertices.iter().all(|v| v.material_index == 0));
    // v is flipped to a top-left origin
    assert!(mesh.vertices.iter().any(|v| v.uv == [1.0, 0.0]));
}

#[test]
fn test_unsupported_extension() {
    let dir = tempfile::tempdir().unwrap();
    let fbx = dir.path().join("scene.fbx");
    fs::write(&fbx, b"Kaydara FBX Binary").unwrap();

    let gpu = MockGpu::new();
    let mut manager = ResourceManager::new(gpu.clone(), MockSpawner::new(), PipelineConfig::default());
    assert!(matches!(
        manager.load_initial(&fbx),
        Err(AssetError::UnsupportedFormat(_))
    ));
    assert_eq!(gpu.submissions(), 0);
}
