//! End-to-end load protocol tests against the mock GPU

mod common;

use bindless_streamer::gpu::mock::MockImage;
use bindless_streamer::{
    slot_for, AssetError, GpuDevice, GpuTextureFormat, ImageLayout, LoadPhase, MockGpu,
    MockGpuConfig, MockSpawner, PipelineConfig, ResourceManager, TextureChannel, Vertex,
};
use common::*;
use std::fs;

fn manager(gpu: &MockGpu) -> ResourceManager<MockGpu, MockSpawner> {
    ResourceManager::new(gpu.clone(), MockSpawner::new(), PipelineConfig::default())
}

fn base_pixels(manager: &ResourceManager<MockGpu, MockSpawner>, slot: u32) -> Vec<u8> {
    manager.textures()[slot as usize]
        .image()
        .and_then(|image| image.level_pixels(0))
        .expect("slot has no image")
}

/// Every mip of every slot, in slot order
fn snapshot(manager: &ResourceManager<MockGpu, MockSpawner>) -> Vec<Vec<Vec<u8>>> {
    manager
        .textures()
        .iter()
        .map(|texture| {
            let image: &MockImage = texture.image().expect("texture not built");
            (0..image.mip_levels)
                .map(|level| image.level_pixels(level).unwrap())
                .collect()
        })
        .collect()
}

#[test]
fn test_two_materials_fill_twelve_slots() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let obj = two_material_obj(dir.path());
    let gpu = MockGpu::new();
    let mut manager = manager(&gpu);

    let report = manager.load_initial(&obj).unwrap().clone();
    assert_eq!(report.material_count, 2);
    assert_eq!(report.texture_count, 12);
    assert_eq!(manager.bindless().len(), 12);

    assert_eq!(&base_pixels(&manager, 4)[..4], &[200, 10, 10, 255]);
    assert_eq!(&base_pixels(&manager, 5)[..4], &[120, 130, 250, 255]);
    assert_eq!(base_pixels(&manager, 6), vec![0, 0, 0, 255]);
    assert_eq!(base_pixels(&manager, 7), vec![128, 128, 128, 255]);
    assert_eq!(base_pixels(&manager, 8), vec![255, 255, 255, 255]);
    assert_eq!(base_pixels(&manager, 9), vec![128, 128, 255, 255]);
    assert_eq!(base_pixels(&manager, 10), vec![0, 0, 0, 255]);
    assert_eq!(base_pixels(&manager, 11), vec![128, 128, 128, 255]);

    assert_eq!(slot_for(1, TextureChannel::Diffuse), 8);
    assert_eq!(manager.bindless().resolve(0, TextureChannel::Normal), 5);
    assert_eq!(manager.bindless().resolve(-1, TextureChannel::Normal), 1);
}

#[test]
fn test_fallback_slots_hold_channel_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let obj = untextured_obj(dir.path());
    let gpu = MockGpu::new();
    let mut manager = manager(&gpu);
    manager.load_initial(&obj).unwrap();

    for channel in TextureChannel::ALL {
        let slot = channel.ordinal();
        assert_eq!(base_pixels(&manager, slot), channel.fallback_color().to_vec());
        assert_eq!(
            manager.textures()[slot as usize].format().bytes_per_pixel(),
            4
        );
    }
    assert_eq!(manager.textures()[0].format(), GpuTextureFormat::Rgba8Srgb);
    assert_eq!(manager.textures()[1].format(), GpuTextureFormat::Rgba8Unorm);
}

#[test]
fn test_zero_materials() {
    let dir = tempfile::tempdir().unwrap();
    let obj = untextured_obj(dir.path());
    let gpu = MockGpu::new();
    let mut manager = manager(&gpu);

    let report = manager.load_initial(&obj).unwrap().clone();
    assert_eq!(report.texture_count, 4);
    assert_eq!(report.staging_bytes, 0);
    // Only the four fallback submissions; no empty batch
    assert_eq!(report.submissions, 4);
    assert_eq!(gpu.submissions(), 4);

    let mesh = manager.mesh().unwrap();
    assert_eq!(mesh.vertex_count, 3);
    assert_eq!(mesh.index_count, 3);
    assert!(manager.bindless().is_complete());
}

#[test]
fn test_staging_total_matches_decoded_images() {
    let dir = tempfile::tempdir().unwrap();
    let obj = two_material_obj(dir.path());
    let gpu = MockGpu::new();
    let mut manager = manager(&gpu);

    let report = manager.load_initial(&obj).unwrap();
    assert_eq!(report.staging_bytes, DIFFUSE_BYTES + NORMAL_BYTES);
    assert_eq!(report.decoded_textures, 2);
    assert_eq!(report.fallback_textures, 6);
}

#[test]
fn test_material_textures_share_one_submission() {
    let dir = tempfile::tempdir().unwrap();
    let obj = two_material_obj(dir.path());
    let gpu = MockGpu::new();
    let mut manager = manager(&gpu);

    manager.load_initial(&obj).unwrap();
    // 4 fallbacks + 1 batch
    assert_eq!(gpu.submissions(), 5);
    // 4 private fallback buffers, 6 private material fallbacks, 1 shared staging, 2 mesh buffers
    assert_eq!(gpu.buffer_allocations(), 4 + 6 + 1 + 2);
    assert_eq!(gpu.live_objects().buffers, 2);

    let diffuse = manager.textures()[4].image().unwrap();
    assert_eq!(diffuse.mip_levels, 3);
    for level in 0..3 {
        assert_eq!(diffuse.level_layout(level), Some(ImageLayout::ShaderReadOnly));
    }
    assert_eq!(diffuse.level_pixels(2).unwrap(), vec![200, 10, 10, 255]);
}

#[test]
fn test_corrupt_image_uses_fallback() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let obj = two_material_obj(dir.path());
    fs::write(dir.path().join("diffuse.png"), b"\x89PNG\r\n\x1a\ngarbage").unwrap();
    let gpu = MockGpu::new();
    let mut manager = manager(&gpu);

    let report = manager.load_initial(&obj).unwrap().clone();
    assert_eq!(base_pixels(&manager, 4), vec![255, 255, 255, 255]);
    assert_eq!(report.decoded_textures, 1);
    assert_eq!(report.fallback_textures, 7);
    assert_eq!(report.staging_bytes, NORMAL_BYTES);
    assert!(report.timings.total_ms >= report.timings.mesh_ms);
    assert!(report.timings.overlap_saved_ms <= report.timings.mesh_ms);
}

#[test]
fn test_missing_texture_file_uses_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let obj = two_material_obj(dir.path());
    fs::remove_file(dir.path().join("normal.png")).unwrap();
    let gpu = MockGpu::new();
    let spawner = MockSpawner::new();
    let mut manager = ResourceManager::new(gpu.clone(), spawner.clone(), PipelineConfig::default());

    manager.load_initial(&obj).unwrap();
    assert_eq!(spawner.spawn_count(), 1);
    assert_eq!(base_pixels(&manager, 5), vec![128, 128, 255, 255]);
}

#[test]
fn test_reload_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let obj = two_material_obj(dir.path());
    let gpu = MockGpu::new();
    let mut manager = manager(&gpu);

    manager.load_initial(&obj).unwrap();
    let first = snapshot(&manager);
    let generation = manager.bindless().generation();
    let live = gpu.live_objects();

    manager.reload(&obj).unwrap();
    assert_eq!(snapshot(&manager), first);
    assert_eq!(manager.bindless().generation(), generation + 1);
    assert_eq!(gpu.wait_idle_calls(), 1);
    assert_eq!(gpu.live_objects(), live);
    assert_eq!(manager.metrics().load_count(), 2);
    assert_eq!(manager.metrics().reload_count(), 1);

    let fresh_gpu = MockGpu::new();
    let mut fresh = ResourceManager::new(fresh_gpu, MockSpawner::deferred(), PipelineConfig::default());
    fresh.load_initial(&obj).unwrap();
    assert_eq!(snapshot(&fresh), first);
}

#[test]
fn test_reload_switches_scene() {
    let dir = tempfile::tempdir().unwrap();
    let textured = two_material_obj(dir.path());
    let bare = untextured_obj(dir.path());
    let gpu = MockGpu::new();
    let mut manager = manager(&gpu);

    manager.load_initial(&textured).unwrap();
    manager.reload(&bare).unwrap();
    assert_eq!(manager.textures().len(), 4);
    assert_eq!(gpu.live_objects().images, 4);
    assert!(manager.materials().is_empty());
}

#[test]
fn test_missing_linear_blit_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let obj = two_material_obj(dir.path());
    let gpu = MockGpu::with_config(MockGpuConfig {
        linear_blit: false,
        ..Default::default()
    });
    let mut manager = manager(&gpu);

    let err = manager.load_initial(&obj).unwrap_err();
    assert!(matches!(err, AssetError::LoadFailure(_)));
    assert!(!manager.is_loaded());
    assert_eq!(gpu.live_objects().total(), 0);
    assert!(matches!(manager.progress().phase(), LoadPhase::Failed(_)));

    // Without mipmaps the blit is never needed
    let mut no_mips = ResourceManager::new(
        gpu.clone(),
        MockSpawner::new(),
        PipelineConfig::default().with_mipmaps(false),
    );
    no_mips.load_initial(&obj).unwrap();
    assert_eq!(no_mips.textures()[4].mip_levels(), 1);
}

#[test]
fn test_texture_creation_failure_recovers_with_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let obj = two_material_obj(dir.path());
    let gpu = MockGpu::with_config(MockGpuConfig {
        max_image_dimension: Some(2),
        ..Default::default()
    });
    let mut manager = manager(&gpu);

    let report = manager.load_initial(&obj).unwrap().clone();
    assert_eq!(base_pixels(&manager, 4), vec![255, 255, 255, 255]);
    assert_eq!(&base_pixels(&manager, 5)[..4], &[120, 130, 250, 255]);
    assert_eq!(report.decoded_textures, 1);
    assert_eq!(report.fallback_textures, 7);
}

#[test]
fn test_device_lost_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let obj = two_material_obj(dir.path());
    let gpu = MockGpu::new();
    let mut manager = manager(&gpu);
    manager.load_initial(&obj).unwrap();

    gpu.lose_device();
    let err = manager.reload(&obj).unwrap_err();
    assert!(matches!(err, AssetError::LoadFailure(_)));

    let mut fresh = ResourceManager::new(gpu.clone(), MockSpawner::new(), PipelineConfig::default());
    assert!(matches!(
        fresh.load_initial(&obj),
        Err(AssetError::LoadFailure(_))
    ));
    assert_eq!(fresh.textures().len(), 0);
}

#[test]
fn test_out_of_memory_is_fatal_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let obj = two_material_obj(dir.path());
    // Room for the fallbacks and the staging buffer, not the 4x4 mip chain
    let gpu = MockGpu::with_config(MockGpuConfig {
        memory_budget: Some(120),
        ..Default::default()
    });
    let mut manager = manager(&gpu);

    let err = manager.load_initial(&obj).unwrap_err();
    assert!(matches!(err, AssetError::LoadFailure(_)));
    assert_eq!(gpu.live_objects().total(), 0);
    assert_eq!(gpu.allocated_bytes(), 0);
    assert_eq!(manager.metrics().failure_count(), 1);
}

#[test]
fn test_parse_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let obj = dir.path().join("broken.obj");
    fs::write(&obj, "v 0 0 0\nf 1 2 3\n").unwrap();
    let gpu = MockGpu::new();
    let mut manager = manager(&gpu);

    assert!(matches!(
        manager.load_initial(&obj),
        Err(AssetError::Parse { .. })
    ));
    assert!(matches!(
        manager.load_initial(dir.path().join("absent.obj")),
        Err(AssetError::Io { .. })
    ));
    assert_eq!(gpu.submissions(), 0);
}

#[test]
fn test_gpu_mesh_contents() {
    let dir = tempfile::tempdir().unwrap();
    let obj = two_material_obj(dir.path());
    let gpu = MockGpu::new();
    let mut manager = manager(&gpu);
    manager.load_initial(&obj).unwrap();

    let mesh = manager.mesh().unwrap();
    assert_eq!(mesh.vertex_count, 8);
    assert_eq!(mesh.index_count, 12);
    assert_eq!(
        mesh.vertex_buffer.size(),
        8 * Vertex::size()
    );
    let indices: Vec<u32> = mesh
        .index_buffer
        .read_data()
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    assert!(indices.iter().all(|&i| i < 8));
    assert_eq!(gpu.backend_name(), "Mock");
}
