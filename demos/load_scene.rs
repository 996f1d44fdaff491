//! Load a scene into the mock GPU and print what ended up in the bindless table
//!
//! Usage: `cargo run --example load_scene -- <model.obj|.gltf|.glb|.ply|directory>`
//!
//! A directory argument is scanned and every model inside is loaded in turn,
//! reusing one manager so each load after the first is a reload.

use anyhow::Context;
use bindless_streamer::{
    AssetCatalog, MockGpu, PipelineConfig, ResourceManager, TextureChannel,
};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let target = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("assets"));

    let models = if target.is_dir() {
        let catalog = AssetCatalog::scan(&target)
            .with_context(|| format!("scanning {}", target.display()))?;
        log::info!(
            "{} models and {} textures under {}",
            catalog.models.len(),
            catalog.textures.len(),
            target.display()
        );
        catalog.models
    } else {
        vec![target]
    };
    if models.is_empty() {
        anyhow::bail!("no models to load");
    }

    let gpu = MockGpu::new();
    let mut manager = ResourceManager::with_rayon(gpu.clone(), PipelineConfig::default())?;
    println!("bindless_streamer v{}", bindless_streamer::VERSION);

    for model in &models {
        let report = manager
            .load_initial(model)
            .with_context(|| format!("loading {}", model.display()))?;
        println!(
            "{}: {} vertices, {} materials, {} slots ({} decoded, {} fallback), {} staging bytes, {:.1} ms",
            report.path.display(),
            report.vertex_count,
            report.material_count,
            report.texture_count,
            report.decoded_textures,
            report.fallback_textures,
            report.staging_bytes,
            report.timings.total_ms
        );

        for (material, info) in manager.materials().iter().enumerate() {
            for channel in TextureChannel::ALL {
                let slot = manager.bindless().resolve(material as i32, channel);
                match info.path(channel) {
                    Some(path) => println!("  slot {slot:>3} {channel:<9} {}", path.display()),
                    None => println!("  slot {slot:>3} {channel:<9} (fallback)"),
                }
            }
        }
    }

    let metrics = manager.metrics();
    if let Some(average) = metrics.average_total_ms() {
        println!(
            "{} loads, {:.1} ms average, {} submissions",
            metrics.load_count(),
            average,
            metrics.submissions()
        );
    }
    Ok(())
}
