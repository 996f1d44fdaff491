//! Load orchestration
//!
//! [`ResourceManager`] owns every GPU object produced from one scene file and
//! runs the load protocol:
//!
//! 1. pick the loader and pre-parse texture references
//! 2. start one decode task per distinct texture file
//! 3. parse geometry on the calling thread while those tasks run
//! 4. build the four fallback textures, each with its own submission
//! 5. join the decodes and lay out every material slot
//! 6. pack, record and submit every material texture in one submission
//! 7. release staging memory and publish the bindless table
//!
//! A reload waits for the device, destroys everything and starts over.

use crate::bindless::{slot_count, slot_layout, BindlessBinding, BindlessTable, SlotOwner};
use crate::config::PipelineConfig;
use crate::error::{AssetError, Result};
use crate::gpu::{BufferUsage, CommandStream, GpuDevice, GpuError, GpuResult, GpuTextureFormat};
use crate::loader::loader_for_path;
use crate::metrics::LoadMetricsHandle;
use crate::model::{MaterialInfo, MeshRecord, TextureChannel};
use crate::progress::{LoadPhase, LoadProgress};
use crate::runtime::{RayonSpawner, TaskHandle, TaskSpawner};
use crate::staging::{StagingAllocation, StagingPacker};
use crate::texture::{DecodedImage, TextureDecoder};
use crate::texture_resource::TextureResource;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Wall-clock breakdown of one load, in milliseconds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadTimings {
    /// Geometry parse on the calling thread
    pub mesh_ms: f64,
    /// From the end of geometry to a published texture table
    pub texture_ms: f64,
    pub total_ms: f64,
    /// Sum of every decode task's own duration
    pub decode_ms: f64,
    /// Decode time hidden behind the geometry parse
    pub overlap_saved_ms: f64,
}

impl LoadTimings {
    fn new(mesh: Duration, texture: Duration, total: Duration, decode: Duration) -> Self {
        let mesh_ms = millis(mesh);
        let decode_ms = millis(decode);
        Self {
            mesh_ms,
            texture_ms: millis(texture),
            total_ms: millis(total),
            decode_ms,
            overlap_saved_ms: mesh_ms.min(decode_ms),
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Counts and timings of a completed load
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub path: PathBuf,
    pub vertex_count: usize,
    pub index_count: usize,
    pub material_count: usize,
    /// Length of the texture array (fallbacks included)
    pub texture_count: usize,
    /// Material slots filled from a decoded file
    pub decoded_textures: usize,
    /// Material slots filled with a fallback colour
    pub fallback_textures: usize,
    /// Bytes packed into the shared staging buffer
    pub staging_bytes: u64,
    /// Submissions made during this load
    pub submissions: u64,
    pub timings: LoadTimings,
}

/// Linear-blit capability of the two colour formats, queried once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitSupport {
    pub srgb: bool,
    pub unorm: bool,
}

impl BlitSupport {
    pub fn query<G: GpuDevice>(gpu: &G) -> Self {
        let support = Self {
            srgb: gpu.supports_linear_blit(GpuTextureFormat::Rgba8Srgb),
            unorm: gpu.supports_linear_blit(GpuTextureFormat::Rgba8Unorm),
        };
        log::debug!("Linear blit support: {support:?}");
        support
    }

    pub fn supports(&self, format: GpuTextureFormat) -> bool {
        match format {
            GpuTextureFormat::Rgba8Srgb => self.srgb,
            GpuTextureFormat::Rgba8Unorm => self.unorm,
        }
    }
}

/// Vertex and index buffers of the loaded scene
#[derive(Debug)]
pub struct GpuMesh<G: GpuDevice> {
    pub vertex_buffer: G::Buffer,
    pub index_buffer: G::Buffer,
    pub vertex_count: u32,
    pub index_count: u32,
}

impl<G: GpuDevice> GpuMesh<G> {
    /// Upload a mesh; `None` when it has no triangles
    pub fn upload(gpu: &G, mesh: &MeshRecord) -> GpuResult<Option<Self>> {
        if mesh.vertices.is_empty() || mesh.indices.is_empty() {
            return Ok(None);
        }
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&mesh.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&mesh.indices);

        let vertex_buffer = gpu.allocate_buffer(vertex_bytes.len(), BufferUsage::Vertex)?;
        let index_buffer = match gpu.allocate_buffer(index_bytes.len(), BufferUsage::Index) {
            Ok(buffer) => buffer,
            Err(e) => {
                gpu.destroy_buffer(vertex_buffer);
                return Err(e);
            }
        };
        let written = gpu
            .upload_buffer_data(&vertex_buffer, 0, vertex_bytes)
            .and_then(|_| gpu.upload_buffer_data(&index_buffer, 0, index_bytes));
        if let Err(e) = written {
            gpu.destroy_buffer(vertex_buffer);
            gpu.destroy_buffer(index_buffer);
            return Err(e);
        }

        Ok(Some(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: mesh.vertices.len() as u32,
            index_count: mesh.indices.len() as u32,
        }))
    }

    pub fn destroy(self, gpu: &G) {
        gpu.destroy_buffer(self.vertex_buffer);
        gpu.destroy_buffer(self.index_buffer);
    }
}

struct TimedDecode {
    image: DecodedImage,
    elapsed: Duration,
}

fn decode_timed(decoder: TextureDecoder, path: &Path) -> TimedDecode {
    let start = Instant::now();
    let image = decoder.decode(path);
    TimedDecode {
        image,
        elapsed: start.elapsed(),
    }
}

fn load_failure(context: &str, error: impl Display) -> AssetError {
    AssetError::LoadFailure(format!("{context}: {error}"))
}

/// Per-texture GPU failures that a fallback can stand in for
fn is_recoverable(error: &AssetError) -> bool {
    matches!(error, AssetError::Gpu(e) if !e.is_fatal())
}

fn escalate(context: &str, error: AssetError) -> AssetError {
    match error {
        AssetError::Gpu(e) => load_failure(context, e),
        other => other,
    }
}

/// Everything a successful load publishes
struct LoadOutput<G: GpuDevice> {
    textures: Vec<TextureResource<G>>,
    mesh: Option<GpuMesh<G>>,
    materials: Vec<MaterialInfo>,
    report: LoadReport,
}

/// Owns the GPU resources of one loaded scene
///
/// # Example
/// ```ignore
/// let mut manager = ResourceManager::new(gpu, RayonSpawner::new(4)?, PipelineConfig::default());
/// let report = manager.load_initial("assets/sponza.obj")?;
/// let slot = manager.bindless().resolve(vertex.material_index, TextureChannel::Diffuse);
/// ```
#[derive(Debug)]
pub struct ResourceManager<G: GpuDevice, S: TaskSpawner> {
    gpu: G,
    spawner: S,
    config: PipelineConfig,
    decoder: TextureDecoder,
    packer: StagingPacker,
    blit_support: BlitSupport,
    textures: Vec<TextureResource<G>>,
    bindless: BindlessTable<G>,
    mesh: Option<GpuMesh<G>>,
    materials: Vec<MaterialInfo>,
    report: Option<LoadReport>,
    metrics: LoadMetricsHandle,
    progress: LoadProgress,
}

impl<G: GpuDevice> ResourceManager<G, RayonSpawner> {
    /// Manager decoding on a rayon pool sized by `config.decode_threads`
    pub fn with_rayon(gpu: G, config: PipelineConfig) -> Result<Self> {
        let spawner = RayonSpawner::from_config(&config)?;
        Ok(Self::new(gpu, spawner, config))
    }
}

impl<G: GpuDevice, S: TaskSpawner> ResourceManager<G, S> {
    pub fn new(gpu: G, spawner: S, config: PipelineConfig) -> Self {
        let blit_support = BlitSupport::query(&gpu);
        log::info!(
            "Resource manager on {} with {} decode ({} workers)",
            gpu.backend_name(),
            spawner.runtime_name(),
            spawner.worker_count()
        );
        Self {
            gpu,
            spawner,
            config,
            decoder: TextureDecoder::new(),
            packer: StagingPacker::new(),
            blit_support,
            textures: Vec::new(),
            bindless: BindlessTable::new(),
            mesh: None,
            materials: Vec::new(),
            report: None,
            metrics: LoadMetricsHandle::new(),
            progress: LoadProgress::new(),
        }
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn blit_support(&self) -> BlitSupport {
        self.blit_support
    }

    /// Finalized textures in slot order
    pub fn textures(&self) -> &[TextureResource<G>] {
        &self.textures
    }

    pub fn bindless(&self) -> &BindlessTable<G> {
        &self.bindless
    }

    pub fn mesh(&self) -> Option<&GpuMesh<G>> {
        self.mesh.as_ref()
    }

    /// Material table of the loaded scene
    pub fn materials(&self) -> &[MaterialInfo] {
        &self.materials
    }

    pub fn last_report(&self) -> Option<&LoadReport> {
        self.report.as_ref()
    }

    pub fn metrics(&self) -> &LoadMetricsHandle {
        &self.metrics
    }

    /// Shared handle other threads can poll during a load
    pub fn progress(&self) -> LoadProgress {
        self.progress.clone()
    }

    pub fn is_loaded(&self) -> bool {
        !self.textures.is_empty()
    }

    /// Load a scene into an empty manager
    ///
    /// Calling this with a scene already loaded behaves like [`reload`](Self::reload).
    pub fn load_initial(&mut self, path: impl AsRef<Path>) -> Result<&LoadReport> {
        if self.is_loaded() {
            return self.reload(path);
        }
        self.load(path.as_ref(), false)
    }

    /// Discard every resource and load `path` from scratch
    pub fn reload(&mut self, path: impl AsRef<Path>) -> Result<&LoadReport> {
        let path = path.as_ref();
        log::info!("Reloading {}", path.display());
        self.gpu
            .wait_idle()
            .map_err(|e| load_failure("waiting for device idle", e))?;
        self.release_all();
        self.load(path, true)
    }

    fn load(&mut self, path: &Path, reload: bool) -> Result<&LoadReport> {
        match self.run(path) {
            Ok(output) => {
                self.bindless.allocate(output.textures.len() as u32);
                for (slot, texture) in output.textures.iter().enumerate() {
                    if let (Some(view), Some(sampler)) = (texture.view(), texture.sampler()) {
                        self.bindless.bind(
                            slot as u32,
                            BindlessBinding {
                                view: view.clone(),
                                sampler: sampler.clone(),
                            },
                        )?;
                    }
                }
                self.textures = output.textures;
                self.mesh = output.mesh;
                self.materials = output.materials;
                self.metrics.record_load(&output.report, reload);
                self.progress.set(LoadPhase::Completed);

                let report = self.report.insert(output.report);
                log::info!(
                    "Loaded {} in {:.1} ms ({} textures, {} decoded, {} fallback, {:.1} ms decode overlapped)",
                    report.path.display(),
                    report.timings.total_ms,
                    report.texture_count,
                    report.decoded_textures,
                    report.fallback_textures,
                    report.timings.overlap_saved_ms
                );
                Ok(report)
            }
            Err(e) => {
                log::warn!("Loading {} failed: {e}", path.display());
                self.metrics.record_failure();
                self.progress.set(LoadPhase::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Steps 1-7; on error every object created so far is released
    fn run(&self, path: &Path) -> Result<LoadOutput<G>> {
        let total_start = Instant::now();

        self.progress.set(LoadPhase::PreParsing);
        let loader = loader_for_path(path, &self.config)?;
        let pre_parsed = loader.pre_parse_texture_paths(path);
        log::debug!(
            "{} pre-parse of {} found {} materials",
            loader.format_name(),
            path.display(),
            pre_parsed.len()
        );
        let tasks = self.spawn_decodes(&pre_parsed);

        self.progress.set(LoadPhase::LoadingGeometry);
        let mesh_start = Instant::now();
        let record = match loader.load(path).and_then(|r| r.validate(path).map(|_| r)) {
            Ok(record) => record,
            Err(e) => {
                // No cancellation; wait for the workers before bailing out
                for (_, handle) in tasks {
                    let _ = handle.join();
                }
                return Err(e);
            }
        };
        let mesh_time = mesh_start.elapsed();
        log::debug!(
            "Geometry: {} vertices, {} indices, {} materials",
            record.vertex_count(),
            record.index_count(),
            record.materials.len()
        );

        let texture_start = Instant::now();
        let mut textures = Vec::with_capacity(slot_count(record.materials.len()) as usize);
        let mut report = LoadReport {
            path: path.to_path_buf(),
            vertex_count: record.vertex_count(),
            index_count: record.index_count(),
            material_count: record.materials.len(),
            ..Default::default()
        };

        let built = self.build_textures(&record.materials, tasks, &mut textures, &mut report);
        let decode_time = match built {
            Ok(decode_time) => decode_time,
            Err(e) => {
                self.destroy_textures(&mut textures);
                return Err(e);
            }
        };

        let mesh = match GpuMesh::upload(&self.gpu, &record) {
            Ok(mesh) => mesh,
            Err(e) => {
                self.destroy_textures(&mut textures);
                return Err(load_failure("uploading mesh", e));
            }
        };

        report.texture_count = textures.len();
        report.timings = LoadTimings::new(
            mesh_time,
            texture_start.elapsed(),
            total_start.elapsed(),
            decode_time,
        );

        Ok(LoadOutput {
            textures,
            mesh,
            materials: record.materials,
            report,
        })
    }

    /// One task per distinct, non-empty, existing path
    fn spawn_decodes(&self, materials: &[MaterialInfo]) -> Vec<(PathBuf, TaskHandle<TimedDecode>)> {
        let mut seen = HashSet::new();
        let mut tasks = Vec::new();
        for (_, path) in materials.iter().flat_map(MaterialInfo::paths) {
            if path.as_os_str().is_empty() || !seen.insert(path.to_path_buf()) {
                continue;
            }
            if !path.exists() {
                log::warn!("Texture {} does not exist", path.display());
                continue;
            }
            let decoder = self.decoder;
            let owned = path.to_path_buf();
            tasks.push((
                path.to_path_buf(),
                self.spawner.spawn(move || decode_timed(decoder, &owned)),
            ));
        }
        log::debug!("Started {} decode tasks", tasks.len());
        tasks
    }

    /// Steps 4-6; returns the summed decode time
    fn build_textures(
        &self,
        materials: &[MaterialInfo],
        tasks: Vec<(PathBuf, TaskHandle<TimedDecode>)>,
        textures: &mut Vec<TextureResource<G>>,
        report: &mut LoadReport,
    ) -> Result<Duration> {
        let anisotropy = Some(self.config.max_anisotropy);

        for channel in TextureChannel::ALL {
            let mut fallback = TextureResource::solid(
                format!("fallback {channel}"),
                channel.fallback_color(),
                channel.is_srgb(),
            );
            let built = fallback.build_immediate(&self.gpu, anisotropy);
            report.submissions += 1;
            built.map_err(|e| escalate("building fallback textures", e))?;
            textures.push(fallback);
        }

        let (decoded, decode_time) = self.join_decodes(materials, tasks);

        // Each slot gets its own region even when two slots share a file
        let slots: Vec<(SlotOwner, Option<&DecodedImage>)> = slot_layout(materials.len())
            .skip(TextureChannel::ALL.len())
            .map(|owner| {
                let image = match owner {
                    SlotOwner::Material { material, channel } => materials[material]
                        .path(channel)
                        .and_then(|p| decoded.get(p))
                        .filter(|image| image.is_valid()),
                    SlotOwner::Fallback(_) => None,
                };
                (owner, image)
            })
            .collect();

        let entries: Vec<(&DecodedImage, bool)> = slots
            .iter()
            .filter_map(|(owner, image)| image.map(|i| (i, owner.channel().is_srgb())))
            .collect();

        self.progress.set(LoadPhase::Uploading);
        let staging = self
            .packer
            .pack(&self.gpu, &entries)
            .map_err(|e| load_failure("packing staging buffer", e))?;
        report.staging_bytes = staging.as_ref().map_or(0, StagingAllocation::total_size);

        let batch = self.upload_batch(materials, &slots, staging.as_ref(), textures, report);
        if let Some(staging) = staging {
            staging.release(&self.gpu);
        }
        batch?;
        Ok(decode_time)
    }

    /// Step 5: join every task, then decode inline whatever the pre-parse missed
    fn join_decodes(
        &self,
        materials: &[MaterialInfo],
        tasks: Vec<(PathBuf, TaskHandle<TimedDecode>)>,
    ) -> (HashMap<PathBuf, DecodedImage>, Duration) {
        let total = tasks.len();
        let mut decoded = HashMap::with_capacity(total);
        let mut decode_time = Duration::ZERO;

        self.progress.set(LoadPhase::JoiningDecodes(0, total));
        for (done, (path, handle)) in tasks.into_iter().enumerate() {
            match handle.join() {
                Ok(timed) => {
                    decode_time += timed.elapsed;
                    decoded.insert(path, timed.image);
                }
                Err(e) => {
                    log::warn!("Decode task for {} failed: {e}", path.display());
                    decoded.insert(path.clone(), DecodedImage::invalid(path));
                }
            }
            self.progress.set(LoadPhase::JoiningDecodes(done + 1, total));
        }

        for (_, path) in materials.iter().flat_map(MaterialInfo::paths) {
            if decoded.contains_key(path) {
                continue;
            }
            let image = if path.exists() {
                log::debug!("Decoding {} inline", path.display());
                let timed = decode_timed(self.decoder, path);
                decode_time += timed.elapsed;
                timed.image
            } else {
                DecodedImage::invalid(path)
            };
            decoded.insert(path.to_path_buf(), image);
        }

        (decoded, decode_time)
    }

    /// Step 6: one stream holding every upload, then every mip chain
    fn upload_batch(
        &self,
        materials: &[MaterialInfo],
        slots: &[(SlotOwner, Option<&DecodedImage>)],
        staging: Option<&StagingAllocation<G>>,
        textures: &mut Vec<TextureResource<G>>,
        report: &mut LoadReport,
    ) -> Result<()> {
        let anisotropy = Some(self.config.max_anisotropy);
        let first_material_slot = textures.len();
        let mut region_index = 0;

        for (owner, image) in slots {
            let SlotOwner::Material { material, channel } = *owner else {
                continue;
            };
            let label = format!("material {material} {channel}");

            let staged = match (image, staging) {
                (Some(image), Some(staging)) => {
                    let region = staging.region(region_index);
                    region_index += 1;
                    region.map(|region| {
                        TextureResource::from_staging(
                            label.clone(),
                            image.width,
                            image.height,
                            staging,
                            region,
                            self.config.generate_mipmaps,
                        )
                    })
                }
                _ => None,
            };

            let texture = match staged {
                Some(mut texture) => {
                    if texture.mip_levels() > 1 && !self.blit_support.supports(texture.format()) {
                        return Err(AssetError::LoadFailure(format!(
                            "{:?} does not support linear blits; cannot generate mipmaps for {label}",
                            texture.format()
                        )));
                    }
                    match texture.prepare(&self.gpu, anisotropy) {
                        Ok(()) => {
                            report.decoded_textures += 1;
                            Some(texture)
                        }
                        Err(e) if is_recoverable(&e) => {
                            log::warn!("Falling back for {label}: {e}");
                            None
                        }
                        Err(e) => return Err(escalate(&format!("creating {label}"), e)),
                    }
                }
                None => {
                    if let Some(path) = materials[material].path(channel) {
                        log::warn!("Using {channel} fallback for {}", path.display());
                    }
                    None
                }
            };

            let texture = match texture {
                Some(texture) => texture,
                None => {
                    let mut fallback =
                        TextureResource::solid(label, channel.fallback_color(), channel.is_srgb());
                    fallback
                        .prepare(&self.gpu, anisotropy)
                        .map_err(|e| escalate("creating fallback texture", e))?;
                    report.fallback_textures += 1;
                    fallback
                }
            };
            textures.push(texture);
        }

        let batch = &mut textures[first_material_slot..];
        if batch.is_empty() {
            return Ok(());
        }

        let mut stream = CommandStream::new(format!("material textures ({})", batch.len()));
        for texture in batch.iter_mut() {
            texture.record_upload(&mut stream)?;
        }
        for texture in batch.iter_mut() {
            texture.record_mipmaps(&mut stream)?;
        }

        report.submissions += 1;
        self.gpu
            .submit_and_wait(&stream)
            .map_err(|e: GpuError| load_failure("submitting texture uploads", e))?;

        for texture in batch.iter_mut() {
            texture.finalize(&self.gpu)?;
        }
        log::debug!(
            "Uploaded {} material textures in one submission ({} commands)",
            batch.len(),
            stream.len()
        );
        Ok(())
    }

    fn destroy_textures(&self, textures: &mut Vec<TextureResource<G>>) {
        for mut texture in textures.drain(..) {
            texture.destroy(&self.gpu);
        }
    }

    /// Drop every published resource; the device must be idle
    fn release_all(&mut self) {
        self.bindless.clear();
        let mut textures = std::mem::take(&mut self.textures);
        self.destroy_textures(&mut textures);
        if let Some(mesh) = self.mesh.take() {
            mesh.destroy(&self.gpu);
        }
        self.materials.clear();
        self.report = None;
    }
}

impl<G: GpuDevice, S: TaskSpawner> Drop for ResourceManager<G, S> {
    fn drop(&mut self) {
        if !self.is_loaded() && self.mesh.is_none() {
            return;
        }
        if let Err(e) = self.gpu.wait_idle() {
            log::warn!("Device not idle while releasing resources: {e}");
        }
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{ImageLayout, MockGpu};
    use crate::runtime::MockSpawner;
    use std::fs;

    fn write_png(path: &Path, width: u32, height: u32, rgba: [u8; 4]) {
        image::RgbaImage::from_pixel(width, height, image::Rgba(rgba))
            .save(path)
            .unwrap();
    }

    /// Two quads, material 0 with diffuse+normal, material 1 untextured
    fn two_material_scene(dir: &Path) -> PathBuf {
        write_png(&dir.join("diffuse.png"), 4, 4, [200, 10, 10, 255]);
        write_png(&dir.join("normal.png"), 2, 2, [128, 128, 255, 255]);
        fs::write(
            dir.join("scene.mtl"),
            "newmtl first\nmap_Kd diffuse.png\nmap_Bump normal.png\n\nnewmtl second\nKd 1 1 1\n",
        )
        .unwrap();
        let obj = dir.join("scene.obj");
        fs::write(
            &obj,
            "mtllib scene.mtl\n\
             v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
             vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
             usemtl first\nf 1/1 2/2 3/3\n\
             usemtl second\nf 1/1 3/3 4/4\n",
        )
        .unwrap();
        obj
    }

    fn manager(gpu: &MockGpu) -> ResourceManager<MockGpu, MockSpawner> {
        ResourceManager::new(gpu.clone(), MockSpawner::new(), PipelineConfig::default())
    }

    #[test]
    fn test_two_material_slot_layout() {
        let dir = tempfile::tempdir().unwrap();
        let obj = two_material_scene(dir.path());
        let gpu = MockGpu::new();
        let mut manager = manager(&gpu);

        let report = manager.load_initial(&obj).unwrap().clone();
        assert_eq!(report.texture_count, 12);
        assert_eq!(report.decoded_textures, 2);
        assert_eq!(report.fallback_textures, 6);
        assert_eq!(report.staging_bytes, 4 * 4 * 4 + 2 * 2 * 4);
        // Four fallbacks plus one batch
        assert_eq!(report.submissions, 5);
        assert_eq!(gpu.submissions(), 5);

        let textures = manager.textures();
        assert_eq!((textures[4].width(), textures[4].height()), (4, 4));
        assert_eq!(textures[4].mip_levels(), 3);
        assert_eq!(textures[5].format(), GpuTextureFormat::Rgba8Unorm);
        let pixel = |slot: usize| textures[slot].image().unwrap().level_pixels(0).unwrap();
        assert_eq!(pixel(6), vec![0, 0, 0, 255]);
        assert_eq!(pixel(7), vec![128, 128, 128, 255]);
        assert_eq!(pixel(8), vec![255, 255, 255, 255]);
        assert_eq!(pixel(9), vec![128, 128, 255, 255]);
        assert_eq!(&pixel(4)[..4], &[200, 10, 10, 255]);

        assert!(manager.bindless().is_complete());
        assert_eq!(manager.bindless().len(), 12);
        assert!(textures.iter().all(|t| t.is_finalized()));
        assert_eq!(
            textures[4].image().unwrap().level_layout(2),
            Some(ImageLayout::ShaderReadOnly)
        );
        assert_eq!(manager.progress().phase(), LoadPhase::Completed);
    }

    #[test]
    fn test_staging_is_released() {
        let dir = tempfile::tempdir().unwrap();
        let obj = two_material_scene(dir.path());
        let gpu = MockGpu::new();
        let mut manager = manager(&gpu);
        manager.load_initial(&obj).unwrap();

        // Only the vertex and index buffers survive the load
        assert_eq!(gpu.live_objects().buffers, 2);
        assert_eq!(gpu.live_objects().images, 12);
        drop(manager);
        assert_eq!(gpu.live_objects().total(), 0);
    }

    #[test]
    fn test_unknown_extension() {
        let gpu = MockGpu::new();
        let mut manager = manager(&gpu);
        let err = manager.load_initial("scene.fbx").unwrap_err();
        assert!(matches!(err, AssetError::UnsupportedFormat(_)));
        assert!(manager.progress().is_failed());
        assert_eq!(manager.metrics().failure_count(), 1);
        assert_eq!(gpu.live_objects().total(), 0);
    }

    #[test]
    fn test_parse_error_joins_tasks_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("diffuse.png"), 1, 1, [1, 2, 3, 255]);
        fs::write(dir.path().join("bad.mtl"), "newmtl m\nmap_Kd diffuse.png\n").unwrap();
        let obj = dir.path().join("bad.obj");
        fs::write(&obj, "mtllib bad.mtl\nv 0 0 0\nusemtl m\nf 1 7 9\n").unwrap();

        let gpu = MockGpu::new();
        let spawner = MockSpawner::deferred();
        let mut manager = ResourceManager::new(gpu.clone(), spawner.clone(), PipelineConfig::default());
        assert!(manager.load_initial(&obj).is_err());
        assert_eq!(spawner.spawn_count(), 1);
        assert_eq!(gpu.live_objects().total(), 0);
    }

    #[test]
    fn test_blit_support_is_queried_once() {
        let gpu = MockGpu::new();
        let manager = manager(&gpu);
        assert_eq!(
            manager.blit_support(),
            BlitSupport {
                srgb: true,
                unorm: true
            }
        );
        assert!(!manager.is_loaded());
    }

    #[test]
    fn test_timings_are_consistent() {
        let timings = LoadTimings::new(
            Duration::from_millis(40),
            Duration::from_millis(10),
            Duration::from_millis(55),
            Duration::from_millis(25),
        );
        assert_eq!(timings.mesh_ms, 40.0);
        assert_eq!(timings.decode_ms, 25.0);
        assert_eq!(timings.overlap_saved_ms, 25.0);
    }
}
