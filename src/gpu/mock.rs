//! Mock GPU implementation for testing
//!
//! Provides a mock GPU that stores buffers and every mip level of every image
//! in memory and executes recorded command streams on the CPU, so uploads,
//! layout transitions and mip blits can be checked without GPU hardware.
//! Failure injection covers oversize images, exhausted memory, device loss
//! and formats without linear-blit support.

use super::{
    BufferUsage, BufferWrite, CommandStream, GpuCommand, GpuDevice, GpuError, GpuResult,
    GpuTextureFormat, ImageLayout, MipRange, SamplerDescriptor, TextureDescriptor,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Counter for generating unique buffer/image IDs
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Behaviour switches for [`MockGpu`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockGpuConfig {
    /// Report linear-blit support for every format
    pub linear_blit: bool,
    /// Images wider or taller than this fail with `TextureCreationFailed`
    pub max_image_dimension: Option<u32>,
    /// Allocations beyond this many live bytes fail with `OutOfMemory`
    pub memory_budget: Option<u64>,
}

impl Default for MockGpuConfig {
    fn default() -> Self {
        Self {
            linear_blit: true,
            max_image_dimension: None,
            memory_budget: None,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    buffer_allocations: AtomicU64,
    map_calls: AtomicU64,
    submissions: AtomicU64,
    executed_commands: AtomicU64,
    wait_idle_calls: AtomicU64,
    live_buffers: AtomicU64,
    live_images: AtomicU64,
    live_views: AtomicU64,
    live_samplers: AtomicU64,
}

/// Mock GPU device for testing
///
/// Clones share all state, so a test can keep one handle for inspection
/// while the pipeline owns another.
#[derive(Clone, Debug, Default)]
pub struct MockGpu {
    /// Track total allocated memory for testing
    allocated_bytes: Arc<AtomicU64>,
    counters: Arc<Counters>,
    device_lost: Arc<AtomicBool>,
    config: MockGpuConfig,
}

impl MockGpu {
    /// Create a new mock GPU device
    pub fn new() -> Self {
        Self::with_config(MockGpuConfig::default())
    }

    /// Create a mock GPU with failure injection
    pub fn with_config(config: MockGpuConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Get total allocated memory (for testing)
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes.load(Ordering::Relaxed)
    }

    /// Buffers allocated since creation
    pub fn buffer_allocations(&self) -> u64 {
        self.counters.buffer_allocations.load(Ordering::Relaxed)
    }

    /// Mapped write calls since creation
    pub fn map_calls(&self) -> u64 {
        self.counters.map_calls.load(Ordering::Relaxed)
    }

    /// Command streams submitted since creation
    pub fn submissions(&self) -> u64 {
        self.counters.submissions.load(Ordering::Relaxed)
    }

    /// Commands executed across all submissions
    pub fn executed_commands(&self) -> u64 {
        self.counters.executed_commands.load(Ordering::Relaxed)
    }

    pub fn wait_idle_calls(&self) -> u64 {
        self.counters.wait_idle_calls.load(Ordering::Relaxed)
    }

    /// Buffers, images, views and samplers not yet destroyed
    pub fn live_objects(&self) -> LiveObjects {
        LiveObjects {
            buffers: self.counters.live_buffers.load(Ordering::Relaxed),
            images: self.counters.live_images.load(Ordering::Relaxed),
            views: self.counters.live_views.load(Ordering::Relaxed),
            samplers: self.counters.live_samplers.load(Ordering::Relaxed),
        }
    }

    /// Make every later submission fail with `DeviceLost`
    pub fn lose_device(&self) {
        self.device_lost.store(true, Ordering::SeqCst);
    }

    fn reserve(&self, bytes: u64) -> GpuResult<()> {
        let previous = self.allocated_bytes.fetch_add(bytes, Ordering::Relaxed);
        if let Some(budget) = self.config.memory_budget {
            if previous + bytes > budget {
                self.allocated_bytes.fetch_sub(bytes, Ordering::Relaxed);
                return Err(GpuError::OutOfMemory);
            }
        }
        Ok(())
    }

    fn release(&self, bytes: u64) {
        self.allocated_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    fn execute(&self, command: &GpuCommand<Self>) -> GpuResult<()> {
        match command {
            GpuCommand::Transition {
                image,
                mips,
                from,
                to,
            } => image.transition(*mips, *from, *to),
            GpuCommand::CopyBufferToImage {
                buffer,
                buffer_offset,
                image,
                width,
                height,
            } => {
                let data = buffer.data.read();
                let start = *buffer_offset as usize;
                let end = start + (*width as usize * *height as usize * 4);
                let texels = data.get(start..end).ok_or_else(|| {
                    GpuError::SubmissionFailed(format!(
                        "copy range {start}..{end} exceeds buffer of {} bytes",
                        data.len()
                    ))
                })?;
                image.write_base_level(*width, *height, texels)
            }
            GpuCommand::BlitMip {
                image,
                src_level,
                src_extent,
                dst_extent,
            } => image.blit(*src_level, *src_extent, *dst_extent),
        }
    }
}

/// Snapshot of undestroyed mock objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiveObjects {
    pub buffers: u64,
    pub images: u64,
    pub views: u64,
    pub samplers: u64,
}

impl LiveObjects {
    pub fn total(&self) -> u64 {
        self.buffers + self.images + self.views + self.samplers
    }
}

/// Mock buffer that stores data in memory
#[derive(Clone, Debug)]
pub struct MockBuffer {
    /// Unique identifier
    pub id: u64,
    /// Buffer data
    pub data: Arc<RwLock<Vec<u8>>>,
    /// Buffer usage
    pub usage: BufferUsage,
}

impl MockBuffer {
    /// Create a new mock buffer
    pub fn new(size: usize, usage: BufferUsage) -> Self {
        Self {
            id: next_id(),
            data: Arc::new(RwLock::new(vec![0u8; size])),
            usage,
        }
    }

    /// Get the size of the buffer
    pub fn size(&self) -> usize {
        self.data.read().len()
    }

    /// Read buffer data
    pub fn read_data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

#[derive(Debug, Clone)]
struct MockLevel {
    width: u32,
    height: u32,
    layout: ImageLayout,
    pixels: Vec<u8>,
}

/// Mock image holding every mip level in memory
#[derive(Clone, Debug)]
pub struct MockImage {
    /// Unique identifier
    pub id: u64,
    /// Texture width
    pub width: u32,
    /// Texture height
    pub height: u32,
    /// Texture format
    pub format: GpuTextureFormat,
    /// Number of mip levels
    pub mip_levels: u32,
    levels: Arc<RwLock<Vec<MockLevel>>>,
}

impl MockImage {
    fn new(desc: &TextureDescriptor) -> Self {
        let levels = (0..desc.mip_levels)
            .map(|level| {
                let width = (desc.width >> level).max(1);
                let height = (desc.height >> level).max(1);
                MockLevel {
                    width,
                    height,
                    layout: ImageLayout::Undefined,
                    pixels: vec![0; width as usize * height as usize * 4],
                }
            })
            .collect();
        Self {
            id: next_id(),
            width: desc.width,
            height: desc.height,
            format: desc.format,
            mip_levels: desc.mip_levels,
            levels: Arc::new(RwLock::new(levels)),
        }
    }

    fn byte_size(&self) -> u64 {
        self.levels.read().iter().map(|l| l.pixels.len() as u64).sum()
    }

    /// Pixels of one mip level
    pub fn level_pixels(&self, level: u32) -> Option<Vec<u8>> {
        self.levels.read().get(level as usize).map(|l| l.pixels.clone())
    }

    /// Current layout of one mip level
    pub fn level_layout(&self, level: u32) -> Option<ImageLayout> {
        self.levels.read().get(level as usize).map(|l| l.layout)
    }

    /// Extent of one mip level
    pub fn level_extent(&self, level: u32) -> Option<(u32, u32)> {
        self.levels
            .read()
            .get(level as usize)
            .map(|l| (l.width, l.height))
    }

    fn transition(&self, mips: MipRange, from: ImageLayout, to: ImageLayout) -> GpuResult<()> {
        let mut levels = self.levels.write();
        for level in mips.levels() {
            let entry = levels.get_mut(level as usize).ok_or_else(|| {
                GpuError::SubmissionFailed(format!("image {} has no mip {level}", self.id))
            })?;
            if from != ImageLayout::Undefined && entry.layout != from {
                return Err(GpuError::SubmissionFailed(format!(
                    "image {} mip {level} is {:?}, barrier expects {:?}",
                    self.id, entry.layout, from
                )));
            }
            entry.layout = to;
        }
        Ok(())
    }

    fn write_base_level(&self, width: u32, height: u32, texels: &[u8]) -> GpuResult<()> {
        let mut levels = self.levels.write();
        let base = levels
            .first_mut()
            .ok_or_else(|| GpuError::SubmissionFailed("image has no levels".into()))?;
        if base.layout != ImageLayout::TransferDst {
            return Err(GpuError::SubmissionFailed(format!(
                "copy into image {} while mip 0 is {:?}",
                self.id, base.layout
            )));
        }
        if (base.width, base.height) != (width, height) {
            return Err(GpuError::SubmissionFailed(format!(
                "copy extent {width}x{height} does not match {}x{}",
                base.width, base.height
            )));
        }
        base.pixels.copy_from_slice(texels);
        Ok(())
    }

    fn blit(&self, src_level: u32, src_extent: (u32, u32), dst_extent: (u32, u32)) -> GpuResult<()> {
        let mut levels = self.levels.write();
        let dst_level = src_level as usize + 1;
        if dst_level >= levels.len() {
            return Err(GpuError::SubmissionFailed(format!(
                "blit target mip {dst_level} out of range"
            )));
        }
        let (head, tail) = levels.split_at_mut(dst_level);
        let src = &head[src_level as usize];
        let dst = &mut tail[0];

        if src.layout != ImageLayout::TransferSrc || dst.layout != ImageLayout::TransferDst {
            return Err(GpuError::SubmissionFailed(format!(
                "blit mip {src_level} ({:?}) -> {dst_level} ({:?})",
                src.layout, dst.layout
            )));
        }
        if (src.width, src.height) != src_extent || (dst.width, dst.height) != dst_extent {
            return Err(GpuError::SubmissionFailed(format!(
                "blit extents {src_extent:?} -> {dst_extent:?} do not match the image"
            )));
        }

        box_filter(&src.pixels, src_extent, &mut dst.pixels, dst_extent);
        Ok(())
    }
}

/// Average the source texels covered by each destination texel
fn box_filter(src: &[u8], (sw, sh): (u32, u32), dst: &mut [u8], (dw, dh): (u32, u32)) {
    for y in 0..dh {
        let y0 = y * sh / dh;
        let y1 = ((y + 1) * sh / dh).max(y0 + 1);
        for x in 0..dw {
            let x0 = x * sw / dw;
            let x1 = ((x + 1) * sw / dw).max(x0 + 1);
            let mut sum = [0u32; 4];
            for sy in y0..y1 {
                for sx in x0..x1 {
                    let i = ((sy * sw + sx) * 4) as usize;
                    for c in 0..4 {
                        sum[c] += src[i + c] as u32;
                    }
                }
            }
            let count = (x1 - x0) * (y1 - y0);
            let o = ((y * dw + x) * 4) as usize;
            for c in 0..4 {
                dst[o + c] = ((sum[c] + count / 2) / count) as u8;
            }
        }
    }
}

/// Mock image view
#[derive(Clone, Debug)]
pub struct MockImageView {
    pub id: u64,
    /// Image this view reads
    pub image_id: u64,
    pub mip_levels: u32,
}

/// Mock sampler
#[derive(Clone, Debug)]
pub struct MockSampler {
    pub id: u64,
    pub desc: SamplerDescriptor,
}

impl GpuDevice for MockGpu {
    type Buffer = MockBuffer;
    type Image = MockImage;
    type ImageView = MockImageView;
    type Sampler = MockSampler;

    fn allocate_buffer(&self, size: usize, usage: BufferUsage) -> GpuResult<Self::Buffer> {
        if size == 0 {
            return Err(GpuError::InvalidSize(size));
        }

        self.reserve(size as u64)?;
        self.counters.buffer_allocations.fetch_add(1, Ordering::Relaxed);
        self.counters.live_buffers.fetch_add(1, Ordering::Relaxed);
        Ok(MockBuffer::new(size, usage))
    }

    fn write_buffer_regions(&self, buffer: &Self::Buffer, writes: &[BufferWrite<'_>]) -> GpuResult<()> {
        self.counters.map_calls.fetch_add(1, Ordering::Relaxed);
        let mut buf_data = buffer.data.write();

        for write in writes {
            let end = write.offset + write.data.len();
            if end > buf_data.len() {
                return Err(GpuError::UploadFailed(format!(
                    "Data exceeds buffer size: offset={}, data_len={}, buffer_size={}",
                    write.offset,
                    write.data.len(),
                    buf_data.len()
                )));
            }
            buf_data[write.offset..end].copy_from_slice(write.data);
        }
        Ok(())
    }

    fn create_image(&self, desc: &TextureDescriptor) -> GpuResult<Self::Image> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(GpuError::TextureCreationFailed(
                "Invalid texture dimensions".to_string(),
            ));
        }
        if let Some(max) = self.config.max_image_dimension {
            if desc.width > max || desc.height > max {
                return Err(GpuError::TextureCreationFailed(format!(
                    "{}x{} exceeds the {max} pixel limit",
                    desc.width, desc.height
                )));
            }
        }

        let image = MockImage::new(desc);
        self.reserve(image.byte_size())?;
        self.counters.live_images.fetch_add(1, Ordering::Relaxed);
        log::trace!("Mock image {} created ({}x{}, {} mips)", image.id, desc.width, desc.height, desc.mip_levels);
        Ok(image)
    }

    fn create_image_view(&self, image: &Self::Image, desc: &TextureDescriptor) -> GpuResult<Self::ImageView> {
        self.counters.live_views.fetch_add(1, Ordering::Relaxed);
        Ok(MockImageView {
            id: next_id(),
            image_id: image.id,
            mip_levels: desc.mip_levels,
        })
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> GpuResult<Self::Sampler> {
        self.counters.live_samplers.fetch_add(1, Ordering::Relaxed);
        Ok(MockSampler {
            id: next_id(),
            desc: *desc,
        })
    }

    fn supports_linear_blit(&self, _format: GpuTextureFormat) -> bool {
        self.config.linear_blit
    }

    fn submit_and_wait(&self, commands: &CommandStream<Self>) -> GpuResult<()> {
        if self.device_lost.load(Ordering::SeqCst) {
            return Err(GpuError::DeviceLost);
        }
        self.counters.submissions.fetch_add(1, Ordering::Relaxed);
        for command in commands.commands() {
            self.execute(command)?;
            self.counters.executed_commands.fetch_add(1, Ordering::Relaxed);
        }
        log::trace!("Mock submission '{}' ran {} commands", commands.label(), commands.len());
        Ok(())
    }

    fn wait_idle(&self) -> GpuResult<()> {
        self.counters.wait_idle_calls.fetch_add(1, Ordering::Relaxed);
        if self.device_lost.load(Ordering::SeqCst) {
            return Err(GpuError::DeviceLost);
        }
        Ok(())
    }

    fn destroy_buffer(&self, buffer: Self::Buffer) {
        self.release(buffer.size() as u64);
        self.counters.live_buffers.fetch_sub(1, Ordering::Relaxed);
    }

    fn destroy_image(&self, image: Self::Image) {
        self.release(image.byte_size());
        self.counters.live_images.fetch_sub(1, Ordering::Relaxed);
    }

    fn destroy_image_view(&self, _view: Self::ImageView) {
        self.counters.live_views.fetch_sub(1, Ordering::Relaxed);
    }

    fn destroy_sampler(&self, _sampler: Self::Sampler) {
        self.counters.live_samplers.fetch_sub(1, Ordering::Relaxed);
    }

    fn backend_name(&self) -> &'static str {
        "Mock"
    }
}
