//! Deferred texture construction
//!
//! A [`TextureResource`] is built in explicit steps so that many textures can
//! share one staging buffer and one submission:
//!
//! ```text
//! Unprepared --prepare--> Prepared --record_upload--> Uploaded
//!     Uploaded --record_mipmaps--> Mipmapped --finalize--> Finalized
//!     Uploaded (single mip) --finalize--> Finalized
//! ```
//!
//! Recording only appends to a [`CommandStream`]; `finalize` is legal once
//! the submission carrying those commands has completed.

use crate::error::{AssetError, Result};
use crate::gpu::{
    BufferUsage, CommandStream, GpuDevice, GpuTextureFormat, ImageLayout, MipRange,
    SamplerDescriptor, TextureDescriptor,
};
use crate::staging::{StagingAllocation, StagingRegion};

/// Number of mip levels in a full chain down to 1x1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

/// Where the base level texels come from
#[derive(Debug, Clone)]
pub enum PixelSource<G: GpuDevice> {
    /// A region of a shared staging buffer
    Staged {
        buffer: G::Buffer,
        region: StagingRegion,
    },
    /// A single RGBA8 texel, uploaded through a private 4-byte buffer
    Solid([u8; 4]),
}

#[derive(Debug)]
struct GpuObjects<G: GpuDevice> {
    image: G::Image,
    view: G::ImageView,
    sampler: G::Sampler,
}

impl<G: GpuDevice> GpuObjects<G> {
    fn destroy(self, device: &G) {
        device.destroy_sampler(self.sampler);
        device.destroy_image_view(self.view);
        device.destroy_image(self.image);
    }
}

#[derive(Debug)]
enum StagingBinding<G: GpuDevice> {
    Shared { buffer: G::Buffer, offset: u64 },
    Private(G::Buffer),
}

impl<G: GpuDevice> StagingBinding<G> {
    fn buffer(&self) -> (&G::Buffer, u64) {
        match self {
            Self::Shared { buffer, offset } => (buffer, *offset),
            Self::Private(buffer) => (buffer, 0),
        }
    }

    fn release(self, device: &G) {
        // Shared buffers belong to the StagingAllocation
        if let Self::Private(buffer) = self {
            device.destroy_buffer(buffer);
        }
    }
}

#[derive(Debug)]
struct Pending<G: GpuDevice> {
    objects: GpuObjects<G>,
    staging: StagingBinding<G>,
}

#[derive(Debug)]
enum TextureState<G: GpuDevice> {
    Unprepared(PixelSource<G>),
    Prepared(Pending<G>),
    Uploaded(Pending<G>),
    Mipmapped(Pending<G>),
    Finalized(GpuObjects<G>),
    Destroyed,
}

impl<G: GpuDevice> TextureState<G> {
    fn name(&self) -> &'static str {
        match self {
            Self::Unprepared(_) => "Unprepared",
            Self::Prepared(_) => "Prepared",
            Self::Uploaded(_) => "Uploaded",
            Self::Mipmapped(_) => "Mipmapped",
            Self::Finalized(_) => "Finalized",
            Self::Destroyed => "Destroyed",
        }
    }

    fn objects(&self) -> Option<&GpuObjects<G>> {
        match self {
            Self::Prepared(p) | Self::Uploaded(p) | Self::Mipmapped(p) => Some(&p.objects),
            Self::Finalized(objects) => Some(objects),
            Self::Unprepared(_) | Self::Destroyed => None,
        }
    }
}

/// A sampled texture owning its image, view and sampler
#[derive(Debug)]
pub struct TextureResource<G: GpuDevice> {
    label: String,
    width: u32,
    height: u32,
    format: GpuTextureFormat,
    mip_levels: u32,
    state: TextureState<G>,
}

impl<G: GpuDevice> TextureResource<G> {
    /// Texture whose texels sit in `region` of a shared staging allocation
    ///
    /// With `generate_mipmaps` the image gets a full chain, filled by
    /// [`record_mipmaps`](Self::record_mipmaps).
    pub fn from_staging(
        label: impl Into<String>,
        width: u32,
        height: u32,
        staging: &StagingAllocation<G>,
        region: StagingRegion,
        generate_mipmaps: bool,
    ) -> Self {
        let mip_levels = if generate_mipmaps {
            mip_level_count(width, height)
        } else {
            1
        };
        Self {
            label: label.into(),
            width,
            height,
            format: GpuTextureFormat::rgba8(region.srgb),
            mip_levels,
            state: TextureState::Unprepared(PixelSource::Staged {
                buffer: staging.buffer().clone(),
                region,
            }),
        }
    }

    /// 1x1 texture of a single colour
    pub fn solid(label: impl Into<String>, color: [u8; 4], srgb: bool) -> Self {
        Self {
            label: label.into(),
            width: 1,
            height: 1,
            format: GpuTextureFormat::rgba8(srgb),
            mip_levels: 1,
            state: TextureState::Unprepared(PixelSource::Solid(color)),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> GpuTextureFormat {
        self.format
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Name of the current construction step
    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, TextureState::Finalized(_))
    }

    pub fn image(&self) -> Option<&G::Image> {
        self.state.objects().map(|o| &o.image)
    }

    pub fn view(&self) -> Option<&G::ImageView> {
        self.state.objects().map(|o| &o.view)
    }

    pub fn sampler(&self) -> Option<&G::Sampler> {
        self.state.objects().map(|o| &o.sampler)
    }

    fn descriptor(&self) -> TextureDescriptor {
        TextureDescriptor {
            width: self.width,
            height: self.height,
            format: self.format,
            mip_levels: self.mip_levels,
            generate_mipmaps: self.mip_levels > 1,
            label: self.label.clone(),
        }
    }

    fn take_state(&mut self) -> TextureState<G> {
        std::mem::replace(&mut self.state, TextureState::Destroyed)
    }

    /// Put `state` back and describe why the call was refused
    fn reject(&mut self, state: TextureState<G>, expected: &'static str) -> AssetError {
        let found = state.name();
        self.state = state;
        AssetError::InvalidState {
            label: self.label.clone(),
            expected,
            found,
        }
    }

    /// Create the image, view and sampler and bind the pixel source
    ///
    /// On failure every object created so far is destroyed and the texture
    /// stays `Unprepared`.
    pub fn prepare(&mut self, device: &G, max_anisotropy: Option<f32>) -> Result<()> {
        let source = match self.take_state() {
            TextureState::Unprepared(source) => source,
            other => return Err(self.reject(other, "Unprepared")),
        };

        match self.create_objects(device, &source, max_anisotropy) {
            Ok(pending) => {
                self.state = TextureState::Prepared(pending);
                Ok(())
            }
            Err(e) => {
                self.state = TextureState::Unprepared(source);
                Err(e)
            }
        }
    }

    fn create_objects(
        &self,
        device: &G,
        source: &PixelSource<G>,
        max_anisotropy: Option<f32>,
    ) -> Result<Pending<G>> {
        let desc = self.descriptor();
        let image = device.create_image(&desc)?;

        let view = match device.create_image_view(&image, &desc) {
            Ok(view) => view,
            Err(e) => {
                device.destroy_image(image);
                return Err(e.into());
            }
        };

        let sampler_desc = SamplerDescriptor {
            max_lod: self.mip_levels as f32,
            max_anisotropy,
        };
        let sampler = match device.create_sampler(&sampler_desc) {
            Ok(sampler) => sampler,
            Err(e) => {
                device.destroy_image_view(view);
                device.destroy_image(image);
                return Err(e.into());
            }
        };
        let objects = GpuObjects {
            image,
            view,
            sampler,
        };

        let staging = match source {
            PixelSource::Staged { buffer, region } => StagingBinding::Shared {
                buffer: buffer.clone(),
                offset: region.offset,
            },
            PixelSource::Solid(color) => match Self::solid_staging(device, color) {
                Ok(buffer) => StagingBinding::Private(buffer),
                Err(e) => {
                    objects.destroy(device);
                    return Err(e);
                }
            },
        };

        Ok(Pending { objects, staging })
    }

    fn solid_staging(device: &G, color: &[u8; 4]) -> Result<G::Buffer> {
        let buffer = device.allocate_buffer(color.len(), BufferUsage::Staging)?;
        if let Err(e) = device.upload_buffer_data(&buffer, 0, color) {
            device.destroy_buffer(buffer);
            return Err(e.into());
        }
        Ok(buffer)
    }

    /// Record the copy of the base level
    ///
    /// Every level moves to TRANSFER_DST first; a single-level texture is
    /// left ready for sampling.
    pub fn record_upload(&mut self, stream: &mut CommandStream<G>) -> Result<()> {
        let pending = match self.take_state() {
            TextureState::Prepared(pending) => pending,
            other => return Err(self.reject(other, "Prepared")),
        };

        let image = &pending.objects.image;
        let (buffer, offset) = pending.staging.buffer();
        stream.transition(
            image,
            MipRange::all(self.mip_levels),
            ImageLayout::Undefined,
            ImageLayout::TransferDst,
        );
        stream.copy_buffer_to_image(buffer, offset, image, self.width, self.height);
        if self.mip_levels == 1 {
            stream.transition(
                image,
                MipRange::single(0),
                ImageLayout::TransferDst,
                ImageLayout::ShaderReadOnly,
            );
        }

        self.state = TextureState::Uploaded(pending);
        Ok(())
    }

    /// Record the blit chain filling levels 1..N from level 0
    ///
    /// Does nothing for a single-level texture.
    pub fn record_mipmaps(&mut self, stream: &mut CommandStream<G>) -> Result<()> {
        if self.mip_levels == 1 {
            if matches!(self.state, TextureState::Uploaded(_)) {
                return Ok(());
            }
            let state = self.take_state();
            return Err(self.reject(state, "Uploaded"));
        }

        let pending = match self.take_state() {
            TextureState::Uploaded(pending) => pending,
            other => return Err(self.reject(other, "Uploaded")),
        };

        let image = &pending.objects.image;
        let mut extent = (self.width, self.height);
        for level in 1..self.mip_levels {
            let src = MipRange::single(level - 1);
            let next = ((extent.0 / 2).max(1), (extent.1 / 2).max(1));
            stream.transition(image, src, ImageLayout::TransferDst, ImageLayout::TransferSrc);
            stream.blit_mip(image, level - 1, extent, next);
            stream.transition(image, src, ImageLayout::TransferSrc, ImageLayout::ShaderReadOnly);
            extent = next;
        }
        stream.transition(
            image,
            MipRange::single(self.mip_levels - 1),
            ImageLayout::TransferDst,
            ImageLayout::ShaderReadOnly,
        );

        self.state = TextureState::Mipmapped(pending);
        Ok(())
    }

    /// Drop the staging binding once the submission has completed
    pub fn finalize(&mut self, device: &G) -> Result<()> {
        let pending = match self.take_state() {
            TextureState::Mipmapped(pending) => pending,
            TextureState::Uploaded(pending) if self.mip_levels == 1 => pending,
            other => return Err(self.reject(other, "Mipmapped")),
        };

        pending.staging.release(device);
        self.state = TextureState::Finalized(pending.objects);
        Ok(())
    }

    /// Release every GPU object this texture owns
    ///
    /// Safe to call in any state; callers must make sure the device no
    /// longer reads the image.
    pub fn destroy(&mut self, device: &G) {
        match self.take_state() {
            TextureState::Prepared(pending)
            | TextureState::Uploaded(pending)
            | TextureState::Mipmapped(pending) => {
                pending.staging.release(device);
                pending.objects.destroy(device);
            }
            TextureState::Finalized(objects) => objects.destroy(device),
            TextureState::Unprepared(_) | TextureState::Destroyed => {}
        }
        log::trace!("Texture '{}' destroyed", self.label);
    }

    /// Run every step for this texture alone, with its own submission
    pub fn build_immediate(&mut self, device: &G, max_anisotropy: Option<f32>) -> Result<()> {
        self.prepare(device, max_anisotropy)?;
        let mut stream = CommandStream::new(format!("upload '{}'", self.label));
        self.record_upload(&mut stream)?;
        self.record_mipmaps(&mut stream)?;
        if let Err(e) = device.submit_and_wait(&stream) {
            self.destroy(device);
            return Err(e.into());
        }
        self.finalize(device)
    }
}
