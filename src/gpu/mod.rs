//! GPU abstraction layer for backend-agnostic uploads
//!
//! This module provides the traits the upload pipeline is written against,
//! plus an in-memory [`MockGpu`] and (behind `gpu-vulkan`) a Vulkan backend.
//! Work is recorded into a [`CommandStream`] and executed by
//! [`GpuDevice::submit_and_wait`].

pub mod command;
pub mod mock;
#[cfg(feature = "gpu-vulkan")]
pub mod vulkan;

use std::fmt::Debug;
use thiserror::Error;

pub use command::{CommandStream, GpuCommand, ImageLayout, MipRange};

/// Error type for GPU operations
#[derive(Error, Debug)]
pub enum GpuError {
    #[error("Buffer allocation failed: {0}")]
    AllocationFailed(String),

    #[error("Buffer upload failed: {0}")]
    UploadFailed(String),

    #[error("Texture creation failed: {0}")]
    TextureCreationFailed(String),

    #[error("Sampler creation failed: {0}")]
    SamplerCreationFailed(String),

    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Invalid buffer size: {0}")]
    InvalidSize(usize),

    #[error("Device lost")]
    DeviceLost,

    #[error("Out of memory")]
    OutOfMemory,
}

impl GpuError {
    /// Errors after which the device cannot be trusted for further work
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceLost | Self::OutOfMemory)
    }
}

/// Result type for GPU operations
pub type GpuResult<T> = Result<T, GpuError>;

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Vertex buffer
    Vertex,
    /// Index buffer
    Index,
    /// Host-visible source for transfers
    Staging,
}

/// Texture format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuTextureFormat {
    /// RGBA 8-bit with sRGB color space
    Rgba8Srgb,
    /// RGBA 8-bit unorm
    Rgba8Unorm,
}

impl GpuTextureFormat {
    /// RGBA8 format for the requested color space
    pub fn rgba8(srgb: bool) -> Self {
        if srgb {
            Self::Rgba8Srgb
        } else {
            Self::Rgba8Unorm
        }
    }

    pub fn bytes_per_pixel(self) -> u32 {
        4
    }
}

/// Texture descriptor for creation
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Texture format
    pub format: GpuTextureFormat,
    /// Number of mip levels (1 = no mipmaps)
    pub mip_levels: u32,
    /// Levels past 0 are filled by blits, so the image is also a blit source
    pub generate_mipmaps: bool,
    /// Debug label
    pub label: String,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            format: GpuTextureFormat::Rgba8Srgb,
            mip_levels: 1,
            generate_mipmaps: false,
            label: String::new(),
        }
    }
}

impl TextureDescriptor {
    /// Size of mip level 0 in bytes
    pub fn base_level_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.bytes_per_pixel() as u64
    }
}

/// Sampler parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDescriptor {
    /// Highest mip level the sampler may read
    pub max_lod: f32,
    /// Anisotropic filtering cap; `None` disables it
    pub max_anisotropy: Option<f32>,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            max_lod: 0.0,
            max_anisotropy: None,
        }
    }
}

/// One region of a mapped write
#[derive(Debug, Clone, Copy)]
pub struct BufferWrite<'a> {
    /// Byte offset into the buffer
    pub offset: usize,
    /// Bytes to copy
    pub data: &'a [u8],
}

/// Core GPU device trait for backend-agnostic operations
///
/// This trait abstracts GPU operations, allowing the upload pipeline to work
/// with any GPU backend (Vulkan, Mock, etc.) through associated types.
///
/// # Associated Types
/// - `Buffer`: The buffer type for this GPU backend
/// - `Image`: A sampled 2D image with a mip chain
/// - `ImageView`: A shader-visible view over every mip of an image
/// - `Sampler`: The sampler type for this GPU backend
///
/// # Example
/// ```ignore
/// let gpu = MockGpu::new();
/// let staging = gpu.allocate_buffer(1024, BufferUsage::Staging)?;
/// gpu.write_buffer_regions(&staging, &[BufferWrite { offset: 0, data: &pixels }])?;
/// ```
pub trait GpuDevice: Send + Sync + Clone + Debug + 'static {
    /// Buffer type for this GPU backend
    type Buffer: Clone + Send + Sync + Debug;

    /// Image type for this GPU backend
    type Image: Clone + Send + Sync + Debug;

    /// Image view type for this GPU backend
    type ImageView: Clone + Send + Sync + Debug;

    /// Sampler type for this GPU backend
    type Sampler: Clone + Send + Sync + Debug;

    /// Allocate a GPU buffer
    ///
    /// # Arguments
    /// * `size` - Size in bytes
    /// * `usage` - How the buffer will be used
    fn allocate_buffer(&self, size: usize, usage: BufferUsage) -> GpuResult<Self::Buffer>;

    /// Copy several regions into a host-visible buffer under a single map
    fn write_buffer_regions(&self, buffer: &Self::Buffer, writes: &[BufferWrite<'_>]) -> GpuResult<()>;

    /// Upload data to a buffer
    ///
    /// # Arguments
    /// * `buffer` - Target buffer
    /// * `offset` - Byte offset into the buffer
    /// * `data` - Data to upload
    fn upload_buffer_data(&self, buffer: &Self::Buffer, offset: usize, data: &[u8]) -> GpuResult<()> {
        self.write_buffer_regions(buffer, &[BufferWrite { offset, data }])
    }

    /// Create an uninitialised image (all levels in [`ImageLayout::Undefined`])
    fn create_image(&self, desc: &TextureDescriptor) -> GpuResult<Self::Image>;

    /// Create a view covering every mip level of `image`
    fn create_image_view(&self, image: &Self::Image, desc: &TextureDescriptor) -> GpuResult<Self::ImageView>;

    /// Create a linear, repeating sampler
    fn create_sampler(&self, desc: &SamplerDescriptor) -> GpuResult<Self::Sampler>;

    /// Whether `format` supports linear filtering as a blit source
    fn supports_linear_blit(&self, format: GpuTextureFormat) -> bool;

    /// Execute a recorded stream and block until the GPU has finished it
    fn submit_and_wait(&self, commands: &CommandStream<Self>) -> GpuResult<()>;

    /// Block until all submitted work is complete
    fn wait_idle(&self) -> GpuResult<()>;

    /// Destroy a buffer (optional cleanup)
    ///
    /// Most backends handle cleanup through Drop, but this allows explicit cleanup.
    fn destroy_buffer(&self, _buffer: Self::Buffer) {
        // Default: let Drop handle it
    }

    /// Destroy an image (optional cleanup)
    fn destroy_image(&self, _image: Self::Image) {}

    /// Destroy an image view (optional cleanup)
    fn destroy_image_view(&self, _view: Self::ImageView) {}

    /// Destroy a sampler (optional cleanup)
    fn destroy_sampler(&self, _sampler: Self::Sampler) {}

    /// Get the name of this GPU backend (for debugging)
    fn backend_name(&self) -> &'static str;
}

// Re-export implementations
pub use mock::{MockGpu, MockGpuConfig};

#[cfg(feature = "gpu-vulkan")]
pub use vulkan::VulkanDevice;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_debug() {
        let usage = BufferUsage::Staging;
        assert_eq!(format!("{:?}", usage), "Staging");
    }

    #[test]
    fn test_texture_descriptor_default() {
        let desc = TextureDescriptor::default();
        assert_eq!(desc.width, 1);
        assert_eq!(desc.height, 1);
        assert_eq!(desc.mip_levels, 1);
        assert_eq!(desc.base_level_size(), 4);
    }

    #[test]
    fn test_format_for_color_space() {
        assert_eq!(GpuTextureFormat::rgba8(true), GpuTextureFormat::Rgba8Srgb);
        assert_eq!(GpuTextureFormat::rgba8(false), GpuTextureFormat::Rgba8Unorm);
    }

    #[test]
    fn test_fatal_errors() {
        assert!(GpuError::OutOfMemory.is_fatal());
        assert!(GpuError::DeviceLost.is_fatal());
        assert!(!GpuError::TextureCreationFailed("too big".into()).is_fatal());
    }
}
