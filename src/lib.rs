//! bindless_streamer - Scene loading and batched texture upload for bindless renderers
//!
//! # Features
//! - OBJ, glTF/GLB and PLY loading into one deduplicated mesh format
//! - Texture decoding on a worker pool, overlapped with geometry parsing
//! - One staging buffer and one submission for every material texture
//! - Fixed bindless slot layout with per-channel fallback textures
//! - GPU abstraction (Vulkan via trait, plus a CPU-side mock)
//!
//! # Quick Start
//!
//! ```ignore
//! use bindless_streamer::{MockGpu, PipelineConfig, ResourceManager};
//!
//! let mut manager = ResourceManager::with_rayon(MockGpu::new(), PipelineConfig::default())?;
//! let report = manager.load_initial("assets/scene.obj")?;
//! println!("{} textures in {:.1} ms", report.texture_count, report.timings.total_ms);
//! ```
//!
//! # Feature Flags
//!
//! - `gpu-vulkan`: Enable Vulkan GPU backend
//! - `runtime-tokio`: Enable the Tokio decode spawner

// Core modules
pub mod bindless;
pub mod gpu;
pub mod loader;
pub mod manager;
pub mod runtime;
pub mod staging;
pub mod texture_resource;

// Support modules
pub mod catalog;
pub mod config;
pub mod metrics;
pub mod model;
pub mod progress;
pub mod texture;
pub mod vertex;

// Error types
mod error;
pub use error::{AssetError, Result};

// Re-export orchestration types
pub use manager::{BlitSupport, GpuMesh, LoadReport, LoadTimings, ResourceManager};
pub use metrics::{LoadMetrics, LoadMetricsHandle, LoadRecord};
pub use progress::{LoadPhase, LoadProgress};
pub use catalog::AssetCatalog;
pub use config::PipelineConfig;

// Re-export GPU types
pub use gpu::mock::{MockGpu, MockGpuConfig};
#[cfg(feature = "gpu-vulkan")]
pub use gpu::vulkan::VulkanDevice;
pub use gpu::{
    BufferUsage, CommandStream, GpuDevice, GpuError, GpuResult, GpuTextureFormat, ImageLayout,
    SamplerDescriptor, TextureDescriptor,
};

// Re-export runtime types
pub use runtime::{MockSpawner, RayonSpawner, TaskError, TaskHandle, TaskSpawner};
#[cfg(feature = "runtime-tokio")]
pub use runtime::TokioSpawner;

// Re-export loading types
pub use loader::{loader_for_path, resolve_texture_path, ModelFormat, ModelLoader};
pub use model::{MaterialInfo, MeshBuilder, MeshRecord, TextureChannel};
pub use vertex::Vertex;

// Re-export texture types
pub use bindless::{slot_for, BindlessBinding, BindlessTable, FALLBACK_SLOT_COUNT};
pub use staging::{StagingAllocation, StagingPacker, StagingRegion};
pub use texture::{DecodedImage, TextureDecoder, TextureError};
pub use texture_resource::{mip_level_count, TextureResource};

// Version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
