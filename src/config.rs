//! Pipeline configuration

/// Subdirectories searched (relative to the model file) for textures whose
/// recorded path does not resolve directly.
pub const DEFAULT_TEXTURE_SEARCH_DIRS: [&str; 4] = ["textures", "Textures", "tex", "maps"];

/// Configuration for a [`ResourceManager`](crate::manager::ResourceManager)
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Whether to allocate and generate a full mip chain for decoded textures
    pub generate_mipmaps: bool,
    /// Subdirectories tried when resolving texture references
    pub texture_search_dirs: Vec<String>,
    /// Sampler anisotropy cap (clamped by the backend to what it supports)
    pub max_anisotropy: f32,
    /// Worker threads for the built-in decode pool
    pub decode_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            generate_mipmaps: true,
            texture_search_dirs: DEFAULT_TEXTURE_SEARCH_DIRS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_anisotropy: 16.0,
            decode_threads: default_decode_threads(),
        }
    }
}

impl PipelineConfig {
    /// Create a config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable mip chain generation
    pub fn with_mipmaps(mut self, generate: bool) -> Self {
        self.generate_mipmaps = generate;
        self
    }

    /// Replace the texture search subdirectories
    pub fn with_search_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.texture_search_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the sampler anisotropy cap
    pub fn with_max_anisotropy(mut self, anisotropy: f32) -> Self {
        self.max_anisotropy = anisotropy.max(1.0);
        self
    }

    /// Set the decode pool size (at least one thread)
    pub fn with_decode_threads(mut self, threads: usize) -> Self {
        self.decode_threads = threads.max(1);
        self
    }
}

fn default_decode_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1)
}
