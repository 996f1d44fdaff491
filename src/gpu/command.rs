//! Backend-neutral recorded GPU work
//!
//! Recording only appends to a list; nothing touches the device until the
//! stream is handed to [`GpuDevice::submit_and_wait`].

use super::GpuDevice;

/// Image layouts the upload path moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    TransferDst,
    TransferSrc,
    ShaderReadOnly,
}

/// A contiguous run of mip levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipRange {
    pub base: u32,
    pub count: u32,
}

impl MipRange {
    pub const fn single(level: u32) -> Self {
        Self {
            base: level,
            count: 1,
        }
    }

    pub const fn all(levels: u32) -> Self {
        Self {
            base: 0,
            count: levels,
        }
    }

    pub fn levels(&self) -> std::ops::Range<u32> {
        self.base..self.base + self.count
    }
}

/// One recorded operation
#[derive(Debug, Clone)]
pub enum GpuCommand<G: GpuDevice> {
    /// Layout transition (pipeline barrier) over a mip range
    Transition {
        image: G::Image,
        mips: MipRange,
        from: ImageLayout,
        to: ImageLayout,
    },
    /// Copy tightly packed RGBA8 texels into mip 0
    CopyBufferToImage {
        buffer: G::Buffer,
        buffer_offset: u64,
        image: G::Image,
        width: u32,
        height: u32,
    },
    /// Linear blit from `src_level` into `src_level + 1`
    BlitMip {
        image: G::Image,
        src_level: u32,
        src_extent: (u32, u32),
        dst_extent: (u32, u32),
    },
}

/// Ordered list of commands destined for one submission
#[derive(Debug, Clone)]
pub struct CommandStream<G: GpuDevice> {
    label: String,
    commands: Vec<GpuCommand<G>>,
}

impl<G: GpuDevice> CommandStream<G> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn transition(&mut self, image: &G::Image, mips: MipRange, from: ImageLayout, to: ImageLayout) {
        self.commands.push(GpuCommand::Transition {
            image: image.clone(),
            mips,
            from,
            to,
        });
    }

    pub fn copy_buffer_to_image(
        &mut self,
        buffer: &G::Buffer,
        buffer_offset: u64,
        image: &G::Image,
        width: u32,
        height: u32,
    ) {
        self.commands.push(GpuCommand::CopyBufferToImage {
            buffer: buffer.clone(),
            buffer_offset,
            image: image.clone(),
            width,
            height,
        });
    }

    pub fn blit_mip(&mut self, image: &G::Image, src_level: u32, src_extent: (u32, u32), dst_extent: (u32, u32)) {
        self.commands.push(GpuCommand::BlitMip {
            image: image.clone(),
            src_level,
            src_extent,
            dst_extent,
        });
    }

    pub fn commands(&self) -> &[GpuCommand<G>] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuDevice, MockGpu, TextureDescriptor};

    #[test]
    fn test_recording_is_ordered() {
        let gpu = MockGpu::new();
        let image = gpu.create_image(&TextureDescriptor::default()).unwrap();
        let mut stream: CommandStream<MockGpu> = CommandStream::new("test");
        assert!(stream.is_empty());

        stream.transition(&image, MipRange::all(1), ImageLayout::Undefined, ImageLayout::TransferDst);
        stream.blit_mip(&image, 0, (2, 2), (1, 1));
        assert_eq!(stream.len(), 2);
        assert!(matches!(stream.commands()[0], GpuCommand::Transition { .. }));
        assert!(matches!(
            stream.commands()[1],
            GpuCommand::BlitMip { src_level: 0, .. }
        ));
        assert_eq!(stream.label(), "test");
    }

    #[test]
    fn test_mip_range_levels() {
        assert_eq!(MipRange::all(3).levels().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(MipRange::single(4).levels().collect::<Vec<_>>(), vec![4]);
    }
}
