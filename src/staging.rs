//! Staging buffer packing
//!
//! Every decoded image of a load shares one host-visible buffer. Regions are
//! assigned by running offset in entry order and filled under a single map.

use crate::gpu::{BufferUsage, BufferWrite, GpuDevice, GpuResult};
use crate::texture::DecodedImage;

/// Where one image lives inside a staging buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingRegion {
    /// Byte offset from the start of the buffer
    pub offset: u64,
    /// Bytes occupied (width * height * 4)
    pub size: u64,
    /// Colour space the texels will be uploaded as
    pub srgb: bool,
}

/// Compute regions for `entries` without touching a device
///
/// Invalid images get `None` and advance the offset by nothing. Returns the
/// regions (one per entry) and the total byte size.
pub fn layout(entries: &[(&DecodedImage, bool)]) -> (Vec<Option<StagingRegion>>, u64) {
    let mut offset = 0u64;
    let regions = entries
        .iter()
        .map(|(image, srgb)| {
            if !image.is_valid() {
                return None;
            }
            let region = StagingRegion {
                offset,
                size: image.byte_size(),
                srgb: *srgb,
            };
            offset += region.size;
            Some(region)
        })
        .collect();
    (regions, offset)
}

/// One staging buffer holding the texels of many textures
#[derive(Debug)]
pub struct StagingAllocation<G: GpuDevice> {
    buffer: G::Buffer,
    total_size: u64,
    regions: Vec<Option<StagingRegion>>,
}

impl<G: GpuDevice> StagingAllocation<G> {
    pub fn buffer(&self) -> &G::Buffer {
        &self.buffer
    }

    /// Sum of the byte sizes of every packed image
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Region of the entry at `index`, if that image was packed
    pub fn region(&self, index: usize) -> Option<StagingRegion> {
        self.regions.get(index).copied().flatten()
    }

    pub fn regions(&self) -> &[Option<StagingRegion>] {
        &self.regions
    }

    /// Number of images that received a region
    pub fn packed_count(&self) -> usize {
        self.regions.iter().filter(|r| r.is_some()).count()
    }

    /// Return the buffer to the device
    ///
    /// Must only be called once every submission reading it has completed.
    pub fn release(self, device: &G) {
        log::trace!("Releasing {} byte staging buffer", self.total_size);
        device.destroy_buffer(self.buffer);
    }
}

/// Packs decoded images into a single staging allocation
#[derive(Debug, Default, Clone, Copy)]
pub struct StagingPacker;

impl StagingPacker {
    pub fn new() -> Self {
        Self
    }

    /// Allocate one buffer sized to every valid image and copy them in
    ///
    /// Returns `Ok(None)` when no entry is valid; no buffer is allocated in
    /// that case.
    pub fn pack<G: GpuDevice>(
        &self,
        device: &G,
        entries: &[(&DecodedImage, bool)],
    ) -> GpuResult<Option<StagingAllocation<G>>> {
        let (regions, total_size) = layout(entries);
        if total_size == 0 {
            return Ok(None);
        }

        let buffer = device.allocate_buffer(total_size as usize, BufferUsage::Staging)?;
        let writes: Vec<BufferWrite<'_>> = entries
            .iter()
            .zip(&regions)
            .filter_map(|((image, _), region)| {
                region.map(|r| BufferWrite {
                    offset: r.offset as usize,
                    data: &image.pixels,
                })
            })
            .collect();

        if let Err(e) = device.write_buffer_regions(&buffer, &writes) {
            device.destroy_buffer(buffer);
            return Err(e);
        }

        log::debug!(
            "Packed {} textures into {} staging bytes",
            writes.len(),
            total_size
        );
        Ok(Some(StagingAllocation {
            buffer,
            total_size,
            regions,
        }))
    }
}
