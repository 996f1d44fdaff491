//! Bindless texture table
//!
//! One flat array of (view, sampler) pairs indexed from shaders by integer
//! slot. The first four slots hold the per-channel fallbacks; every material
//! then owns four consecutive slots in channel order.

use crate::error::{AssetError, Result};
use crate::gpu::GpuDevice;
use crate::model::TextureChannel;
use std::ops::Range;

/// Slots reserved for the fallback textures
pub const FALLBACK_SLOT_COUNT: u32 = 4;

/// Slots owned by each material
pub const TEXTURES_PER_MATERIAL: u32 = 4;

/// Shader index of `channel` for material `material`
pub fn slot_for(material: usize, channel: TextureChannel) -> u32 {
    FALLBACK_SLOT_COUNT + material as u32 * TEXTURES_PER_MATERIAL + channel.ordinal()
}

/// Shader index of the fallback for `channel`
pub fn fallback_slot(channel: TextureChannel) -> u32 {
    channel.ordinal()
}

/// Total slots for a scene with `material_count` materials
pub fn slot_count(material_count: usize) -> u32 {
    FALLBACK_SLOT_COUNT + material_count as u32 * TEXTURES_PER_MATERIAL
}

/// What a slot in the fixed layout holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOwner {
    Fallback(TextureChannel),
    Material {
        material: usize,
        channel: TextureChannel,
    },
}

impl SlotOwner {
    pub fn channel(&self) -> TextureChannel {
        match self {
            Self::Fallback(channel) | Self::Material { channel, .. } => *channel,
        }
    }
}

/// Every slot of the layout, in slot order
pub fn slot_layout(material_count: usize) -> impl Iterator<Item = SlotOwner> {
    let fallbacks = TextureChannel::ALL.into_iter().map(SlotOwner::Fallback);
    let materials = (0..material_count).flat_map(|material| {
        TextureChannel::ALL
            .into_iter()
            .map(move |channel| SlotOwner::Material { material, channel })
    });
    fallbacks.chain(materials)
}

/// A view and sampler bound at one slot
#[derive(Debug, Clone)]
pub struct BindlessBinding<G: GpuDevice> {
    pub view: G::ImageView,
    pub sampler: G::Sampler,
}

/// Slot arena, sized once per load cycle
#[derive(Debug)]
pub struct BindlessTable<G: GpuDevice> {
    slots: Vec<Option<BindlessBinding<G>>>,
    generation: u64,
}

impl<G: GpuDevice> Default for BindlessTable<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: GpuDevice> BindlessTable<G> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            generation: 0,
        }
    }

    /// Discard every binding and size the table to `count` empty slots
    pub fn allocate(&mut self, count: u32) {
        self.slots.clear();
        self.slots.resize_with(count as usize, || None);
        self.generation += 1;
    }

    /// Bind `binding` at `slot`, replacing what was there
    pub fn bind(&mut self, slot: u32, binding: BindlessBinding<G>) -> Result<()> {
        let len = self.slots.len();
        let entry = self.slots.get_mut(slot as usize).ok_or_else(|| {
            AssetError::LoadFailure(format!("bindless slot {slot} out of range (table has {len})"))
        })?;
        *entry = Some(binding);
        Ok(())
    }

    pub fn binding(&self, slot: u32) -> Option<&BindlessBinding<G>> {
        self.slots.get(slot as usize).and_then(Option::as_ref)
    }

    /// Variable descriptor count for this load
    pub fn len(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether every slot has a binding
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Bumped by every `allocate`, so renderers can tell a table was rebuilt
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drop every binding and shrink to zero slots
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Materials the current size accounts for
    pub fn material_count(&self) -> usize {
        (self.len().saturating_sub(FALLBACK_SLOT_COUNT) / TEXTURES_PER_MATERIAL) as usize
    }

    /// Slots owned by `material`
    pub fn material_slot_range(&self, material: usize) -> Range<u32> {
        let start = slot_for(material, TextureChannel::Diffuse);
        start..start + TEXTURES_PER_MATERIAL
    }

    /// Slot a shader should sample for a vertex's material index
    ///
    /// Negative or unknown material indices resolve to the channel fallback.
    pub fn resolve(&self, material_index: i32, channel: TextureChannel) -> u32 {
        match usize::try_from(material_index) {
            Ok(material) if material < self.material_count() => slot_for(material, channel),
            _ => fallback_slot(channel),
        }
    }

    /// Bound slots in slot order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &BindlessBinding<G>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, binding)| binding.as_ref().map(|b| (slot as u32, b)))
    }
}
