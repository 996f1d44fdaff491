//! Vertex types for rendering
//!
//! This module provides the vertex layout shared by every format loader and
//! uploaded verbatim into the GPU vertex buffer.

use bytemuck::{Pod, Zeroable};
use std::hash::{Hash, Hasher};

/// Material index carried by vertices that reference no material
pub const NO_MATERIAL: i32 = -1;

/// A vertex with position, color, UV, normal and material index
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// 3D position
    pub position: [f32; 3],
    /// Vertex color (RGB)
    pub color: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
    /// Normal vector
    pub normal: [f32; 3],
    /// Index into the mesh's material list, or [`NO_MATERIAL`]
    pub material_index: i32,
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            color: [1.0, 1.0, 1.0],
            uv: [0.0, 0.0],
            normal: [0.0, 0.0, 1.0], // Default up (Z+)
            material_index: NO_MATERIAL,
        }
    }
}

impl Vertex {
    /// Create a new white vertex without a material
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
            ..Self::default()
        }
    }

    /// Set the vertex color
    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    /// Set the material index
    pub fn with_material(mut self, material_index: i32) -> Self {
        self.material_index = material_index;
        self
    }

    /// Size of a vertex in bytes
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Hashable identity of this vertex
    ///
    /// Matches `PartialEq` for finite components, with `-0.0` and `0.0`
    /// folded together. Every NaN maps to one key, so NaN vertices dedupe
    /// even though `PartialEq` calls them unequal.
    pub(crate) fn key(&self) -> VertexKey {
        let mut bits = [0u32; 11];
        let floats = self
            .position
            .iter()
            .chain(self.color.iter())
            .chain(self.uv.iter())
            .chain(self.normal.iter());
        for (slot, value) in bits.iter_mut().zip(floats) {
            *slot = if value.is_nan() {
                f32::NAN.to_bits()
            } else {
                // -0.0 == 0.0 under PartialEq, so fold them to one bit pattern
                (*value + 0.0).to_bits()
            };
        }
        VertexKey {
            bits,
            material_index: self.material_index,
        }
    }
}

/// Bitwise vertex identity used for deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VertexKey {
    bits: [u32; 11],
    material_index: i32,
}

impl Hash for VertexKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(bytemuck::cast_slice(&self.bits));
        state.write_i32(self.material_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_default() {
        let v = Vertex::default();
        assert_eq!(v.position, [0.0, 0.0, 0.0]);
        assert_eq!(v.normal, [0.0, 0.0, 1.0]);
        assert_eq!(v.color, [1.0, 1.0, 1.0]);
        assert_eq!(v.material_index, NO_MATERIAL);
    }

    #[test]
    fn test_vertex_size() {
        assert_eq!(Vertex::size(), 48);
        assert_eq!(Vertex::size(), std::mem::size_of::<Vertex>());
    }

    #[test]
    fn test_vertex_bytes() {
        let v = Vertex::new([1.0, 2.0, 3.0], [0.0, 1.0, 0.0], [0.5, 0.5]).with_material(2);
        let bytes: &[u8] = bytemuck::bytes_of(&v);
        assert_eq!(bytes.len(), 48);
        let floats: &[f32] = bytemuck::cast_slice(&bytes[..44]);
        assert_eq!(floats[0], 1.0);
        assert_eq!(floats[8], 0.0); // normal x
        assert_eq!(floats[9], 1.0); // normal y
        assert_eq!(&bytes[44..], &2i32.to_ne_bytes());
    }

    #[test]
    fn test_key_matches_equality() {
        let a = Vertex::new([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.25, 0.75]);
        let b = Vertex::new([-0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.25, 0.75]);
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());

        let c = a.with_material(0);
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn test_key_folds_nan_payloads() {
        let quiet = Vertex::new([f32::NAN, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]);
        let payload = Vertex::new([f32::from_bits(0x7fc0_0001), 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]);
        let negative = Vertex::new([-f32::NAN, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]);
        assert_ne!(quiet, payload);
        assert_eq!(quiet.key(), payload.key());
        assert_eq!(quiet.key(), negative.key());
    }
}
