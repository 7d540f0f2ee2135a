//! Mesh buffers produced by isosurface extraction
//!
//! Vertices are not welded: every triangle owns its three vertices, and the
//! index buffer simply counts up. Material tags run parallel to positions.

use crate::material::{MaterialPolicy, MaterialTag};

/// Constants for performance tuning
const INITIAL_VERTEX_CAPACITY: usize = 4096;

/// Raw output of one chunk's extraction, positions in chunk-local space
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MeshBuffers {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub materials: Vec<MaterialTag>,
}

impl MeshBuffers {
    /// Create with pre-allocated capacity
    pub fn with_capacity(vertex_count: usize) -> Self {
        Self {
            positions: Vec::with_capacity(vertex_count),
            indices: Vec::with_capacity(vertex_count),
            materials: Vec::with_capacity(vertex_count),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::with_capacity(INITIAL_VERTEX_CAPACITY)
    }

    /// Append one triangle; all three vertices share `tag`
    #[inline]
    pub fn push_triangle(&mut self, corners: [[f32; 3]; 3], tag: MaterialTag) {
        let base = self.positions.len() as u32;
        self.positions.extend_from_slice(&corners);
        self.materials.extend_from_slice(&[tag; 3]);
        self.indices.extend_from_slice(&[base, base + 1, base + 2]);
    }

    pub fn clear(&mut self) {
        self.positions.clear();
        self.indices.clear();
        self.materials.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Resolve material tags to colors, consuming the buffers
    pub fn into_upload(self, policy: &MaterialPolicy) -> MeshUpload {
        let colors = self.materials.iter().map(|&tag| policy.color(tag)).collect();
        MeshUpload { positions: self.positions, indices: self.indices, colors }
    }
}

/// What a mesh consumer receives for one chunk
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MeshUpload {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    /// RGBA per vertex
    pub colors: Vec<[u8; 4]>,
}

impl MeshUpload {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}
