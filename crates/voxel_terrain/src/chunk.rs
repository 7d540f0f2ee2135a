#![allow(clippy::len_without_is_empty)]
//! Chunk dimensions, lattice indexing and density storage
//!
//! A chunk of horizontal width W and height H samples a padded lattice of
//! `(W+1) x H x (W+1)` points. The extra layer on +X/+Z holds the first
//! column of the neighbouring chunk so marching cubes can close the seam.

use bitvec::vec::BitVec;
use core::ops::Index;
use glam::{IVec3, UVec3};

/// Density value of a solid lattice point
pub const SOLID: f32 = 0.0;

/// Density value of an empty lattice point, also returned for any lookup
/// outside the sampled lattice
pub const EMPTY: f32 = 1.0;

pub const MAX_CHUNK_WIDTH: u32 = 1024;
pub const MAX_CHUNK_HEIGHT: u32 = 1024;

/// Upper bound on the padded lattice of one chunk
pub const MAX_PADDED_VOLUME: usize = 1 << 27;

/// Every world lattice coordinate stays within `-WORLD_LIMIT..=WORLD_LIMIT`.
/// f32 still represents every integer in that range.
pub const WORLD_LIMIT: i32 = 1 << 24;

/// Width and height of a chunk in lattice cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkDims {
    pub width: u32,
    pub height: u32,
}

impl ChunkDims {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Sampled lattice dimensions, padded by one on X and Z
    #[inline]
    pub fn padded(&self) -> UVec3 {
        UVec3::new(self.width + 1, self.height, self.width + 1)
    }

    #[inline]
    pub fn padded_volume(&self) -> usize {
        let d = self.padded();
        d.x as usize * d.y as usize * d.z as usize
    }

    /// World-space origin of the chunk at `coord`
    ///
    /// Only meaningful for coordinates accepted by [`Self::checked_origin`].
    #[inline]
    pub fn origin(&self, coord: IVec3) -> IVec3 {
        coord * self.extent()
    }

    /// Origin of the chunk at `coord`, or `None` if any point of its padded
    /// lattice lies outside [`WORLD_LIMIT`]
    pub fn checked_origin(&self, coord: IVec3) -> Option<IVec3> {
        let axis = |c: i32, extent: u32| {
            let lo = i64::from(c) * i64::from(extent);
            let hi = lo + i64::from(extent);
            let limit = i64::from(WORLD_LIMIT);
            (lo >= -limit && hi <= limit).then_some(lo as i32)
        };
        Some(IVec3::new(
            axis(coord.x, self.width)?,
            axis(coord.y, self.height)?,
            axis(coord.z, self.width)?,
        ))
    }

    /// Chunk coordinate containing a world lattice position
    #[inline]
    pub fn chunk_of(&self, world: IVec3) -> IVec3 {
        world.div_euclid(self.extent())
    }

    /// Position of a world lattice point inside its owning chunk
    #[inline]
    pub fn local_of(&self, world: IVec3) -> UVec3 {
        world.rem_euclid(self.extent()).as_uvec3()
    }

    #[inline]
    fn extent(&self) -> IVec3 {
        IVec3::new(self.width as i32, self.height as i32, self.width as i32)
    }
}

/// Flat index of `(x, y, z)` in a lattice of dimensions `dim`
#[inline]
pub fn index_for_pos(x: u32, y: u32, z: u32, dim: UVec3) -> usize {
    x as usize + y as usize * dim.x as usize + z as usize * dim.x as usize * dim.y as usize
}

/// Exact inverse of [`index_for_pos`]
#[inline]
pub fn pos_for_index(i: usize, dim: UVec3) -> UVec3 {
    let dx = dim.x as usize;
    let dy = dim.y as usize;
    UVec3::new((i % dx) as u32, ((i / dx) % dy) as u32, (i / (dx * dy)) as u32)
}

/// Dense scalar field for one chunk's padded lattice
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    dims: UVec3,
    values: Vec<f32>,
}

impl DensityGrid {
    pub fn new_filled(dims: UVec3, fill: f32) -> Self {
        let volume = dims.x as usize * dims.y as usize * dims.z as usize;
        Self { dims, values: vec![fill; volume] }
    }

    pub fn new_empty(dims: UVec3) -> Self {
        Self::new_filled(dims, EMPTY)
    }

    /// Wrap existing values; `None` if the length does not match `dims`
    pub fn from_values(dims: UVec3, values: Vec<f32>) -> Option<Self> {
        let volume = dims.x as usize * dims.y as usize * dims.z as usize;
        (values.len() == volume).then_some(Self { dims, values })
    }

    #[inline]
    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32, z: i32) -> bool {
        x >= 0
            && y >= 0
            && z >= 0
            && (x as u32) < self.dims.x
            && (y as u32) < self.dims.y
            && (z as u32) < self.dims.z
    }

    /// Density at a lattice point; [`EMPTY`] outside the lattice
    #[inline]
    pub fn get(&self, x: i32, y: i32, z: i32) -> f32 {
        if !self.contains(x, y, z) {
            return EMPTY;
        }
        self.values[index_for_pos(x as u32, y as u32, z as u32, self.dims)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, z: u32, value: f32) {
        let i = index_for_pos(x, y, z, self.dims);
        self.values[i] = value;
    }

    #[inline]
    pub fn is_solid(&self, x: i32, y: i32, z: i32) -> bool {
        self.get(x, y, z) == SOLID
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    pub fn solid_count(&self) -> usize {
        self.values.iter().filter(|&&v| v == SOLID).count()
    }

    /// Compact to one bit per lattice point
    pub fn compact(&self) -> SolidMask {
        SolidMask {
            dims: self.dims,
            bits: self.values.iter().map(|&v| v == SOLID).collect(),
        }
    }
}

impl Index<(u32, u32, u32)> for DensityGrid {
    type Output = f32;
    fn index(&self, i: (u32, u32, u32)) -> &Self::Output {
        &self.values[index_for_pos(i.0, i.1, i.2, self.dims)]
    }
}

/// Retained form of a built chunk's lattice: one solid bit per point
#[derive(Debug, Clone, PartialEq)]
pub struct SolidMask {
    dims: UVec3,
    bits: BitVec,
}

impl SolidMask {
    #[inline]
    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    /// Density at a lattice point; [`EMPTY`] outside the lattice
    pub fn get(&self, x: i32, y: i32, z: i32) -> f32 {
        if x < 0 || y < 0 || z < 0 {
            return EMPTY;
        }
        let (x, y, z) = (x as u32, y as u32, z as u32);
        if x >= self.dims.x || y >= self.dims.y || z >= self.dims.z {
            return EMPTY;
        }
        if self.bits[index_for_pos(x, y, z, self.dims)] {
            SOLID
        } else {
            EMPTY
        }
    }

    pub fn solid_count(&self) -> usize {
        self.bits.count_ones()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(UVec3::new(5, 8, 5))]
    #[test_case(UVec3::new(17, 64, 17))]
    #[test_case(UVec3::new(1, 2, 3))]
    fn test_index_bijection(dim: UVec3) {
        let volume = (dim.x * dim.y * dim.z) as usize;
        let mut seen = vec![false; volume];
        for z in 0..dim.z {
            for y in 0..dim.y {
                for x in 0..dim.x {
                    let i = index_for_pos(x, y, z, dim);
                    assert!(i < volume);
                    assert!(!seen[i], "index {} produced twice", i);
                    seen[i] = true;
                    assert_eq!(pos_for_index(i, dim), UVec3::new(x, y, z));
                }
            }
        }
        assert!(seen.into_iter().all(|s| s));
    }

    #[test]
    fn test_padded_dims() {
        let dims = ChunkDims::new(16, 64);
        assert_eq!(dims.padded(), UVec3::new(17, 64, 17));
        assert_eq!(dims.padded_volume(), 17 * 64 * 17);
    }

    #[test]
    fn test_chunk_of_negative_world() {
        let dims = ChunkDims::new(16, 32);
        assert_eq!(dims.chunk_of(IVec3::new(-1, 5, 0)), IVec3::new(-1, 0, 0));
        assert_eq!(dims.local_of(IVec3::new(-1, 5, 0)), UVec3::new(15, 5, 0));
        assert_eq!(dims.chunk_of(IVec3::new(16, 32, -17)), IVec3::new(1, 1, -2));
        assert_eq!(dims.origin(IVec3::new(1, 0, -2)), IVec3::new(16, 0, -32));
    }

    #[test_case(IVec3::ZERO, Some(IVec3::ZERO))]
    #[test_case(IVec3::new(-3, 1, 2), Some(IVec3::new(-48, 64, 32)))]
    #[test_case(IVec3::new(i32::MAX, 0, 0), None ; "overflowing x")]
    #[test_case(IVec3::new(0, i32::MIN, 0), None ; "overflowing y")]
    #[test_case(IVec3::new(0, 0, WORLD_LIMIT / 16), None ; "padding past the limit")]
    #[test_case(IVec3::new(0, 0, WORLD_LIMIT / 16 - 1), Some(IVec3::new(0, 0, WORLD_LIMIT - 16)) ; "last chunk")]
    #[test_case(IVec3::new(-(WORLD_LIMIT / 16), 0, 0), Some(IVec3::new(-WORLD_LIMIT, 0, 0)) ; "first chunk")]
    fn test_checked_origin(coord: IVec3, expected: Option<IVec3>) {
        let dims = ChunkDims::new(16, 64);
        assert_eq!(dims.checked_origin(coord), expected);
        if let Some(origin) = expected {
            assert_eq!(dims.origin(coord), origin);
        }
    }

    #[test]
    fn test_out_of_range_is_empty() {
        let grid = DensityGrid::new_filled(UVec3::new(3, 3, 3), SOLID);
        assert_eq!(grid.get(0, 0, 0), SOLID);
        assert_eq!(grid.get(-1, 0, 0), EMPTY);
        assert_eq!(grid.get(3, 0, 0), EMPTY);
        assert_eq!(grid.get(0, 3, 0), EMPTY);
        assert_eq!(grid.get(0, 0, i32::MAX), EMPTY);
    }

    #[test]
    fn test_from_values_checks_length() {
        let dims = UVec3::new(2, 2, 2);
        assert!(DensityGrid::from_values(dims, vec![EMPTY; 8]).is_some());
        assert!(DensityGrid::from_values(dims, vec![EMPTY; 7]).is_none());
    }

    #[test]
    fn test_compact_preserves_solids() {
        let dims = UVec3::new(4, 5, 4);
        let mut grid = DensityGrid::new_empty(dims);
        grid.set(1, 2, 3, SOLID);
        grid.set(3, 4, 0, SOLID);

        let mask = grid.compact();
        assert_eq!(mask.solid_count(), 2);
        for z in -1..=4 {
            for y in -1..=5 {
                for x in -1..=4 {
                    assert_eq!(mask.get(x, y, z), grid.get(x, y, z));
                }
            }
        }
    }
}
