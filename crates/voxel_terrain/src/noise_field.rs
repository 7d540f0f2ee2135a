//! Deterministic scalar noise used by the density sampler
//!
//! 2-D values come from seeded Perlin noise remapped to [0, 1]. There is no
//! native 3-D layer: a 3-D sample is the weighted mean of six 2-D samples
//! taken on the axis-plane projections of the point.

use glam::{IVec2, IVec3, Vec2, Vec3};
use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

/// Added to every coordinate before normalization so integer lattice points
/// never land exactly on Perlin grid nodes
pub const COORD_EPSILON: f32 = 0.001;

/// Shift applied to integer 3-D inputs before projection
pub const INT_3D_SHIFT: IVec3 = IVec3::new(1234, 2345, 3456);

/// Weight of the xy, xz and yz projections
const PRIMARY_WEIGHT: f32 = 5.0;

/// Weight of the reversed yx, zx and zy projections
const CROSS_WEIGHT: f32 = 1.0;

const TOTAL_WEIGHT: f32 = 3.0 * PRIMARY_WEIGHT + 3.0 * CROSS_WEIGHT;

/// Scale and offset of one noise layer
///
/// A field missing from a config file takes its value from
/// [`NoiseSettings::default`], not from the layer's own default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseSettings {
    pub scale: f32,
    pub offset: f32,
}

impl NoiseSettings {
    pub const fn new(scale: f32, offset: f32) -> Self {
        Self { scale, offset }
    }
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self::new(1.0, 0.0)
    }
}

/// Stateless noise evaluator, safe to share between threads
#[derive(Clone)]
pub struct NoiseField {
    perlin: Perlin,
    seed: u32,
}

impl std::fmt::Debug for NoiseField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseField").field("seed", &self.seed).finish()
    }
}

impl NoiseField {
    pub fn new(seed: u32) -> Self {
        Self { perlin: Perlin::new(seed), seed }
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// 2-D noise at a real position, in [0, 1]
    pub fn perlin_2d(&self, pos: Vec2, settings: NoiseSettings, domain: IVec2) -> f32 {
        let x = (pos.x + settings.offset + COORD_EPSILON) / domain.x as f32 * settings.scale;
        let y = (pos.y + settings.offset + COORD_EPSILON) / domain.y as f32 * settings.scale;
        self.sample(x, y)
    }

    /// 2-D noise at an integer position, in [0, 1]
    #[inline]
    pub fn perlin_2d_int(&self, pos: IVec2, settings: NoiseSettings, domain: IVec2) -> f32 {
        self.perlin_2d(pos.as_vec2(), settings, domain)
    }

    /// 3-D noise at a real position, in [0, 1]
    ///
    /// Only X and Z of `domain` are used; every projection is normalized
    /// against the horizontal footprint.
    pub fn perlin_3d(&self, pos: Vec3, settings: NoiseSettings, domain: IVec3) -> f32 {
        let d = IVec2::new(domain.x, domain.z);
        let xy = self.perlin_2d(Vec2::new(pos.x, pos.y), settings, d);
        let xz = self.perlin_2d(Vec2::new(pos.x, pos.z), settings, d);
        let yz = self.perlin_2d(Vec2::new(pos.y, pos.z), settings, d);
        let yx = self.perlin_2d(Vec2::new(pos.y, pos.x), settings, d);
        let zx = self.perlin_2d(Vec2::new(pos.z, pos.x), settings, d);
        let zy = self.perlin_2d(Vec2::new(pos.z, pos.y), settings, d);

        (xy * PRIMARY_WEIGHT
            + xz * PRIMARY_WEIGHT
            + yz * PRIMARY_WEIGHT
            + yx * CROSS_WEIGHT
            + zx * CROSS_WEIGHT
            + zy * CROSS_WEIGHT)
            / TOTAL_WEIGHT
    }

    /// 3-D noise at an integer lattice position, in [0, 1]
    ///
    /// The position is shifted by [`INT_3D_SHIFT`] first so the world origin
    /// does not sit on a symmetric projection.
    #[inline]
    pub fn perlin_3d_int(&self, pos: IVec3, settings: NoiseSettings, domain: IVec3) -> f32 {
        self.perlin_3d((pos + INT_3D_SHIFT).as_vec3(), settings, domain)
    }

    #[inline]
    fn sample(&self, x: f32, y: f32) -> f32 {
        let v = self.perlin.get([x as f64, y as f64]) as f32;
        (v * 0.5 + 0.5).clamp(0.0, 1.0)
    }
}

impl Default for NoiseField {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SETTINGS: NoiseSettings = NoiseSettings::new(3.0, 17.5);
    const DOMAIN_2D: IVec2 = IVec2::new(17, 17);
    const DOMAIN_3D: IVec3 = IVec3::new(17, 64, 17);

    #[test]
    fn test_2d_in_unit_range() {
        let field = NoiseField::new(7);
        for x in -40..40 {
            for y in -40..40 {
                let v = field.perlin_2d_int(IVec2::new(x, y), SETTINGS, DOMAIN_2D);
                assert!((0.0..=1.0).contains(&v), "{} out of range", v);
            }
        }
    }

    #[test]
    fn test_3d_in_unit_range() {
        let field = NoiseField::new(7);
        for x in -8..8 {
            for y in 0..16 {
                for z in -8..8 {
                    let v = field.perlin_3d_int(IVec3::new(x, y, z), SETTINGS, DOMAIN_3D);
                    assert!((0.0..=1.0).contains(&v), "{} out of range", v);
                }
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let a = NoiseField::new(99);
        let b = NoiseField::new(99);
        let p = IVec3::new(12, 40, -3);
        assert_eq!(
            a.perlin_3d_int(p, SETTINGS, DOMAIN_3D).to_bits(),
            b.perlin_3d_int(p, SETTINGS, DOMAIN_3D).to_bits()
        );
    }

    #[test]
    fn test_int_3d_applies_shift() {
        let field = NoiseField::new(3);
        let p = IVec3::new(4, 9, -2);
        assert_eq!(
            field.perlin_3d_int(p, SETTINGS, DOMAIN_3D),
            field.perlin_3d((p + INT_3D_SHIFT).as_vec3(), SETTINGS, DOMAIN_3D)
        );
    }

    #[test]
    fn test_3d_is_weighted_projection_mean() {
        let field = NoiseField::new(11);
        let p = Vec3::new(3.0, 20.0, 8.0);
        let d = IVec2::new(DOMAIN_3D.x, DOMAIN_3D.z);
        let s = |a: f32, b: f32| field.perlin_2d(Vec2::new(a, b), SETTINGS, d);
        let expected = (5.0 * s(p.x, p.y)
            + 5.0 * s(p.x, p.z)
            + 5.0 * s(p.y, p.z)
            + s(p.y, p.x)
            + s(p.z, p.x)
            + s(p.z, p.y))
            / 18.0;
        assert_relative_eq!(field.perlin_3d(p, SETTINGS, DOMAIN_3D), expected, epsilon = 1e-6);
    }

    #[test]
    fn test_concurrent_evaluation_matches() {
        use rayon::prelude::*;
        let field = NoiseField::new(5);
        let points: Vec<IVec3> = (0..512).map(|i| IVec3::new(i % 8, i / 8, i % 5)).collect();
        let serial: Vec<u32> = points
            .iter()
            .map(|&p| field.perlin_3d_int(p, SETTINGS, DOMAIN_3D).to_bits())
            .collect();
        let parallel: Vec<u32> = points
            .par_iter()
            .map(|&p| field.perlin_3d_int(p, SETTINGS, DOMAIN_3D).to_bits())
            .collect();
        assert_eq!(serial, parallel);
    }
}
