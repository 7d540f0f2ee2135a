//! Material categories attached to extracted triangles
//!
//! The extractor tags each triangle from the lattice point that anchors it;
//! the consumer only ever sees the resulting colors.

use serde::{Deserialize, Serialize};

/// Coarse material category of a triangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialTag {
    /// Solid point with open air directly above
    Surface,
    /// Solid point buried under more solid
    Earth,
    /// Solid point at or above the mountain line
    Mountain,
    /// No solid point to anchor on
    Error,
}

/// RGBA color per material tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialPalette {
    pub surface: [u8; 4],
    pub earth: [u8; 4],
    pub mountain: [u8; 4],
    pub error: [u8; 4],
}

impl Default for MaterialPalette {
    fn default() -> Self {
        Self {
            surface: [86, 160, 60, 255],
            earth: [121, 85, 58, 255],
            mountain: [142, 142, 148, 255],
            error: [255, 0, 255, 255],
        }
    }
}

/// Rules for picking a [`MaterialTag`] and its color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialPolicy {
    /// World height from which solid points count as mountain
    pub mountain_height: i32,
    pub palette: MaterialPalette,
}

impl Default for MaterialPolicy {
    fn default() -> Self {
        Self { mountain_height: 38, palette: MaterialPalette::default() }
    }
}

impl MaterialPolicy {
    /// Tag for a solid anchor point at `world_y`
    ///
    /// `open_above` is whether the lattice point directly above is empty.
    #[inline]
    pub fn classify(&self, world_y: i32, open_above: bool) -> MaterialTag {
        if world_y >= self.mountain_height {
            MaterialTag::Mountain
        } else if open_above {
            MaterialTag::Surface
        } else {
            MaterialTag::Earth
        }
    }

    #[inline]
    pub fn color(&self, tag: MaterialTag) -> [u8; 4] {
        match tag {
            MaterialTag::Surface => self.palette.surface,
            MaterialTag::Earth => self.palette.earth,
            MaterialTag::Mountain => self.palette.mountain,
            MaterialTag::Error => self.palette.error,
        }
    }
}
