//! Post-Process Volume
//!
//! Pure data describing the look of the final image. The volume is part of
//! [`PipelineSettings`](crate::settings::PipelineSettings) so it can be loaded
//! from JSON, and the forward renderer keeps a runtime copy that callers may
//! tweak between frames (user LUTs and grain textures are runtime-only).
//!
//! | Component           | Active when                          | Consumed by      |
//! |---------------------|--------------------------------------|------------------|
//! | [`BloomSettings`]   | `intensity > 0`                      | bloom + uber     |
//! | [`TonemappingMode`] | not `None`                           | LUT (HDR) / uber |
//! | [`ColorAdjustments`]| always                               | LUT + uber       |
//! | [`WhiteBalance`]    | temperature or tint non-zero         | LUT              |
//! | [`LiftGammaGain`]   | any channel off its neutral value    | LUT              |
//! | [`SplitToning`]     | either colour off neutral grey       | LUT              |
//! | [`FilmGrain`]       | `intensity > 0`                      | uber             |
//! | [`ColorLookup`]     | texture set and contribution > 0     | uber             |

use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::core::TextureId;

/// Accepted bloom mip chain lengths.
pub const BLOOM_MIP_RANGE: (u32, u32) = (3, 6);

/// Largest half-float value, the default bloom clamp.
pub const BLOOM_DEFAULT_CLAMP: f32 = 65472.0;

const NEUTRAL_GREY: Vec4 = Vec4::new(0.5, 0.5, 0.5, 1.0);
const NEUTRAL_LGG: Vec4 = Vec4::new(1.0, 1.0, 1.0, 0.0);

/// A runtime texture with the dimensions the uber pass needs for tiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupTexture {
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
}

// ============================================================================
// Bloom
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomSettings {
    /// Brightness cut-off, in gamma space.
    pub threshold: f32,
    pub intensity: f32,
    /// Extent of the veiling effect, `[0, 1]`.
    pub scatter: f32,
    pub clamp: f32,
    /// sRGB tint; normalised by luminance before use.
    pub tint: Vec4,
    /// Blur while upsampling to remove mach bands.
    pub high_quality_upsampling: bool,
    /// Blur the prefiltered image before downsampling to suppress flicker.
    pub prefilter_blur: bool,
    pub mip_count: u32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            threshold: 0.9,
            intensity: 0.0,
            scatter: 0.7,
            clamp: BLOOM_DEFAULT_CLAMP,
            tint: Vec4::ONE,
            high_quality_upsampling: false,
            prefilter_blur: false,
            mip_count: 5,
        }
    }
}

impl BloomSettings {
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.intensity > 0.0
    }

    /// Mip count clamped into [`BLOOM_MIP_RANGE`].
    #[inline]
    #[must_use]
    pub fn effective_mip_count(&self) -> u32 {
        self.mip_count.clamp(BLOOM_MIP_RANGE.0, BLOOM_MIP_RANGE.1)
    }

    #[must_use]
    pub fn validated(mut self) -> Self {
        let mips = self.effective_mip_count();
        if mips != self.mip_count {
            log::warn!("bloom mip_count {} clamped to {}", self.mip_count, mips);
            self.mip_count = mips;
        }
        self.threshold = self.threshold.max(0.0);
        self.intensity = self.intensity.max(0.0);
        self.scatter = self.scatter.clamp(0.0, 1.0);
        self.clamp = self.clamp.max(0.0);
        self
    }
}

// ============================================================================
// Tonemapping / Grading
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TonemappingMode {
    #[default]
    None,
    Neutral,
    Aces,
    Uchimura,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorAdjustments {
    /// EV stops applied after grading.
    pub post_exposure: f32,
    /// `[-100, 100]`.
    pub contrast: f32,
    /// sRGB multiplier.
    pub color_filter: Vec4,
    /// Degrees, `[-180, 180]`.
    pub hue_shift: f32,
    /// `[-100, 100]`.
    pub saturation: f32,
}

impl Default for ColorAdjustments {
    fn default() -> Self {
        Self {
            post_exposure: 0.0,
            contrast: 0.0,
            color_filter: Vec4::ONE,
            hue_shift: 0.0,
            saturation: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WhiteBalance {
    /// `[-100, 100]`.
    pub temperature: f32,
    /// `[-100, 100]`.
    pub tint: f32,
}

impl WhiteBalance {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.temperature != 0.0 || self.tint != 0.0
    }
}

/// Trackball values: rgb in gamma space, `w` is the offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiftGammaGain {
    pub lift: Vec4,
    pub gamma: Vec4,
    pub gain: Vec4,
}

impl Default for LiftGammaGain {
    fn default() -> Self {
        Self {
            lift: NEUTRAL_LGG,
            gamma: NEUTRAL_LGG,
            gain: NEUTRAL_LGG,
        }
    }
}

impl LiftGammaGain {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lift != NEUTRAL_LGG || self.gamma != NEUTRAL_LGG || self.gain != NEUTRAL_LGG
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitToning {
    /// sRGB.
    pub shadows: Vec4,
    /// sRGB.
    pub highlights: Vec4,
    /// `[-100, 100]`.
    pub balance: f32,
}

impl Default for SplitToning {
    fn default() -> Self {
        Self {
            shadows: NEUTRAL_GREY,
            highlights: NEUTRAL_GREY,
            balance: 0.0,
        }
    }
}

impl SplitToning {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shadows != NEUTRAL_GREY || self.highlights != NEUTRAL_GREY
    }
}

// ============================================================================
// Uber-only components
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilmGrain {
    pub intensity: f32,
    /// Noisiness response curve based on scene luminance.
    pub response: f32,
    #[serde(skip)]
    pub texture: Option<LookupTexture>,
}

impl Default for FilmGrain {
    fn default() -> Self {
        Self {
            intensity: 0.0,
            response: 0.8,
            texture: None,
        }
    }
}

impl FilmGrain {
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.intensity > 0.0
    }
}

/// User-supplied grading LUT applied on top of the internal one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorLookup {
    pub contribution: f32,
    #[serde(skip)]
    pub texture: Option<LookupTexture>,
}

impl Default for ColorLookup {
    fn default() -> Self {
        Self {
            contribution: 1.0,
            texture: None,
        }
    }
}

impl ColorLookup {
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.texture.is_some() && self.contribution > 0.0
    }
}

// ============================================================================
// Volume
// ============================================================================

/// Every post-process component, resolved for the frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessVolume {
    pub bloom: BloomSettings,
    pub tonemapping: TonemappingMode,
    pub color_adjustments: ColorAdjustments,
    pub white_balance: WhiteBalance,
    pub lift_gamma_gain: LiftGammaGain,
    pub split_toning: SplitToning,
    pub film_grain: FilmGrain,
    pub color_lookup: ColorLookup,
}

impl PostProcessVolume {
    #[must_use]
    pub fn validated(mut self) -> Self {
        self.bloom = self.bloom.validated();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bloom_inactive_by_default() {
        assert!(!BloomSettings::default().is_active());
    }

    #[test]
    fn test_bloom_mip_count_clamped() {
        let low = BloomSettings { mip_count: 1, ..Default::default() }.validated();
        let high = BloomSettings { mip_count: 9, ..Default::default() }.validated();
        assert_eq!(low.mip_count, 3);
        assert_eq!(high.mip_count, 6);
    }

    #[test]
    fn test_neutral_grading_is_inactive() {
        let volume = PostProcessVolume::default();
        assert!(!volume.white_balance.is_active());
        assert!(!volume.lift_gamma_gain.is_active());
        assert!(!volume.split_toning.is_active());
        assert!(!volume.color_lookup.is_active());
    }
}
