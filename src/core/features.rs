//! Per-frame shader feature record.
//!
//! Replaces string-keyed global shader toggles. Each stage of the frame owns
//! the bits it produces; the driver emits the accumulated record with
//! [`RenderCommand::SetFeatures`](super::command::RenderCommand::SetFeatures)
//! after every producer, so a reader's input can always be traced back to a
//! single producer.
//!
//! | Producer            | Bits                                                   |
//! |---------------------|--------------------------------------------------------|
//! | Light setup         | `ADDITIONAL_LIGHTS`, `MIXED_LIGHTING_SUBTRACTIVE`      |
//! | Clustered culling   | `CLUSTER_LIGHTING`                                     |
//! | Main-light shadows  | `MAIN_LIGHT_SHADOWS`, `MAIN_LIGHT_SHADOWS_CASCADE`, `SOFT_SHADOWS` |
//! | Depth copy          | `DEPTH_NO_MSAA`, `DEPTH_MSAA_2`, `DEPTH_MSAA_4`        |
//! | Final blit          | `LINEAR_TO_SRGB`                                       |
//! | Debug view          | `PIPELINE_DEBUG`                                       |
//!
//! Material-local bits (tonemapping, grading, grain, bloom, RGBM, upsample
//! blur) travel on the blit that uses them instead of the global record.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FeatureFlags: u32 {
        const LINEAR_TO_SRGB             = 1 << 0;
        const TONEMAP_NEUTRAL            = 1 << 1;
        const TONEMAP_ACES               = 1 << 2;
        const TONEMAP_UCHIMURA           = 1 << 3;
        const HDR_GRADING                = 1 << 4;
        const FILM_GRAIN                 = 1 << 5;
        const BLOOM                      = 1 << 6;
        const USE_RGBM                   = 1 << 7;
        const UPSAMPLE_BLUR              = 1 << 8;
        const MAIN_LIGHT_SHADOWS         = 1 << 9;
        const MAIN_LIGHT_SHADOWS_CASCADE = 1 << 10;
        const SOFT_SHADOWS               = 1 << 11;
        const ADDITIONAL_LIGHTS          = 1 << 12;
        const MIXED_LIGHTING_SUBTRACTIVE = 1 << 13;
        const CLUSTER_LIGHTING           = 1 << 14;
        const PIPELINE_DEBUG             = 1 << 15;
        const DEPTH_NO_MSAA              = 1 << 16;
        const DEPTH_MSAA_2               = 1 << 17;
        const DEPTH_MSAA_4               = 1 << 18;

        /// Tonemapping variants are mutually exclusive.
        const TONEMAPPING = Self::TONEMAP_NEUTRAL.bits()
            | Self::TONEMAP_ACES.bits()
            | Self::TONEMAP_UCHIMURA.bits();
        const DEPTH_MSAA = Self::DEPTH_NO_MSAA.bits()
            | Self::DEPTH_MSAA_2.bits()
            | Self::DEPTH_MSAA_4.bits();
        const SHADOWS = Self::MAIN_LIGHT_SHADOWS.bits()
            | Self::MAIN_LIGHT_SHADOWS_CASCADE.bits()
            | Self::SOFT_SHADOWS.bits();
    }
}

impl FeatureFlags {
    /// Selects the depth-copy variant for a sample count.
    #[must_use]
    pub fn depth_copy_variant(msaa_samples: u32) -> Self {
        match msaa_samples {
            0 | 1 => Self::DEPTH_NO_MSAA,
            2 => Self::DEPTH_MSAA_2,
            _ => Self::DEPTH_MSAA_4,
        }
    }
}
