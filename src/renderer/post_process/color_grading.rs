//! Colour-grading LUT bake.
//!
//! Renders the internal grading LUT into the transient `_InternalGradingLut`
//! slot once per camera. The LUT is a `size² × size` strip of `size` slices.
//! In HDR grading mode the selected tonemapper is baked into the LUT; in LDR
//! mode the uber pass tonemaps instead.

use glam::{Vec3, Vec4};

use super::color::{color_balance_to_lms, prepare_lift_gamma_gain, prepare_split_toning, srgb_to_linear};
use super::volume::{PostProcessVolume, TonemappingMode};
use crate::core::{
    BlitMaterial, CommandList, FeatureFlags, GpuContext, LoadAction, StoreAction, TargetRef, TextureDesc,
    TextureFormat, TextureId, TransientResourceTable, slots,
};
use crate::errors::Result;
use crate::renderer::frame_data::PostProcessData;
use crate::settings::ColorGradingMode;

pub mod names {
    pub const LUT_PARAMS: &str = "_Lut_Params";
    pub const COLOR_BALANCE: &str = "_ColorBalance";
    pub const COLOR_FILTER: &str = "_ColorFilter";
    pub const HUE_SAT_CON: &str = "_HueSatCon";
    pub const LIFT: &str = "_Lift";
    pub const GAMMA: &str = "_Gamma";
    pub const GAIN: &str = "_Gain";
    pub const SPLIT_SHADOWS: &str = "_SplitShadows";
    pub const SPLIT_HIGHLIGHTS: &str = "_SplitHighlights";
}

/// LUT width and height for a slice size.
#[inline]
#[must_use]
pub fn lut_dimensions(lut_size: u32) -> (u32, u32) {
    (lut_size * lut_size, lut_size)
}

/// Bake-side LUT parameters `(h, 0.5/w, 0.5/h, h/(h-1))`.
#[must_use]
pub fn lut_bake_params(lut_size: u32) -> Vec4 {
    let (w, h) = lut_dimensions(lut_size);
    let (w, h) = (w as f32, h as f32);
    Vec4::new(h, 0.5 / w, 0.5 / h, h / (h - 1.0))
}

/// Tonemapping feature bit for a mode; empty for `None`.
#[must_use]
pub fn tonemapping_features(mode: TonemappingMode) -> FeatureFlags {
    match mode {
        TonemappingMode::None => FeatureFlags::empty(),
        TonemappingMode::Neutral => FeatureFlags::TONEMAP_NEUTRAL,
        TonemappingMode::Aces => FeatureFlags::TONEMAP_ACES,
        TonemappingMode::Uchimura => FeatureFlags::TONEMAP_UCHIMURA,
    }
}

pub struct ColorGradingLutPass {
    ldr_format: TextureFormat,
    hdr_format: TextureFormat,
}

impl Default for ColorGradingLutPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorGradingLutPass {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ldr_format: TextureFormat::Rgba8Unorm,
            hdr_format: TextureFormat::Rgba16Float,
        }
    }

    /// Acquires and renders the internal LUT. Returns its texture.
    pub fn render(
        &self,
        cmd: &mut CommandList,
        table: &mut TransientResourceTable,
        ctx: &mut dyn GpuContext,
        volume: &PostProcessVolume,
        data: &PostProcessData,
    ) -> Result<TextureId> {
        let hdr = data.grading_mode == ColorGradingMode::HighDynamicRange;
        let (width, height) = lut_dimensions(data.lut_size);
        let format = if hdr { self.hdr_format } else { self.ldr_format };
        let material = if hdr {
            BlitMaterial::LutBuilderHdr
        } else {
            BlitMaterial::LutBuilderLdr
        };

        let adjust = &volume.color_adjustments;
        let balance = volume.white_balance;
        let hue_sat_con = Vec4::new(
            adjust.hue_shift / 360.0,
            adjust.saturation / 100.0 + 1.0,
            adjust.contrast / 100.0 + 1.0,
            0.0,
        );
        let lgg = volume.lift_gamma_gain;
        let (lift, gamma, gain) = prepare_lift_gamma_gain(lgg.lift, lgg.gamma, lgg.gain);
        let split = volume.split_toning;
        let (split_shadows, split_highlights) = prepare_split_toning(split.shadows, split.highlights, split.balance);
        let lms: Vec3 = color_balance_to_lms(balance.temperature, balance.tint);

        cmd.set_global_vector(names::LUT_PARAMS, lut_bake_params(data.lut_size));
        cmd.set_global_vector(names::COLOR_BALANCE, lms.extend(0.0));
        cmd.set_global_vector(names::COLOR_FILTER, srgb_to_linear(adjust.color_filter));
        cmd.set_global_vector(names::HUE_SAT_CON, hue_sat_con);
        cmd.set_global_vector(names::LIFT, lift);
        cmd.set_global_vector(names::GAMMA, gamma);
        cmd.set_global_vector(names::GAIN, gain);
        cmd.set_global_vector(names::SPLIT_SHADOWS, split_shadows);
        cmd.set_global_vector(names::SPLIT_HIGHLIGHTS, split_highlights);

        let features = if hdr {
            tonemapping_features(volume.tonemapping)
        } else {
            FeatureFlags::empty()
        };

        let desc = TextureDesc::color(width, height, format, slots::GRADING_LUT);
        let lut = table.acquire(slots::GRADING_LUT, &desc, ctx)?;
        let target = TargetRef::Texture(lut);
        cmd.set_render_target(target, target, LoadAction::DontCare, StoreAction::Store);
        cmd.blit(None, target, material, 0, features);
        log::trace!("Grading LUT {width}x{height} ({})", if hdr { "HDR" } else { "LDR" });
        Ok(lut)
    }

    /// Releases the LUT acquired by [`render`](Self::render), if any.
    pub fn frame_cleanup(&self, table: &mut TransientResourceTable) {
        table.release_if_live(slots::GRADING_LUT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lut_bake_params() {
        let p = lut_bake_params(32);
        assert!((p.x - 32.0).abs() < 1e-6);
        assert!((p.y - 0.5 / 1024.0).abs() < 1e-9);
        assert!((p.z - 0.5 / 32.0).abs() < 1e-9);
        assert!((p.w - 32.0 / 31.0).abs() < 1e-6);
    }

    #[test]
    fn test_tonemapping_features_are_exclusive() {
        assert!(tonemapping_features(TonemappingMode::None).is_empty());
        assert_eq!(tonemapping_features(TonemappingMode::Aces), FeatureFlags::TONEMAP_ACES);
    }
}
