//! Post-Process Orchestrator
//!
//! Sequences the post-processing stack of one camera:
//!
//! ```text
//! ┌────────────┐    ┌──────────────────┐    ┌───────────────────────────┐
//! │ LUT bake   │───►│ Bloom (optional) │───►│ Uber composite            │
//! │ (per cam)  │    │ → _BloomFinal    │    │ exposure · LUT · bloom ·  │
//! └────────────┘    └──────────────────┘    │ grain · linear→sRGB       │
//!                                           └─────────────┬─────────────┘
//!                                                         ▼
//!                                              caller's destination
//! ```
//!
//! The LUT is baked by [`PostProcessOrchestrator::render_lut`] early in the
//! frame and released by [`PostProcessOrchestrator::frame_cleanup`]. Bloom
//! and the uber pass run together in [`PostProcessOrchestrator::render`],
//! which leaves no bloom target live when it returns.

pub mod bloom;
pub mod color;
pub mod color_grading;
pub mod volume;

use glam::{Mat4, Vec4};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::core::{
    BlitMaterial, CommandList, FeatureFlags, GpuContext, LoadAction, RenderCommand, StoreAction, TargetRef,
    TextureId, TransientResourceTable, slots,
};
use crate::errors::Result;
use crate::renderer::frame_data::RenderingData;
use crate::settings::ColorGradingMode;

pub use bloom::{BloomOutput, BloomPass};
pub use color_grading::ColorGradingLutPass;
pub use volume::{
    BloomSettings, ColorAdjustments, ColorLookup, FilmGrain, LiftGammaGain, LookupTexture, PostProcessVolume,
    SplitToning, TonemappingMode, WhiteBalance,
};

pub mod names {
    pub const BLIT_TEX: &str = "_BlitTex";
    pub const INTERNAL_LUT: &str = "_InternalLut";
    pub const LUT_PARAMS: &str = "_Lut_Params";
    pub const USER_LUT: &str = "_UserLut";
    pub const USER_LUT_PARAMS: &str = "_UserLut_Params";
    pub const GRAIN_TEXTURE: &str = "_Grain_Texture";
    pub const GRAIN_PARAMS: &str = "_Grain_Params";
    pub const GRAIN_TILING_PARAMS: &str = "_Grain_TilingParams";
}

/// Uber-side LUT parameters `(1/w, 1/h, h-1, 2^postExposure)`.
#[must_use]
pub fn uber_lut_params(lut_size: u32, post_exposure: f32) -> Vec4 {
    let (w, h) = color_grading::lut_dimensions(lut_size);
    let (w, h) = (w as f32, h as f32);
    Vec4::new(1.0 / w, 1.0 / h, h - 1.0, post_exposure.exp2())
}

/// User LUT parameters; zero when the lookup is inactive.
#[must_use]
pub fn user_lut_params(lookup: &ColorLookup) -> Vec4 {
    match lookup.texture {
        Some(lut) if lookup.is_active() => {
            let (w, h) = (lut.width as f32, lut.height as f32);
            Vec4::new(1.0 / w, 1.0 / h, h - 1.0, lookup.contribution)
        }
        _ => Vec4::ZERO,
    }
}

pub struct PostProcessOrchestrator {
    lut_pass: ColorGradingLutPass,
    bloom_pass: BloomPass,
    rng: StdRng,
}

impl PostProcessOrchestrator {
    #[must_use]
    pub fn new(hdr_format_supported: bool) -> Self {
        Self::with_seed(hdr_format_supported, 0x5EED)
    }

    /// Deterministic film-grain offsets for a given seed.
    #[must_use]
    pub fn with_seed(hdr_format_supported: bool, seed: u64) -> Self {
        Self {
            lut_pass: ColorGradingLutPass::new(),
            bloom_pass: BloomPass::new(hdr_format_supported),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Bakes the internal grading LUT for this camera.
    pub fn render_lut(
        &self,
        cmd: &mut CommandList,
        table: &mut TransientResourceTable,
        ctx: &mut dyn GpuContext,
        volume: &PostProcessVolume,
        data: &RenderingData,
    ) -> Result<TextureId> {
        self.lut_pass.render(cmd, table, ctx, volume, &data.post_process)
    }

    /// Runs bloom (when active) and the uber composite from `source` into
    /// `dest`.
    pub fn render(
        &mut self,
        cmd: &mut CommandList,
        table: &mut TransientResourceTable,
        ctx: &mut dyn GpuContext,
        volume: &PostProcessVolume,
        data: &RenderingData,
        source: TargetRef,
        dest: TargetRef,
    ) -> Result<()> {
        let requires_srgb = ctx.capabilities().requires_srgb_blit;
        let camera = &data.camera.camera;
        let mut features = FeatureFlags::empty();

        let bloom_output = if volume.bloom.is_active() {
            let (width, height) = data.camera.scaled_size();
            Some(self.bloom_pass.render(cmd, table, ctx, source, width, height, &volume.bloom)?)
        } else {
            None
        };
        if let Some(output) = &bloom_output {
            cmd.set_global_vector(bloom::names::BLOOM_PARAMS, output.params);
            cmd.set_global_texture(bloom::names::BLOOM_TEXTURE, TargetRef::Texture(output.final_texture));
            features |= output.features;
        }

        features |= self.setup_color_grading(cmd, table, volume, data);
        features |= self.setup_film_grain(cmd, volume, camera.pixel_width, camera.pixel_height);
        if requires_srgb {
            features |= FeatureFlags::LINEAR_TO_SRGB;
        }

        cmd.set_global_texture(names::BLIT_TEX, source);
        if data.camera.is_scene_view {
            cmd.push(RenderCommand::SetRenderTarget {
                color: dest,
                depth: dest,
                color_load: LoadAction::DontCare,
                color_store: StoreAction::Store,
                depth_load: LoadAction::DontCare,
                depth_store: StoreAction::DontCare,
            });
        } else {
            cmd.set_render_target(dest, dest, LoadAction::DontCare, StoreAction::Store);
            cmd.set_view_projection(Mat4::IDENTITY, Mat4::IDENTITY);
            cmd.push(RenderCommand::SetViewport(camera.pixel_rect()));
        }
        cmd.blit(Some(source), dest, BlitMaterial::Uber, 0, features);
        log::trace!("Uber post-process {features:?}");

        if bloom_output.is_some() {
            table.release(slots::BLOOM_FINAL)?;
        }
        Ok(())
    }

    /// Releases the per-camera LUT.
    pub fn frame_cleanup(&self, table: &mut TransientResourceTable) {
        self.lut_pass.frame_cleanup(table);
    }

    #[inline]
    #[must_use]
    pub fn uses_rgbm(&self) -> bool {
        self.bloom_pass.uses_rgbm()
    }

    fn setup_color_grading(
        &self,
        cmd: &mut CommandList,
        table: &TransientResourceTable,
        volume: &PostProcessVolume,
        data: &RenderingData,
    ) -> FeatureFlags {
        let post = &data.post_process;
        if let Some(lut) = table.get(slots::GRADING_LUT) {
            cmd.set_global_texture(names::INTERNAL_LUT, TargetRef::Texture(lut));
        } else {
            log::warn!("Uber pass without a baked grading LUT");
        }
        cmd.set_global_vector(
            names::LUT_PARAMS,
            uber_lut_params(post.lut_size, volume.color_adjustments.post_exposure),
        );
        if let Some(user) = volume.color_lookup.texture.filter(|_| volume.color_lookup.is_active()) {
            cmd.set_global_texture(names::USER_LUT, TargetRef::Texture(user.texture));
        }
        cmd.set_global_vector(names::USER_LUT_PARAMS, user_lut_params(&volume.color_lookup));

        match post.grading_mode {
            ColorGradingMode::HighDynamicRange => FeatureFlags::HDR_GRADING,
            ColorGradingMode::LowDynamicRange => color_grading::tonemapping_features(volume.tonemapping),
        }
    }

    fn setup_film_grain(
        &mut self,
        cmd: &mut CommandList,
        volume: &PostProcessVolume,
        pixel_width: u32,
        pixel_height: u32,
    ) -> FeatureFlags {
        let grain = &volume.film_grain;
        if !grain.is_active() {
            return FeatureFlags::empty();
        }

        let offset_x: f32 = self.rng.random_range(0.0..1.0);
        let offset_y: f32 = self.rng.random_range(0.0..1.0);
        let tiling = grain.texture.map_or(Vec4::ZERO, |tex| {
            Vec4::new(
                pixel_width as f32 / tex.width as f32,
                pixel_height as f32 / tex.height as f32,
                offset_x,
                offset_y,
            )
        });

        if let Some(tex) = grain.texture {
            cmd.set_global_texture(names::GRAIN_TEXTURE, TargetRef::Texture(tex.texture));
        }
        cmd.set_global_vector(names::GRAIN_PARAMS, Vec4::new(grain.intensity * 4.0, grain.response, 0.0, 0.0));
        cmd.set_global_vector(names::GRAIN_TILING_PARAMS, tiling);
        FeatureFlags::FILM_GRAIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uber_lut_params() {
        let p = uber_lut_params(32, 1.0);
        assert!((p.x - 1.0 / 1024.0).abs() < 1e-9);
        assert!((p.y - 1.0 / 32.0).abs() < 1e-9);
        assert!((p.z - 31.0).abs() < 1e-6);
        assert!((p.w - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_inactive_user_lut_params_are_zero() {
        let lookup = ColorLookup {
            contribution: 0.0,
            texture: Some(LookupTexture {
                texture: TextureId::default(),
                width: 256,
                height: 16,
            }),
        };
        assert_eq!(user_lut_params(&lookup), Vec4::ZERO);
    }
}
