//! Bloom
//!
//! Quarter-resolution prefilter followed by a separable-blur mip chain and a
//! coarse-to-fine upsample.
//!
//! # Pass Chain
//!
//! ```text
//! source ──(0 prefilter)──► _BloomInit ──(6 blur, optional)──► _BloomInitBlurred
//!                               │
//!            ┌──────────────────┘
//!            ▼
//!   for i in 0..n:  last ──(2 h-blur)──► up[i] ──(3 v-blur)──► down[i]
//!
//!   low = down[n-1]
//!   down[n-2] ──(4 upsample, low)──► up[n-2]
//!   for i in n-3..=0:  down[i] ──(4 upsample, low = up[i+1])──► up[i]
//!   up[0] ──(5 final)──► _BloomFinal
//! ```
//!
//! Every target except `_BloomFinal` is released before
//! [`BloomPass::render`] returns; the uber pass reads `_BloomFinal` and the
//! orchestrator releases it afterwards.

use glam::{Vec3, Vec4};

use super::color::{gamma_to_linear, luminance, srgb_to_linear};
use super::volume::BloomSettings;
use crate::core::{
    BlitMaterial, CommandList, FeatureFlags, FilterMode, GpuContext, LoadAction, RenderCommand, StoreAction,
    TargetRef, TextureDesc, TextureFormat, TextureId, TransientResourceTable, slots,
};
use crate::errors::Result;

pub mod names {
    /// Prefilter `(threshold, knee, scatter, clamp)`.
    pub const PARAMS: &str = "_Params";
    pub const LOW_MIP: &str = "_BloomLowMip";
    /// Uber `(intensity, tint.rgb)`.
    pub const BLOOM_PARAMS: &str = "_Bloom_Params";
    pub const BLOOM_TEXTURE: &str = "_Bloom_Texture";
}

/// Material passes of the bloom shader.
pub mod passes {
    pub const PREFILTER: u32 = 0;
    pub const BLUR_HORIZONTAL: u32 = 2;
    pub const BLUR_VERTICAL: u32 = 3;
    pub const UPSAMPLE: u32 = 4;
    pub const FINAL: u32 = 5;
    pub const PREFILTER_BLUR: u32 = 6;
}

/// What the uber pass needs from a finished bloom chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomOutput {
    pub final_texture: TextureId,
    /// `(intensity, normalised linear tint)`.
    pub params: Vec4,
    /// `BLOOM`, plus `USE_RGBM` on the fallback format.
    pub features: FeatureFlags,
}

/// Prefilter constants `(threshold, knee, scatter, clamp)`.
#[must_use]
pub fn prefilter_params(settings: &BloomSettings) -> Vec4 {
    let threshold = gamma_to_linear(settings.threshold);
    let knee = threshold * 0.5;
    let scatter = 0.05 + (0.95 - 0.05) * settings.scatter;
    Vec4::new(threshold, knee, scatter, settings.clamp)
}

/// Linear tint normalised to unit luminance; white when the tint is black.
#[must_use]
pub fn normalized_tint(tint: Vec4) -> Vec3 {
    let linear = srgb_to_linear(tint).truncate();
    let luma = luminance(linear);
    if luma > 0.0 { linear / luma } else { Vec3::ONE }
}

/// Size of each mip after the quarter-resolution prefilter.
#[must_use]
pub fn mip_sizes(width: u32, height: u32, mip_count: u32) -> Vec<(u32, u32)> {
    let (mut w, mut h) = quarter(width, height);
    (0..mip_count)
        .map(|_| {
            w = (w >> 1).max(1);
            h = (h >> 1).max(1);
            (w, h)
        })
        .collect()
}

fn quarter(width: u32, height: u32) -> (u32, u32) {
    ((width >> 2).max(1), (height >> 2).max(1))
}

pub struct BloomPass {
    format: TextureFormat,
    use_rgbm: bool,
}

impl BloomPass {
    /// Picks the bloom format. Without a packed HDR format the chain is
    /// RGBM-encoded in an 8-bit target.
    #[must_use]
    pub fn new(hdr_format_supported: bool) -> Self {
        if hdr_format_supported {
            Self {
                format: TextureFormat::Rg11B10Float,
                use_rgbm: false,
            }
        } else {
            Self {
                format: TextureFormat::Rgba8UnormSrgb,
                use_rgbm: true,
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn uses_rgbm(&self) -> bool {
        self.use_rgbm
    }

    /// Records the whole chain from `source` into `_BloomFinal`.
    ///
    /// `width` and `height` are the full-resolution source size.
    pub fn render(
        &self,
        cmd: &mut CommandList,
        table: &mut TransientResourceTable,
        ctx: &mut dyn GpuContext,
        source: TargetRef,
        width: u32,
        height: u32,
        settings: &BloomSettings,
    ) -> Result<BloomOutput> {
        let rgbm = if self.use_rgbm {
            FeatureFlags::USE_RGBM
        } else {
            FeatureFlags::empty()
        };
        cmd.set_global_vector(names::PARAMS, prefilter_params(settings));

        let (tw, th) = quarter(width, height);
        let desc = |w, h, label| TextureDesc::color(w, h, self.format, label).with_filter(FilterMode::Bilinear);

        // Prefilter
        let init = table.acquire(slots::BLOOM_INIT, &desc(tw, th, slots::BLOOM_INIT), ctx)?;
        let blurred = if settings.prefilter_blur {
            Some(table.acquire(
                slots::BLOOM_INIT_BLURRED,
                &desc(tw, th, slots::BLOOM_INIT_BLURRED),
                ctx,
            )?)
        } else {
            None
        };
        let final_texture = table.acquire(slots::BLOOM_FINAL, &desc(tw, th, slots::BLOOM_FINAL), ctx)?;

        cmd.blit(Some(source), TargetRef::Texture(init), BlitMaterial::Bloom, passes::PREFILTER, rgbm);
        if let Some(blurred) = blurred {
            cmd.blit(
                Some(TargetRef::Texture(init)),
                TargetRef::Texture(blurred),
                BlitMaterial::Bloom,
                passes::PREFILTER_BLUR,
                rgbm,
            );
        }

        // Downsample
        let mip_count = settings.effective_mip_count() as usize;
        let mut up = Vec::with_capacity(mip_count);
        let mut down = Vec::with_capacity(mip_count);
        let mut last = blurred.unwrap_or(init);
        for (i, (w, h)) in mip_sizes(width, height, mip_count as u32).into_iter().enumerate() {
            let mip_up = table.acquire(slots::BLOOM_MIP_UP[i], &desc(w, h, slots::BLOOM_MIP_UP[i]), ctx)?;
            let mip_down = table.acquire(slots::BLOOM_MIP_DOWN[i], &desc(w, h, slots::BLOOM_MIP_DOWN[i]), ctx)?;
            cmd.blit(
                Some(TargetRef::Texture(last)),
                TargetRef::Texture(mip_up),
                BlitMaterial::Bloom,
                passes::BLUR_HORIZONTAL,
                rgbm,
            );
            cmd.blit(
                Some(TargetRef::Texture(mip_up)),
                TargetRef::Texture(mip_down),
                BlitMaterial::Bloom,
                passes::BLUR_VERTICAL,
                rgbm,
            );
            up.push(mip_up);
            down.push(mip_down);
            last = mip_down;
        }
        log::debug!("Bloom chain: {mip_count} mips from {tw}x{th}");

        // Upsample, coarse to fine
        let upsample = if settings.high_quality_upsampling {
            rgbm | FeatureFlags::UPSAMPLE_BLUR
        } else {
            rgbm
        };
        let mut low = down[mip_count - 1];
        for i in (0..=mip_count - 2).rev() {
            cmd.set_global_texture(names::LOW_MIP, TargetRef::Texture(low));
            discard_target(cmd, up[i]);
            cmd.blit(
                Some(TargetRef::Texture(down[i])),
                TargetRef::Texture(up[i]),
                BlitMaterial::Bloom,
                passes::UPSAMPLE,
                upsample,
            );
            low = up[i];
        }
        discard_target(cmd, final_texture);
        cmd.blit(
            Some(TargetRef::Texture(up[0])),
            TargetRef::Texture(final_texture),
            BlitMaterial::Bloom,
            passes::FINAL,
            rgbm,
        );

        // Release everything but the final target
        table.release(slots::BLOOM_INIT)?;
        if blurred.is_some() {
            table.release(slots::BLOOM_INIT_BLURRED)?;
        }
        for i in 0..mip_count {
            table.release(slots::BLOOM_MIP_UP[i])?;
            table.release(slots::BLOOM_MIP_DOWN[i])?;
        }

        let tint = normalized_tint(settings.tint);
        Ok(BloomOutput {
            final_texture,
            params: Vec4::new(settings.intensity, tint.x, tint.y, tint.z),
            features: FeatureFlags::BLOOM | rgbm,
        })
    }
}

/// Binds `texture` as colour only; its previous contents are not needed.
fn discard_target(cmd: &mut CommandList, texture: TextureId) {
    let target = TargetRef::Texture(texture);
    cmd.push(RenderCommand::SetRenderTarget {
        color: target,
        depth: target,
        color_load: LoadAction::DontCare,
        color_store: StoreAction::Store,
        depth_load: LoadAction::DontCare,
        depth_store: StoreAction::DontCare,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_prefilter_params() {
        let p = prefilter_params(&BloomSettings {
            threshold: 1.0,
            scatter: 1.0,
            ..Default::default()
        });
        assert!((p.x - 1.0).abs() < EPSILON);
        assert!((p.y - 0.5).abs() < EPSILON);
        assert!((p.z - 0.95).abs() < EPSILON);
        assert!((p.w - 65472.0).abs() < EPSILON);
    }

    #[test]
    fn test_black_tint_falls_back_to_white() {
        assert_eq!(normalized_tint(Vec4::new(0.0, 0.0, 0.0, 1.0)), Vec3::ONE);
        let white = normalized_tint(Vec4::ONE);
        assert!((white - Vec3::ONE).abs().max_element() < EPSILON);
    }

    #[test]
    fn test_mip_sizes_halve_from_quarter_resolution() {
        let sizes = mip_sizes(1920, 1080, 5);
        assert_eq!(sizes.len(), 5);
        assert_eq!(sizes[0], (240, 135));
        assert_eq!(sizes[4], (15, 8));
    }

    #[test]
    fn test_tiny_source_never_reaches_zero() {
        assert!(mip_sizes(8, 8, 6).iter().all(|&(w, h)| w >= 1 && h >= 1));
    }
}
