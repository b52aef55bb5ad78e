//! Pipeline Settings
//!
//! [`PipelineSettings`] is the single, read-only configuration value of the
//! frame pipeline. It is built once (from code or JSON), wrapped in an
//! [`Arc`](std::sync::Arc) and handed to every component at construction.
//! Nothing in the pipeline mutates it.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xrp::settings::{PipelineSettings, ShadowCascadesOption};
//!
//! let settings = PipelineSettings {
//!     use_cluster_lighting: true,
//!     shadow_cascades: ShadowCascadesOption::FourCascades,
//!     ..Default::default()
//! };
//! let renderer = ForwardRenderer::new(Arc::new(settings.validated()), ctx.capabilities(), RuntimeFlags::default());
//! ```

use bitflags::bitflags;
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::renderer::post_process::PostProcessVolume;

/// Smallest accepted render scale.
pub const MIN_RENDER_SCALE: f32 = 0.1;
/// Largest accepted render scale.
pub const MAX_RENDER_SCALE: f32 = 2.0;
/// Largest accepted shadow bias, in pipeline units.
pub const MAX_SHADOW_BIAS: f32 = 10.0;
/// Accepted colour-grading LUT sizes.
pub const LUT_SIZE_RANGE: (u32, u32) = (16, 65);
/// Largest accepted tile count along either screen axis.
pub const MAX_CLUSTER_TILES: u32 = 256;
/// Largest accepted number of depth slices.
pub const MAX_CLUSTER_SLICES: u32 = 128;
/// Largest accepted per-cluster light list length.
pub const MAX_LIGHTS_PER_CLUSTER: u32 = 256;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Multi-sample anti-aliasing quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MsaaQuality {
    #[default]
    Disabled,
    Msaa2x,
    Msaa4x,
    Msaa8x,
}

impl MsaaQuality {
    #[inline]
    #[must_use]
    pub const fn samples(self) -> u32 {
        match self {
            Self::Disabled => 1,
            Self::Msaa2x => 2,
            Self::Msaa4x => 4,
            Self::Msaa8x => 8,
        }
    }
}

/// Main-light shadow map resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShadowmapResolution {
    R256,
    R512,
    #[default]
    R1024,
    R2048,
    R4096,
}

impl ShadowmapResolution {
    #[inline]
    #[must_use]
    pub const fn pixels(self) -> u32 {
        match self {
            Self::R256 => 256,
            Self::R512 => 512,
            Self::R1024 => 1024,
            Self::R2048 => 2048,
            Self::R4096 => 4096,
        }
    }
}

/// How the main-light shadow distance is split into cascades.
///
/// `Unrecognized` absorbs any value a settings file names that this build does
/// not know. It resolves to a single cascade with an error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShadowCascadesOption {
    NoCascades,
    TwoCascades,
    #[default]
    FourCascades,
    #[serde(other)]
    Unrecognized,
}

/// Downsampling applied when copying the opaque colour buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Downsampling {
    None,
    #[default]
    Bilinear2x,
    Box4x,
    Bilinear4x,
}

impl Downsampling {
    /// Integer divisor applied to both target dimensions.
    #[inline]
    #[must_use]
    pub const fn divisor(self) -> u32 {
        match self {
            Self::None => 1,
            Self::Bilinear2x => 2,
            Self::Box4x | Self::Bilinear4x => 4,
        }
    }
}

/// Where colour grading happens relative to tonemapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorGradingMode {
    /// Classic workflow: limited grading applied after tonemapping.
    #[default]
    LowDynamicRange,
    /// Grading before tonemapping, tonemapping baked into the LUT.
    HighDynamicRange,
}

/// Material channel visualised by the pipeline debug view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum MaterialDebugMode {
    #[default]
    None = 0,
    BaseColor = 1,
    Metallic = 2,
    Roughness = 3,
    AmbientOcclusion = 4,
    Normal = 5,
    ValidatePbrDiffuse = 6,
    ValidatePbrSpecular = 7,
}

bitflags! {
    /// Lighting terms kept by the pipeline debug view.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct LightingDebugMode: i32 {
        const DIRECT_SPECULAR   = 1 << 0;
        const INDIRECT_SPECULAR = 1 << 1;
        const DIRECT_DIFFUSE    = 1 << 2;
        const INDIRECT_DIFFUSE  = 1 << 3;
    }
}

impl Default for LightingDebugMode {
    fn default() -> Self {
        Self::all()
    }
}

/// Wireframe overlay mode of the debug view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WireframeMode {
    #[default]
    None,
    WireframeOnly,
    ShadedWireframe,
    SolidColorWireframe,
}

// ---------------------------------------------------------------------------
// Nested setting groups
// ---------------------------------------------------------------------------

/// Clustered light-culling dimensions and capacities.
///
/// These size the persistent GPU buffers, so they are fixed for the lifetime
/// of a [`ClusteredLightCuller`](crate::renderer::ClusteredLightCuller).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    pub tile_count_x: u32,
    pub tile_count_y: u32,
    pub z_slice_count: u32,
    pub max_lights_per_cluster: u32,
    /// Lights further than this along the view direction skip the cluster path.
    pub max_far_plane: f32,
    pub max_visible_point_lights: u32,
    pub max_visible_spot_lights: u32,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            tile_count_x: 16,
            tile_count_y: 8,
            z_slice_count: 16,
            max_lights_per_cluster: 16,
            max_far_plane: 500.0,
            max_visible_point_lights: 256,
            max_visible_spot_lights: 256,
        }
    }
}

impl ClusterSettings {
    #[inline]
    #[must_use]
    pub fn total_cluster_count(&self) -> u32 {
        self.tile_count_x
            .saturating_mul(self.tile_count_y)
            .saturating_mul(self.z_slice_count)
    }

    /// Capacity of the flat light-index list.
    #[inline]
    #[must_use]
    pub fn light_index_capacity(&self) -> u32 {
        self.max_lights_per_cluster
            .saturating_mul(self.total_cluster_count())
    }

    /// Returns a copy with every dimension clamped to at least one and at most
    /// its `MAX_CLUSTER_*` bound.
    #[must_use]
    pub fn validated(mut self) -> Self {
        for (name, value, max) in [
            ("tile_count_x", &mut self.tile_count_x, MAX_CLUSTER_TILES),
            ("tile_count_y", &mut self.tile_count_y, MAX_CLUSTER_TILES),
            ("z_slice_count", &mut self.z_slice_count, MAX_CLUSTER_SLICES),
            ("max_lights_per_cluster", &mut self.max_lights_per_cluster, MAX_LIGHTS_PER_CLUSTER),
        ] {
            let clamped = (*value).clamp(1, max);
            if clamped != *value {
                log::warn!("cluster.{name} {value} clamped to {clamped}");
            }
            *value = clamped;
        }
        if self.max_far_plane.is_nan() || self.max_far_plane <= 0.0 {
            let fallback = Self::default().max_far_plane;
            log::warn!("cluster.max_far_plane {} replaced by {fallback}", self.max_far_plane);
            self.max_far_plane = fallback;
        }
        self
    }
}

/// Narrow "foreground" camera composited inside the main view through stencil.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrideCameraSettings {
    pub enabled: bool,
    pub opaque_layer_mask: u32,
    pub transparent_layer_mask: u32,
    pub position_offset: Vec3,
    /// Vertical field of view in degrees.
    pub field_of_view: f32,
    pub near_clip_plane: f32,
    pub far_clip_plane: f32,
}

impl Default for OverrideCameraSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            opaque_layer_mask: 0,
            transparent_layer_mask: 0,
            position_offset: Vec3::ZERO,
            field_of_view: 60.0,
            near_clip_plane: 0.01,
            far_clip_plane: 50.0,
        }
    }
}

/// Editor-only debug view configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineDebugSettings {
    pub enabled: bool,
    pub material_debug_mode: MaterialDebugMode,
    pub lighting_debug_mode: LightingDebugMode,
    pub wireframe_mode: WireframeMode,
    pub wireframe_color: Vec4,
    pub wireframe_override_color: Vec4,
    pub validate_pure_metal: bool,
    pub validate_pure_metal_color: Vec4,
    pub validate_high_color: Vec4,
    pub validate_low_color: Vec4,
}

impl Default for PipelineDebugSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            material_debug_mode: MaterialDebugMode::None,
            lighting_debug_mode: LightingDebugMode::all(),
            wireframe_mode: WireframeMode::None,
            wireframe_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            wireframe_override_color: Vec4::new(0.5, 0.5, 0.5, 1.0),
            validate_pure_metal: false,
            validate_pure_metal_color: Vec4::new(1.0, 0.0, 1.0, 1.0),
            validate_high_color: Vec4::new(1.0, 0.0, 0.0, 1.0),
            validate_low_color: Vec4::new(0.0, 1.0, 1.0, 1.0),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineSettings
// ---------------------------------------------------------------------------

/// Read-only configuration of the frame pipeline.
///
/// # Fields
///
/// | Field                      | Description                               | Default            |
/// |----------------------------|-------------------------------------------|--------------------|
/// | `render_scale`             | Resolution scale of intermediate targets  | `1.0`              |
/// | `use_hdr`                  | Allow HDR camera targets                  | `false`            |
/// | `msaa_quality`             | MSAA sample count                         | `Disabled`         |
/// | `support_main_light_shadow`| Main-light cascaded shadows               | `true`             |
/// | `shadow_distance`          | Max shadow distance (clamped to far)      | `50.0`             |
/// | `shadowmap_resolution`     | Atlas resolution                          | `R1024`            |
/// | `shadow_cascades`          | Cascade split option                      | `FourCascades`     |
/// | `use_cluster_lighting`     | Clustered punctual lights                 | `false`            |
/// | `use_post_process`         | LUT + bloom + uber pass                   | `false`            |
/// | `post_process`             | Bloom, grading, grain and user LUT        | neutral, no bloom  |
/// | `disable_additional_lights`| Main light only                           | `false`            |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    // === General ===
    pub opaque_layer_mask: u32,
    pub transparent_layer_mask: u32,
    pub require_opaque_texture: bool,
    pub require_depth_texture: bool,
    pub opaque_downsampling: Downsampling,

    // === Quality ===
    pub use_hdr: bool,
    pub msaa_quality: MsaaQuality,
    pub render_scale: f32,

    // === Shadows ===
    pub support_main_light_shadow: bool,
    pub support_soft_shadow: bool,
    pub shadow_distance: f32,
    pub shadowmap_resolution: ShadowmapResolution,
    pub shadow_depth_bias: f32,
    pub shadow_normal_bias: f32,
    pub shadow_cascades: ShadowCascadesOption,
    pub cascades2_split: f32,
    pub cascades4_split: Vec3,

    // === Post-processing ===
    pub use_post_process: bool,
    pub color_grading_mode: ColorGradingMode,
    pub color_grading_lut_size: u32,
    pub post_process: PostProcessVolume,

    // === Lighting ===
    pub use_dynamic_batching: bool,
    pub support_mixed_lighting: bool,
    pub disable_additional_lights: bool,
    pub use_cluster_lighting: bool,
    pub cluster: ClusterSettings,

    // === Custom passes ===
    pub override_camera: OverrideCameraSettings,
    pub debug: PipelineDebugSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            opaque_layer_mask: u32::MAX,
            transparent_layer_mask: u32::MAX,
            require_opaque_texture: false,
            require_depth_texture: false,
            opaque_downsampling: Downsampling::Bilinear2x,

            use_hdr: false,
            msaa_quality: MsaaQuality::Disabled,
            render_scale: 1.0,

            support_main_light_shadow: true,
            support_soft_shadow: true,
            shadow_distance: 50.0,
            shadowmap_resolution: ShadowmapResolution::R1024,
            shadow_depth_bias: 1.0,
            shadow_normal_bias: 1.0,
            shadow_cascades: ShadowCascadesOption::FourCascades,
            cascades2_split: 0.25,
            cascades4_split: Vec3::new(0.067, 0.2, 0.467),

            use_post_process: false,
            color_grading_mode: ColorGradingMode::LowDynamicRange,
            color_grading_lut_size: 32,
            post_process: PostProcessVolume::default(),

            use_dynamic_batching: false,
            support_mixed_lighting: true,
            disable_additional_lights: false,
            use_cluster_lighting: false,
            cluster: ClusterSettings::default(),

            override_camera: OverrideCameraSettings::default(),
            debug: PipelineDebugSettings::default(),
        }
    }
}

impl PipelineSettings {
    /// Parses settings from JSON. Missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(text)?;
        Ok(settings.validated())
    }

    /// Returns a copy with every numeric knob clamped into its accepted range,
    /// including the bloom mip count of the post-process volume.
    ///
    /// Each clamp is logged; none is an error.
    #[must_use]
    pub fn validated(mut self) -> Self {
        let scale = self.render_scale.clamp(MIN_RENDER_SCALE, MAX_RENDER_SCALE);
        if (scale - self.render_scale).abs() > f32::EPSILON || scale.is_nan() {
            log::warn!("render_scale {} clamped to {}", self.render_scale, scale);
        }
        self.render_scale = if scale.is_nan() { 1.0 } else { scale };

        for (name, bias) in [
            ("shadow_depth_bias", &mut self.shadow_depth_bias),
            ("shadow_normal_bias", &mut self.shadow_normal_bias),
        ] {
            let clamped = bias.clamp(0.0, MAX_SHADOW_BIAS);
            if (clamped - *bias).abs() > f32::EPSILON {
                log::warn!("{name} {bias} clamped to {clamped}");
            }
            *bias = clamped;
        }

        let lut = self
            .color_grading_lut_size
            .clamp(LUT_SIZE_RANGE.0, LUT_SIZE_RANGE.1);
        if lut != self.color_grading_lut_size {
            log::warn!(
                "color_grading_lut_size {} clamped to {}",
                self.color_grading_lut_size,
                lut
            );
        }
        self.color_grading_lut_size = lut;
        self.post_process = self.post_process.validated();
        self.cluster = self.cluster.validated();

        if self.shadow_distance < 0.0 {
            log::warn!("shadow_distance {} clamped to 0", self.shadow_distance);
            self.shadow_distance = 0.0;
        }
        self
    }

    /// Resolves the cascade option into `(count, split fractions)`.
    ///
    /// Split fractions are cumulative fractions of the shadow distance. An
    /// unrecognised option logs an error and resolves to one cascade.
    #[must_use]
    pub fn cascade_layout(&self) -> (u32, Vec3) {
        match self.shadow_cascades {
            ShadowCascadesOption::NoCascades => (1, Vec3::new(1.0, 0.0, 0.0)),
            ShadowCascadesOption::TwoCascades => (2, Vec3::new(self.cascades2_split, 1.0, 0.0)),
            ShadowCascadesOption::FourCascades => (4, self.cascades4_split),
            ShadowCascadesOption::Unrecognized => {
                log::error!("Unknown shadow cascade option, falling back to a single cascade");
                (1, Vec3::new(1.0, 0.0, 0.0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cascade_layout() {
        let (count, split) = PipelineSettings::default().cascade_layout();
        assert_eq!(count, 4);
        assert!((split.x - 0.067).abs() < 1e-6);
    }

    #[test]
    fn test_unrecognized_cascades_fall_back_to_one() {
        let settings = PipelineSettings {
            shadow_cascades: ShadowCascadesOption::Unrecognized,
            ..Default::default()
        };
        assert_eq!(settings.cascade_layout().0, 1);
    }

    #[test]
    fn test_validated_clamps_render_scale() {
        let settings = PipelineSettings {
            render_scale: 5.0,
            shadow_depth_bias: 20.0,
            ..Default::default()
        }
        .validated();
        assert!((settings.render_scale - MAX_RENDER_SCALE).abs() < 1e-6);
        assert!((settings.shadow_depth_bias - MAX_SHADOW_BIAS).abs() < 1e-6);
    }

    #[test]
    fn test_msaa_samples() {
        assert_eq!(MsaaQuality::Disabled.samples(), 1);
        assert_eq!(MsaaQuality::Msaa4x.samples(), 4);
    }
}
