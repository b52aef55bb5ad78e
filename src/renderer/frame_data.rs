//! Per-Camera Frame State
//!
//! Plain data rebuilt from the live camera, the settings and the cull result
//! at the start of every camera render, then threaded read-only through the
//! passes.
//!
//! ```text
//! RenderCamera + PipelineSettings ──► CameraFrameState
//! CullResults  + SceneEnvironment ──► LightData ──► ShadowData
//!                                        │
//!                                        ▼
//!                                  RenderingData
//! ```

use glam::Vec3;

use crate::core::{DeviceCapabilities, FeatureFlags, SortingCriteria, TextureDesc, TextureFormat};
use crate::scene::{CameraType, CullResults, OpaqueSortMode, RenderCamera, SceneEnvironment, ShadowMode, VisibleLight};
use crate::settings::{ColorGradingMode, OverrideCameraSettings, PipelineSettings};

/// Maximum additional lights visible to shaders.
pub const MAX_VISIBLE_ADDITIONAL_LIGHTS: usize = 32;
/// Additional lights indexed per object.
pub const MAX_PER_OBJECT_ADDITIONAL_LIGHTS: usize = 4;
/// Depth precision of camera depth attachments.
pub const DEPTH_STENCIL_BUFFER_BITS: u32 = 32;

// ============================================================================
// CameraFrameState
// ============================================================================

/// Camera-derived state for one render.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct CameraFrameState {
    pub camera: RenderCamera,
    /// Descriptor of the camera's colour target after render scale.
    pub target_desc: TextureDesc,
    pub opaque_sorting: SortingCriteria,
    pub render_scale: f32,
    pub max_shadow_distance: f32,
    pub require_opaque_texture: bool,
    pub require_depth_texture: bool,
    pub is_scene_view: bool,
    pub is_hdr_enabled: bool,
    /// Pre-exposure applied to light intensities.
    pub exposure: f32,
}

impl CameraFrameState {
    #[must_use]
    pub fn new(camera: &RenderCamera, settings: &PipelineSettings, caps: &DeviceCapabilities) -> Self {
        let render_scale = settings.render_scale;
        let max_shadow_distance = if settings.support_main_light_shadow {
            settings.shadow_distance.min(camera.far)
        } else {
            0.0
        };
        let is_scene_view = camera.camera_type == CameraType::SceneView;

        let msaa_samples = if camera.allow_msaa && settings.msaa_quality.samples() > 1 {
            camera
                .target_texture
                .map_or(settings.msaa_quality.samples(), |t| t.msaa_samples)
        } else {
            1
        };
        let is_hdr_enabled = (camera.allow_hdr || is_scene_view) && settings.use_hdr;
        let target_desc = camera_target_descriptor(camera, render_scale, is_hdr_enabled, msaa_samples, caps);

        let can_skip_front_to_back = (camera.opaque_sort_mode == OpaqueSortMode::Default
            && caps.hidden_surface_removal)
            || camera.opaque_sort_mode == OpaqueSortMode::NoDistanceSort;
        let opaque_sorting = if can_skip_front_to_back {
            SortingCriteria::COMMON_OPAQUE - SortingCriteria::QUANTIZED_FRONT_TO_BACK
        } else {
            SortingCriteria::COMMON_OPAQUE
        };

        let exposure = match (camera.camera_type, camera.physical) {
            (CameraType::Game, Some(physical)) => physical.exposure(),
            _ => 1.0,
        };

        Self {
            camera: camera.clone(),
            target_desc,
            opaque_sorting,
            render_scale,
            max_shadow_distance,
            require_opaque_texture: settings.require_opaque_texture,
            require_depth_texture: settings.require_depth_texture || is_scene_view,
            is_scene_view,
            is_hdr_enabled,
            exposure,
        }
    }

    #[inline]
    #[must_use]
    pub fn msaa_samples(&self) -> u32 {
        self.target_desc.msaa_samples
    }

    /// Scaled target size in pixels.
    #[inline]
    #[must_use]
    pub fn scaled_size(&self) -> (u32, u32) {
        (self.target_desc.width, self.target_desc.height)
    }
}

/// Colour target descriptor for a camera at the given scale.
#[must_use]
pub fn camera_target_descriptor(
    camera: &RenderCamera,
    render_scale: f32,
    is_hdr_enabled: bool,
    msaa_samples: u32,
    caps: &DeviceCapabilities,
) -> TextureDesc {
    let width = (camera.pixel_width as f32 * render_scale) as u32;
    let height = (camera.pixel_height as f32 * render_scale) as u32;
    let hdr_format = if caps.hdr_format_supported {
        TextureFormat::Rg11B10Float
    } else {
        TextureFormat::Rgba16Float
    };
    let ldr_or_hdr = if is_hdr_enabled { hdr_format } else { TextureFormat::Rgba8Unorm };

    let mut desc = TextureDesc::color(width, height, ldr_or_hdr, "_CameraTarget");
    match camera.target_texture {
        Some(target) => {
            if camera.camera_type != CameraType::SceneView {
                desc.format = target.format;
            }
            desc.depth_bits = target.depth_bits;
            desc.msaa_samples = target.msaa_samples.max(1);
        }
        None => {
            desc.depth_bits = DEPTH_STENCIL_BUFFER_BITS;
            desc.msaa_samples = msaa_samples.max(1);
        }
    }
    desc
}

// ============================================================================
// LightData
// ============================================================================

/// Light selection for one camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightData {
    /// Index into `CullResults::visible_lights` of the main directional light.
    pub main_light_index: Option<usize>,
    pub additional_lights_count: usize,
    pub max_per_object_additional_lights: usize,
    pub camera_exposure: f32,
    pub support_mixed_lighting: bool,
}

impl LightData {
    #[must_use]
    pub fn new(lights: &[VisibleLight], sun: Option<u64>, camera_exposure: f32, settings: &PipelineSettings) -> Self {
        let main_light_index = find_main_light(lights, sun);

        let (additional_lights_count, max_per_object_additional_lights) = if settings.disable_additional_lights {
            (0, 0)
        } else {
            let candidates = if main_light_index.is_some() {
                lights.len().saturating_sub(1)
            } else {
                lights.len()
            };
            (
                candidates.min(MAX_VISIBLE_ADDITIONAL_LIGHTS),
                MAX_PER_OBJECT_ADDITIONAL_LIGHTS,
            )
        };

        Self {
            main_light_index,
            additional_lights_count,
            max_per_object_additional_lights,
            camera_exposure,
            support_mixed_lighting: settings.support_mixed_lighting,
        }
    }
}

/// The configured sun if visible; otherwise, when no sun is configured, the
/// first visible directional light.
#[must_use]
pub fn find_main_light(lights: &[VisibleLight], sun: Option<u64>) -> Option<usize> {
    match sun {
        Some(sun_id) => lights.iter().position(|l| l.id == sun_id),
        None => lights.iter().position(|l| l.kind.is_directional()),
    }
}

// ============================================================================
// ShadowData
// ============================================================================

/// Main-light shadow configuration for one camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowData {
    pub main_light_shadow_enabled: bool,
    pub soft_shadow_enabled: bool,
    pub resolution: u32,
    pub depth_bias: f32,
    pub normal_bias: f32,
    pub cascade_count: usize,
    pub cascade_split: Vec3,
}

impl ShadowData {
    #[must_use]
    pub fn new(
        main_light: Option<&VisibleLight>,
        max_shadow_distance: f32,
        settings: &PipelineSettings,
        caps: &DeviceCapabilities,
    ) -> Self {
        let (cast, soft) = match main_light {
            Some(light) if max_shadow_distance > 0.0 => (light.casts_shadows(), light.shadows == ShadowMode::Soft),
            _ => (false, false),
        };

        let (depth_bias, normal_bias) = match main_light.and_then(|l| l.bias_override) {
            Some(bias) => (bias.depth, bias.normal),
            None => (settings.shadow_depth_bias, settings.shadow_normal_bias),
        };

        let (cascade_count, cascade_split) = settings.cascade_layout();

        Self {
            main_light_shadow_enabled: caps.supports_shadows && settings.support_main_light_shadow && cast,
            soft_shadow_enabled: settings.support_soft_shadow && soft,
            resolution: settings.shadowmap_resolution.pixels(),
            depth_bias,
            normal_bias,
            cascade_count: cascade_count as usize,
            cascade_split,
        }
    }
}

// ============================================================================
// RenderingData
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostProcessData {
    pub grading_mode: ColorGradingMode,
    pub lut_size: u32,
}

/// Everything a pass may read for the current camera.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct RenderingData {
    pub cull: CullResults,
    pub camera: CameraFrameState,
    pub lights: LightData,
    pub shadows: ShadowData,
    pub post_process: PostProcessData,
    pub override_camera: OverrideCameraSettings,
    pub environment: SceneEnvironment,
    pub use_post_process: bool,
    pub use_dynamic_batching: bool,
    pub use_cluster_lighting: bool,
    /// Draws need per-object light indices.
    pub per_object_light_indices: bool,
    /// Shader features produced so far this frame.
    pub features: FeatureFlags,
}

impl RenderingData {
    #[must_use]
    pub fn new(
        camera: CameraFrameState,
        cull: CullResults,
        environment: SceneEnvironment,
        settings: &PipelineSettings,
        caps: &DeviceCapabilities,
    ) -> Self {
        let lights = LightData::new(&cull.visible_lights, environment.sun, camera.exposure, settings);
        let main_light = lights.main_light_index.and_then(|i| cull.visible_lights.get(i));
        let shadows = ShadowData::new(main_light, camera.max_shadow_distance, settings, caps);

        Self {
            per_object_light_indices: lights.additional_lights_count > 0,
            lights,
            shadows,
            post_process: PostProcessData {
                grading_mode: settings.color_grading_mode,
                lut_size: settings.color_grading_lut_size,
            },
            override_camera: settings.override_camera.clone(),
            environment,
            use_post_process: settings.use_post_process,
            use_dynamic_batching: settings.use_dynamic_batching,
            use_cluster_lighting: settings.use_cluster_lighting,
            features: FeatureFlags::empty(),
            camera,
            cull,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn lights(n_point: usize) -> Vec<VisibleLight> {
        let mut v = vec![VisibleLight::directional(1, Vec3::NEG_Y, Vec3::ONE, 1.0)];
        for i in 0..n_point {
            v.push(VisibleLight::point(10 + i as u64, Vec3::ZERO, Vec3::ONE, 1.0, 5.0));
        }
        v
    }

    #[test]
    fn test_additional_count_excludes_main_light() {
        let data = LightData::new(&lights(3), None, 1.0, &PipelineSettings::default());
        assert_eq!(data.main_light_index, Some(0));
        assert_eq!(data.additional_lights_count, 3);
        assert_eq!(data.max_per_object_additional_lights, 4);
    }

    #[test]
    fn test_additional_count_is_capped() {
        let data = LightData::new(&lights(40), None, 1.0, &PipelineSettings::default());
        assert_eq!(data.additional_lights_count, MAX_VISIBLE_ADDITIONAL_LIGHTS);
    }

    #[test]
    fn test_disabled_additional_lights() {
        let settings = PipelineSettings {
            disable_additional_lights: true,
            ..Default::default()
        };
        let data = LightData::new(&lights(3), None, 1.0, &settings);
        assert_eq!(data.additional_lights_count, 0);
        assert_eq!(data.max_per_object_additional_lights, 0);
    }

    #[test]
    fn test_configured_sun_wins() {
        let mut v = lights(1);
        v.push(VisibleLight::directional(99, Vec3::NEG_X, Vec3::ONE, 1.0));
        assert_eq!(find_main_light(&v, Some(99)), Some(2));
        assert_eq!(find_main_light(&v, Some(1234)), None);
    }

    #[test]
    fn test_max_shadow_distance_clamped_to_far() {
        let camera = RenderCamera::new_perspective("Main", 60.0, 640, 480, 0.3, 30.0);
        let state = CameraFrameState::new(&camera, &PipelineSettings::default(), &DeviceCapabilities::default());
        assert!((state.max_shadow_distance - 30.0).abs() < 1e-6);
    }
}
