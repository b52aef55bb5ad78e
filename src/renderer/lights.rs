//! Forward Light Constants
//!
//! [`LightDataBuilder`] packs the visible lights of one camera into the
//! shader-constant layout used by forward shading:
//!
//! - the main light goes to `_MainLightPosition` / `_MainLightColorIntensity`,
//! - up to [`MAX_VISIBLE_ADDITIONAL_LIGHTS`] other lights go to fixed-size
//!   `_AdditionalLights*` arrays, in visible-light order with no gaps.
//!
//! It also rewrites the cull result's per-object light index map so the main
//! light (shaded globally) and every light past the array capacity are
//! excluded from per-object indexing.
//!
//! # Encodings
//!
//! | Field            | Directional      | Point                  | Spot                         |
//! |------------------|------------------|------------------------|------------------------------|
//! | position         | `(-fwd, 0)`      | `(pos, 1)`             | `(pos, 1)`                   |
//! | color            | `(rgb, I·exp)`   | `(rgb, I·exp)`         | `(rgb, I·exp)`               |
//! | attenuation      | `(0, 1, 0, 1)`   | `(fade, bias, 0, 1)`   | `(fade, bias, inv, -cos·inv)`|
//! | spot direction   | `(0, 0, 1, 0)`   | `(0, 0, 1, 0)`         | `(-fwd, 0)`                  |
//!
//! Range attenuation is a single MAD in the shader:
//! `saturate(distSq · x + y)`, reaching zero exactly at the light's range and
//! fading linearly in squared distance from 80% of it.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

use super::frame_data::{LightData, MAX_VISIBLE_ADDITIONAL_LIGHTS};
use crate::core::{CommandList, FeatureFlags};
use crate::scene::{CullResults, LightBakeType, LightKind, MixedLightingMode, VisibleLight};

/// Fraction of the range where the distance fade starts.
const FADE_START_FRACTION: f32 = 0.8;

/// Shader property names.
pub mod names {
    pub const MAIN_LIGHT_POSITION: &str = "_MainLightPosition";
    pub const MAIN_LIGHT_COLOR: &str = "_MainLightColorIntensity";
    pub const ADDITIONAL_LIGHTS_COUNT: &str = "_AdditionalLightsCount";
    pub const ADDITIONAL_LIGHTS_POSITIONS: &str = "_AdditionalLightsPositions";
    pub const ADDITIONAL_LIGHTS_COLORS: &str = "_AdditionalLightsColorIntensities";
    pub const ADDITIONAL_LIGHTS_ATTENUATIONS: &str = "_AdditionalLightsAttenuations";
    pub const ADDITIONAL_LIGHTS_SPOT_DIRS: &str = "_AdditionalLightsSpotDirs";
    pub const ADDITIONAL_LIGHTS_OCCLUSION_PROBES: &str = "_AdditionalLightsOcclusionProbes";
}

// ============================================================================
// PackedLight
// ============================================================================

/// Shader constants of one light.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PackedLight {
    /// Direction (`w = 0`) or position (`w = 1`).
    pub position: Vec4,
    pub color_intensity: Vec4,
    pub attenuation: Vec4,
    pub spot_direction: Vec4,
    pub occlusion_probe: Vec4,
}

impl PackedLight {
    /// Constants of an absent light. Attenuation evaluates to 1.
    pub const DEFAULT: Self = Self {
        position: Vec4::new(0.0, 0.0, 1.0, 0.0),
        color_intensity: Vec4::ZERO,
        attenuation: Vec4::new(0.0, 1.0, 0.0, 1.0),
        spot_direction: Vec4::new(0.0, 0.0, 1.0, 0.0),
        occlusion_probe: Vec4::new(-1.0, 1.0, -1.0, -1.0),
    };

    /// Packs `light` with its intensity pre-exposed by `exposure`.
    #[must_use]
    pub fn from_light(light: &VisibleLight, exposure: f32) -> Self {
        let mut packed = Self::DEFAULT;

        packed.position = match light.kind {
            LightKind::Directional => (-light.direction).extend(0.0),
            _ => light.position.extend(1.0),
        };
        packed.color_intensity = light.color.extend(light.intensity * exposure);

        if light.kind.is_punctual() {
            let (x, y) = range_attenuation(light.range);
            packed.attenuation.x = x;
            packed.attenuation.y = y;
        }

        if let LightKind::Spot {
            spot_angle,
            inner_spot_angle,
        } = light.kind
        {
            packed.spot_direction = (-light.direction).extend(0.0);
            let (z, w) = spot_attenuation(spot_angle, inner_spot_angle);
            packed.attenuation.z = z;
            packed.attenuation.w = w;
        }

        let channel = light.baking.occlusion_mask_channel;
        packed.occlusion_probe.x = if channel == -1 { 0.0 } else { channel as f32 };
        packed.occlusion_probe.y = if channel == -1 { 1.0 } else { 0.0 };

        packed
    }
}

/// Distance attenuation coefficients `(1 / fadeRangeSq, -rangeSq / fadeRangeSq)`.
#[must_use]
pub fn range_attenuation(range: f32) -> (f32, f32) {
    let range_sq = range * range;
    let fade_start_sq = FADE_START_FRACTION * FADE_START_FRACTION * range_sq;
    let fade_range_sq = fade_start_sq - range_sq;
    (1.0 / fade_range_sq, -range_sq / fade_range_sq)
}

/// Evaluates the packed distance fade the way the shader does.
#[inline]
#[must_use]
pub fn evaluate_range_attenuation(coefficients: (f32, f32), distance: f32) -> f32 {
    (distance * distance * coefficients.0 + coefficients.1).clamp(0.0, 1.0)
}

/// Angular attenuation `(invAngleRange, -cosOuter · invAngleRange)`.
///
/// Angles are full cone angles in degrees. Without an inner angle the inner
/// cone is derived from the outer one.
#[must_use]
pub fn spot_attenuation(spot_angle: f32, inner_spot_angle: Option<f32>) -> (f32, f32) {
    let outer_half = (spot_angle * 0.5).to_radians();
    let cos_outer = outer_half.cos();
    let cos_inner = match inner_spot_angle {
        Some(inner) => (inner * 0.5).to_radians().cos(),
        None => (outer_half.tan() * (64.0 - 18.0) / 64.0).atan().cos(),
    };
    let inv_angle_range = 1.0 / (cos_inner - cos_outer).max(0.001);
    (inv_angle_range, -cos_outer * inv_angle_range)
}

/// Whether a light enables subtractive mixed lighting.
fn is_subtractive_mixed(light: &VisibleLight) -> bool {
    light.baking.bake_type == LightBakeType::Mixed
        && light.baking.mixed_mode == MixedLightingMode::Subtractive
        && light.casts_shadows()
}

// ============================================================================
// LightDataBuilder
// ============================================================================

/// Packs light constants each frame into a preallocated arena.
pub struct LightDataBuilder {
    additional: [PackedLight; MAX_VISIBLE_ADDITIONAL_LIGHTS],
    // Structure-of-arrays staging for the vector-array globals
    staging: Vec<Vec4>,
}

impl Default for LightDataBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LightDataBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            additional: [PackedLight::DEFAULT; MAX_VISIBLE_ADDITIONAL_LIGHTS],
            staging: Vec::with_capacity(MAX_VISIBLE_ADDITIONAL_LIGHTS),
        }
    }

    /// Packed additional lights of the last `setup` call.
    #[must_use]
    pub fn additional_lights(&self) -> &[PackedLight; MAX_VISIBLE_ADDITIONAL_LIGHTS] {
        &self.additional
    }

    /// Records the light constants for one camera and rewrites the per-object
    /// light index map of `cull`.
    ///
    /// Returns the light-related feature bits.
    pub fn setup(&mut self, cmd: &mut CommandList, cull: &mut CullResults, light_data: &LightData) -> FeatureFlags {
        let lights = &cull.visible_lights;
        let exposure = light_data.camera_exposure;
        let mut features = FeatureFlags::empty();
        let mut subtractive = false;

        if let Some(main) = light_data.main_light_index.and_then(|i| lights.get(i)) {
            let packed = PackedLight::from_light(main, exposure);
            cmd.set_global_vector(names::MAIN_LIGHT_POSITION, packed.position);
            cmd.set_global_vector(names::MAIN_LIGHT_COLOR, packed.color_intensity);
            subtractive |= is_subtractive_mixed(main);
        }

        let additional_count = setup_per_object_light_indices(cull, light_data);
        let lights = &cull.visible_lights;

        if additional_count > 0 {
            features |= FeatureFlags::ADDITIONAL_LIGHTS;
            self.additional.fill(PackedLight::DEFAULT);

            let others = lights
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != light_data.main_light_index)
                .map(|(_, l)| l);
            for (slot, light) in self.additional.iter_mut().zip(others) {
                *slot = PackedLight::from_light(light, exposure);
                subtractive |= is_subtractive_mixed(light);
            }

            self.upload(cmd, names::ADDITIONAL_LIGHTS_POSITIONS, |l| l.position);
            self.upload(cmd, names::ADDITIONAL_LIGHTS_COLORS, |l| l.color_intensity);
            self.upload(cmd, names::ADDITIONAL_LIGHTS_ATTENUATIONS, |l| l.attenuation);
            self.upload(cmd, names::ADDITIONAL_LIGHTS_SPOT_DIRS, |l| l.spot_direction);
            self.upload(cmd, names::ADDITIONAL_LIGHTS_OCCLUSION_PROBES, |l| l.occlusion_probe);
            cmd.set_global_vector(
                names::ADDITIONAL_LIGHTS_COUNT,
                Vec4::new(light_data.max_per_object_additional_lights as f32, 0.0, 0.0, 0.0),
            );
        } else {
            cmd.set_global_vector(names::ADDITIONAL_LIGHTS_COUNT, Vec4::ZERO);
        }

        if light_data.support_mixed_lighting && subtractive {
            features |= FeatureFlags::MIXED_LIGHTING_SUBTRACTIVE;
        }

        log::trace!(
            "Light setup: main={:?} additional={}",
            light_data.main_light_index,
            additional_count
        );
        features
    }

    fn upload(&mut self, cmd: &mut CommandList, name: &'static str, field: impl Fn(&PackedLight) -> Vec4) {
        self.staging.clear();
        self.staging.extend(self.additional.iter().map(field));
        cmd.set_global_vector_array(name, &self.staging);
    }
}

/// Excludes the main light and everything past the shader capacity from the
/// per-object light index map. Returns the number of additional lights.
pub fn setup_per_object_light_indices(cull: &mut CullResults, light_data: &LightData) -> usize {
    if light_data.additional_lights_count == 0 {
        return 0;
    }

    let map = &mut cull.light_index_map;
    let mut global_directional = 0i32;
    let mut additional = 0usize;

    for (i, index) in map.iter_mut().enumerate().take(cull.visible_lights.len()) {
        if additional >= MAX_VISIBLE_ADDITIONAL_LIGHTS {
            break;
        }
        if Some(i) == light_data.main_light_index {
            *index = -1;
            global_directional += 1;
        } else {
            *index -= global_directional;
            additional += 1;
        }
    }

    let first_masked = global_directional as usize + additional;
    for index in map.iter_mut().skip(first_masked) {
        *index = -1;
    }

    additional
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    const EPSILON: f32 = 1e-4;

    fn packed_direction(packed: &PackedLight) -> Option<Vec3> {
        (packed.position.w == 0.0).then(|| packed.position.truncate())
    }

    #[test]
    fn test_directional_encodes_direction() {
        let light = VisibleLight::directional(1, Vec3::new(0.0, -1.0, 0.0), Vec3::ONE, 2.0);
        let packed = PackedLight::from_light(&light, 0.5);
        assert_eq!(packed.position, Vec4::new(0.0, 1.0, 0.0, 0.0));
        assert!((packed.color_intensity.w - 1.0).abs() < EPSILON);
        assert_eq!(packed.attenuation, PackedLight::DEFAULT.attenuation);
        assert_eq!(packed_direction(&packed), Some(Vec3::Y));
    }

    #[test]
    fn test_range_fade_boundaries() {
        let coeffs = range_attenuation(10.0);
        assert!((evaluate_range_attenuation(coeffs, 8.0) - 1.0).abs() < EPSILON);
        assert!(evaluate_range_attenuation(coeffs, 10.0).abs() < EPSILON);
        assert!(evaluate_range_attenuation(coeffs, 9.0) > 0.0);
    }

    #[test]
    fn test_spot_cone_edges() {
        let (z, w) = spot_attenuation(60.0, Some(40.0));
        let at = |deg: f32| (deg.to_radians().cos() * z + w).clamp(0.0, 1.0);
        assert!(at(30.0).abs() < EPSILON, "outer edge is dark");
        assert!((at(20.0) - 1.0).abs() < EPSILON, "inner edge is lit");
    }

    #[test]
    fn test_occlusion_probe_channel() {
        let mut light = VisibleLight::point(2, Vec3::ZERO, Vec3::ONE, 1.0, 4.0);
        light.baking.occlusion_mask_channel = 2;
        let packed = PackedLight::from_light(&light, 1.0);
        assert_eq!(packed.occlusion_probe, Vec4::new(2.0, 0.0, -1.0, -1.0));
    }
}
