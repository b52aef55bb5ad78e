//! Scene Query Boundary
//!
//! The pipeline does not own a scene graph. Everything it needs to know about
//! the world comes through [`SceneQuery`]:
//!
//! - [`SceneQuery::cull`] returns the lights (and renderer ids) visible to a
//!   camera, or `None` when the camera cannot be culled.
//! - [`SceneQuery::shadow_caster_bounds`] and
//!   [`SceneQuery::compute_directional_shadow_matrices`] feed the cascade
//!   builder.
//! - [`SceneQuery::environment`] exposes the frame-global render settings
//!   (sun, skybox, fog, ambient colours).
//!
//! [`StaticScene`] is a fixed-content implementation used for headless
//! rendering and tests.

pub mod bounds;
pub mod camera;
pub mod light;
mod static_scene;

use glam::{Mat4, Vec3, Vec4};

pub use bounds::{BoundingBox, BoundingSphere};
pub use camera::{CameraTargetTexture, CameraType, ClearFlags, OpaqueSortMode, PhysicalCamera, ProjectionType, RenderCamera};
pub use light::{LightBakeType, LightBakingOutput, LightKind, MixedLightingMode, ShadowBias, ShadowMode, VisibleLight};
pub use static_scene::{StaticRenderer, StaticScene};

/// Inputs to a culling request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullingParameters {
    /// Shadow caster culling distance.
    pub shadow_distance: f32,
    /// When `false` the scene skips shadow-caster culling entirely.
    pub cull_shadow_casters: bool,
}

/// What a camera can see this frame.
#[derive(Debug, Clone, Default)]
pub struct CullResults {
    pub visible_lights: Vec<VisibleLight>,
    /// Per-object light index for each visible light; `-1` excludes the
    /// light from per-object lighting. Identity on return from `cull`.
    pub light_index_map: Vec<i32>,
    pub visible_renderers: Vec<u64>,
    /// Whether shadow casters were culled for this result.
    pub shadow_casters_culled: bool,
    /// Shadow distance the result was culled with.
    pub shadow_distance: f32,
}

impl CullResults {
    #[must_use]
    pub fn new(visible_lights: Vec<VisibleLight>, visible_renderers: Vec<u64>, params: &CullingParameters) -> Self {
        let light_index_map = (0..visible_lights.len() as i32).collect();
        Self {
            visible_lights,
            light_index_map,
            visible_renderers,
            shadow_casters_culled: params.cull_shadow_casters,
            shadow_distance: params.shadow_distance,
        }
    }
}

/// One cascade's matrices as produced by the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSplit {
    pub view: Mat4,
    pub proj: Mat4,
    /// `(center, radius)`.
    pub culling_sphere: Vec4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FogMode {
    #[default]
    Disabled,
    Linear,
    Exponential,
    ExponentialSquared,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FogSettings {
    pub mode: FogMode,
    pub density: f32,
    pub start_distance: f32,
    pub end_distance: f32,
}

impl FogSettings {
    /// Packs fog into the shader's `(exp2, exp, linear scale, linear bias)`
    /// vector.
    #[must_use]
    pub fn params(&self) -> Vec4 {
        let linear = self.mode == FogMode::Linear;
        let diff = if linear {
            self.end_distance - self.start_distance
        } else {
            0.0
        };
        let inv_diff = if diff.abs() > 0.0001 { 1.0 / diff } else { 0.0 };
        Vec4::new(
            self.density * 1.201_122_4, // density / sqrt(ln 2)
            self.density * std::f32::consts::LOG2_E,
            if linear { -inv_diff } else { 0.0 },
            if linear { self.end_distance * inv_diff } else { 0.0 },
        )
    }
}

/// Frame-global render settings owned by the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneEnvironment {
    /// Light id configured as the sun, if any.
    pub sun: Option<u64>,
    pub has_skybox: bool,
    pub fog: FogSettings,
    pub glossy_environment_color: Vec4,
    pub subtractive_shadow_color: Vec4,
}

impl Default for SceneEnvironment {
    fn default() -> Self {
        Self {
            sun: None,
            has_skybox: true,
            fog: FogSettings::default(),
            glossy_environment_color: Vec4::ZERO,
            subtractive_shadow_color: Vec4::new(0.42, 0.478, 0.627, 1.0),
        }
    }
}

/// Scene-side collaborator of the pipeline.
pub trait SceneQuery {
    fn cull(&self, camera: &RenderCamera, params: &CullingParameters) -> Option<CullResults>;

    /// World bounds of the shadow casters affected by a visible light.
    fn shadow_caster_bounds(&self, cull: &CullResults, light_index: usize) -> Option<BoundingBox>;

    /// Matrices and culling sphere of one directional cascade.
    ///
    /// `splits` are the cumulative split fractions of the shadow distance.
    /// The returned projection is not adjusted for a reversed depth buffer.
    fn compute_directional_shadow_matrices(
        &self,
        camera: &RenderCamera,
        cull: &CullResults,
        light_index: usize,
        cascade_index: usize,
        cascade_count: usize,
        splits: Vec3,
        resolution: u32,
        near_plane: f32,
    ) -> Option<ShadowSplit>;

    fn environment(&self) -> SceneEnvironment;
}
