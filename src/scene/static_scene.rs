use glam::Vec3;

use super::bounds::BoundingBox;
use super::camera::RenderCamera;
use super::light::VisibleLight;
use super::{CullResults, CullingParameters, SceneEnvironment, SceneQuery, ShadowSplit};
use crate::renderer::shadow_utils;

/// A renderer known to a [`StaticScene`].
#[derive(Debug, Clone, PartialEq)]
pub struct StaticRenderer {
    pub id: u64,
    pub bounds: BoundingBox,
    pub casts_shadows: bool,
}

/// Scene with fixed lights and renderers.
///
/// Culls lights and renderers against the camera frustum and derives cascade
/// matrices with [`shadow_utils`].
#[derive(Debug, Clone, Default)]
pub struct StaticScene {
    pub lights: Vec<VisibleLight>,
    pub renderers: Vec<StaticRenderer>,
    pub environment: SceneEnvironment,
}

impl StaticScene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_light(mut self, light: VisibleLight) -> Self {
        self.lights.push(light);
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, id: u64, bounds: BoundingBox, casts_shadows: bool) -> Self {
        self.renderers.push(StaticRenderer {
            id,
            bounds,
            casts_shadows,
        });
        self
    }

    #[must_use]
    pub fn with_sun(mut self, light_id: u64) -> Self {
        self.environment.sun = Some(light_id);
        self
    }
}

impl SceneQuery for StaticScene {
    fn cull(&self, camera: &RenderCamera, params: &CullingParameters) -> Option<CullResults> {
        if !camera.has_valid_culling_parameters() {
            return None;
        }
        let frustum = camera.frustum();

        let lights = self
            .lights
            .iter()
            .filter(|l| l.kind.is_directional() || frustum.intersects_sphere(l.position, l.range))
            .cloned()
            .collect();

        let renderers = self
            .renderers
            .iter()
            .filter(|r| frustum.intersects_sphere(r.bounds.center(), r.bounds.size().length() * 0.5))
            .map(|r| r.id)
            .collect();

        Some(CullResults::new(lights, renderers, params))
    }

    fn shadow_caster_bounds(&self, cull: &CullResults, light_index: usize) -> Option<BoundingBox> {
        if !cull.shadow_casters_culled {
            return None;
        }
        let light = cull.visible_lights.get(light_index)?;
        if !light.casts_shadows() {
            return None;
        }
        self.renderers
            .iter()
            .filter(|r| r.casts_shadows)
            .map(|r| r.bounds)
            .reduce(|a, b| a.union(&b))
    }

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
    ) -> Option<ShadowSplit> {
        let light = cull.visible_lights.get(light_index)?;
        if !light.kind.is_directional() || cascade_index >= cascade_count {
            return None;
        }
        if cull.shadow_distance <= camera.near {
            return None;
        }

        let bounds = shadow_utils::cascade_boundaries(camera.near, cull.shadow_distance, cascade_count, splits);
        let corners = shadow_utils::frustum_slice_corners(camera, bounds[cascade_index], bounds[cascade_index + 1]);
        let sphere = shadow_utils::bounding_sphere(&corners);
        let (view, proj, sphere) = shadow_utils::sphere_shadow_matrices(light.direction, sphere, resolution, near_plane);

        if !(view.is_finite() && proj.is_finite()) {
            return None;
        }

        Some(ShadowSplit {
            view,
            proj,
            culling_sphere: sphere.to_vec4(),
        })
    }

    fn environment(&self) -> SceneEnvironment {
        self.environment.clone()
    }
}
