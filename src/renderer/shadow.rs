//! Main-Light Cascaded Shadows
//!
//! [`ShadowCascadeBuilder`] renders 1, 2 or 4 cascades of the main
//! directional light into a single depth atlas and publishes the receiver
//! constants the forward shaders sample with.
//!
//! # Atlas Layout
//!
//! ```text
//!   4 cascades            2 cascades          1 cascade
//! ┌───────┬───────┐     ┌───────┬───────┐     ┌───────────────┐
//! │   0   │   1   │     │   0   │   1   │     │               │
//! ├───────┼───────┤     └───────┴───────┘     │       0       │
//! │   2   │   3   │       (half height)       │               │
//! └───────┴───────┘                           └───────────────┘
//! ```
//!
//! Tile resolution starts at the atlas size and halves until the tiles fit
//! the cascade count. Cascade `i` sits at `((i % 2)·tile, (i / 2)·tile)`.
//!
//! # Shadow Transform
//!
//! `world → atlas UV` is `sliceTransform × scaleBias × proj × view`:
//!
//! - `scaleBias` maps clip XY from `[-1, 1]` to `[0, 1]`, and on reversed-Z
//!   devices maps depth to `1 - z` (scene matrices are never pre-reversed).
//! - `sliceTransform` scales and offsets into the cascade's tile. It is only
//!   applied with more than one cascade.
//!
//! Slots past the cascade count hold a no-op matrix so an out-of-range
//! cascade index in the shader reads "fully lit".

use glam::{Mat4, UVec2, Vec3, Vec4};

use super::frame_data::RenderingData;
use super::shadow_utils::MAX_CASCADES;
use crate::core::{
    CommandList, FeatureFlags, FilterMode, GpuContext, LoadAction, Rect, RenderCommand, StoreAction, TargetRef,
    TextureDesc, TextureFormat, TextureId,
};
use crate::scene::{SceneQuery, VisibleLight};

/// Depth precision of the shadow atlas.
pub const SHADOWMAP_DEPTH_BITS: u32 = 16;
/// PCF kernel radius in texels used to scale bias for soft shadows.
const SOFT_SHADOW_KERNEL_RADIUS: f32 = 2.5;
/// Pixels left unrendered around each tile.
const SCISSOR_INSET: f32 = 2.0;

/// Shader property names.
pub mod names {
    pub const SHADOWMAP: &str = "_MainLightShadowmap";
    pub const WORLD_TO_SHADOW: &str = "_MainLightWorldToShadow";
    pub const SPLIT_SPHERES: [&str; 4] = [
        "_CascadeShadowSplitSpheres0",
        "_CascadeShadowSplitSpheres1",
        "_CascadeShadowSplitSpheres2",
        "_CascadeShadowSplitSpheres3",
    ];
    pub const SPLIT_SPHERE_RADII: &str = "_CascadeShadowSplitSphereRadii";
    pub const SHADOW_OFFSET_01: &str = "_MainLightShadowOffset01";
    pub const SHADOW_OFFSET_23: &str = "_MainLightShadowOffset23";
    pub const SHADOW_PARAMS: &str = "_MainLightShadowParams";
    pub const LIGHT_DIRECTION: &str = "_LightDirection";
    pub const SHADOW_BIAS: &str = "_ShadowBias";
}

// ============================================================================
// Slice Math
// ============================================================================

/// One rendered cascade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSlice {
    pub view: Mat4,
    pub proj: Mat4,
    /// World to atlas UV and depth.
    pub shadow_transform: Mat4,
    /// Tile origin in atlas pixels.
    pub offset: UVec2,
    pub resolution: u32,
    /// `(center, radius)`.
    pub culling_sphere: Vec4,
}

impl Default for ShadowSlice {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            shadow_transform: Mat4::IDENTITY,
            offset: UVec2::ZERO,
            resolution: 1024,
            culling_sphere: Vec4::ZERO,
        }
    }
}

/// Largest square tile such that `tile_count` tiles fit in the atlas.
#[must_use]
pub fn max_tile_resolution(atlas_width: u32, atlas_height: u32, tile_count: usize) -> u32 {
    let mut resolution = atlas_width.min(atlas_height).max(1);
    let fits = |r: u32| ((atlas_width / r) * (atlas_height / r)) as usize;
    while fits(resolution) < tile_count && resolution > 1 {
        resolution >>= 1;
    }
    resolution
}

/// Tile origin of cascade `index`.
#[inline]
#[must_use]
pub fn slice_offset(index: usize, tile_resolution: u32) -> UVec2 {
    UVec2::new((index % 2) as u32, (index / 2) as u32) * tile_resolution
}

/// World to shadow-map texture space for one cascade, before tiling.
#[must_use]
pub fn shadow_transform(view: Mat4, proj: Mat4, reversed_z: bool) -> Mat4 {
    let mut remap = Mat4::from_cols(
        Vec4::new(0.5, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 0.5, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(0.5, 0.5, 0.0, 1.0),
    );
    if reversed_z {
        remap.z_axis.z = -1.0;
        remap.w_axis.z = 1.0;
    }
    remap * proj * view
}

/// Scale and offset from a full-atlas UV into one tile.
#[must_use]
pub fn slice_transform(offset: UVec2, tile_resolution: u32, atlas_width: u32, atlas_height: u32) -> Mat4 {
    let inv_w = 1.0 / atlas_width as f32;
    let inv_h = 1.0 / atlas_height as f32;
    let mut m = Mat4::IDENTITY;
    m.x_axis.x = tile_resolution as f32 * inv_w;
    m.y_axis.y = tile_resolution as f32 * inv_h;
    m.w_axis.x = offset.x as f32 * inv_w;
    m.w_axis.y = offset.y as f32 * inv_h;
    m
}

/// Matrix written into unused cascade slots.
#[must_use]
pub fn no_op_shadow_matrix(reversed_z: bool) -> Mat4 {
    let mut m = Mat4::ZERO;
    m.z_axis.z = if reversed_z { 1.0 } else { 0.0 };
    m
}

/// `(depthBias, normalBias, 0, 0)` in world units for a cascade projection.
///
/// Cascade frusta wrap a sphere, so `2 / proj.m00` is the tile's world size.
#[must_use]
pub fn shadow_bias(proj: Mat4, resolution: u32, depth_bias: f32, normal_bias: f32, soft: bool) -> Vec4 {
    let frustum_size = 2.0 / proj.x_axis.x;
    let texel_size = frustum_size / resolution.max(1) as f32;
    let mut depth = -depth_bias * texel_size;
    let mut normal = -normal_bias * texel_size;
    if soft {
        depth *= SOFT_SHADOW_KERNEL_RADIUS;
        normal *= SOFT_SHADOW_KERNEL_RADIUS;
    }
    Vec4::new(depth, normal, 0.0, 0.0)
}

// ============================================================================
// ShadowCascadeBuilder
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Atlas {
    texture: TextureId,
    width: u32,
    height: u32,
}

/// Prepares and renders the main-light shadow atlas.
pub struct ShadowCascadeBuilder {
    slices: [ShadowSlice; MAX_CASCADES],
    world_to_shadow: [Mat4; MAX_CASCADES + 1],
    cascade_count: usize,
    atlas_width: u32,
    atlas_height: u32,
    atlas: Option<Atlas>,
    prepared: bool,
}

impl Default for ShadowCascadeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowCascadeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slices: [ShadowSlice::default(); MAX_CASCADES],
            world_to_shadow: [Mat4::IDENTITY; MAX_CASCADES + 1],
            cascade_count: 0,
            atlas_width: 0,
            atlas_height: 0,
            atlas: None,
            prepared: false,
        }
    }

    /// Slices produced by the last successful `prepare`.
    #[must_use]
    pub fn slices(&self) -> &[ShadowSlice] {
        &self.slices[..self.cascade_count]
    }

    /// Receiver matrices, including the no-op slots.
    #[must_use]
    pub fn world_to_shadow(&self) -> &[Mat4; MAX_CASCADES + 1] {
        &self.world_to_shadow
    }

    #[must_use]
    pub fn atlas_size(&self) -> (u32, u32) {
        (self.atlas_width, self.atlas_height)
    }

    #[must_use]
    pub fn atlas_texture(&self) -> Option<TextureId> {
        self.atlas.map(|a| a.texture)
    }

    #[inline]
    #[must_use]
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    fn clear(&mut self) {
        self.slices = [ShadowSlice::default(); MAX_CASCADES];
        self.world_to_shadow = [Mat4::IDENTITY; MAX_CASCADES + 1];
        self.cascade_count = 0;
        self.prepared = false;
    }

    /// Computes every cascade's matrices.
    ///
    /// Returns `false` when shadows are disabled for this camera or the scene
    /// cannot supply caster bounds or matrices for any cascade; the caller
    /// then skips the shadow draw.
    pub fn prepare(&mut self, scene: &dyn SceneQuery, data: &RenderingData, reversed_z: bool) -> bool {
        self.clear();
        let shadow = &data.shadows;
        if !shadow.main_light_shadow_enabled {
            return false;
        }
        let Some(light_index) = data.lights.main_light_index else {
            return false;
        };
        let Some(light) = data.cull.visible_lights.get(light_index) else {
            return false;
        };
        if !light.kind.is_directional() {
            log::warn!("Only directional lights are supported as main light");
        }
        if scene.shadow_caster_bounds(&data.cull, light_index).is_none() {
            return false;
        }

        let camera = &data.camera.camera;
        let full = scene.compute_directional_shadow_matrices(
            camera,
            &data.cull,
            light_index,
            0,
            1,
            Vec3::X,
            shadow.resolution,
            light.shadow_near_plane,
        );
        if full.is_none() {
            return false;
        }

        let count = shadow.cascade_count.clamp(1, MAX_CASCADES);
        let tile = max_tile_resolution(shadow.resolution, shadow.resolution, count);
        self.atlas_width = shadow.resolution;
        self.atlas_height = if count == 2 {
            shadow.resolution >> 1
        } else {
            shadow.resolution
        };

        for i in 0..count {
            let Some(split) = scene.compute_directional_shadow_matrices(
                camera,
                &data.cull,
                light_index,
                i,
                count,
                shadow.cascade_split,
                tile,
                light.shadow_near_plane,
            ) else {
                log::debug!("Cascade {i} has no shadow matrices, skipping shadows");
                return false;
            };

            let offset = slice_offset(i, tile);
            let mut transform = shadow_transform(split.view, split.proj, reversed_z);
            if count > 1 {
                transform = slice_transform(offset, tile, self.atlas_width, self.atlas_height) * transform;
            }
            self.slices[i] = ShadowSlice {
                view: split.view,
                proj: split.proj,
                shadow_transform: transform,
                offset,
                resolution: tile,
                culling_sphere: split.culling_sphere,
            };
        }

        self.cascade_count = count;
        self.prepared = true;
        true
    }

    fn ensure_atlas(&mut self, ctx: &mut dyn GpuContext) -> TextureId {
        if let Some(atlas) = self.atlas {
            if atlas.width == self.atlas_width && atlas.height == self.atlas_height {
                return atlas.texture;
            }
            ctx.destroy_texture(atlas.texture);
        }
        log::debug!("Allocating shadow atlas {}x{}", self.atlas_width, self.atlas_height);
        let mut desc = TextureDesc::depth(self.atlas_width, self.atlas_height, SHADOWMAP_DEPTH_BITS, names::SHADOWMAP)
            .with_filter(FilterMode::Bilinear);
        desc.format = TextureFormat::Shadowmap;
        let texture = ctx.create_texture(&desc);
        self.atlas = Some(Atlas {
            texture,
            width: self.atlas_width,
            height: self.atlas_height,
        });
        texture
    }

    /// Renders the prepared cascades and records the receiver constants.
    ///
    /// Returns the shadow feature bits.
    pub fn draw(&mut self, cmd: &mut CommandList, data: &RenderingData, ctx: &mut dyn GpuContext) -> FeatureFlags {
        if !self.prepared {
            return FeatureFlags::empty();
        }
        let Some(light_index) = data.lights.main_light_index else {
            return FeatureFlags::empty();
        };
        let Some(light) = data.cull.visible_lights.get(light_index) else {
            return FeatureFlags::empty();
        };
        let reversed_z = ctx.capabilities().reversed_z;

        let atlas = TargetRef::Texture(self.ensure_atlas(ctx));
        cmd.set_render_target(atlas, atlas, LoadAction::DontCare, StoreAction::Store);
        cmd.clear_render_target(true, true, Vec4::ZERO);

        let shadow = &data.shadows;
        let light_direction = (-light.direction).extend(0.0);
        for (i, slice) in self.slices[..self.cascade_count].iter().enumerate() {
            cmd.set_global_vector(names::LIGHT_DIRECTION, light_direction);
            cmd.set_global_vector(
                names::SHADOW_BIAS,
                shadow_bias(
                    slice.proj,
                    slice.resolution,
                    shadow.depth_bias,
                    shadow.normal_bias,
                    shadow.soft_shadow_enabled,
                ),
            );
            render_slice(cmd, slice, light_index, i as u32);
        }

        let mut features = if self.cascade_count > 1 {
            FeatureFlags::MAIN_LIGHT_SHADOWS_CASCADE
        } else {
            FeatureFlags::MAIN_LIGHT_SHADOWS
        };
        if shadow.soft_shadow_enabled {
            features |= FeatureFlags::SOFT_SHADOWS;
        }

        self.setup_receiver_constants(cmd, light, atlas, shadow.soft_shadow_enabled, reversed_z);

        let camera = &data.camera.camera;
        cmd.set_view_projection(camera.view_matrix(), camera.projection_matrix());
        log::trace!("Shadow atlas: {} cascades", self.cascade_count);
        features
    }

    fn setup_receiver_constants(
        &mut self,
        cmd: &mut CommandList,
        light: &VisibleLight,
        atlas: TargetRef,
        soft: bool,
        reversed_z: bool,
    ) {
        let count = self.cascade_count;
        for (dst, slice) in self.world_to_shadow.iter_mut().zip(&self.slices[..count]) {
            *dst = slice.shadow_transform;
        }
        self.world_to_shadow[count..].fill(no_op_shadow_matrix(reversed_z));

        cmd.set_global_texture(names::SHADOWMAP, atlas);
        cmd.set_global_matrix_array(names::WORLD_TO_SHADOW, &self.world_to_shadow);
        cmd.set_global_vector(
            names::SHADOW_PARAMS,
            Vec4::new(light.shadow_strength, if soft { 1.0 } else { 0.0 }, 0.0, 0.0),
        );

        if count > 1 {
            let spheres: [Vec4; MAX_CASCADES] = std::array::from_fn(|i| self.slices[i].culling_sphere);
            for (name, sphere) in names::SPLIT_SPHERES.iter().zip(spheres) {
                cmd.set_global_vector(*name, sphere);
            }
            cmd.set_global_vector(
                names::SPLIT_SPHERE_RADII,
                Vec4::from_array(spheres.map(|s| s.w * s.w)),
            );
        }

        if soft {
            let half = 0.5 / self.atlas_width as f32;
            cmd.set_global_vector(names::SHADOW_OFFSET_01, Vec4::new(-half, -half, half, -half));
            cmd.set_global_vector(names::SHADOW_OFFSET_23, Vec4::new(-half, half, half, half));
        }
    }

    /// Ends the frame's use of the prepared slices.
    pub fn frame_cleanup(&mut self) {
        self.prepared = false;
    }

    /// Destroys the atlas.
    pub fn dispose(&mut self, ctx: &mut dyn GpuContext) {
        if let Some(atlas) = self.atlas.take() {
            ctx.destroy_texture(atlas.texture);
        }
        self.clear();
    }
}

fn render_slice(cmd: &mut CommandList, slice: &ShadowSlice, light_index: usize, cascade: u32) {
    let (x, y, r) = (slice.offset.x as f32, slice.offset.y as f32, slice.resolution as f32);
    cmd.push(RenderCommand::SetViewport(Rect::new(x, y, r, r)));
    cmd.set_view_projection(slice.view, slice.proj);
    cmd.push(RenderCommand::EnableScissor(Rect::new(
        x + SCISSOR_INSET,
        y + SCISSOR_INSET,
        r - 2.0 * SCISSOR_INSET,
        r - 2.0 * SCISSOR_INSET,
    )));
    cmd.push(RenderCommand::DrawShadows {
        light_index,
        cascade,
        culling_sphere: slice.culling_sphere,
    });
    cmd.push(RenderCommand::DisableScissor);
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_tile_resolution_per_cascade_count() {
        assert_eq!(max_tile_resolution(2048, 2048, 1), 2048);
        assert_eq!(max_tile_resolution(2048, 1024, 2), 1024);
        assert_eq!(max_tile_resolution(2048, 2048, 4), 1024);
    }

    #[test]
    fn test_slice_offsets() {
        assert_eq!(slice_offset(0, 512), UVec2::new(0, 0));
        assert_eq!(slice_offset(1, 512), UVec2::new(512, 0));
        assert_eq!(slice_offset(2, 512), UVec2::new(0, 512));
        assert_eq!(slice_offset(3, 512), UVec2::new(512, 512));
    }

    #[test]
    fn test_bias_scales_with_soft_kernel() {
        let proj = Mat4::orthographic_rh(-5.0, 5.0, -5.0, 5.0, 0.0, 20.0);
        let hard = shadow_bias(proj, 1000, 1.0, 2.0, false);
        let soft = shadow_bias(proj, 1000, 1.0, 2.0, true);
        assert!((hard.x + 0.01).abs() < EPSILON);
        assert!((hard.y + 0.02).abs() < EPSILON);
        assert!((soft.x - hard.x * 2.5).abs() < EPSILON);
    }

    #[test]
    fn test_no_op_matrix() {
        let m = no_op_shadow_matrix(true);
        let p = m * Vec4::new(3.0, 4.0, 0.25, 1.0);
        assert_eq!(p, Vec4::new(0.0, 0.0, 0.25, 0.0));
        assert_eq!(no_op_shadow_matrix(false), Mat4::ZERO);
    }
}
