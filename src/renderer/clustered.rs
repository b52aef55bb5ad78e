//! Clustered Light Culling
//!
//! Partitions the camera's view volume into a `tiles_x × tiles_y × slices`
//! grid and assigns every visible punctual light to the clusters it touches.
//! Shading then walks only the lights of the pixel's cluster.
//!
//! # Grid
//!
//! ```text
//!            screen X tiles (ceil(width / tiles_x) px each)
//!          ┌────┬────┬────┬────┐
//!  slice 0 │    │    │    │    │  thin, near the camera
//!  slice 1 │    │    │    │    │
//!    ...   │    │    │    │    │
//!  slice N │    │    │    │    │  thick, far away
//!          └────┴────┴────┴────┘
//! ```
//!
//! View-space depth is sliced logarithmically:
//! `slice = floor(log2(z) · sliceScale + sliceBias)` with
//! `sliceScale = N / log2(far / near)` and
//! `sliceBias = -N · log2(near) / log2(far / near)`.
//!
//! # Passes
//!
//! 1. **Clustering** (`ClusterAabb` kernel) computes one view-space AABB per
//!    cluster. It only runs when the grid is dirty: on first use and whenever
//!    the scaled resolution or projection matrix changes.
//! 2. **Light culling** (`LightCulling` kernel) runs every frame, one group
//!    per Z slice, and writes a per-cluster `(offset, count)` grid plus a
//!    flat light-index list. Per-cluster counts are clamped to
//!    `max_lights_per_cluster` and the global counter to the index capacity.
//!
//! [`cluster_aabbs`] and [`assign_lights`] are CPU versions of both kernels,
//! used for validation and headless rendering.

use bytemuck::{Pod, Zeroable};
use glam::{IVec4, Mat4, UVec2, Vec3, Vec4};

use crate::core::{
    BufferBinding, BufferDesc, BufferId, BufferKind, CommandList, ComputeKernel, ConstantValue, GpuContext,
};
use crate::scene::{LightKind, VisibleLight};
use crate::settings::ClusterSettings;

use super::lights::{range_attenuation, spot_attenuation};

/// Shader property names.
pub mod names {
    pub const CLUSTERS: &str = "_Clusters";
    pub const CLUSTER_DIMENSIONS: &str = "_ClusterDimensions";
    pub const TILE_SIZE: &str = "_TileSize";
    pub const PUNCTUAL_LIGHT_COUNT: &str = "_PunctualLightCount";
    pub const POINT_LIGHTS: &str = "_PointLights";
    pub const POINT_LIGHTS_CBUFFER: &str = "CPointLights";
    pub const SPOT_LIGHTS: &str = "_SpotLights";
    pub const SPOT_LIGHTS_CBUFFER: &str = "CSpotLights";
    pub const LIGHT_INDEX_LIST: &str = "_LightIndexList";
    pub const LIGHT_GRIDS: &str = "_LightGrids";
    pub const LIGHT_GRIDS_CBUFFER: &str = "CLightGrids";
    pub const GLOBAL_LIGHT_INDEX_COUNT: &str = "_GlobalLightIndexCount";
    pub const CAMERA_INV_PROJ: &str = "_CameraInvProjMatrix";
    pub const CAMERA_VIEW: &str = "_CameraViewMatrix";
    pub const DIM_XY_AND_TILE_SIZE: &str = "_ClusterDimXYAndTileSize";
    pub const SLICE_SCALE: &str = "_SliceScale";
    pub const SLICE_BIAS: &str = "_SliceBias";
}

// ============================================================================
// GPU Records
// ============================================================================

/// View-space bounds of one cluster.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, Pod, Zeroable)]
pub struct ClusterAabb {
    pub min: Vec4,
    pub max: Vec4,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, Pod, Zeroable)]
pub struct GpuPointLight {
    /// World position and range.
    pub position_range: Vec4,
    pub color_intensity: Vec4,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, Pod, Zeroable)]
pub struct GpuSpotLight {
    pub position_range: Vec4,
    pub color_intensity: Vec4,
    /// Negated light forward and outer half angle in radians.
    pub direction_angle: Vec4,
    pub attenuation: Vec4,
}

/// Slice of the light-index list owned by one cluster.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct LightGrid {
    pub offset: u32,
    pub count: u32,
}

// ============================================================================
// Persistent Buffers
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct ClusterBuffers {
    aabbs: BufferId,
    point_lights: BufferId,
    spot_lights: BufferId,
    light_grids: BufferId,
    light_indices: BufferId,
    global_index_count: BufferId,
}

impl ClusterBuffers {
    fn create(settings: &ClusterSettings, ctx: &mut dyn GpuContext) -> Self {
        let clusters = settings.total_cluster_count();
        let mut structured = |count: u32, stride: usize, label: &'static str| {
            ctx.create_buffer(&BufferDesc {
                count,
                stride: stride as u32,
                kind: BufferKind::Structured,
                label,
            })
        };
        Self {
            aabbs: structured(clusters, size_of::<ClusterAabb>(), "Cluster AABBs"),
            point_lights: structured(settings.max_visible_point_lights, size_of::<GpuPointLight>(), "Point Lights"),
            spot_lights: structured(settings.max_visible_spot_lights, size_of::<GpuSpotLight>(), "Spot Lights"),
            light_grids: structured(clusters, size_of::<LightGrid>(), "Light Grids"),
            light_indices: structured(settings.light_index_capacity(), size_of::<u32>(), "Light Index List"),
            global_index_count: structured(1, size_of::<u32>(), "Global Light Index Count"),
        }
    }

    fn destroy(self, ctx: &mut dyn GpuContext) {
        for id in [
            self.aabbs,
            self.point_lights,
            self.spot_lights,
            self.light_grids,
            self.light_indices,
            self.global_index_count,
        ] {
            ctx.destroy_buffer(id);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CullerState {
    Uninitialized,
    Initialized(ClusterBuffers),
}

/// Camera inputs that invalidate the cluster grid.
#[derive(Debug, Clone, Copy, PartialEq)]
struct GridKey {
    width: u32,
    height: u32,
    projection: Mat4,
}

// ============================================================================
// ClusteredLightCuller
// ============================================================================

/// Owns the cluster grid and light buffers across frames.
pub struct ClusteredLightCuller {
    settings: ClusterSettings,
    state: CullerState,
    clusters_dirty: bool,
    grid_key: Option<GridKey>,
    tile_pixel_size: UVec2,
    use_constant_buffers: bool,

    // Arena sized from the configured maxima
    point_lights: Vec<GpuPointLight>,
    spot_lights: Vec<GpuSpotLight>,
    visible_point_count: usize,
    visible_spot_count: usize,

    clustering_passes: u64,
}

impl ClusteredLightCuller {
    #[must_use]
    pub fn new(settings: ClusterSettings) -> Self {
        let settings = settings.validated();
        Self {
            point_lights: vec![GpuPointLight::default(); settings.max_visible_point_lights as usize],
            spot_lights: vec![GpuSpotLight::default(); settings.max_visible_spot_lights as usize],
            settings,
            state: CullerState::Uninitialized,
            clusters_dirty: true,
            grid_key: None,
            tile_pixel_size: UVec2::ONE,
            use_constant_buffers: false,
            visible_point_count: 0,
            visible_spot_count: 0,
            clustering_passes: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(self.state, CullerState::Initialized(_))
    }

    #[inline]
    #[must_use]
    pub fn is_clusters_dirty(&self) -> bool {
        self.clusters_dirty
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn tile_pixel_size(&self) -> UVec2 {
        self.tile_pixel_size
    }

    #[inline]
    #[must_use]
    pub fn visible_point_light_count(&self) -> usize {
        self.visible_point_count
    }

    #[inline]
    #[must_use]
    pub fn visible_spot_light_count(&self) -> usize {
        self.visible_spot_count
    }

    /// Point lights collected this frame.
    #[must_use]
    pub fn point_lights(&self) -> &[GpuPointLight] {
        &self.point_lights[..self.visible_point_count]
    }

    /// Spot lights collected this frame.
    #[must_use]
    pub fn spot_lights(&self) -> &[GpuSpotLight] {
        &self.spot_lights[..self.visible_spot_count]
    }

    /// Number of clustering passes recorded since construction.
    #[must_use]
    pub fn clustering_pass_count(&self) -> u64 {
        self.clustering_passes
    }

    /// Allocates the persistent buffers on first use.
    ///
    /// Marks the grid dirty and caches the camera inputs.
    pub fn initialize(&mut self, width: u32, height: u32, projection: Mat4, ctx: &mut dyn GpuContext) {
        if self.is_initialized() {
            return;
        }
        log::debug!(
            "Initializing clustered lighting: {}x{}x{} clusters",
            self.settings.tile_count_x,
            self.settings.tile_count_y,
            self.settings.z_slice_count
        );
        self.use_constant_buffers = ctx.capabilities().prefers_constant_buffers;
        self.state = CullerState::Initialized(ClusterBuffers::create(&self.settings, ctx));
        self.clusters_dirty = true;
        self.update_grid_key(GridKey {
            width,
            height,
            projection,
        });
    }

    /// Marks the grid dirty when the scaled resolution or projection changed.
    pub fn check_clusters_dirty(&mut self, width: u32, height: u32, projection: Mat4) {
        let key = GridKey {
            width,
            height,
            projection,
        };
        if self.grid_key != Some(key) {
            self.clusters_dirty = true;
            self.update_grid_key(key);
        }
    }

    fn update_grid_key(&mut self, key: GridKey) {
        self.tile_pixel_size = UVec2::new(
            key.width.div_ceil(self.settings.tile_count_x.max(1)),
            key.height.div_ceil(self.settings.tile_count_y.max(1)),
        );
        self.grid_key = Some(key);
    }

    /// Copies visible point and spot lights into the arena.
    ///
    /// Lights further than `max_far_plane` along the camera forward axis are
    /// skipped, as is everything past the per-kind capacity.
    pub fn collect_visible_punctual_lights(&mut self, lights: &[VisibleLight], camera_position: Vec3, camera_forward: Vec3) {
        self.visible_point_count = 0;
        self.visible_spot_count = 0;
        let max_far = self.settings.max_far_plane;

        for light in lights {
            let beyond_far_plane = (light.position - camera_position).dot(camera_forward) > max_far;
            let color_intensity = light.color.extend(light.intensity);
            let position_range = light.position.extend(light.range);

            match light.kind {
                LightKind::Directional => {}
                LightKind::Point => {
                    if self.visible_point_count >= self.point_lights.len() || beyond_far_plane {
                        continue;
                    }
                    self.point_lights[self.visible_point_count] = GpuPointLight {
                        position_range,
                        color_intensity,
                    };
                    self.visible_point_count += 1;
                }
                LightKind::Spot {
                    spot_angle,
                    inner_spot_angle,
                } => {
                    if self.visible_spot_count >= self.spot_lights.len() || beyond_far_plane {
                        continue;
                    }
                    let (fade, fade_bias) = range_attenuation(light.range);
                    let (inv_angle, angle_bias) = spot_attenuation(spot_angle, inner_spot_angle);
                    self.spot_lights[self.visible_spot_count] = GpuSpotLight {
                        position_range,
                        color_intensity,
                        direction_angle: (-light.direction).extend((spot_angle * 0.5).to_radians()),
                        attenuation: Vec4::new(fade, fade_bias, inv_angle, angle_bias),
                    };
                    self.visible_spot_count += 1;
                }
            }
        }
    }

    /// Records the AABB pass if the grid is dirty. Returns whether it ran.
    pub fn execute_clustering_pass(&mut self, cmd: &mut CommandList, projection: Mat4, reversed_z: bool) -> bool {
        let CullerState::Initialized(buffers) = self.state else {
            return false;
        };
        if !self.clusters_dirty {
            return false;
        }
        self.clusters_dirty = false;
        self.clustering_passes += 1;
        log::debug!("Rebuilding cluster AABBs, tile {}", self.tile_pixel_size);

        let s = &self.settings;
        let kernel = ComputeKernel::ClusterAabb;
        cmd.set_compute_buffer(kernel, names::CLUSTERS, buffers.aabbs);
        cmd.set_compute_constant(
            kernel,
            names::CLUSTER_DIMENSIONS,
            ConstantValue::IntVector(IVec4::new(s.tile_count_x as i32, s.tile_count_y as i32, s.z_slice_count as i32, 0)),
        );
        cmd.set_compute_constant(
            kernel,
            names::TILE_SIZE,
            ConstantValue::IntVector(IVec4::new(
                self.tile_pixel_size.x as i32,
                self.tile_pixel_size.y as i32,
                0,
                0,
            )),
        );

        let mut projection = projection;
        if reversed_z {
            let row = -projection.row(2);
            projection.x_axis.z = row.x;
            projection.y_axis.z = row.y;
            projection.z_axis.z = row.z;
            projection.w_axis.z = row.w;
        }
        cmd.set_compute_constant(kernel, names::CAMERA_INV_PROJ, ConstantValue::Matrix(projection.inverse()));
        cmd.dispatch(kernel, s.tile_count_x, s.tile_count_y, s.z_slice_count);
        true
    }

    /// Records the per-frame light assignment pass.
    pub fn execute_light_culling_pass(&self, cmd: &mut CommandList, view: Mat4) {
        let CullerState::Initialized(buffers) = self.state else {
            return;
        };
        let kernel = ComputeKernel::LightCulling;
        cmd.set_compute_buffer(kernel, names::CLUSTERS, buffers.aabbs);
        cmd.set_compute_buffer(kernel, names::POINT_LIGHTS, buffers.point_lights);
        cmd.set_compute_constant(
            kernel,
            names::PUNCTUAL_LIGHT_COUNT,
            ConstantValue::IntVector(IVec4::new(
                self.visible_point_count as i32,
                self.visible_spot_count as i32,
                0,
                0,
            )),
        );
        // Full arenas: partial uploads leave stale records the kernel may read
        cmd.upload_buffer(buffers.point_lights, &self.point_lights);
        cmd.set_compute_buffer(kernel, names::SPOT_LIGHTS, buffers.spot_lights);
        cmd.upload_buffer(buffers.spot_lights, &self.spot_lights);
        cmd.set_compute_buffer(kernel, names::LIGHT_INDEX_LIST, buffers.light_indices);
        cmd.set_compute_buffer(kernel, names::LIGHT_GRIDS, buffers.light_grids);
        cmd.set_compute_buffer(kernel, names::GLOBAL_LIGHT_INDEX_COUNT, buffers.global_index_count);
        cmd.upload_buffer(buffers.global_index_count, &[0u32]);
        cmd.set_compute_constant(kernel, names::CAMERA_VIEW, ConstantValue::Matrix(view));
        cmd.dispatch(kernel, 1, 1, self.settings.z_slice_count);
    }

    /// Binds the cluster outputs and slicing constants for shading.
    pub fn set_shader_params(&self, cmd: &mut CommandList, near: f32, far: f32) {
        let CullerState::Initialized(buffers) = self.state else {
            return;
        };
        let light_binding = if self.use_constant_buffers {
            cmd.set_global_buffer(names::POINT_LIGHTS_CBUFFER, buffers.point_lights, BufferBinding::Constant);
            cmd.set_global_buffer(names::SPOT_LIGHTS_CBUFFER, buffers.spot_lights, BufferBinding::Constant);
            BufferBinding::Constant
        } else {
            cmd.set_global_buffer(names::POINT_LIGHTS, buffers.point_lights, BufferBinding::Structured);
            cmd.set_global_buffer(names::SPOT_LIGHTS, buffers.spot_lights, BufferBinding::Structured);
            BufferBinding::Structured
        };
        // Index list exceeds the constant-buffer size limit
        cmd.set_global_buffer(names::LIGHT_INDEX_LIST, buffers.light_indices, BufferBinding::Structured);
        let grid_name = match light_binding {
            BufferBinding::Constant => names::LIGHT_GRIDS_CBUFFER,
            BufferBinding::Structured => names::LIGHT_GRIDS,
        };
        cmd.set_global_buffer(grid_name, buffers.light_grids, light_binding);

        let s = &self.settings;
        let (slice_scale, slice_bias) = slice_params(s.z_slice_count, near, far.max(s.max_far_plane));
        cmd.set_global_vector(
            names::DIM_XY_AND_TILE_SIZE,
            Vec4::new(
                s.tile_count_x as f32,
                s.tile_count_y as f32,
                self.tile_pixel_size.x as f32,
                self.tile_pixel_size.y as f32,
            ),
        );
        cmd.set_global_float(names::SLICE_SCALE, slice_scale);
        cmd.set_global_float(names::SLICE_BIAS, slice_bias);
    }

    /// Releases the persistent buffers and returns to the uninitialized state.
    pub fn dispose(&mut self, ctx: &mut dyn GpuContext) {
        if let CullerState::Initialized(buffers) = self.state {
            log::debug!("Releasing clustered lighting buffers");
            buffers.destroy(ctx);
        }
        self.state = CullerState::Uninitialized;
        self.clusters_dirty = true;
        self.grid_key = None;
        self.visible_point_count = 0;
        self.visible_spot_count = 0;
    }
}

// ============================================================================
// Slicing
// ============================================================================

/// `(sliceScale, sliceBias)` for a logarithmic depth split.
#[must_use]
pub fn slice_params(slices: u32, near: f32, far: f32) -> (f32, f32) {
    let log_ratio = (far / near).log2();
    let n = slices as f32;
    (n / log_ratio, -n * near.log2() / log_ratio)
}

/// Slice containing a positive view depth, clamped to the grid.
#[must_use]
pub fn slice_index(view_depth: f32, slices: u32, slice_scale: f32, slice_bias: f32) -> u32 {
    let slice = (view_depth.max(f32::MIN_POSITIVE).log2() * slice_scale + slice_bias).floor();
    (slice.max(0.0) as u32).min(slices.saturating_sub(1))
}

/// Near distance of slice `k` (slice `slices` yields `far`).
#[must_use]
pub fn slice_depth(k: u32, slices: u32, near: f32, far: f32) -> f32 {
    near * (far / near).powf(k as f32 / slices as f32)
}

// ============================================================================
// CPU Reference Kernels
// ============================================================================

/// View-space AABBs of every cluster, in `x + y·tiles_x + z·tiles_x·tiles_y`
/// order.
///
/// `projection` must be a non-reversed perspective projection.
#[must_use]
pub fn cluster_aabbs(settings: &ClusterSettings, screen: UVec2, projection: Mat4, near: f32, far: f32) -> Vec<ClusterAabb> {
    let (tx, ty, tz) = (settings.tile_count_x, settings.tile_count_y, settings.z_slice_count);
    let tile = UVec2::new(screen.x.div_ceil(tx.max(1)), screen.y.div_ceil(ty.max(1)));
    let inv_proj = projection.inverse();
    let near_ndc_z = projection.project_point3(Vec3::new(0.0, 0.0, -near)).z;
    let z_far = far.max(settings.max_far_plane);

    // Point on the near plane below a screen pixel
    let unproject = |px: f32, py: f32| {
        let ndc_x = px / screen.x as f32 * 2.0 - 1.0;
        let ndc_y = py / screen.y as f32 * 2.0 - 1.0;
        inv_proj.project_point3(Vec3::new(ndc_x, ndc_y, near_ndc_z))
    };

    let mut out = Vec::with_capacity(settings.total_cluster_count() as usize);
    for z in 0..tz {
        let d_near = slice_depth(z, tz, near, z_far);
        let d_far = slice_depth(z + 1, tz, near, z_far);
        for y in 0..ty {
            for x in 0..tx {
                let p_min = unproject((x * tile.x) as f32, (y * tile.y) as f32);
                let p_max = unproject(((x + 1) * tile.x) as f32, ((y + 1) * tile.y) as f32);

                // Scale along the eye ray onto both slice planes
                let on_plane = |p: Vec3, depth: f32| p * (depth / -p.z);
                let pts = [
                    on_plane(p_min, d_near),
                    on_plane(p_min, d_far),
                    on_plane(p_max, d_near),
                    on_plane(p_max, d_far),
                ];
                let min = pts.iter().copied().fold(Vec3::splat(f32::MAX), Vec3::min);
                let max = pts.iter().copied().fold(Vec3::splat(f32::MIN), Vec3::max);
                out.push(ClusterAabb {
                    min: min.extend(0.0),
                    max: max.extend(0.0),
                });
            }
        }
    }
    out
}

/// Output of [`assign_lights`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LightAssignment {
    pub grids: Vec<LightGrid>,
    /// Point lights are indexed `0..points`, spot lights `points..`.
    pub indices: Vec<u32>,
}

/// Assigns lights to clusters by sphere/AABB overlap.
///
/// Each cluster keeps at most `max_lights_per_cluster` lights and the flat
/// list never grows past `capacity`. Clusters visited after the list is full
/// get an empty grid entry. The GPU buffer uses
/// [`ClusterSettings::light_index_capacity`].
#[must_use]
pub fn assign_lights(
    settings: &ClusterSettings,
    aabbs: &[ClusterAabb],
    view: Mat4,
    points: &[GpuPointLight],
    spots: &[GpuSpotLight],
    capacity: usize,
) -> LightAssignment {
    let per_cluster = settings.max_lights_per_cluster as usize;

    let spheres: Vec<(Vec3, f32)> = points
        .iter()
        .map(|l| l.position_range)
        .chain(spots.iter().map(|l| l.position_range))
        .map(|p| (view.transform_point3(p.truncate()), p.w))
        .collect();

    let mut result = LightAssignment {
        grids: Vec::with_capacity(aabbs.len()),
        indices: Vec::with_capacity(capacity.min(aabbs.len().saturating_mul(per_cluster))),
    };

    for aabb in aabbs {
        let offset = result.indices.len();
        let room = per_cluster.min(capacity.saturating_sub(offset));
        let hits = spheres
            .iter()
            .enumerate()
            .filter(|(_, (center, radius))| sphere_intersects_aabb(*center, *radius, aabb))
            .map(|(i, _)| i as u32)
            .take(room);
        result.indices.extend(hits);
        result.grids.push(LightGrid {
            offset: offset as u32,
            count: (result.indices.len() - offset) as u32,
        });
    }
    result
}

fn sphere_intersects_aabb(center: Vec3, radius: f32, aabb: &ClusterAabb) -> bool {
    let closest = center.clamp(aabb.min.truncate(), aabb.max.truncate());
    closest.distance_squared(center) <= radius * radius
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_slice_params_cover_range() {
        let (scale, bias) = slice_params(16, 0.3, 500.0);
        assert!((0.3f32.log2() * scale + bias).abs() < EPSILON);
        assert!((500.0f32.log2() * scale + bias - 16.0).abs() < 1e-3);
    }

    #[test]
    fn test_slice_index_clamps() {
        let (scale, bias) = slice_params(16, 0.3, 500.0);
        assert_eq!(slice_index(0.01, 16, scale, bias), 0);
        assert_eq!(slice_index(10_000.0, 16, scale, bias), 15);
    }

    #[test]
    fn test_sphere_aabb_overlap() {
        let aabb = ClusterAabb {
            min: Vec4::new(-1.0, -1.0, -2.0, 0.0),
            max: Vec4::new(1.0, 1.0, -1.0, 0.0),
        };
        assert!(sphere_intersects_aabb(Vec3::new(0.0, 0.0, -1.5), 0.1, &aabb));
        assert!(sphere_intersects_aabb(Vec3::new(2.0, 0.0, -1.5), 1.0, &aabb));
        assert!(!sphere_intersects_aabb(Vec3::new(3.0, 0.0, -1.5), 1.0, &aabb));
    }

    #[test]
    fn test_culler_clamps_degenerate_grid() {
        let culler = ClusteredLightCuller::new(ClusterSettings {
            tile_count_x: 0,
            z_slice_count: 100_000,
            ..Default::default()
        });
        assert_eq!(culler.settings().tile_count_x, 1);
        assert_eq!(culler.settings().z_slice_count, crate::settings::MAX_CLUSTER_SLICES);
        assert!(culler.settings().total_cluster_count() > 0);
    }
}
