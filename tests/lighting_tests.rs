//! Lighting Tests
//!
//! Tests for:
//! - Range and spot attenuation coefficients
//! - Main light selection and additional-light packing
//! - Per-object light index remapping
//! - Cluster slicing, grid rebuild tracking and light assignment clamps

use glam::{Mat4, UVec2, Vec3, Vec4};

use xrp::core::{CommandList, ConstantValue};
use xrp::renderer::clustered::{GpuPointLight, assign_lights, cluster_aabbs, slice_depth, slice_index, slice_params};
use xrp::renderer::frame_data::{LightData, MAX_VISIBLE_ADDITIONAL_LIGHTS, find_main_light};
use xrp::renderer::lights::{
    PackedLight, evaluate_range_attenuation, range_attenuation, setup_per_object_light_indices, spot_attenuation,
};
use xrp::scene::{CullResults, CullingParameters};
use xrp::settings::{ClusterSettings, PipelineSettings};
use xrp::{
    ClusteredLightCuller, CommandListPool, DeviceCapabilities, FeatureFlags, LightDataBuilder, RecordingContext,
    RenderCommand, VisibleLight,
};

const EPSILON: f32 = 1e-4;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn cull_of(lights: Vec<VisibleLight>) -> CullResults {
    CullResults::new(
        lights,
        Vec::new(),
        &CullingParameters {
            shadow_distance: 50.0,
            cull_shadow_casters: true,
        },
    )
}

fn sun() -> VisibleLight {
    VisibleLight::directional(1, Vec3::new(0.0, -1.0, -0.2), Vec3::ONE, 1.0)
}

fn point(id: u64, z: f32) -> VisibleLight {
    VisibleLight::point(id, Vec3::new(0.0, 0.0, z), Vec3::new(1.0, 0.5, 0.25), 2.0, 5.0)
}

// ============================================================================
// Attenuation
// ============================================================================

#[test]
fn range_attenuation_is_full_inside_fade_start() {
    let coeffs = range_attenuation(10.0);
    assert!(approx(evaluate_range_attenuation(coeffs, 0.0), 1.0));
    assert!(approx(evaluate_range_attenuation(coeffs, 5.0), 1.0));
}

#[test]
fn range_attenuation_fades_to_zero_at_range() {
    let range = 10.0;
    let coeffs = range_attenuation(range);

    let at_fade_start = evaluate_range_attenuation(coeffs, 0.8 * range);
    let mid = evaluate_range_attenuation(coeffs, 0.9 * range);
    let at_range = evaluate_range_attenuation(coeffs, range);

    assert!(at_fade_start > 0.0, "Attenuation at 0.8r should be non-zero");
    assert!(mid < at_fade_start && mid > 0.0, "Attenuation should decrease in the fade band");
    assert!(approx(at_range, 0.0), "Attenuation should reach zero at r, got {at_range}");
    assert!(approx(evaluate_range_attenuation(coeffs, 2.0 * range), 0.0));
}

#[test]
fn spot_attenuation_spans_inner_to_outer_cone() {
    let (inv_range, bias) = spot_attenuation(60.0, Some(40.0));
    let eval = |angle_deg: f32| (angle_deg.to_radians().cos() * inv_range + bias).clamp(0.0, 1.0);

    assert!(approx(eval(20.0), 1.0), "Inside inner cone should be fully lit");
    assert!(approx(eval(30.0), 0.0), "Outer cone edge should be dark");
    assert!(eval(25.0) > 0.0 && eval(25.0) < 1.0);
}

#[test]
fn spot_attenuation_derives_inner_angle() {
    let (inv_range, bias) = spot_attenuation(60.0, None);
    assert!(inv_range > 0.0);
    let edge = 30f32.to_radians().cos() * inv_range + bias;
    assert!(approx(edge, 0.0));
}

// ============================================================================
// Light Selection and Packing
// ============================================================================

#[test]
fn main_light_prefers_configured_sun() {
    let lights = vec![point(7, -3.0), sun(), VisibleLight::directional(2, Vec3::NEG_Y, Vec3::ONE, 1.0)];
    assert_eq!(find_main_light(&lights, None), Some(1));
    assert_eq!(find_main_light(&lights, Some(2)), Some(2));
    assert_eq!(find_main_light(&lights, Some(99)), None, "Invisible sun means no main light");
}

#[test]
fn additional_light_count_is_clamped() {
    let mut lights = vec![sun()];
    lights.extend((0..40).map(|i| point(10 + i, -2.0)));
    let settings = PipelineSettings::default();

    let data = LightData::new(&lights, None, 1.0, &settings);
    assert_eq!(data.main_light_index, Some(0));
    assert_eq!(data.additional_lights_count, MAX_VISIBLE_ADDITIONAL_LIGHTS);

    let disabled = PipelineSettings {
        disable_additional_lights: true,
        ..Default::default()
    };
    assert_eq!(LightData::new(&lights, None, 1.0, &disabled).additional_lights_count, 0);
}

#[test]
fn index_map_excludes_main_light_and_overflow() {
    let mut lights = vec![point(2, -1.0), sun()];
    lights.extend((0..34).map(|i| point(10 + i, -2.0)));
    let mut cull = cull_of(lights);
    let data = LightData::new(&cull.visible_lights, None, 1.0, &PipelineSettings::default());

    let additional = setup_per_object_light_indices(&mut cull, &data);
    assert_eq!(additional, MAX_VISIBLE_ADDITIONAL_LIGHTS);

    let map = &cull.light_index_map;
    assert_eq!(map[0], 0, "Lights before the main light keep their index");
    assert_eq!(map[1], -1, "Main light is shaded globally");
    assert_eq!(map[2], 1, "Lights after the main light shift down by one");
    assert_eq!(map[MAX_VISIBLE_ADDITIONAL_LIGHTS], MAX_VISIBLE_ADDITIONAL_LIGHTS as i32 - 1);
    assert!(
        map[MAX_VISIBLE_ADDITIONAL_LIGHTS + 1..].iter().all(|&i| i == -1),
        "Lights past capacity are masked"
    );
}

#[test]
fn builder_packs_additional_lights_without_gaps() {
    init_logger();
    let pool = CommandListPool::new();
    let mut cmd = pool.get("SetupLights");
    let mut cull = cull_of(vec![point(2, -1.0), sun(), point(3, -4.0)]);
    let data = LightData::new(&cull.visible_lights, None, 1.0, &PipelineSettings::default());

    let mut builder = LightDataBuilder::new();
    let features = builder.setup(&mut cmd, &mut cull, &data);

    assert!(features.contains(FeatureFlags::ADDITIONAL_LIGHTS));
    let packed = builder.additional_lights();
    assert_eq!(packed[0].position, Vec4::new(0.0, 0.0, -1.0, 1.0));
    assert_eq!(packed[1].position, Vec4::new(0.0, 0.0, -4.0, 1.0));
    assert!(
        packed[2..].iter().all(|p| *p == PackedLight::DEFAULT),
        "Unused slots are reset to the default light"
    );
}

#[test]
fn builder_without_additional_lights_writes_zero_count() {
    let pool = CommandListPool::new();
    let mut cmd = pool.get("SetupLights");
    let mut cull = cull_of(vec![sun()]);
    let data = LightData::new(&cull.visible_lights, None, 1.0, &PipelineSettings::default());

    let features = LightDataBuilder::new().setup(&mut cmd, &mut cull, &data);
    assert!(!features.contains(FeatureFlags::ADDITIONAL_LIGHTS));
    assert!(has_vector(&cmd, "_AdditionalLightsCount", Vec4::ZERO));
    assert!(has_vector(&cmd, "_MainLightColorIntensity", Vec4::ONE));
}

fn has_vector(list: &CommandList, name: &str, value: Vec4) -> bool {
    list.commands.iter().any(|c| {
        matches!(c, RenderCommand::SetGlobalConstant { name: n, value: ConstantValue::Vector(v) }
            if *n == name && v.abs_diff_eq(value, EPSILON))
    })
}

// ============================================================================
// Cluster Math
// ============================================================================

#[test]
fn slice_depths_are_logarithmic() {
    let (near, far) = (0.3, 300.0);
    assert!(approx(slice_depth(0, 16, near, far), near));
    assert!((slice_depth(16, 16, near, far) - far).abs() < 1e-2);

    let ratio_a = slice_depth(1, 16, near, far) / slice_depth(0, 16, near, far);
    let ratio_b = slice_depth(9, 16, near, far) / slice_depth(8, 16, near, far);
    assert!((ratio_a - ratio_b).abs() < 1e-3, "Consecutive slices share one ratio");
}

#[test]
fn slice_index_matches_slice_bounds() {
    let (near, far) = (0.3, 300.0);
    let (scale, bias) = slice_params(16, near, far);
    for k in 0..16 {
        let mid = (slice_depth(k, 16, near, far) * slice_depth(k + 1, 16, near, far)).sqrt();
        assert_eq!(slice_index(mid, 16, scale, bias), k);
    }
}

#[test]
fn cluster_aabbs_cover_grid() {
    let settings = ClusterSettings {
        tile_count_x: 4,
        tile_count_y: 2,
        z_slice_count: 3,
        ..Default::default()
    };
    let proj = Mat4::perspective_rh(60f32.to_radians(), 2.0, 0.5, 100.0);
    let aabbs = cluster_aabbs(&settings, UVec2::new(400, 200), proj, 0.5, 100.0);

    assert_eq!(aabbs.len(), settings.total_cluster_count() as usize);
    for aabb in &aabbs {
        assert!(aabb.min.x <= aabb.max.x && aabb.min.y <= aabb.max.y && aabb.min.z <= aabb.max.z);
        assert!(aabb.max.z < 0.0, "Clusters lie in front of the camera");
    }
}

#[test]
fn assignment_respects_per_cluster_limit() {
    let settings = ClusterSettings {
        tile_count_x: 2,
        tile_count_y: 2,
        z_slice_count: 2,
        max_lights_per_cluster: 3,
        ..Default::default()
    };
    let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.5, 50.0);
    let aabbs = cluster_aabbs(&settings, UVec2::new(128, 128), proj, 0.5, 50.0);

    // Huge lights touch every cluster
    let points: Vec<GpuPointLight> = (0..8)
        .map(|_| GpuPointLight {
            position_range: Vec4::new(0.0, 0.0, -5.0, 1000.0),
            color_intensity: Vec4::ONE,
        })
        .collect();
    let capacity = settings.light_index_capacity() as usize;
    let result = assign_lights(&settings, &aabbs, Mat4::IDENTITY, &points, &[], capacity);

    assert_eq!(result.grids.len(), aabbs.len());
    assert!(result.grids.iter().all(|g| g.count == 3));
    assert_eq!(result.indices.len(), aabbs.len() * 3);
    assert!(result.indices.len() <= capacity);
}

#[test]
fn assignment_stops_at_index_list_capacity() {
    let settings = ClusterSettings {
        tile_count_x: 2,
        tile_count_y: 2,
        z_slice_count: 2,
        max_lights_per_cluster: 4,
        ..Default::default()
    };
    let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.5, 50.0);
    let aabbs = cluster_aabbs(&settings, UVec2::new(128, 128), proj, 0.5, 50.0);
    let points: Vec<GpuPointLight> = (0..6)
        .map(|_| GpuPointLight {
            position_range: Vec4::new(0.0, 0.0, -5.0, 1000.0),
            color_intensity: Vec4::ONE,
        })
        .collect();

    // Demand is 8 clusters x 4 lights = 32 entries
    let capacity = 10;
    let result = assign_lights(&settings, &aabbs, Mat4::IDENTITY, &points, &[], capacity);

    assert_eq!(result.grids.len(), aabbs.len());
    assert_eq!(result.indices.len(), capacity);
    for grid in &result.grids {
        assert!(grid.offset as usize <= capacity);
        assert!((grid.offset + grid.count) as usize <= capacity);
        assert!(grid.count <= settings.max_lights_per_cluster);
    }
    let counts: Vec<u32> = result.grids.iter().map(|g| g.count).collect();
    assert_eq!(counts, vec![4, 4, 2, 0, 0, 0, 0, 0]);

    let empty = assign_lights(&settings, &aabbs, Mat4::IDENTITY, &points, &[], 0);
    assert!(empty.indices.is_empty());
    assert!(empty.grids.iter().all(|g| g.offset == 0 && g.count == 0));
}

// ============================================================================
// ClusteredLightCuller
// ============================================================================

#[test]
fn clustering_pass_runs_only_when_dirty() {
    init_logger();
    let mut ctx = RecordingContext::new(DeviceCapabilities::default());
    let pool = CommandListPool::new();
    let mut culler = ClusteredLightCuller::new(ClusterSettings::default());
    let proj = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.3, 100.0);

    culler.initialize(1920, 1080, proj, &mut ctx);
    assert!(culler.is_initialized());
    assert_eq!(ctx.live_buffer_count(), 6);

    for _ in 0..3 {
        let mut cmd = pool.get("ClusteredLighting");
        culler.check_clusters_dirty(1920, 1080, proj);
        culler.execute_clustering_pass(&mut cmd, proj, true);
    }
    assert_eq!(culler.clustering_pass_count(), 1, "Unchanged camera must not rebuild clusters");
    assert!(!culler.is_clusters_dirty());

    let mut cmd = pool.get("ClusteredLighting");
    culler.check_clusters_dirty(1280, 720, proj);
    assert!(culler.execute_clustering_pass(&mut cmd, proj, true));
    assert_eq!(culler.clustering_pass_count(), 2);
    assert_eq!(culler.tile_pixel_size(), UVec2::new(80, 90));

    culler.dispose(&mut ctx);
    assert!(!culler.is_initialized());
    assert_eq!(ctx.live_buffer_count(), 0);
}

#[test]
fn collection_clamps_to_capacity_and_far_plane() {
    let settings = ClusterSettings {
        max_visible_point_lights: 4,
        max_far_plane: 50.0,
        ..Default::default()
    };
    let mut culler = ClusteredLightCuller::new(settings);

    let mut lights: Vec<VisibleLight> = (0..6).map(|i| point(i, -10.0)).collect();
    lights.insert(0, point(100, -80.0));
    lights.push(sun());
    culler.collect_visible_punctual_lights(&lights, Vec3::ZERO, Vec3::NEG_Z);

    assert_eq!(culler.visible_point_light_count(), 4);
    assert!(
        culler.point_lights().iter().all(|l| approx(l.position_range.z, -10.0)),
        "Light beyond the far plane must be skipped"
    );
}

#[test]
fn spot_lights_are_collected_separately() {
    let mut culler = ClusteredLightCuller::new(ClusterSettings::default());
    let lights = vec![
        point(1, -5.0),
        VisibleLight::spot(2, Vec3::new(0.0, 2.0, -5.0), Vec3::NEG_Y, Vec3::ONE, 3.0, 8.0, 45.0),
    ];
    culler.collect_visible_punctual_lights(&lights, Vec3::ZERO, Vec3::NEG_Z);

    assert_eq!(culler.visible_point_light_count(), 1);
    assert_eq!(culler.visible_spot_light_count(), 1);
    let spot = culler.spot_lights()[0];
    assert_eq!(spot.direction_angle.truncate(), Vec3::Y);
    assert!(approx(spot.direction_angle.w, 22.5f32.to_radians()));
}
