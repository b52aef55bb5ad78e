//! Settings Tests
//!
//! Tests for:
//! - JSON loading with partial documents
//! - Unknown cascade options
//! - Range clamping of numeric knobs
//! - Cluster grid dimensions

use xrp::PipelineError;
use xrp::renderer::post_process::volume::{BLOOM_MIP_RANGE, TonemappingMode};
use xrp::settings::{
    ClusterSettings, LUT_SIZE_RANGE, MAX_CLUSTER_SLICES, MAX_CLUSTER_TILES, MAX_LIGHTS_PER_CLUSTER, MAX_RENDER_SCALE,
    MAX_SHADOW_BIAS, MIN_RENDER_SCALE, MsaaQuality, PipelineSettings, ShadowCascadesOption, ShadowmapResolution,
};

const EPSILON: f32 = 1e-4;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// JSON
// ============================================================================

#[test]
fn empty_document_is_default() {
    init_logger();
    let settings = PipelineSettings::from_json("{}").unwrap();
    assert_eq!(settings, PipelineSettings::default());
}

#[test]
fn partial_document_keeps_other_defaults() -> anyhow::Result<()> {
    init_logger();
    let json = r#"{
        "use_cluster_lighting": true,
        "msaa_quality": "Msaa4x",
        "shadowmap_resolution": "R2048",
        "post_process": { "bloom": { "intensity": 0.8 }, "tonemapping": "Aces" }
    }"#;
    let settings = PipelineSettings::from_json(json)?;

    assert!(settings.use_cluster_lighting);
    assert_eq!(settings.msaa_quality, MsaaQuality::Msaa4x);
    assert_eq!(settings.shadowmap_resolution, ShadowmapResolution::R2048);
    assert!(approx(settings.post_process.bloom.intensity, 0.8));
    assert_eq!(settings.post_process.tonemapping, TonemappingMode::Aces);

    let defaults = PipelineSettings::default();
    assert_eq!(settings.post_process.bloom.mip_count, defaults.post_process.bloom.mip_count);
    assert_eq!(settings.shadow_cascades, defaults.shadow_cascades);
    assert_eq!(settings.cluster, defaults.cluster);
    assert!(approx(settings.shadow_distance, defaults.shadow_distance));
    Ok(())
}

#[test]
fn unknown_cascade_option_falls_back_to_one_cascade() {
    init_logger();
    let settings = PipelineSettings::from_json(r#"{ "shadow_cascades": "EightCascades" }"#).unwrap();
    assert_eq!(settings.shadow_cascades, ShadowCascadesOption::Unrecognized);

    let (count, split) = settings.cascade_layout();
    assert_eq!(count, 1);
    assert!(approx(split.x, 1.0));
}

#[test]
fn cascade_layouts() {
    let two = PipelineSettings {
        shadow_cascades: ShadowCascadesOption::TwoCascades,
        cascades2_split: 0.3,
        ..Default::default()
    };
    let (count, split) = two.cascade_layout();
    assert_eq!(count, 2);
    assert!(approx(split.x, 0.3) && approx(split.y, 1.0));

    let none = PipelineSettings {
        shadow_cascades: ShadowCascadesOption::NoCascades,
        ..Default::default()
    };
    assert_eq!(none.cascade_layout().0, 1);
}

#[test]
fn malformed_json_is_a_parse_error() {
    init_logger();
    let err = PipelineSettings::from_json(r#"{ "render_scale": "big" }"#).unwrap_err();
    assert!(matches!(err, PipelineError::ConfigParse(_)), "Got {err:?}");
}

// ============================================================================
// Clamping
// ============================================================================

#[test]
fn render_scale_is_clamped() {
    init_logger();
    let low = PipelineSettings::from_json(r#"{ "render_scale": 0.01 }"#).unwrap();
    let high = PipelineSettings::from_json(r#"{ "render_scale": 4.0 }"#).unwrap();
    assert!(approx(low.render_scale, MIN_RENDER_SCALE));
    assert!(approx(high.render_scale, MAX_RENDER_SCALE));
}

#[test]
fn shadow_biases_are_clamped() {
    init_logger();
    let settings = PipelineSettings {
        shadow_depth_bias: -1.0,
        shadow_normal_bias: 42.0,
        shadow_distance: -5.0,
        ..Default::default()
    }
    .validated();
    assert!(approx(settings.shadow_depth_bias, 0.0));
    assert!(approx(settings.shadow_normal_bias, MAX_SHADOW_BIAS));
    assert!(approx(settings.shadow_distance, 0.0));
}

#[test]
fn lut_size_is_clamped() {
    init_logger();
    let small = PipelineSettings {
        color_grading_lut_size: 4,
        ..Default::default()
    }
    .validated();
    let large = PipelineSettings {
        color_grading_lut_size: 128,
        ..Default::default()
    }
    .validated();
    assert_eq!(small.color_grading_lut_size, LUT_SIZE_RANGE.0);
    assert_eq!(large.color_grading_lut_size, LUT_SIZE_RANGE.1);
}

#[test]
fn bloom_mip_count_is_clamped_on_load() -> anyhow::Result<()> {
    init_logger();
    let settings = PipelineSettings::from_json(r#"{ "post_process": { "bloom": { "mip_count": 12 } } }"#)?;
    assert_eq!(settings.post_process.bloom.mip_count, BLOOM_MIP_RANGE.1);

    let settings = PipelineSettings::from_json(r#"{ "post_process": { "bloom": { "mip_count": 0 } } }"#)?;
    assert_eq!(settings.post_process.bloom.mip_count, BLOOM_MIP_RANGE.0);
    Ok(())
}

#[test]
fn huge_cluster_grid_is_clamped_on_load() -> anyhow::Result<()> {
    init_logger();
    let json = r#"{
        "cluster": {
            "tile_count_x": 65536,
            "tile_count_y": 65536,
            "z_slice_count": 4096,
            "max_lights_per_cluster": 100000
        }
    }"#;
    let settings = PipelineSettings::from_json(json)?;
    let cluster = &settings.cluster;
    assert_eq!(cluster.tile_count_x, MAX_CLUSTER_TILES);
    assert_eq!(cluster.tile_count_y, MAX_CLUSTER_TILES);
    assert_eq!(cluster.z_slice_count, MAX_CLUSTER_SLICES);
    assert_eq!(cluster.max_lights_per_cluster, MAX_LIGHTS_PER_CLUSTER);
    assert_eq!(
        cluster.total_cluster_count(),
        MAX_CLUSTER_TILES * MAX_CLUSTER_TILES * MAX_CLUSTER_SLICES
    );
    assert_eq!(
        u64::from(cluster.light_index_capacity()),
        u64::from(cluster.total_cluster_count()) * u64::from(MAX_LIGHTS_PER_CLUSTER)
    );
    Ok(())
}

#[test]
fn zero_cluster_dimensions_become_one() -> anyhow::Result<()> {
    init_logger();
    let json = r#"{
        "cluster": { "tile_count_x": 0, "tile_count_y": 0, "z_slice_count": 0, "max_lights_per_cluster": 0, "max_far_plane": -1.0 }
    }"#;
    let settings = PipelineSettings::from_json(json)?;
    let cluster = &settings.cluster;
    assert_eq!((cluster.tile_count_x, cluster.tile_count_y, cluster.z_slice_count), (1, 1, 1));
    assert_eq!(cluster.max_lights_per_cluster, 1);
    assert_eq!(cluster.total_cluster_count(), 1);
    assert_eq!(cluster.light_index_capacity(), 1);
    assert!(approx(cluster.max_far_plane, ClusterSettings::default().max_far_plane));
    Ok(())
}

#[test]
fn unvalidated_cluster_counts_saturate() {
    let cluster = ClusterSettings {
        tile_count_x: u32::MAX,
        tile_count_y: 2,
        z_slice_count: 2,
        max_lights_per_cluster: 16,
        ..Default::default()
    };
    assert_eq!(cluster.total_cluster_count(), u32::MAX);
    assert_eq!(cluster.light_index_capacity(), u32::MAX);
}

#[test]
fn valid_settings_pass_unchanged() {
    let settings = PipelineSettings {
        render_scale: 0.75,
        color_grading_lut_size: 33,
        ..Default::default()
    };
    assert_eq!(settings.clone().validated(), settings);
}
