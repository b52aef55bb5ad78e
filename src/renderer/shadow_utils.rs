//! Shadow Utilities
//!
//! Pure math for directional-light cascades, kept free of pass state for
//! reuse and testability.
//!
//! # Provided Functions
//!
//! - Cascade boundary distances from split fractions
//! - Frustum slice corners in world space
//! - Bounding sphere of a slice
//! - Orthographic light view/projection around a sphere, texel-snapped
//!
//! Matrices use glam's right-handed, `[0, 1]` depth conventions and are *not*
//! adjusted for a reversed depth buffer.

use glam::{Mat4, Vec3};

use crate::scene::bounds::BoundingSphere;
use crate::scene::camera::RenderCamera;

/// Maximum cascade count for the main light.
pub const MAX_CASCADES: usize = 4;

// ============================================================================
// Cascade Boundaries
// ============================================================================

/// Near/far view distances of every cascade.
///
/// `ratios` are cumulative fractions of `shadow_distance`: for four cascades
/// `(r0, r1, r2)` yields `[near, r0·d, r1·d, r2·d, d]`; for two cascades only
/// `r0` is used; one cascade covers `[near, d]`. Entry `i` and `i + 1` bound
/// cascade `i`.
#[must_use]
pub fn cascade_boundaries(near: f32, shadow_distance: f32, cascade_count: usize, ratios: Vec3) -> [f32; MAX_CASCADES + 1] {
    let n = cascade_count.clamp(1, MAX_CASCADES);
    let far = shadow_distance.max(near);
    let mut bounds = [far; MAX_CASCADES + 1];
    bounds[0] = near;

    let r = ratios.to_array();
    for i in 1..n {
        bounds[i] = (r[i - 1] * far).clamp(near, far);
    }
    bounds[n] = far;
    bounds
}

// ============================================================================
// Frustum Corners in World Space
// ============================================================================

/// The 8 world-space corners of the camera frustum between two view
/// distances. Near face first.
#[must_use]
pub fn frustum_slice_corners(camera: &RenderCamera, slice_near: f32, slice_far: f32) -> [Vec3; 8] {
    let (w_near, h_near, w_far, h_far) = if camera.is_orthographic() {
        let h = camera.ortho_size;
        let w = h * camera.aspect;
        (w, h, w, h)
    } else {
        let proj = camera.projection_matrix();
        let tan_half_fov = 1.0 / proj.y_axis.y;
        let aspect = proj.y_axis.y / proj.x_axis.x;
        let h_near = tan_half_fov * slice_near;
        let h_far = tan_half_fov * slice_far;
        (h_near * aspect, h_near, h_far * aspect, h_far)
    };

    // View space is RH: -Z is forward
    let corners_view = [
        Vec3::new(-w_near, -h_near, -slice_near),
        Vec3::new(w_near, -h_near, -slice_near),
        Vec3::new(w_near, h_near, -slice_near),
        Vec3::new(-w_near, h_near, -slice_near),
        Vec3::new(-w_far, -h_far, -slice_far),
        Vec3::new(w_far, -h_far, -slice_far),
        Vec3::new(w_far, h_far, -slice_far),
        Vec3::new(-w_far, h_far, -slice_far),
    ];

    let inv_view = camera.view_matrix().inverse();
    corners_view.map(|c| inv_view.transform_point3(c))
}

/// Sphere around the corners: centroid plus farthest corner distance.
#[must_use]
pub fn bounding_sphere(corners: &[Vec3; 8]) -> BoundingSphere {
    let center = corners.iter().copied().sum::<Vec3>() / 8.0;
    let radius = corners
        .iter()
        .map(|c| c.distance(center))
        .fold(0.0f32, f32::max);
    BoundingSphere { center, radius }
}

// ============================================================================
// Light View / Projection
// ============================================================================

fn light_up(direction: Vec3) -> Vec3 {
    if direction.y.abs() > 0.99 { Vec3::X } else { Vec3::Y }
}

/// Builds the orthographic view and projection that enclose `sphere` as seen
/// from a directional light shining along `light_direction`.
///
/// The sphere centre is snapped to the shadow-map texel grid in light space
/// so the cascade does not shimmer when the camera translates. The near plane
/// is pulled back by `near_plane_offset` to catch casters in front of the
/// sphere.
#[must_use]
pub fn sphere_shadow_matrices(
    light_direction: Vec3,
    sphere: BoundingSphere,
    resolution: u32,
    near_plane_offset: f32,
) -> (Mat4, Mat4, BoundingSphere) {
    let dir = light_direction.normalize_or(Vec3::NEG_Z);
    let up = light_up(dir);
    let radius = sphere.radius.max(1e-3);

    // Texel snapping in a light-aligned basis
    let basis = Mat4::look_at_rh(Vec3::ZERO, dir, up);
    let texel = (2.0 * radius) / resolution.max(1) as f32;
    let mut ls_center = basis.transform_point3(sphere.center);
    ls_center.x = (ls_center.x / texel).floor() * texel;
    ls_center.y = (ls_center.y / texel).floor() * texel;
    let center = basis.inverse().transform_point3(ls_center);

    let back_off = radius + near_plane_offset.max(0.0);
    let view = Mat4::look_at_rh(center - dir * back_off, center, up);
    let proj = Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.0, back_off + radius);

    (view, proj, BoundingSphere { center, radius })
}
