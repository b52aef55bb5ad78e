use glam::{Mat4, Vec3, Vec4};

use crate::core::{Rect, TargetRef, TextureFormat, TextureId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraType {
    #[default]
    Game,
    SceneView,
    Preview,
    Reflection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearFlags {
    #[default]
    Skybox,
    SolidColor,
    Depth,
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpaqueSortMode {
    #[default]
    Default,
    FrontToBack,
    NoDistanceSort,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalCamera {
    /// f-number.
    pub aperture: f32,
    /// Seconds.
    pub shutter_speed: f32,
    /// ISO.
    pub sensitivity: f32,
}

impl Default for PhysicalCamera {
    fn default() -> Self {
        Self {
            aperture: 16.0,
            shutter_speed: 1.0 / 125.0,
            sensitivity: 100.0,
        }
    }
}

impl PhysicalCamera {
    /// Exposure multiplier from the saturation-based EV100 model.
    #[must_use]
    pub fn exposure(&self) -> f32 {
        let e = (self.aperture * self.aperture) / self.shutter_speed * 100.0 / self.sensitivity;
        1.0 / (1.2 * e)
    }
}

/// A texture the camera renders into instead of the backbuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraTargetTexture {
    pub texture: TextureId,
    pub format: TextureFormat,
    pub depth_bits: u32,
    pub msaa_samples: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionType {
    Perspective,
    Orthographic,
}

#[derive(Debug, Clone)]
pub struct RenderCamera {
    pub name: String,
    pub camera_type: CameraType,

    // === Projection ===
    pub projection_type: ProjectionType,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub ortho_size: f32,

    // === Output ===
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub target_texture: Option<CameraTargetTexture>,
    pub allow_msaa: bool,
    pub allow_hdr: bool,
    pub clear_flags: ClearFlags,
    /// sRGB background colour.
    pub background_color: Vec4,
    pub opaque_sort_mode: OpaqueSortMode,
    pub physical: Option<PhysicalCamera>,
    pub post_process_enabled: bool,

    // Cached matrices, renderer read-only
    pub(crate) world_matrix: Mat4,
    pub(crate) view_matrix: Mat4,
    pub(crate) projection_matrix: Mat4,
}

impl RenderCamera {
    /// Perspective camera at the origin looking down -Z. `fov` is in degrees.
    #[must_use]
    pub fn new_perspective(name: &str, fov: f32, pixel_width: u32, pixel_height: u32, near: f32, far: f32) -> Self {
        let aspect = if pixel_height == 0 {
            1.0
        } else {
            pixel_width as f32 / pixel_height as f32
        };
        let mut cam = Self {
            name: name.to_string(),
            camera_type: CameraType::Game,
            projection_type: ProjectionType::Perspective,
            fov: fov.to_radians(),
            aspect,
            near,
            far,
            ortho_size: 10.0,

            pixel_width,
            pixel_height,
            target_texture: None,
            allow_msaa: true,
            allow_hdr: true,
            clear_flags: ClearFlags::Skybox,
            background_color: Vec4::new(0.19, 0.3, 0.47, 0.0),
            opaque_sort_mode: OpaqueSortMode::Default,
            physical: None,
            post_process_enabled: true,

            world_matrix: Mat4::IDENTITY,
            view_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
        };
        cam.update_projection_matrix();
        cam
    }

    #[must_use]
    pub fn with_type(mut self, camera_type: CameraType) -> Self {
        self.camera_type = camera_type;
        self
    }

    pub fn set_orthographic(&mut self, ortho_size: f32) {
        self.projection_type = ProjectionType::Orthographic;
        self.ortho_size = ortho_size;
        self.update_projection_matrix();
    }

    pub fn set_pixel_size(&mut self, width: u32, height: u32) {
        self.pixel_width = width;
        self.pixel_height = height;
        if height > 0 {
            self.aspect = width as f32 / height as f32;
        }
        self.update_projection_matrix();
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection_matrix = match self.projection_type {
            ProjectionType::Perspective => Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far),
            ProjectionType::Orthographic => {
                let w = self.ortho_size * self.aspect;
                let h = self.ortho_size;
                Mat4::orthographic_rh(-w, w, -h, h, self.near, self.far)
            }
        };
    }

    /// Places the camera with a world transform. View matrix = inverse world.
    pub fn set_world_matrix(&mut self, world: Mat4) {
        self.world_matrix = world;
        self.view_matrix = world.inverse();
    }

    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) {
        self.view_matrix = Mat4::look_at_rh(eye, target, up);
        self.world_matrix = self.view_matrix.inverse();
    }

    #[inline]
    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        self.view_matrix
    }

    #[inline]
    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix
    }

    #[inline]
    #[must_use]
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix * self.view_matrix
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.world_matrix.w_axis.truncate()
    }

    /// World-space viewing direction (local -Z).
    #[inline]
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        (-self.world_matrix.z_axis.truncate()).normalize_or(Vec3::NEG_Z)
    }

    #[inline]
    #[must_use]
    pub fn is_orthographic(&self) -> bool {
        self.projection_type == ProjectionType::Orthographic
    }

    #[must_use]
    pub fn pixel_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.pixel_width as f32, self.pixel_height as f32)
    }

    /// Final target of this camera.
    #[must_use]
    pub fn target(&self) -> TargetRef {
        self.target_texture
            .map_or(TargetRef::Backbuffer, |t| TargetRef::Texture(t.texture))
    }

    /// Whether culling parameters can be derived for this camera.
    #[must_use]
    pub fn has_valid_culling_parameters(&self) -> bool {
        self.pixel_width > 0
            && self.pixel_height > 0
            && self.near > 0.0
            && self.far > self.near
            && self.aspect.is_finite()
            && self.aspect > 0.0
            && self.view_matrix.is_finite()
            && self.projection_matrix.is_finite()
    }

    #[must_use]
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(self.view_projection_matrix())
    }
}

/// Six clip planes extracted from a view-projection matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct Frustum {
    planes: [Vec4; 6], // Left, Right, Bottom, Top, Near, Far
}

impl Frustum {
    /// Gribb-Hartmann extraction for a `[0, 1]` depth range.
    #[must_use]
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let mut planes = [
            rows[3] + rows[0],
            rows[3] - rows[0],
            rows[3] + rows[1],
            rows[3] - rows[1],
            rows[2],
            rows[3] - rows[2],
        ];

        for plane in &mut planes {
            let length = plane.truncate().length();
            if length > 0.0 {
                *plane /= length;
            }
        }

        Self { planes }
    }

    #[must_use]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|p| p.truncate().dot(center) + p.w >= -radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_physical_exposure() {
        let exposure = PhysicalCamera::default().exposure();
        // 1 / (1.2 * 16^2 * 125)
        assert!((exposure - 1.0 / 38400.0).abs() < 1e-9);
    }

    #[test]
    fn test_forward_follows_look_at() {
        let mut cam = RenderCamera::new_perspective("Main", 60.0, 1280, 720, 0.3, 100.0);
        cam.look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        assert!((cam.forward() - Vec3::NEG_Z).length() < 1e-5);
        assert!((cam.position() - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-5);
    }

    #[test]
    fn test_degenerate_camera_has_no_culling_parameters() {
        let cam = RenderCamera::new_perspective("Broken", 60.0, 0, 0, 0.3, 100.0);
        assert!(!cam.has_valid_culling_parameters());
    }
}
