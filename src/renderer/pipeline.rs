//! Render Pipeline
//!
//! Frame entry point. [`RenderPipeline::render`] publishes the per-frame
//! environment globals once, then renders every camera in order through the
//! shared [`ForwardRenderer`]. Cameras never interleave: each one's command
//! lists are executed and submitted before the next camera starts.

use std::sync::Arc;

use super::forward::{CameraOutcome, ForwardRenderer, RuntimeFlags};
use super::post_process::color::srgb_to_linear;
use crate::core::{DeviceCapabilities, GpuContext};
use crate::scene::{CameraType, RenderCamera, SceneQuery};
use crate::settings::PipelineSettings;

pub mod names {
    pub const GLOSSY_ENVIRONMENT_COLOR: &str = "_GlossyEnvironmentColor";
    pub const SUBTRACTIVE_SHADOW_COLOR: &str = "_SubtractiveShadowColor";
}

pub struct RenderPipeline {
    renderer: ForwardRenderer,
    flags: RuntimeFlags,
    frame_count: u64,
}

impl RenderPipeline {
    /// Validates `settings` and builds the forward renderer.
    #[must_use]
    pub fn new(settings: PipelineSettings, capabilities: &DeviceCapabilities, flags: RuntimeFlags) -> Self {
        let settings = Arc::new(settings.validated());
        Self {
            renderer: ForwardRenderer::new(settings, capabilities, flags),
            flags,
            frame_count: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn renderer(&self) -> &ForwardRenderer {
        &self.renderer
    }

    #[inline]
    pub fn renderer_mut(&mut self) -> &mut ForwardRenderer {
        &mut self.renderer
    }

    /// Frames rendered so far.
    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Renders one frame. Returns one outcome per camera, in input order.
    pub fn render(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &dyn SceneQuery,
        cameras: &[RenderCamera],
    ) -> Vec<CameraOutcome> {
        let environment = scene.environment();
        {
            let mut cmd = self.renderer.pool().get("SetupPerFrame");
            cmd.set_global_vector(names::GLOSSY_ENVIRONMENT_COLOR, environment.glossy_environment_color);
            cmd.set_global_vector(
                names::SUBTRACTIVE_SHADOW_COLOR,
                srgb_to_linear(environment.subtractive_shadow_color),
            );
            ctx.execute(&cmd);
        }

        if self.flags.is_editor_preview {
            let game_cameras = cameras
                .iter()
                .filter(|c| c.camera_type == CameraType::Game)
                .count();
            if game_cameras > 1 {
                log::warn!("{game_cameras} game cameras in one frame, only one is supported in preview");
            }
        }

        let outcomes = cameras
            .iter()
            .map(|camera| self.renderer.render_camera(ctx, scene, camera))
            .collect();

        self.renderer.end_frame(ctx);
        self.frame_count += 1;
        outcomes
    }

    /// Releases every persistent GPU resource.
    pub fn dispose(&mut self, ctx: &mut dyn GpuContext) {
        log::debug!("Disposing render pipeline after {} frames", self.frame_count);
        self.renderer.dispose(ctx);
    }
}
