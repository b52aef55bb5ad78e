//! Forward Renderer
//!
//! [`ForwardRenderer`] drives one camera through the fixed pass sequence of
//! the forward path. Every stage records into its own pooled command list
//! and hands it to the [`GpuContext`] in order; the camera's batch is
//! submitted at the end.
//!
//! # Pass Sequence
//!
//! ```text
//!  ResetFeatures ─► SetupLights ─► ClusteredLighting? ─► MainLightShadow?
//!        │
//!        ▼
//!  ColorGradingLut? ─► SetCamera ─► DrawOpaque ─► DrawSkybox?
//!        │
//!        ▼
//!  CopyOpaque? / CopyDepth? ─► DrawTransparent ─► DrawDebug?
//!        │
//!        ▼
//!  PostProcess | FinalBlit? ─► FinishRendering (unconditional)
//! ```
//!
//! # Render Targets
//!
//! An intermediate colour target is created when MSAA needs an explicit
//! resolve, the render scale is not 1, the camera is a scene view, HDR is
//! on, the display needs a blit, or post-processing runs. A separate depth
//! target exists only when downstream shaders sample scene depth. Without an
//! intermediate target the camera draws straight into its final target and
//! no blit happens at the end.
//!
//! # Resource Lifetime
//!
//! Whatever happens inside the sequence, `FinishRendering` releases every
//! transient target the camera acquired. Targets still live at that point
//! are logged and counted in [`CameraStats::leaked_transients`].

use std::sync::Arc;

use glam::{Mat4, Vec4};

use super::clustered::ClusteredLightCuller;
use super::frame_data::{CameraFrameState, DEPTH_STENCIL_BUFFER_BITS, RenderingData};
use super::lights::LightDataBuilder;
use super::post_process::{self, PostProcessOrchestrator, PostProcessVolume};
use super::shadow::ShadowCascadeBuilder;
use crate::core::{
    BlitMaterial, CommandList, CommandListPool, CompareFunction, DepthState, DeviceCapabilities, DrawFilter,
    DrawSettings, FeatureFlags, FilterMode, GpuContext, LoadAction, RenderCommand, RenderQueueRange,
    RenderStateBlock, RenderTargetHandle, ShaderPassTag, SortingCriteria, StencilOp, StencilState, StoreAction,
    TargetRef, TextureDesc, TransientResourceTable, slots,
};
use crate::errors::{PipelineError, Result};
use crate::scene::{CameraType, ClearFlags, CullingParameters, RenderCamera, SceneQuery};
use crate::settings::{Downsampling, OverrideCameraSettings, PipelineSettings, WireframeMode};

/// Stencil value marking override-camera pixels.
pub const OVERRIDE_STENCIL_REF: u8 = 127;

/// Frames a released transient target may sit unused before it is destroyed.
pub const TRANSIENT_MAX_IDLE_FRAMES: u32 = 3;

pub mod names {
    pub const FOG_PARAMS: &str = "_FogParams";
    pub const MATERIAL_DEBUG_MODE: &str = "_PipelineMaterialDebugMode";
    pub const LIGHTING_DEBUG_MODE: &str = "_PipelineLightingDebugMode";
    pub const VALIDATE_PURE_METAL_COLOR: &str = "_DebugValidatePureMetalColor";
    pub const VALIDATE_HIGH_COLOR: &str = "_DebugValidateHighColor";
    pub const VALIDATE_LOW_COLOR: &str = "_DebugValidateLowColor";
    pub const DEBUG_OVERRIDE_COLOR: &str = "_DebugOverrideColor";
    pub const WIREFRAME_COLOR: &str = "_WireframeColor";
}

/// Fog vector that disables fog for the override camera.
const NO_FOG: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);

// ============================================================================
// Public types
// ============================================================================

/// Host context the pipeline runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeFlags {
    /// Editor preview: enables the debug view and multi-camera warnings.
    pub is_editor_preview: bool,
}

/// Why a camera produced no frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Degenerate viewport, clip planes or matrices.
    InvalidCullingParameters,
    /// The scene returned no culling result.
    CullingFailed,
}

/// What the forward path did for one camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct CameraStats {
    pub intermediate_color: bool,
    pub intermediate_depth: bool,
    pub clustered_lighting: bool,
    pub shadows: bool,
    pub opaque_copied: bool,
    pub depth_copied: bool,
    pub post_processed: bool,
    pub final_blit: bool,
    /// Feature record at the end of the frame.
    pub features: FeatureFlags,
    /// Transient targets still live when the frame finished.
    pub leaked_transients: usize,
}

/// Result of [`ForwardRenderer::render_camera`].
#[derive(Debug)]
pub enum CameraOutcome {
    Rendered(CameraStats),
    Skipped(SkipReason),
    /// A pool-misuse error stopped the camera mid-sequence. Its transient
    /// targets were still released.
    Failed(PipelineError),
}

impl CameraOutcome {
    #[inline]
    #[must_use]
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered(_))
    }

    #[must_use]
    pub fn stats(&self) -> Option<&CameraStats> {
        match self {
            Self::Rendered(stats) => Some(stats),
            _ => None,
        }
    }
}

/// A mesh drawn on top of the frame after transparents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugDrawCommand {
    pub mesh: u64,
    pub transform: Mat4,
    pub material: u64,
    /// Also drawn by scene-view cameras.
    pub can_view_in_scene: bool,
}

/// Resolved attachments of the camera pass.
#[derive(Debug, Clone, Copy)]
struct ActiveTargets {
    color_handle: RenderTargetHandle,
    color: TargetRef,
    /// `None` when the colour target carries its own depth.
    depth: Option<TargetRef>,
}

impl ActiveTargets {
    fn depth_or_color(&self) -> TargetRef {
        self.depth.unwrap_or(self.color)
    }
}

// ============================================================================
// ForwardRenderer
// ============================================================================

/// Per-camera frame driver of the forward path.
pub struct ForwardRenderer {
    settings: Arc<PipelineSettings>,
    flags: RuntimeFlags,
    pool: Arc<CommandListPool>,
    transients: TransientResourceTable,

    // Passes
    lights: LightDataBuilder,
    clustered: ClusteredLightCuller,
    shadows: ShadowCascadeBuilder,
    post_process: PostProcessOrchestrator,

    volume: PostProcessVolume,
    debug_draws: Vec<DebugDrawCommand>,
}

impl ForwardRenderer {
    #[must_use]
    pub fn new(settings: Arc<PipelineSettings>, capabilities: &DeviceCapabilities, flags: RuntimeFlags) -> Self {
        Self::with_pool(settings, Arc::new(CommandListPool::new()), capabilities, flags)
    }

    /// Shares an existing command-list pool.
    #[must_use]
    pub fn with_pool(
        settings: Arc<PipelineSettings>,
        pool: Arc<CommandListPool>,
        capabilities: &DeviceCapabilities,
        flags: RuntimeFlags,
    ) -> Self {
        Self {
            lights: LightDataBuilder::new(),
            clustered: ClusteredLightCuller::new(settings.cluster.clone()),
            shadows: ShadowCascadeBuilder::new(),
            post_process: PostProcessOrchestrator::new(capabilities.hdr_format_supported),
            volume: settings.post_process.clone(),
            transients: TransientResourceTable::new(),
            debug_draws: Vec::new(),
            pool,
            flags,
            settings,
        }
    }

    // === Accessors ===

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn flags(&self) -> RuntimeFlags {
        self.flags
    }

    #[inline]
    #[must_use]
    pub fn pool(&self) -> &Arc<CommandListPool> {
        &self.pool
    }

    #[inline]
    #[must_use]
    pub fn transients(&self) -> &TransientResourceTable {
        &self.transients
    }

    /// Mutable table access, e.g. to pre-warm targets before the first frame.
    #[inline]
    pub fn transients_mut(&mut self) -> &mut TransientResourceTable {
        &mut self.transients
    }

    #[inline]
    #[must_use]
    pub fn clustered(&self) -> &ClusteredLightCuller {
        &self.clustered
    }

    #[inline]
    #[must_use]
    pub fn shadows(&self) -> &ShadowCascadeBuilder {
        &self.shadows
    }

    #[inline]
    #[must_use]
    pub fn lights(&self) -> &LightDataBuilder {
        &self.lights
    }

    #[inline]
    #[must_use]
    pub fn volume(&self) -> &PostProcessVolume {
        &self.volume
    }

    /// Runtime copy of the post-process volume, e.g. to attach a user LUT.
    #[inline]
    pub fn volume_mut(&mut self) -> &mut PostProcessVolume {
        &mut self.volume
    }

    /// Queues a mesh for every camera of the current frame.
    pub fn queue_debug_draw(&mut self, draw: DebugDrawCommand) {
        self.debug_draws.push(draw);
    }

    // === Frame ===

    /// Renders one camera.
    ///
    /// Degenerate cameras and failed culls skip the camera; nothing is
    /// recorded for them.
    pub fn render_camera(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &dyn SceneQuery,
        camera: &RenderCamera,
    ) -> CameraOutcome {
        if !camera.has_valid_culling_parameters() {
            log::debug!("Camera '{}' has no valid culling parameters, skipping", camera.name);
            return CameraOutcome::Skipped(SkipReason::InvalidCullingParameters);
        }

        let caps = ctx.capabilities().clone();
        let camera_state = CameraFrameState::new(camera, &self.settings, &caps);
        let params = CullingParameters {
            shadow_distance: camera_state.max_shadow_distance,
            cull_shadow_casters: caps.supports_shadows && camera_state.max_shadow_distance > f32::EPSILON,
        };
        let Some(cull) = scene.cull(camera, &params) else {
            log::warn!(
                "{}",
                PipelineError::CullingFailed {
                    camera: camera.name.clone()
                }
            );
            return CameraOutcome::Skipped(SkipReason::CullingFailed);
        };

        let environment = scene.environment();
        let mut data = RenderingData::new(camera_state, cull, environment, &self.settings, &caps);

        {
            let mut cmd = self.pool.get("ResetFeatures");
            cmd.set_features(FeatureFlags::empty());
            ctx.execute(&cmd);
        }

        let mut stats = CameraStats::default();
        let result = self.execute(ctx, scene, &mut data, &caps, &mut stats);
        stats.leaked_transients = self.finish_rendering(&data);
        stats.features = data.features;
        ctx.submit();

        match result {
            Ok(()) => CameraOutcome::Rendered(stats),
            Err(err) => {
                log::error!("Camera '{}' aborted: {err}", data.camera.camera.name);
                CameraOutcome::Failed(err)
            }
        }
    }

    /// Ends the frame: clears queued debug draws and ages idle transients.
    pub fn end_frame(&mut self, ctx: &mut dyn GpuContext) {
        self.debug_draws.clear();
        self.transients.trim(TRANSIENT_MAX_IDLE_FRAMES, ctx);
    }

    /// Releases every persistent resource.
    pub fn dispose(&mut self, ctx: &mut dyn GpuContext) {
        self.clustered.dispose(ctx);
        self.shadows.dispose(ctx);
        self.transients.dispose(ctx);
        self.debug_draws.clear();
    }

    fn execute(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &dyn SceneQuery,
        data: &mut RenderingData,
        caps: &DeviceCapabilities,
        stats: &mut CameraStats,
    ) -> Result<()> {
        self.setup_lights(ctx, data);
        stats.clustered_lighting = self.setup_clustering(ctx, data, caps);
        stats.shadows = self.render_main_light_shadow(ctx, scene, data, caps.reversed_z);

        if data.use_post_process {
            let mut cmd = self.pool.get("ColorGradingLut");
            self.post_process
                .render_lut(&mut cmd, &mut self.transients, ctx, &self.volume, data)?;
            ctx.execute(&cmd);
        }

        let targets = self.setup_camera_targets(ctx, data, caps, stats)?;

        self.draw_opaque(ctx, data);
        let camera = &data.camera.camera;
        if camera.clear_flags == ClearFlags::Skybox && data.environment.has_skybox {
            let mut cmd = self.pool.get("DrawSkybox");
            cmd.push(RenderCommand::DrawSkybox);
            ctx.execute(&cmd);
        }

        stats.opaque_copied = self.copy_opaque(ctx, data, &targets)?;
        stats.depth_copied = self.copy_depth(ctx, data, &targets)?;
        if stats.opaque_copied || stats.depth_copied {
            let mut cmd = self.pool.get("RestoreCameraTarget");
            cmd.push(RenderCommand::SetRenderTarget {
                color: targets.color,
                depth: targets.depth_or_color(),
                color_load: LoadAction::Load,
                color_store: StoreAction::Store,
                depth_load: LoadAction::Load,
                depth_store: StoreAction::Store,
            });
            ctx.execute(&cmd);
        }

        self.draw_transparent(ctx, data);
        self.draw_debug(ctx, data);

        let camera = &data.camera.camera;
        if data.use_post_process && camera.post_process_enabled {
            let mut cmd = self.pool.get("PostProcess");
            self.post_process.render(
                &mut cmd,
                &mut self.transients,
                ctx,
                &self.volume,
                data,
                targets.color,
                camera.target(),
            )?;
            ctx.execute(&cmd);
            stats.post_processed = true;
        } else if !targets.color_handle.is_camera_target() {
            self.blit_to_final_target(ctx, data, targets.color, caps.requires_srgb_blit);
            stats.final_blit = true;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lighting
    // ------------------------------------------------------------------------

    fn setup_lights(&mut self, ctx: &mut dyn GpuContext, data: &mut RenderingData) {
        let mut cmd = self.pool.get("SetupLights");
        let light_data = data.lights;
        data.features |= self.lights.setup(&mut cmd, &mut data.cull, &light_data);
        cmd.set_features(data.features);
        ctx.execute(&cmd);
    }

    /// Runs both cluster passes. Returns whether clustered lighting is active.
    fn setup_clustering(&mut self, ctx: &mut dyn GpuContext, data: &mut RenderingData, caps: &DeviceCapabilities) -> bool {
        if !data.use_cluster_lighting || !caps.supports_compute {
            if self.clustered.is_initialized() {
                self.clustered.dispose(ctx);
            }
            return false;
        }
        let camera = &data.camera.camera;
        if !matches!(camera.camera_type, CameraType::Game | CameraType::SceneView) {
            return false;
        }
        if camera.is_orthographic() {
            if self.clustered.is_initialized() {
                log::debug!("Orthographic camera '{}', clustered lighting off", camera.name);
                self.clustered.dispose(ctx);
            }
            return false;
        }

        let (width, height) = data.camera.scaled_size();
        let projection = camera.projection_matrix();
        self.clustered.initialize(width, height, projection, ctx);
        self.clustered.check_clusters_dirty(width, height, projection);

        let mut cmd = self.pool.get("ClusteredLighting");
        self.clustered
            .execute_clustering_pass(&mut cmd, projection, caps.reversed_z);
        self.clustered
            .collect_visible_punctual_lights(&data.cull.visible_lights, camera.position(), camera.forward());
        self.clustered
            .execute_light_culling_pass(&mut cmd, camera.view_matrix());
        data.features |= FeatureFlags::CLUSTER_LIGHTING;
        cmd.set_features(data.features);
        ctx.execute(&cmd);
        true
    }

    fn render_main_light_shadow(
        &mut self,
        ctx: &mut dyn GpuContext,
        scene: &dyn SceneQuery,
        data: &mut RenderingData,
        reversed_z: bool,
    ) -> bool {
        if !self.shadows.prepare(scene, data, reversed_z) {
            return false;
        }
        let mut cmd = self.pool.get("MainLightShadow");
        let features = self.shadows.draw(&mut cmd, data, ctx);
        data.features = (data.features - FeatureFlags::SHADOWS) | features;
        cmd.set_features(data.features);
        ctx.execute(&cmd);
        true
    }

    // ------------------------------------------------------------------------
    // Camera targets
    // ------------------------------------------------------------------------

    fn setup_camera_targets(
        &mut self,
        ctx: &mut dyn GpuContext,
        data: &mut RenderingData,
        caps: &DeviceCapabilities,
        stats: &mut CameraStats,
    ) -> Result<ActiveTargets> {
        let create_color = requires_intermediate_target(data, caps);
        let create_depth = data.camera.require_depth_texture;
        let (width, height) = data.camera.scaled_size();

        if create_color {
            let mut desc = data.camera.target_desc.clone().with_filter(FilterMode::Bilinear);
            desc.depth_bits = if create_depth { 0 } else { DEPTH_STENCIL_BUFFER_BITS };
            desc.label = slots::CAMERA_COLOR;
            self.transients.acquire(slots::CAMERA_COLOR, &desc, ctx)?;
        }
        if create_depth {
            let desc = TextureDesc::depth(width, height, DEPTH_STENCIL_BUFFER_BITS, slots::CAMERA_DEPTH)
                .with_samples(data.camera.msaa_samples());
            self.transients.acquire(slots::CAMERA_DEPTH, &desc, ctx)?;
        }
        stats.intermediate_color = create_color;
        stats.intermediate_depth = create_depth;

        let camera = &data.camera.camera;
        let camera_target = camera.target();
        let color_handle = if create_color {
            RenderTargetHandle::Transient(slots::CAMERA_COLOR)
        } else {
            RenderTargetHandle::CameraTarget
        };
        let color = self.resolve(&color_handle, camera_target)?;
        let depth = if create_depth {
            Some(self.resolve(&RenderTargetHandle::Transient(slots::CAMERA_DEPTH), camera_target)?)
        } else {
            None
        };
        let targets = ActiveTargets {
            color_handle,
            color,
            depth,
        };

        let mut cmd = self.pool.get("SetCamera");
        cmd.set_view_projection(camera.view_matrix(), camera.projection_matrix());
        match depth {
            Some(depth) => cmd.push(RenderCommand::SetRenderTarget {
                color,
                depth,
                color_load: LoadAction::DontCare,
                color_store: StoreAction::Store,
                depth_load: LoadAction::Load,
                depth_store: StoreAction::Store,
            }),
            None => cmd.set_render_target(color, color, LoadAction::DontCare, StoreAction::Store),
        }
        let (clear_depth, clear_color) = clear_targets(camera.clear_flags);
        if clear_depth || clear_color {
            cmd.clear_render_target(clear_depth, clear_color, camera.background_color);
        }

        if data.features.contains(FeatureFlags::CLUSTER_LIGHTING) {
            self.clustered.set_shader_params(&mut cmd, camera.near, camera.far);
        }
        if self.flags.is_editor_preview && self.settings.debug.enabled {
            self.setup_pipeline_debug(&mut cmd);
            data.features |= FeatureFlags::PIPELINE_DEBUG;
        }
        cmd.set_features(data.features);
        ctx.execute(&cmd);
        Ok(targets)
    }

    fn resolve(&self, handle: &RenderTargetHandle, camera_target: TargetRef) -> Result<TargetRef> {
        self.transients
            .resolve(handle, camera_target)
            .ok_or(PipelineError::TransientNotAcquired {
                slot: handle.slot().unwrap_or("<camera>"),
            })
    }

    fn setup_pipeline_debug(&self, cmd: &mut CommandList) {
        let debug = &self.settings.debug;
        let metal = debug.validate_pure_metal_color;
        cmd.set_global_int(names::MATERIAL_DEBUG_MODE, debug.material_debug_mode as i32);
        cmd.set_global_vector(
            names::VALIDATE_PURE_METAL_COLOR,
            Vec4::new(if debug.validate_pure_metal { 1.0 } else { 0.0 }, metal.x, metal.y, metal.z),
        );
        cmd.set_global_vector(names::VALIDATE_HIGH_COLOR, debug.validate_high_color);
        cmd.set_global_vector(names::VALIDATE_LOW_COLOR, debug.validate_low_color);
        cmd.set_global_int(names::LIGHTING_DEBUG_MODE, debug.lighting_debug_mode.bits());
    }

    // ------------------------------------------------------------------------
    // Draws
    // ------------------------------------------------------------------------

    fn draw_opaque(&mut self, ctx: &mut dyn GpuContext, data: &RenderingData) {
        let mut cmd = self.pool.get("DrawOpaque");
        let state = &data.camera;
        let over = &data.override_camera;
        let mut layer_mask = if state.camera.camera_type == CameraType::Preview {
            u32::MAX
        } else {
            self.settings.opaque_layer_mask
        };
        if state.is_scene_view && over.enabled {
            layer_mask |= over.opaque_layer_mask;
        }

        let draw = DrawSettings::new(ShaderPassTag::Forward, state.opaque_sorting)
            .with_pass(ShaderPassTag::Unlit)
            .with_dynamic_batching(data.use_dynamic_batching);

        if over.enabled && over.opaque_layer_mask != 0 && !state.is_scene_view {
            begin_override_camera(&mut cmd, &state.camera, over);
            draw_renderers(
                &mut cmd,
                draw.clone(),
                RenderQueueRange::opaque(),
                over.opaque_layer_mask,
                Some(RenderStateBlock {
                    stencil: Some(StencilState {
                        reference: OVERRIDE_STENCIL_REF,
                        compare: CompareFunction::Always,
                        pass_op: StencilOp::Replace,
                    }),
                    depth: None,
                }),
            );
            draw_renderers(
                &mut cmd,
                DrawSettings::new(ShaderPassTag::OverrideDepthNearest, state.opaque_sorting),
                RenderQueueRange::opaque(),
                over.opaque_layer_mask,
                None,
            );
            end_override_camera(&mut cmd, data);
        }

        let wireframe = if self.flags.is_editor_preview && self.settings.debug.enabled {
            self.settings.debug.wireframe_mode
        } else {
            WireframeMode::None
        };
        match wireframe {
            WireframeMode::None | WireframeMode::ShadedWireframe => {
                draw_renderers(&mut cmd, draw.clone(), RenderQueueRange::opaque(), layer_mask, None);
            }
            WireframeMode::SolidColorWireframe => {
                cmd.set_global_vector(names::DEBUG_OVERRIDE_COLOR, self.settings.debug.wireframe_override_color);
                draw_renderers(
                    &mut cmd,
                    DrawSettings::new(ShaderPassTag::SolidColorOverride, state.opaque_sorting),
                    RenderQueueRange::opaque(),
                    layer_mask,
                    None,
                );
            }
            WireframeMode::WireframeOnly => {}
        }
        if wireframe != WireframeMode::None {
            cmd.set_global_vector(names::WIREFRAME_COLOR, self.settings.debug.wireframe_color);
            draw_renderers(
                &mut cmd,
                DrawSettings::new(ShaderPassTag::Wireframe, SortingCriteria::empty()),
                RenderQueueRange::all(),
                layer_mask,
                None,
            );
        }

        log::trace!("Opaque pass, mask {layer_mask:#x}");
        ctx.execute(&cmd);
    }

    fn draw_transparent(&mut self, ctx: &mut dyn GpuContext, data: &RenderingData) {
        let mut cmd = self.pool.get("DrawTransparent");
        let state = &data.camera;
        let over = &data.override_camera;
        let mut layer_mask = if state.camera.camera_type == CameraType::Preview {
            u32::MAX
        } else {
            self.settings.transparent_layer_mask
        };
        if state.is_scene_view && over.enabled {
            layer_mask |= over.transparent_layer_mask;
        }

        let draw = DrawSettings::new(ShaderPassTag::Forward, SortingCriteria::COMMON_TRANSPARENT)
            .with_pass(ShaderPassTag::Unlit)
            .with_dynamic_batching(data.use_dynamic_batching);
        draw_renderers(&mut cmd, draw.clone(), RenderQueueRange::transparent(), layer_mask, None);

        if over.enabled && over.transparent_layer_mask != 0 && !state.is_scene_view {
            begin_override_camera(&mut cmd, &state.camera, over);
            // Push marked pixels to the far plane, then restore scene depth
            draw_renderers(
                &mut cmd,
                DrawSettings::new(ShaderPassTag::OverrideDepthFarthest, SortingCriteria::empty())
                    .with_pass(ShaderPassTag::RestoreDepth),
                RenderQueueRange::opaque(),
                over.opaque_layer_mask,
                None,
            );
            draw_renderers(
                &mut cmd,
                draw.clone(),
                RenderQueueRange::transparent(),
                over.transparent_layer_mask,
                Some(RenderStateBlock {
                    stencil: Some(StencilState {
                        reference: OVERRIDE_STENCIL_REF,
                        compare: CompareFunction::Equal,
                        pass_op: StencilOp::Keep,
                    }),
                    depth: None,
                }),
            );
            draw_renderers(
                &mut cmd,
                draw,
                RenderQueueRange::transparent(),
                over.transparent_layer_mask,
                Some(RenderStateBlock {
                    stencil: Some(StencilState {
                        reference: OVERRIDE_STENCIL_REF,
                        compare: CompareFunction::NotEqual,
                        pass_op: StencilOp::Keep,
                    }),
                    depth: Some(DepthState {
                        write: false,
                        compare: CompareFunction::Disabled,
                    }),
                }),
            );
            end_override_camera(&mut cmd, data);
        }

        log::trace!("Transparent pass, mask {layer_mask:#x}");
        ctx.execute(&cmd);
    }

    fn draw_debug(&mut self, ctx: &mut dyn GpuContext, data: &RenderingData) {
        let is_scene_view = data.camera.is_scene_view;
        let mut visible = self
            .debug_draws
            .iter()
            .filter(|d| d.can_view_in_scene || !is_scene_view)
            .peekable();
        if visible.peek().is_none() {
            return;
        }
        let mut cmd = self.pool.get("DrawDebug");
        for draw in visible {
            cmd.push(RenderCommand::DrawMesh {
                mesh: draw.mesh,
                transform: draw.transform,
                material: draw.material,
            });
        }
        ctx.execute(&cmd);
    }

    // ------------------------------------------------------------------------
    // Copies
    // ------------------------------------------------------------------------

    fn copy_opaque(&mut self, ctx: &mut dyn GpuContext, data: &RenderingData, targets: &ActiveTargets) -> Result<bool> {
        if !data.camera.require_opaque_texture {
            return Ok(false);
        }
        let downsampling = self.settings.opaque_downsampling;
        let divisor = downsampling.divisor();
        let (width, height) = data.camera.scaled_size();
        let filter = if downsampling == Downsampling::None {
            FilterMode::Point
        } else {
            FilterMode::Bilinear
        };
        let desc = TextureDesc::color(
            width / divisor,
            height / divisor,
            data.camera.target_desc.format,
            slots::OPAQUE_TEXTURE,
        )
        .with_filter(filter);
        let opaque = TargetRef::Texture(self.transients.acquire(slots::OPAQUE_TEXTURE, &desc, ctx)?);

        let material = if downsampling == Downsampling::Box4x {
            BlitMaterial::Sampling
        } else {
            BlitMaterial::Copy
        };
        let mut cmd = self.pool.get("CopyOpaque");
        cmd.blit(Some(targets.color), opaque, material, 0, FeatureFlags::empty());
        cmd.set_global_texture(slots::OPAQUE_TEXTURE, opaque);
        ctx.execute(&cmd);
        Ok(true)
    }

    fn copy_depth(&mut self, ctx: &mut dyn GpuContext, data: &mut RenderingData, targets: &ActiveTargets) -> Result<bool> {
        let Some(depth) = targets.depth else {
            return Ok(false);
        };
        let (width, height) = data.camera.scaled_size();
        let desc = TextureDesc::depth(width, height, DEPTH_STENCIL_BUFFER_BITS, slots::DEPTH_TEXTURE);
        let copy = TargetRef::Texture(self.transients.acquire(slots::DEPTH_TEXTURE, &desc, ctx)?);

        let variant = FeatureFlags::depth_copy_variant(data.camera.msaa_samples());
        data.features = (data.features - FeatureFlags::DEPTH_MSAA) | variant;

        let mut cmd = self.pool.get("CopyDepth");
        cmd.set_global_texture(slots::CAMERA_DEPTH, depth);
        cmd.blit(Some(depth), copy, BlitMaterial::CopyDepth, 0, variant);
        cmd.set_global_texture(slots::DEPTH_TEXTURE, copy);
        cmd.set_features(data.features);
        ctx.execute(&cmd);
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Final target
    // ------------------------------------------------------------------------

    fn blit_to_final_target(&self, ctx: &mut dyn GpuContext, data: &RenderingData, source: TargetRef, srgb: bool) {
        let camera = &data.camera.camera;
        let dest = camera.target();
        let features = if srgb {
            FeatureFlags::LINEAR_TO_SRGB
        } else {
            FeatureFlags::empty()
        };

        let mut cmd = self.pool.get("FinalBlit");
        cmd.set_global_texture(post_process::names::BLIT_TEX, source);
        if data.camera.is_scene_view {
            cmd.push(RenderCommand::SetRenderTarget {
                color: dest,
                depth: dest,
                color_load: LoadAction::DontCare,
                color_store: StoreAction::Store,
                depth_load: LoadAction::DontCare,
                depth_store: StoreAction::DontCare,
            });
        } else {
            cmd.set_render_target(dest, dest, LoadAction::DontCare, StoreAction::Store);
            cmd.set_view_projection(Mat4::IDENTITY, Mat4::IDENTITY);
            cmd.push(RenderCommand::SetViewport(camera.pixel_rect()));
        }
        cmd.blit(Some(source), dest, BlitMaterial::Blit, 0, features);
        ctx.execute(&cmd);
    }

    /// Releases everything the camera acquired. Returns how many targets had
    /// to be reclaimed by the catch-all release.
    fn finish_rendering(&mut self, data: &RenderingData) -> usize {
        self.shadows.frame_cleanup();
        if data.use_post_process {
            self.post_process.frame_cleanup(&mut self.transients);
        }
        for slot in [
            slots::CAMERA_COLOR,
            slots::CAMERA_DEPTH,
            slots::OPAQUE_TEXTURE,
            slots::DEPTH_TEXTURE,
        ] {
            self.transients.release_if_live(slot);
        }

        let leftover = self.transients.release_all();
        if leftover > 0 {
            log::warn!(
                "{leftover} transient target(s) still live after camera '{}'",
                data.camera.camera.name
            );
        }
        leftover
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Whether the camera renders into an intermediate colour target.
#[must_use]
pub fn requires_intermediate_target(data: &RenderingData, caps: &DeviceCapabilities) -> bool {
    let state = &data.camera;
    let msaa_needs_resolve = state.msaa_samples() > 1 && !caps.msaa_auto_resolve;
    let scaled = (state.render_scale - 1.0).abs() > f32::EPSILON;
    msaa_needs_resolve
        || scaled
        || state.is_scene_view
        || state.is_hdr_enabled
        || caps.requires_blit_to_backbuffer
        || data.use_post_process
}

/// `(depth, color)` clears for a camera clear mode.
#[must_use]
pub fn clear_targets(flags: ClearFlags) -> (bool, bool) {
    match flags {
        ClearFlags::Skybox | ClearFlags::SolidColor => (true, true),
        ClearFlags::Depth => (true, false),
        ClearFlags::Nothing => (false, false),
    }
}

/// View and projection of the override camera.
#[must_use]
pub fn override_view_projection(camera: &RenderCamera, over: &OverrideCameraSettings) -> (Mat4, Mat4) {
    let mut view = camera.view_matrix();
    view.w_axis += over.position_offset.extend(0.0);
    let proj = Mat4::perspective_rh(
        over.field_of_view.to_radians(),
        camera.aspect,
        over.near_clip_plane,
        over.far_clip_plane,
    );
    (view, proj)
}

fn begin_override_camera(cmd: &mut CommandList, camera: &RenderCamera, over: &OverrideCameraSettings) {
    let (view, proj) = override_view_projection(camera, over);
    cmd.set_view_projection(view, proj);
    cmd.set_global_vector(names::FOG_PARAMS, NO_FOG);
}

fn end_override_camera(cmd: &mut CommandList, data: &RenderingData) {
    let camera = &data.camera.camera;
    cmd.set_view_projection(camera.view_matrix(), camera.projection_matrix());
    cmd.set_global_vector(names::FOG_PARAMS, data.environment.fog.params());
}

fn draw_renderers(
    cmd: &mut CommandList,
    settings: DrawSettings,
    queue: RenderQueueRange,
    layer_mask: u32,
    state: Option<RenderStateBlock>,
) {
    cmd.push(RenderCommand::DrawRenderers {
        settings,
        filter: DrawFilter { queue, layer_mask },
        state,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_clear_targets() {
        assert_eq!(clear_targets(ClearFlags::Skybox), (true, true));
        assert_eq!(clear_targets(ClearFlags::Depth), (true, false));
        assert_eq!(clear_targets(ClearFlags::Nothing), (false, false));
    }

    #[test]
    fn test_override_view_offsets_translation() {
        let mut camera = RenderCamera::new_perspective("Main", 60.0, 640, 480, 0.3, 100.0);
        camera.look_at(Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO, Vec3::Y);
        let over = OverrideCameraSettings {
            position_offset: Vec3::new(0.0, 0.0, -0.5),
            ..Default::default()
        };
        let (view, _) = override_view_projection(&camera, &over);
        let delta = view.w_axis - camera.view_matrix().w_axis;
        assert!((delta.z + 0.5).abs() < 1e-5);
        assert!(delta.x.abs() < 1e-5 && delta.w.abs() < 1e-5);
    }
}
