//! Typed GPU Commands
//!
//! Every piece of GPU work the pipeline issues is a [`RenderCommand`] recorded
//! into a [`CommandList`]. Lists are recorded eagerly on the driving thread
//! and handed to the [`GpuContext`](super::context::GpuContext), which
//! executes them in submission order.
//!
//! # Command Families
//!
//! | Family        | Commands                                                     |
//! |---------------|--------------------------------------------------------------|
//! | Targets       | `SetRenderTarget`, `ClearRenderTarget`, `SetViewport`, scissor |
//! | Draws         | `DrawRenderers`, `DrawSkybox`, `DrawShadows`, `DrawMesh`      |
//! | Compute       | `DispatchCompute`, `SetComputeBuffer`, `SetComputeConstant`, `UploadBuffer` |
//! | Globals       | `SetGlobalBuffer`, `SetGlobalConstant`, `SetGlobalTexture`    |
//! | Copies        | `Blit`                                                       |
//! | State         | `SetViewProjection`, `SetFeatures`                           |

use std::ops::RangeInclusive;

use bitflags::bitflags;
use glam::{IVec4, Mat4, UVec3, Vec4};
use smallvec::SmallVec;

use super::features::FeatureFlags;
use super::resources::{BufferId, TextureId};

// ─── Targets ──────────────────────────────────────────────────────────────────

/// A resolved render target: the final backbuffer or a concrete texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetRef {
    Backbuffer,
    Texture(TextureId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadAction {
    Load,
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreAction {
    Store,
    DontCare,
}

/// Pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }
}

// ─── Draw Filtering ───────────────────────────────────────────────────────────

/// Shader pass selected by a renderer draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderPassTag {
    Forward,
    Unlit,
    /// Writes the nearest depth for override-camera geometry.
    OverrideDepthNearest,
    /// Pushes marked pixels to the far plane before the override transparents.
    OverrideDepthFarthest,
    RestoreDepth,
    /// Debug view: flat colour in place of the shaded result.
    SolidColorOverride,
    /// Debug view: wireframe overlay.
    Wireframe,
}

bitflags! {
    /// Ordering applied to renderers within a draw.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SortingCriteria: u32 {
        const SORTING_LAYER          = 1 << 0;
        const RENDER_QUEUE           = 1 << 1;
        const BACK_TO_FRONT          = 1 << 2;
        const QUANTIZED_FRONT_TO_BACK = 1 << 3;
        const OPTIMIZE_STATE_CHANGES = 1 << 4;
        const CANVAS_ORDER           = 1 << 5;

        const COMMON_OPAQUE = Self::SORTING_LAYER.bits()
            | Self::RENDER_QUEUE.bits()
            | Self::QUANTIZED_FRONT_TO_BACK.bits()
            | Self::OPTIMIZE_STATE_CHANGES.bits()
            | Self::CANVAS_ORDER.bits();
        const COMMON_TRANSPARENT = Self::SORTING_LAYER.bits()
            | Self::RENDER_QUEUE.bits()
            | Self::BACK_TO_FRONT.bits()
            | Self::OPTIMIZE_STATE_CHANGES.bits();
    }
}

/// Render queue interval accepted by a draw.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderQueueRange(pub RangeInclusive<u32>);

impl RenderQueueRange {
    #[must_use]
    pub fn opaque() -> Self {
        Self(0..=2500)
    }

    #[must_use]
    pub fn transparent() -> Self {
        Self(2501..=5000)
    }

    #[must_use]
    pub fn all() -> Self {
        Self(0..=5000)
    }
}

/// Which renderers a draw considers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DrawFilter {
    pub queue: RenderQueueRange,
    pub layer_mask: u32,
}

/// How the selected renderers are drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawSettings {
    pub passes: SmallVec<[ShaderPassTag; 2]>,
    pub sorting: SortingCriteria,
    pub dynamic_batching: bool,
}

impl DrawSettings {
    #[must_use]
    pub fn new(pass: ShaderPassTag, sorting: SortingCriteria) -> Self {
        Self {
            passes: SmallVec::from_slice(&[pass]),
            sorting,
            dynamic_batching: false,
        }
    }

    #[must_use]
    pub fn with_pass(mut self, pass: ShaderPassTag) -> Self {
        self.passes.push(pass);
        self
    }

    #[must_use]
    pub fn with_dynamic_batching(mut self, enabled: bool) -> Self {
        self.dynamic_batching = enabled;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Always,
    Equal,
    NotEqual,
    LessEqual,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilState {
    pub reference: u8,
    pub compare: CompareFunction,
    pub pass_op: StencilOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub write: bool,
    pub compare: CompareFunction,
}

/// Per-draw state overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderStateBlock {
    pub stencil: Option<StencilState>,
    pub depth: Option<DepthState>,
}

// ─── Compute / Blit ───────────────────────────────────────────────────────────

/// Compute kernels owned by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeKernel {
    ClusterAabb,
    LightCulling,
}

/// Full-screen materials used by blits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlitMaterial {
    /// Plain copy, no material.
    Copy,
    /// Box-filtered 4x downsample.
    Sampling,
    CopyDepth,
    LutBuilderLdr,
    LutBuilderHdr,
    Bloom,
    Uber,
    /// Final camera blit with optional linear-to-sRGB conversion.
    Blit,
}

/// How a buffer is bound as a shader global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferBinding {
    Structured,
    Constant,
}

/// A shader constant value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Float(f32),
    Int(i32),
    IntVector(IVec4),
    Vector(Vec4),
    VectorArray(Vec<Vec4>),
    Matrix(Mat4),
    MatrixArray(Vec<Mat4>),
}

// ─── RenderCommand ────────────────────────────────────────────────────────────

/// One recorded GPU operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    SetRenderTarget {
        color: TargetRef,
        depth: TargetRef,
        color_load: LoadAction,
        color_store: StoreAction,
        depth_load: LoadAction,
        depth_store: StoreAction,
    },
    ClearRenderTarget {
        depth: bool,
        color: bool,
        color_value: Vec4,
    },
    SetViewport(Rect),
    EnableScissor(Rect),
    DisableScissor,
    SetViewProjection {
        view: Mat4,
        proj: Mat4,
    },
    DrawRenderers {
        settings: DrawSettings,
        filter: DrawFilter,
        state: Option<RenderStateBlock>,
    },
    DrawSkybox,
    DrawShadows {
        light_index: usize,
        cascade: u32,
        culling_sphere: Vec4,
    },
    DrawMesh {
        mesh: u64,
        transform: Mat4,
        material: u64,
    },
    DispatchCompute {
        kernel: ComputeKernel,
        groups: UVec3,
    },
    SetComputeBuffer {
        kernel: ComputeKernel,
        name: &'static str,
        buffer: BufferId,
    },
    SetComputeConstant {
        kernel: ComputeKernel,
        name: &'static str,
        value: ConstantValue,
    },
    UploadBuffer {
        buffer: BufferId,
        data: Vec<u8>,
    },
    SetGlobalBuffer {
        name: &'static str,
        buffer: BufferId,
        binding: BufferBinding,
    },
    SetGlobalConstant {
        name: &'static str,
        value: ConstantValue,
    },
    SetGlobalTexture {
        name: &'static str,
        texture: TargetRef,
    },
    Blit {
        source: Option<TargetRef>,
        dest: TargetRef,
        material: BlitMaterial,
        pass: u32,
        features: FeatureFlags,
    },
    SetFeatures(FeatureFlags),
}

// ─── CommandList ──────────────────────────────────────────────────────────────

/// A named, recyclable list of commands.
///
/// Obtained from a [`CommandListPool`](super::command_pool::CommandListPool);
/// `id` is assigned by the pool and is stable across reuse.
#[derive(Debug)]
pub struct CommandList {
    pub(crate) id: u64,
    pub name: String,
    pub commands: Vec<RenderCommand>,
}

impl CommandList {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            name: String::new(),
            commands: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drops every command, keeping the allocation.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    #[inline]
    pub fn push(&mut self, command: RenderCommand) {
        self.commands.push(command);
    }

    // === Convenience recorders ===

    pub fn set_global_float(&mut self, name: &'static str, value: f32) {
        self.push(RenderCommand::SetGlobalConstant {
            name,
            value: ConstantValue::Float(value),
        });
    }

    pub fn set_global_int(&mut self, name: &'static str, value: i32) {
        self.push(RenderCommand::SetGlobalConstant {
            name,
            value: ConstantValue::Int(value),
        });
    }

    pub fn set_global_vector(&mut self, name: &'static str, value: Vec4) {
        self.push(RenderCommand::SetGlobalConstant {
            name,
            value: ConstantValue::Vector(value),
        });
    }

    pub fn set_global_vector_array(&mut self, name: &'static str, values: &[Vec4]) {
        self.push(RenderCommand::SetGlobalConstant {
            name,
            value: ConstantValue::VectorArray(values.to_vec()),
        });
    }

    pub fn set_global_matrix(&mut self, name: &'static str, value: Mat4) {
        self.push(RenderCommand::SetGlobalConstant {
            name,
            value: ConstantValue::Matrix(value),
        });
    }

    pub fn set_global_matrix_array(&mut self, name: &'static str, values: &[Mat4]) {
        self.push(RenderCommand::SetGlobalConstant {
            name,
            value: ConstantValue::MatrixArray(values.to_vec()),
        });
    }

    pub fn set_global_texture(&mut self, name: &'static str, texture: TargetRef) {
        self.push(RenderCommand::SetGlobalTexture { name, texture });
    }

    pub fn set_global_buffer(&mut self, name: &'static str, buffer: BufferId, binding: BufferBinding) {
        self.push(RenderCommand::SetGlobalBuffer {
            name,
            buffer,
            binding,
        });
    }

    pub fn set_features(&mut self, features: FeatureFlags) {
        self.push(RenderCommand::SetFeatures(features));
    }

    pub fn set_view_projection(&mut self, view: Mat4, proj: Mat4) {
        self.push(RenderCommand::SetViewProjection { view, proj });
    }

    pub fn set_render_target(&mut self, color: TargetRef, depth: TargetRef, load: LoadAction, store: StoreAction) {
        self.push(RenderCommand::SetRenderTarget {
            color,
            depth,
            color_load: load,
            color_store: store,
            depth_load: load,
            depth_store: store,
        });
    }

    pub fn clear_render_target(&mut self, depth: bool, color: bool, color_value: Vec4) {
        self.push(RenderCommand::ClearRenderTarget {
            depth,
            color,
            color_value,
        });
    }

    pub fn blit(&mut self, source: Option<TargetRef>, dest: TargetRef, material: BlitMaterial, pass: u32, features: FeatureFlags) {
        self.push(RenderCommand::Blit {
            source,
            dest,
            material,
            pass,
            features,
        });
    }

    pub fn set_compute_buffer(&mut self, kernel: ComputeKernel, name: &'static str, buffer: BufferId) {
        self.push(RenderCommand::SetComputeBuffer { kernel, name, buffer });
    }

    pub fn set_compute_constant(&mut self, kernel: ComputeKernel, name: &'static str, value: ConstantValue) {
        self.push(RenderCommand::SetComputeConstant { kernel, name, value });
    }

    /// Replaces the whole contents of `buffer` with `data`.
    pub fn upload_buffer<T: bytemuck::Pod>(&mut self, buffer: BufferId, data: &[T]) {
        self.push(RenderCommand::UploadBuffer {
            buffer,
            data: bytemuck::cast_slice(data).to_vec(),
        });
    }

    pub fn dispatch(&mut self, kernel: ComputeKernel, x: u32, y: u32, z: u32) {
        self.push(RenderCommand::DispatchCompute {
            kernel,
            groups: UVec3::new(x, y, z),
        });
    }
}
