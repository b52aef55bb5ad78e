//! Frame infrastructure shared by every pipeline stage: typed commands,
//! pooling, transient targets and the GPU-context boundary.

pub mod command;
pub mod command_pool;
pub mod context;
pub mod features;
pub mod recording;
pub mod render_target;
pub mod resources;
pub mod transient;

pub use command::{
    BlitMaterial, BufferBinding, CommandList, CompareFunction, ComputeKernel, ConstantValue,
    DepthState, DrawFilter, DrawSettings, LoadAction, Rect, RenderCommand, RenderQueueRange,
    RenderStateBlock, ShaderPassTag, SortingCriteria, StencilOp, StencilState, StoreAction,
    TargetRef,
};
pub use command_pool::{CommandListPool, PooledCommandList};
pub use context::{DeviceCapabilities, GpuContext};
pub use features::FeatureFlags;
pub use recording::{RecordedList, RecordingContext};
pub use render_target::{RenderTargetHandle, slots};
pub use resources::{BufferDesc, BufferId, BufferKind, FilterMode, TextureDesc, TextureFormat, TextureId};
pub use transient::TransientResourceTable;
