//! GPU Context Boundary
//!
//! [`GpuContext`] is the only way the pipeline touches the GPU. A backend
//! creates resources, executes recorded [`CommandList`]s in submission order
//! and reports what the device can do through [`DeviceCapabilities`].
//!
//! The pipeline never blocks on the context; any synchronisation is the
//! backend's business.

use super::command::CommandList;
use super::resources::{BufferDesc, BufferId, TextureDesc, TextureId};

/// Static facts about the device and display that steer pass selection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct DeviceCapabilities {
    /// Depth buffer is reversed (near = 1, far = 0).
    pub reversed_z: bool,
    /// GPU performs hidden surface removal (tile-based deferred).
    pub hidden_surface_removal: bool,
    /// MSAA targets resolve automatically when sampled.
    pub msaa_auto_resolve: bool,
    /// Multisampled textures can be bound as shader inputs.
    pub multisampled_textures: bool,
    pub supports_shadows: bool,
    pub supports_compute: bool,
    /// Presenting requires an explicit copy into the backbuffer.
    pub requires_blit_to_backbuffer: bool,
    /// The backbuffer expects sRGB-encoded values written by the shader.
    pub requires_srgb_blit: bool,
    /// `Rg11B10Float` is usable as a render target.
    pub hdr_format_supported: bool,
    /// Light buffers should be bound as constant buffers.
    pub prefers_constant_buffers: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            reversed_z: true,
            hidden_surface_removal: false,
            msaa_auto_resolve: false,
            multisampled_textures: true,
            supports_shadows: true,
            supports_compute: true,
            requires_blit_to_backbuffer: false,
            requires_srgb_blit: false,
            hdr_format_supported: true,
            prefers_constant_buffers: false,
        }
    }
}

/// GPU submission collaborator.
pub trait GpuContext {
    fn capabilities(&self) -> &DeviceCapabilities;

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId;

    fn destroy_texture(&mut self, id: TextureId);

    fn create_buffer(&mut self, desc: &BufferDesc) -> BufferId;

    fn destroy_buffer(&mut self, id: BufferId);

    /// Queues a recorded list. Execution order is submission order.
    fn execute(&mut self, list: &CommandList);

    /// Closes the current batch and hands it to the GPU.
    fn submit(&mut self);
}
