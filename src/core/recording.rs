//! Recording GPU context.
//!
//! [`RecordingContext`] implements [`GpuContext`] without a device: it keeps
//! resource descriptors in `slotmap` arenas and appends a copy of every
//! executed list to a log. Useful for headless frame capture and as the
//! collaborator in tests.

use slotmap::SlotMap;

use super::command::{CommandList, RenderCommand};
use super::context::{DeviceCapabilities, GpuContext};
use super::resources::{BufferDesc, BufferId, TextureDesc, TextureId};

/// Snapshot of one executed command list.
#[derive(Debug, Clone)]
pub struct RecordedList {
    pub name: String,
    pub commands: Vec<RenderCommand>,
    /// Index of the submit batch this list belongs to.
    pub batch: usize,
}

#[derive(Default)]
pub struct RecordingContext {
    capabilities: DeviceCapabilities,
    textures: SlotMap<TextureId, TextureDesc>,
    buffers: SlotMap<BufferId, BufferDesc>,
    log: Vec<RecordedList>,
    batch: usize,
    textures_created: usize,
    textures_destroyed: usize,
}

impl RecordingContext {
    #[must_use]
    pub fn new(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn capabilities_mut(&mut self) -> &mut DeviceCapabilities {
        &mut self.capabilities
    }

    /// Every list executed so far, in order.
    #[must_use]
    pub fn executed(&self) -> &[RecordedList] {
        &self.log
    }

    /// Names of executed lists, in order.
    #[must_use]
    pub fn list_names(&self) -> Vec<&str> {
        self.log.iter().map(|l| l.name.as_str()).collect()
    }

    /// All executed commands, flattened in execution order.
    pub fn commands(&self) -> impl Iterator<Item = &RenderCommand> {
        self.log.iter().flat_map(|l| l.commands.iter())
    }

    /// Commands of the first executed list with the given name.
    #[must_use]
    pub fn list(&self, name: &str) -> Option<&RecordedList> {
        self.log.iter().find(|l| l.name == name)
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    #[must_use]
    pub fn texture_desc(&self, id: TextureId) -> Option<&TextureDesc> {
        self.textures.get(id)
    }

    #[must_use]
    pub fn buffer_desc(&self, id: BufferId) -> Option<&BufferDesc> {
        self.buffers.get(id)
    }

    #[must_use]
    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn textures_created(&self) -> usize {
        self.textures_created
    }

    #[must_use]
    pub fn textures_destroyed(&self) -> usize {
        self.textures_destroyed
    }

    #[must_use]
    pub fn submit_count(&self) -> usize {
        self.batch
    }
}

impl GpuContext for RecordingContext {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        self.textures_created += 1;
        self.textures.insert(desc.clone())
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if self.textures.remove(id).is_some() {
            self.textures_destroyed += 1;
        } else {
            log::warn!("RecordingContext: destroying unknown texture {id:?}");
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> BufferId {
        self.buffers.insert(desc.clone())
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if self.buffers.remove(id).is_none() {
            log::warn!("RecordingContext: destroying unknown buffer {id:?}");
        }
    }

    fn execute(&mut self, list: &CommandList) {
        log::trace!("execute '{}' ({} commands)", list.name, list.commands.len());
        self.log.push(RecordedList {
            name: list.name.clone(),
            commands: list.commands.clone(),
            batch: self.batch,
        });
    }

    fn submit(&mut self) {
        self.batch += 1;
    }
}
