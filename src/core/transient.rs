//! Transient Resource Table
//!
//! Maps symbolic render-target slots (`"_CameraColorTexture"`, bloom mips,
//! the grading LUT) to GPU textures that live for one camera render.
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                TransientResourceTable                    │
//! │                                                          │
//! │  active: FxHashMap<slot, ActiveEntry>   ← live this frame │
//! │  free:   FxHashMap<PoolKey, Vec<Idle>>  ← reusable        │
//! │                                                          │
//! │  acquire(slot, desc) → TextureId                         │
//! │  release(slot)                                           │
//! │  release_all()          (FinishRendering)                │
//! │  trim(max_idle_frames)  (resolution changes)             │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! - A slot is acquired at most once between releases. Acquiring a live
//!   slot fails with [`PipelineError::TransientAlreadyAcquired`]; releasing a
//!   dead one fails with [`PipelineError::TransientNotAcquired`].
//! - Released textures are not destroyed; they return to the free list keyed
//!   by descriptor and are reused by the next compatible acquire.

use rustc_hash::FxHashMap;

use super::command::TargetRef;
use super::context::GpuContext;
use super::render_target::RenderTargetHandle;
use super::resources::{FilterMode, TextureDesc, TextureFormat, TextureId};
use crate::errors::{PipelineError, Result};

// ─── Internal Types ───────────────────────────────────────────────────────────

/// Recycling key: the descriptor without its debug label.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct PoolKey {
    width: u32,
    height: u32,
    format: TextureFormat,
    depth_bits: u32,
    msaa_samples: u32,
    filter: FilterMode,
}

impl PoolKey {
    fn from_desc(desc: &TextureDesc) -> Self {
        Self {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            depth_bits: desc.depth_bits,
            msaa_samples: desc.msaa_samples,
            filter: desc.filter,
        }
    }
}

struct ActiveEntry {
    texture: TextureId,
    key: PoolKey,
}

struct IdleTexture {
    texture: TextureId,
    /// Frames spent in the free list without reuse.
    idle_frames: u32,
}

// ─── Table ────────────────────────────────────────────────────────────────────

/// Per-frame slot → texture table with descriptor-keyed reuse.
#[derive(Default)]
pub struct TransientResourceTable {
    active: FxHashMap<&'static str, ActiveEntry>,
    free: FxHashMap<PoolKey, Vec<IdleTexture>>,
}

impl TransientResourceTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `slot` to a texture matching `desc`, creating one if no
    /// compatible texture is free.
    pub fn acquire(
        &mut self,
        slot: &'static str,
        desc: &TextureDesc,
        ctx: &mut dyn GpuContext,
    ) -> Result<TextureId> {
        if self.active.contains_key(slot) {
            log::error!("Transient target '{slot}' acquired twice");
            return Err(PipelineError::TransientAlreadyAcquired { slot });
        }

        let key = PoolKey::from_desc(desc);
        let texture = match self.free.get_mut(&key).and_then(Vec::pop) {
            Some(idle) => idle.texture,
            None => {
                log::debug!("Creating transient '{slot}' {}x{}", desc.width, desc.height);
                ctx.create_texture(desc)
            }
        };

        self.active.insert(slot, ActiveEntry { texture, key });
        Ok(texture)
    }

    /// Returns the texture bound to `slot` to the free list.
    pub fn release(&mut self, slot: &'static str) -> Result<()> {
        let Some(entry) = self.active.remove(slot) else {
            log::error!("Transient target '{slot}' released without acquire");
            return Err(PipelineError::TransientNotAcquired { slot });
        };
        self.free.entry(entry.key).or_default().push(IdleTexture {
            texture: entry.texture,
            idle_frames: 0,
        });
        Ok(())
    }

    /// Releases `slot` if it is live. Returns whether anything was released.
    pub fn release_if_live(&mut self, slot: &'static str) -> bool {
        self.active.contains_key(slot) && self.release(slot).is_ok()
    }

    /// Releases every live slot and returns how many were still live.
    pub fn release_all(&mut self) -> usize {
        let slots: Vec<&'static str> = self.active.keys().copied().collect();
        for slot in &slots {
            let _ = self.release(slot);
        }
        slots.len()
    }

    /// Texture currently bound to `slot`.
    #[inline]
    #[must_use]
    pub fn get(&self, slot: &str) -> Option<TextureId> {
        self.active.get(slot).map(|e| e.texture)
    }

    #[inline]
    #[must_use]
    pub fn is_live(&self, slot: &str) -> bool {
        self.active.contains_key(slot)
    }

    #[inline]
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.active.len()
    }

    /// Resolves a handle to a concrete target.
    ///
    /// `CameraTarget` resolves to `camera_target`; a transient handle whose
    /// slot is not live resolves to `None`.
    #[must_use]
    pub fn resolve(&self, handle: &RenderTargetHandle, camera_target: TargetRef) -> Option<TargetRef> {
        match handle {
            RenderTargetHandle::CameraTarget => Some(camera_target),
            RenderTargetHandle::UserAssigned(id) => Some(TargetRef::Texture(*id)),
            RenderTargetHandle::Transient(slot) => self.get(slot).map(TargetRef::Texture),
        }
    }

    /// Ages free textures by one frame and destroys those idle for more than
    /// `max_idle_frames`.
    pub fn trim(&mut self, max_idle_frames: u32, ctx: &mut dyn GpuContext) {
        for bucket in self.free.values_mut() {
            bucket.retain_mut(|t| {
                t.idle_frames += 1;
                if t.idle_frames > max_idle_frames {
                    ctx.destroy_texture(t.texture);
                    false
                } else {
                    true
                }
            });
        }
        self.free.retain(|_, bucket| !bucket.is_empty());
    }

    /// Destroys every texture, live or free.
    pub fn dispose(&mut self, ctx: &mut dyn GpuContext) {
        for (_, entry) in self.active.drain() {
            ctx.destroy_texture(entry.texture);
        }
        for (_, bucket) in self.free.drain() {
            for t in bucket {
                ctx.destroy_texture(t.texture);
            }
        }
    }

    /// Total textures owned by the table (live and free).
    #[must_use]
    pub fn total_texture_count(&self) -> usize {
        self.active.len() + self.free.values().map(Vec::len).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recording::RecordingContext;

    fn desc(w: u32, h: u32) -> TextureDesc {
        TextureDesc::color(w, h, TextureFormat::Rgba8Unorm, "test")
    }

    #[test]
    fn test_release_then_acquire_reuses_texture() {
        let mut ctx = RecordingContext::default();
        let mut table = TransientResourceTable::new();

        let a = table.acquire("_A", &desc(64, 64), &mut ctx).unwrap();
        table.release("_A").unwrap();
        let b = table.acquire("_B", &desc(64, 64), &mut ctx).unwrap();

        assert_eq!(a, b, "compatible descriptor must reuse the free texture");
        assert_eq!(ctx.textures_created(), 1);
    }

    #[test]
    fn test_double_acquire_and_dead_release_fail() {
        let mut ctx = RecordingContext::default();
        let mut table = TransientResourceTable::new();

        table.acquire("_A", &desc(8, 8), &mut ctx).unwrap();
        assert!(table.acquire("_A", &desc(8, 8), &mut ctx).is_err());
        table.release("_A").unwrap();
        assert!(table.release("_A").is_err());
        assert_eq!(table.live_count(), 0);
    }

    #[test]
    fn test_trim_destroys_idle_textures() {
        let mut ctx = RecordingContext::default();
        let mut table = TransientResourceTable::new();

        table.acquire("_A", &desc(8, 8), &mut ctx).unwrap();
        table.release("_A").unwrap();
        table.trim(1, &mut ctx);
        assert_eq!(table.total_texture_count(), 1);
        table.trim(1, &mut ctx);
        assert_eq!(table.total_texture_count(), 0);
        assert_eq!(ctx.live_texture_count(), 0);
    }
}
