//! Render target handles.
//!
//! A [`RenderTargetHandle`] names *where* a pass renders without owning the
//! texture. Transient slots are resolved through the
//! [`TransientResourceTable`](super::transient::TransientResourceTable).

use super::resources::TextureId;

/// Opaque reference to a render target.
///
/// Two `UserAssigned` handles are equal when they refer to the same texture,
/// regardless of how each handle was obtained. Transient handles compare by
/// slot name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTargetHandle {
    /// The camera's final target (backbuffer or the camera's own texture).
    CameraTarget,
    /// A caller-supplied texture.
    UserAssigned(TextureId),
    /// A per-frame slot in the transient table.
    Transient(&'static str),
}

impl RenderTargetHandle {
    #[inline]
    #[must_use]
    pub fn is_camera_target(&self) -> bool {
        matches!(self, Self::CameraTarget)
    }

    /// Slot name for transient handles.
    #[inline]
    #[must_use]
    pub fn slot(&self) -> Option<&'static str> {
        match self {
            Self::Transient(slot) => Some(slot),
            _ => None,
        }
    }
}

/// Well-known transient slot names.
pub mod slots {
    pub const CAMERA_COLOR: &str = "_CameraColorTexture";
    pub const CAMERA_DEPTH: &str = "_CameraDepthAttachment";
    pub const OPAQUE_TEXTURE: &str = "_CameraOpaqueTexture";
    pub const DEPTH_TEXTURE: &str = "_CameraDepthTexture";
    pub const GRADING_LUT: &str = "_InternalGradingLut";
    pub const BLOOM_INIT: &str = "_BloomInit";
    pub const BLOOM_INIT_BLURRED: &str = "_BloomInitBlurred";
    pub const BLOOM_FINAL: &str = "_BloomFinal";

    /// Bloom mip slots, indexed by mip level.
    pub const BLOOM_MIP_DOWN: [&str; 6] = [
        "_BloomMipDown0",
        "_BloomMipDown1",
        "_BloomMipDown2",
        "_BloomMipDown3",
        "_BloomMipDown4",
        "_BloomMipDown5",
    ];
    pub const BLOOM_MIP_UP: [&str; 6] = [
        "_BloomMipUp0",
        "_BloomMipUp1",
        "_BloomMipUp2",
        "_BloomMipUp3",
        "_BloomMipUp4",
        "_BloomMipUp5",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::{DeviceCapabilities, GpuContext};
    use crate::core::recording::RecordingContext;
    use crate::core::resources::{TextureDesc, TextureFormat};

    #[test]
    fn test_user_assigned_compares_by_texture() {
        let mut ctx = RecordingContext::new(DeviceCapabilities::default());
        let desc = TextureDesc::color(4, 4, TextureFormat::Rgba8Unorm, "User");
        let a = ctx.create_texture(&desc);
        let b = ctx.create_texture(&desc);

        assert_eq!(RenderTargetHandle::UserAssigned(a), RenderTargetHandle::UserAssigned(a));
        assert_ne!(RenderTargetHandle::UserAssigned(a), RenderTargetHandle::UserAssigned(b));
        assert_ne!(RenderTargetHandle::UserAssigned(a), RenderTargetHandle::CameraTarget);
    }

    #[test]
    fn test_transient_slot() {
        let handle = RenderTargetHandle::Transient(slots::CAMERA_COLOR);
        assert_eq!(handle.slot(), Some(slots::CAMERA_COLOR));
        assert_eq!(handle, RenderTargetHandle::Transient("_CameraColorTexture"));
        assert!(!handle.is_camera_target());
        assert_eq!(RenderTargetHandle::CameraTarget.slot(), None);
    }
}
