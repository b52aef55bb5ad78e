//! GPU Resource Descriptors
//!
//! Resource identities are [`slotmap`] keys handed out by the
//! [`GpuContext`](super::context::GpuContext). The pipeline never sees a
//! backend object, only these keys and the descriptors that created them.

use slotmap::new_key_type;

new_key_type! {
    /// Identity of a GPU texture (render target, LUT, shadow atlas).
    pub struct TextureId;
    /// Identity of a GPU buffer (cluster AABBs, light lists).
    pub struct BufferId;
}

/// Texel formats used by the pipeline's own targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba16Float,
    Rg11B10Float,
    /// Depth-only formats; `depth_bits` on the descriptor selects precision.
    Depth,
    Shadowmap,
}

impl TextureFormat {
    #[inline]
    #[must_use]
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::Depth | Self::Shadowmap)
    }
}

/// Sampler filter requested for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    Point,
    #[default]
    Bilinear,
}

/// Describes a 2D texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// 0, 16, 24 or 32. A colour target with non-zero bits carries its own depth.
    pub depth_bits: u32,
    pub msaa_samples: u32,
    pub filter: FilterMode,
    pub label: &'static str,
}

impl TextureDesc {
    /// Single-sampled colour target without depth.
    #[must_use]
    pub fn color(width: u32, height: u32, format: TextureFormat, label: &'static str) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            format,
            depth_bits: 0,
            msaa_samples: 1,
            filter: FilterMode::Bilinear,
            label,
        }
    }

    /// Depth target with the given precision.
    #[must_use]
    pub fn depth(width: u32, height: u32, depth_bits: u32, label: &'static str) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            format: TextureFormat::Depth,
            depth_bits,
            msaa_samples: 1,
            filter: FilterMode::Point,
            label,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: FilterMode) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn with_samples(mut self, samples: u32) -> Self {
        self.msaa_samples = samples.max(1);
        self
    }
}

/// How a buffer is exposed to shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Structured,
    Constant,
}

/// Describes a GPU buffer of `count` elements of `stride` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    pub count: u32,
    pub stride: u32,
    pub kind: BufferKind,
    pub label: &'static str,
}

impl BufferDesc {
    #[inline]
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        u64::from(self.count) * u64::from(self.stride)
    }
}
