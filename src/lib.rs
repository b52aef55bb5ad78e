//! # XRender Pipeline
//!
//! Per-frame core of a forward, cluster-lit renderer: camera pass
//! sequencing, clustered light culling, cascaded main-light shadows and
//! post-process orchestration.
//!
//! The crate owns no device and no scene graph. GPU work is recorded as typed
//! commands and handed to a [`GpuContext`]; visibility comes from a
//! [`SceneQuery`].
//!
//! ```rust,ignore
//! use xrp::{DeviceCapabilities, GpuContext, PipelineSettings, RecordingContext, RenderPipeline, RuntimeFlags};
//!
//! let mut ctx = RecordingContext::new(DeviceCapabilities::default());
//! let mut pipeline = RenderPipeline::new(PipelineSettings::default(), ctx.capabilities(), RuntimeFlags::default());
//! let outcomes = pipeline.render(&mut ctx, &scene, &[camera]);
//! pipeline.dispose(&mut ctx);
//! ```

pub mod core;
pub mod errors;
pub mod renderer;
pub mod scene;
pub mod settings;

pub use crate::core::{
    CommandList, CommandListPool, DeviceCapabilities, FeatureFlags, GpuContext, RecordingContext, RenderCommand,
    RenderTargetHandle, TargetRef, TextureId, TransientResourceTable,
};
pub use errors::{PipelineError, Result};
pub use renderer::{
    CameraOutcome, CameraStats, ClusteredLightCuller, ForwardRenderer, LightDataBuilder, PostProcessOrchestrator,
    PostProcessVolume, RenderPipeline, RuntimeFlags, ShadowCascadeBuilder, SkipReason,
};
pub use scene::{RenderCamera, SceneQuery, StaticScene, VisibleLight};
pub use settings::PipelineSettings;
