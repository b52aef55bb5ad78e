//! Frame Renderer
//!
//! The per-camera stages of the forward path and the multi-camera entry
//! point that drives them.
//!
//! | Module          | Component                                  |
//! |-----------------|--------------------------------------------|
//! | [`frame_data`]  | Camera, light and shadow state per camera  |
//! | [`lights`]      | `LightDataBuilder`                         |
//! | [`clustered`]   | `ClusteredLightCuller`                     |
//! | [`shadow`]      | `ShadowCascadeBuilder`                     |
//! | [`post_process`]| `PostProcessOrchestrator`                  |
//! | [`forward`]     | `ForwardRenderer` (frame pipeline driver)  |
//! | [`pipeline`]    | `RenderPipeline` (all cameras of a frame)  |

pub mod clustered;
pub mod forward;
pub mod frame_data;
pub mod lights;
pub mod pipeline;
pub mod post_process;
pub mod shadow;
pub mod shadow_utils;

pub use clustered::ClusteredLightCuller;
pub use forward::{CameraOutcome, CameraStats, DebugDrawCommand, ForwardRenderer, RuntimeFlags, SkipReason};
pub use frame_data::{CameraFrameState, LightData, RenderingData, ShadowData};
pub use lights::LightDataBuilder;
pub use pipeline::RenderPipeline;
pub use post_process::{PostProcessOrchestrator, PostProcessVolume};
pub use shadow::ShadowCascadeBuilder;
