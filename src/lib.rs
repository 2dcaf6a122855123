// =============================================================================
// VULKAN BRING-UP
// =============================================================================
//
// One-time setup of a rendering-capable Vulkan device:
//
//   Bootstrap ──> InstanceStage ──> SurfaceStage ──> RenderingContext
//   (loader)      (layers, exts)    (window surface)  (physical device)
//                                                        └── LogicalDevice
//                                                              └── Queues
//
// =============================================================================

pub mod backend;
pub mod config;

pub use backend::{
    Bootstrap, BootstrapError, DeviceSettings, InstanceSettings, LogicalDevice, Queue, RenderingContext,
};
pub use config::Config;
