// Backend module - Vulkan bring-up layer
//
// Design: thin wrapper around ash. Instance -> surface -> physical device ->
// logical device, each stage owning what it created.

pub mod context;
pub mod device;
pub mod error;
pub mod feature;
pub mod instance;
pub mod physical;
pub mod queue;
pub mod surface;

pub use context::{Bootstrap, InstanceStage, RenderingContext, SurfaceStage};
pub use device::{DeviceSettings, LogicalDevice, QueuePlan};
pub use error::{BootstrapError, BootstrapResult, QueueRole};
pub use feature::FeatureRequest;
pub use instance::InstanceSettings;
pub use physical::QueueFamilyInfo;
pub use queue::Queue;
pub use surface::NativeSurfaceSource;
