// Bring-up errors
//
// Every stage returns `Result<_, BootstrapError>`. Nothing is retried here;
// the caller decides whether a failed bring-up is fatal (the binary treats
// it as such).

use ash::vk;
use thiserror::Error;

/// Which side of the queue request went over budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRole {
    Graphic,
    Present,
}

impl std::fmt::Display for QueueRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueRole::Graphic => f.write_str("graphic"),
            QueueRole::Present => f.write_str("present"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Failed to load Vulkan library. Is Vulkan installed? ({0})")]
    Loading(#[from] ash::LoadingError),

    #[error("{label}: mandatory entry '{name}' is not available")]
    MissingFeature { label: String, name: String },

    #[error("Must supply a window before creating a surface")]
    WindowMissing,

    #[error("Window cannot produce a surface on this platform: {0}")]
    IncompatibleWindow(String),

    #[error("No Vulkan-capable physical device found")]
    NoPhysicalDevice,

    #[error("No {0} queue family was resolved on the selected device")]
    QueueFamilyMissing(QueueRole),

    #[error("{role} queue family has {available} queue(s), but {requested} were requested")]
    QueueCountExceeded {
        role: QueueRole,
        requested: u32,
        available: u32,
    },

    #[error("At least one graphic or present queue must be requested")]
    NoQueuesRequested,

    #[error("Name contains an interior NUL byte: {0:?}")]
    InvalidName(String),

    #[error("{context} failed: {result}")]
    Vulkan {
        context: &'static str,
        result: vk::Result,
    },
}

impl BootstrapError {
    pub fn vulkan(context: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| BootstrapError::Vulkan { context, result }
    }
}

pub type BootstrapResult<T> = Result<T, BootstrapError>;
