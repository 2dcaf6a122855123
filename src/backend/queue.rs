// Device queues
//
// Non-owning views into queues the logical device created. They borrow
// nothing at the type level, so the owning `LogicalDevice` only hands out
// references to them.

use ash::vk;

use super::error::{BootstrapError, BootstrapResult};

/// Where a queue lives inside its family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSlot {
    pub family_index: u32,
    pub index: u32,
    pub can_present: bool,
}

pub struct Queue {
    slot: QueueSlot,
    queue: vk::Queue,
    device: ash::Device,
}

impl Queue {
    pub(crate) fn fetch(device: &ash::Device, slot: QueueSlot) -> Self {
        let queue = unsafe { device.get_device_queue(slot.family_index, slot.index) };
        log::trace!(
            "Create a new queue: {} - {} - {:?}, present: {}",
            slot.family_index,
            slot.index,
            queue,
            slot.can_present
        );
        Self {
            slot,
            queue,
            device: device.clone(),
        }
    }

    pub fn handle(&self) -> vk::Queue {
        self.queue
    }

    pub fn family_index(&self) -> u32 {
        self.slot.family_index
    }

    pub fn index(&self) -> u32 {
        self.slot.index
    }

    pub fn can_present(&self) -> bool {
        self.slot.can_present
    }

    pub fn slot(&self) -> QueueSlot {
        self.slot
    }

    /// Block until every submission on this queue has finished
    pub fn wait_idle(&self) -> BootstrapResult<()> {
        unsafe { self.device.queue_wait_idle(self.queue) }.map_err(|result| {
            log::error!(
                "vkQueueWaitIdle failed on queue {} - {}: {}",
                self.slot.family_index,
                self.slot.index,
                result
            );
            BootstrapError::Vulkan {
                context: "vkQueueWaitIdle",
                result,
            }
        })
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("family_index", &self.slot.family_index)
            .field("index", &self.slot.index)
            .field("can_present", &self.slot.can_present)
            .field("queue", &self.queue)
            .finish()
    }
}
