// Vulkan Device - Logical device and queues
//
// Responsibilities:
// - Validate requested queue counts against the selected families
// - Build one queue request per family (merged when graphic == present)
// - Negotiate device extensions
// - Create the logical device and fetch tagged queue handles

use ash::vk;

use super::context::RenderingContext;
use super::error::{BootstrapError, BootstrapResult, QueueRole};
use super::feature::{self, FeatureRequest};
use super::physical::QueueFamilyInfo;
use super::queue::{Queue, QueueSlot};

#[cfg(not(target_os = "macos"))]
const DEVICE_EXTENSIONS: &[FeatureRequest] = &[FeatureRequest::required("VK_KHR_swapchain")];

#[cfg(target_os = "macos")]
const DEVICE_EXTENSIONS: &[FeatureRequest] = &[
    FeatureRequest::required("VK_KHR_swapchain"),
    FeatureRequest::required("VK_KHR_portability_subset"),
];

/// Device-level knobs
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    /// Appended after the platform table
    pub extra_extensions: Vec<FeatureRequest>,
    pub graphic_priority: f32,
    pub present_priority: f32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            extra_extensions: Vec::new(),
            graphic_priority: 0.0,
            present_priority: 1.0,
        }
    }
}

impl DeviceSettings {
    pub fn extension_requests(&self) -> Vec<FeatureRequest> {
        feature::merge_requests(DEVICE_EXTENSIONS, &self.extra_extensions)
    }
}

/// One `VkDeviceQueueCreateInfo` worth of data
#[derive(Debug, Clone, PartialEq)]
pub struct QueueRequest {
    pub family_index: u32,
    pub priorities: Vec<f32>,
}

/// Queue creation requests plus where each requested queue is fetched from
#[derive(Debug, Clone, PartialEq)]
pub struct QueuePlan {
    pub requests: Vec<QueueRequest>,
    pub graphic_slots: Vec<QueueSlot>,
    pub present_slots: Vec<QueueSlot>,
    /// Graphic and present queues come from one family
    pub shared_family: bool,
}

/// Queues created in a family serving both roles, capped by its capacity
fn shared_queue_count(graphic_count: u32, present_count: u32, capacity: u32) -> u32 {
    graphic_count.saturating_add(present_count).min(capacity)
}

impl QueuePlan {
    pub fn new(
        graphic: QueueFamilyInfo,
        present: QueueFamilyInfo,
        graphic_count: u32,
        present_count: u32,
        settings: &DeviceSettings,
    ) -> BootstrapResult<Self> {
        let Some(graphic_family) = graphic.index() else {
            log::error!("graphic queue family is not assigned on this device");
            return Err(BootstrapError::QueueFamilyMissing(QueueRole::Graphic));
        };
        let Some(present_family) = present.index() else {
            log::error!("present queue family is not assigned on this device");
            return Err(BootstrapError::QueueFamilyMissing(QueueRole::Present));
        };

        if graphic_count == 0 && present_count == 0 {
            log::error!("no graphic or present queue requested");
            return Err(BootstrapError::NoQueuesRequested);
        }

        if graphic_count > graphic.queue_count {
            log::error!("this queue family has {} queue, but request {}", graphic.queue_count, graphic_count);
            return Err(BootstrapError::QueueCountExceeded {
                role: QueueRole::Graphic,
                requested: graphic_count,
                available: graphic.queue_count,
            });
        }
        if present_count > present.queue_count {
            log::error!("this queue family has {} queue, but request {}", present.queue_count, present_count);
            return Err(BootstrapError::QueueCountExceeded {
                role: QueueRole::Present,
                requested: present_count,
                available: present.queue_count,
            });
        }

        let graphic_priorities = vec![settings.graphic_priority.clamp(0.0, 1.0); graphic_count as usize];
        let present_priorities = vec![settings.present_priority.clamp(0.0, 1.0); present_count as usize];

        let graphic_slots: Vec<QueueSlot> = (0..graphic_count)
            .map(|index| QueueSlot {
                family_index: graphic_family,
                index,
                can_present: false,
            })
            .collect();

        let shared_family = graphic_family == present_family;
        let (requests, present_slots) = if shared_family {
            let created = shared_queue_count(graphic_count, present_count, graphic.queue_count);
            let mut priorities = graphic_priorities;
            priorities.extend(present_priorities);
            priorities.truncate(created as usize);

            // Present queues follow the graphic ones inside the shared family
            // and only wrap around once the family runs out of queues.
            let present_slots: Vec<QueueSlot> = (0..present_count)
                .map(|i| QueueSlot {
                    family_index: present_family,
                    index: (graphic_count + i) % created,
                    can_present: true,
                })
                .collect();

            let requests = vec![QueueRequest {
                family_index: graphic_family,
                priorities,
            }];
            (requests, present_slots)
        } else {
            let present_slots: Vec<QueueSlot> = (0..present_count)
                .map(|index| QueueSlot {
                    family_index: present_family,
                    index,
                    can_present: true,
                })
                .collect();

            let requests = vec![
                QueueRequest {
                    family_index: graphic_family,
                    priorities: graphic_priorities,
                },
                QueueRequest {
                    family_index: present_family,
                    priorities: present_priorities,
                },
            ];
            (requests, present_slots)
        };

        // Vulkan rejects zero-queue requests
        let requests: Vec<QueueRequest> = requests.into_iter().filter(|r| !r.priorities.is_empty()).collect();

        Ok(Self {
            requests,
            graphic_slots,
            present_slots,
            shared_family,
        })
    }
}

/// Logical device with its graphic and present queues.
///
/// Borrows the `RenderingContext` it was created from, so the instance and
/// physical device stay alive for as long as this does.
pub struct LogicalDevice<'ctx> {
    graphic_queues: Vec<Queue>,
    present_queues: Vec<Queue>,
    pub enabled_extensions: Vec<String>,
    pub device: ash::Device,
    context: &'ctx RenderingContext,
}

impl<'ctx> LogicalDevice<'ctx> {
    pub fn new(
        context: &'ctx RenderingContext,
        graphic_count: u32,
        present_count: u32,
        settings: &DeviceSettings,
    ) -> BootstrapResult<Self> {
        let plan = QueuePlan::new(
            context.graphic_family(),
            context.present_family(),
            graphic_count,
            present_count,
            settings,
        )?;

        let instance = context.instance();
        let physical_device = context.physical_device();

        let available = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .map_err(BootstrapError::vulkan("vkEnumerateDeviceExtensionProperties"))?;
        let available = feature::names_from_extensions(&available);
        let enabled_extensions = feature::negotiate("Device Extensions", true, &available, &settings.extension_requests())?;

        let extension_names = feature::to_cstrings(&enabled_extensions)?;
        let extension_ptrs: Vec<_> = extension_names.iter().map(|name| name.as_ptr()).collect();

        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = plan
            .requests
            .iter()
            .map(|request| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(request.family_index)
                    .queue_priorities(&request.priorities)
            })
            .collect();

        // No device layers: they are inherited from the instance
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .map_err(BootstrapError::vulkan("vkCreateDevice"))?;
        log::trace!("VkDevice: {:?}", device.handle());

        let graphic_queues = plan.graphic_slots.iter().map(|&slot| Queue::fetch(&device, slot)).collect();
        let present_queues = plan.present_slots.iter().map(|&slot| Queue::fetch(&device, slot)).collect();

        log::info!(
            "Logical device created: {} graphic queue(s), {} present queue(s), {} extension(s){}",
            graphic_count,
            present_count,
            enabled_extensions.len(),
            if plan.shared_family { ", shared family" } else { "" }
        );

        Ok(Self {
            graphic_queues,
            present_queues,
            enabled_extensions,
            device,
            context,
        })
    }

    pub fn context(&self) -> &'ctx RenderingContext {
        self.context
    }

    pub fn graphic_queues(&self) -> &[Queue] {
        &self.graphic_queues
    }

    pub fn present_queues(&self) -> &[Queue] {
        &self.present_queues
    }

    pub fn graphic_queue(&self, index: usize) -> Option<&Queue> {
        self.graphic_queues.get(index)
    }

    pub fn present_queue(&self, index: usize) -> Option<&Queue> {
        self.present_queues.get(index)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> BootstrapResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(BootstrapError::vulkan("vkDeviceWaitIdle"))
    }
}

impl Drop for LogicalDevice<'_> {
    fn drop(&mut self) {
        log::info!("Destroying logical device...");

        if let Err(e) = self.wait_idle() {
            log::error!("{}", e);
        }

        self.graphic_queues.clear();
        self.present_queues.clear();
        unsafe { self.device.destroy_device(None) };
    }
}
