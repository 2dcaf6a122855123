// Rendering context - staged bring-up
//
// Bootstrap -> InstanceStage -> SurfaceStage -> RenderingContext. Each stage
// consumes the previous one and only exposes the next step, so the
// instance/surface/device order cannot be broken by a caller.
//
// IMPORTANT: field order matters for Drop. The surface is declared before
// the instance so it is destroyed first.

use ash::{vk, Entry};

use super::device::{DeviceSettings, LogicalDevice};
use super::error::BootstrapResult;
use super::feature::FeatureRequest;
use super::instance::{self, InstanceSettings, VulkanInstance};
use super::physical::{self, QueueFamilyInfo, VulkanProbe};
use super::surface::{self, NativeSurfaceSource, VulkanSurface};

/// Extensions the window system requires for `window`
pub fn window_extensions(window: Option<&dyn NativeSurfaceSource>) -> BootstrapResult<Vec<FeatureRequest>> {
    let (display, _) = surface::resolve_handles(window)?;
    instance::window_required_extensions(display)
}

/// Loaded Vulkan library, nothing created yet
pub struct Bootstrap {
    entry: Entry,
    settings: InstanceSettings,
}

impl Bootstrap {
    pub fn new(settings: InstanceSettings) -> BootstrapResult<Self> {
        let entry = unsafe { Entry::load() }?;
        Ok(Self::with_entry(entry, settings))
    }

    pub fn with_entry(entry: Entry, settings: InstanceSettings) -> Self {
        Self { entry, settings }
    }

    pub fn create_instance(self, window_extensions: &[FeatureRequest]) -> BootstrapResult<InstanceStage> {
        let instance = instance::create_instance(self.entry, &self.settings, window_extensions)?;
        Ok(InstanceStage { instance })
    }
}

/// Instance created, waiting for a surface
pub struct InstanceStage {
    instance: VulkanInstance,
}

impl InstanceStage {
    pub fn instance(&self) -> &VulkanInstance {
        &self.instance
    }

    pub fn create_surface(self, window: Option<&dyn NativeSurfaceSource>) -> BootstrapResult<SurfaceStage> {
        let surface = surface::create_surface(&self.instance, window)?;
        Ok(SurfaceStage {
            surface,
            instance: self.instance,
        })
    }
}

/// Instance and surface created, waiting for physical device selection
pub struct SurfaceStage {
    surface: VulkanSurface,
    instance: VulkanInstance,
}

impl SurfaceStage {
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface.surface
    }

    pub fn select_physical_device(self) -> BootstrapResult<RenderingContext> {
        let probe = VulkanProbe {
            instance: &self.instance.instance,
            surface: &self.surface,
        };
        let selection = physical::select_physical_device(&probe)?;

        let memory_properties = unsafe {
            self.instance
                .instance
                .get_physical_device_memory_properties(selection.adapter)
        };
        log::debug!(
            "Memory: {} type(s), {} heap(s)",
            memory_properties.memory_type_count,
            memory_properties.memory_heap_count
        );

        Ok(RenderingContext {
            surface: self.surface,
            instance: self.instance,
            physical_device: selection.adapter,
            device_index: selection.index,
            properties: selection.properties,
            memory_properties,
            graphic_family: selection.graphic,
            present_family: selection.present,
            qualified: selection.qualified,
        })
    }
}

/// Instance, surface and the selected physical device
pub struct RenderingContext {
    surface: VulkanSurface,
    instance: VulkanInstance,
    physical_device: vk::PhysicalDevice,
    device_index: usize,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    graphic_family: QueueFamilyInfo,
    present_family: QueueFamilyInfo,
    qualified: bool,
}

impl RenderingContext {
    pub fn entry(&self) -> &Entry {
        &self.instance.entry
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance.instance
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface.surface
    }

    pub fn surface_loader(&self) -> &ash::khr::surface::Instance {
        &self.surface.loader
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Enumeration index of the selected device
    pub fn device_index(&self) -> usize {
        self.device_index
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn graphic_family(&self) -> QueueFamilyInfo {
        self.graphic_family
    }

    pub fn present_family(&self) -> QueueFamilyInfo {
        self.present_family
    }

    pub fn is_same_graphic_present_family(&self) -> bool {
        self.graphic_family.shares_family_with(&self.present_family)
    }

    /// False when selection fell back to device 0 without a usable queue pair
    pub fn is_qualified(&self) -> bool {
        self.qualified
    }

    pub fn is_validating(&self) -> bool {
        self.instance.is_validating()
    }

    pub fn create_device(
        &self,
        graphic_queue_count: u32,
        present_queue_count: u32,
        settings: &DeviceSettings,
    ) -> BootstrapResult<LogicalDevice<'_>> {
        LogicalDevice::new(self, graphic_queue_count, present_queue_count, settings)
    }
}

impl Drop for RenderingContext {
    fn drop(&mut self) {
        log::info!("Destroying rendering context...");
    }
}
