// Vulkan Instance - Loader connection
//
// Responsibilities:
// - Negotiate validation layers and instance extensions
// - Merge engine and window-system extension lists
// - Create the instance, with a debug messenger when validating

use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{CStr, CString};

use super::error::{BootstrapError, BootstrapResult};
use super::feature::{self, FeatureRequest};

pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";
pub const DEBUG_UTILS_EXTENSION: &str = "VK_EXT_debug_utils";
const PORTABILITY_ENUMERATION_EXTENSION: &str = "VK_KHR_portability_enumeration";

const INSTANCE_LAYERS: &[FeatureRequest] = &[FeatureRequest::required(VALIDATION_LAYER)];

#[cfg(target_os = "windows")]
const INSTANCE_EXTENSIONS: &[FeatureRequest] = &[
    FeatureRequest::required("VK_KHR_surface"),
    FeatureRequest::required("VK_KHR_win32_surface"),
];

#[cfg(target_os = "macos")]
const INSTANCE_EXTENSIONS: &[FeatureRequest] = &[
    FeatureRequest::required("VK_KHR_surface"),
    FeatureRequest::required("VK_EXT_metal_surface"),
    FeatureRequest::required(PORTABILITY_ENUMERATION_EXTENSION),
    FeatureRequest::required("VK_KHR_get_physical_device_properties2"),
];

// The xlib/xcb/wayland extension comes from the window, see `window_required_extensions`
#[cfg(all(unix, not(any(target_os = "macos", target_os = "ios"))))]
const INSTANCE_EXTENSIONS: &[FeatureRequest] = &[FeatureRequest::required("VK_KHR_surface")];

#[cfg(not(any(target_os = "windows", target_os = "macos", all(unix, not(target_os = "ios")))))]
compile_error!("no Vulkan surface platform for this target (expected Windows, macOS or Linux/Unix)");

/// Identity and debug switches for instance creation
#[derive(Debug, Clone)]
pub struct InstanceSettings {
    pub app_name: String,
    pub app_version: u32,
    pub engine_name: String,
    pub engine_version: u32,
    pub enable_validation: bool,
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            app_name: "vk-bringup".to_string(),
            app_version: vk::make_api_version(0, 0, 1, 0),
            engine_name: "vk-bringup".to_string(),
            engine_version: vk::make_api_version(0, 0, 1, 0),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

/// Owned instance with its loader and optional debug messenger.
///
/// The messenger is destroyed before the instance, and the entry outlives
/// both because it is dropped after `Drop::drop` runs.
pub struct VulkanInstance {
    pub instance: ash::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub enabled_layers: Vec<String>,
    pub enabled_extensions: Vec<String>,
    pub entry: Entry,
}

impl VulkanInstance {
    pub fn is_validating(&self) -> bool {
        self.debug_utils.is_some()
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        log::debug!("Destroying Vulkan instance");
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Extensions the window system needs for surface creation, all mandatory
pub fn window_required_extensions(display: RawDisplayHandle) -> BootstrapResult<Vec<FeatureRequest>> {
    let names = ash_window::enumerate_required_extensions(display)
        .map_err(|_| BootstrapError::IncompatibleWindow(format!("{display:?}")))?;

    Ok(names
        .iter()
        .map(|&ptr| unsafe { CStr::from_ptr(ptr) })
        .map(|name| FeatureRequest::owned(name.to_string_lossy(), true))
        .collect())
}

/// Engine-side instance extension table for this platform
pub fn engine_extensions(enable_validation: bool) -> Vec<FeatureRequest> {
    let mut requests = INSTANCE_EXTENSIONS.to_vec();
    if enable_validation {
        requests.push(FeatureRequest::optional(DEBUG_UTILS_EXTENSION));
    }
    requests
}

pub fn create_instance(
    entry: Entry,
    settings: &InstanceSettings,
    window_extensions: &[FeatureRequest],
) -> BootstrapResult<VulkanInstance> {
    log::info!("Creating Vulkan instance: {}", settings.app_name);

    let available_layers = unsafe { entry.enumerate_instance_layer_properties() }
        .map_err(BootstrapError::vulkan("vkEnumerateInstanceLayerProperties"))?;
    let available_layers = feature::names_from_layers(&available_layers);
    log::debug!("Instance layers: {:?}", available_layers);

    let available_extensions = unsafe { entry.enumerate_instance_extension_properties(None) }
        .map_err(BootstrapError::vulkan("vkEnumerateInstanceExtensionProperties"))?;
    let available_extensions = feature::names_from_extensions(&available_extensions);
    log::debug!("Instance extensions: {:?}", available_extensions);

    let enabled_layers = if settings.enable_validation {
        feature::negotiate("Instance Layers", false, &available_layers, INSTANCE_LAYERS)?
    } else {
        Vec::new()
    };

    let requested_extensions = feature::merge_requests(&engine_extensions(settings.enable_validation), window_extensions);
    let enabled_extensions = feature::negotiate("Instance Extensions", true, &available_extensions, &requested_extensions)?;

    let layer_names = feature::to_cstrings(&enabled_layers)?;
    let extension_names = feature::to_cstrings(&enabled_extensions)?;
    let layer_ptrs: Vec<_> = layer_names.iter().map(|name| name.as_ptr()).collect();
    let extension_ptrs: Vec<_> = extension_names.iter().map(|name| name.as_ptr()).collect();

    let app_name = CString::new(settings.app_name.as_str())
        .map_err(|_| BootstrapError::InvalidName(settings.app_name.clone()))?;
    let engine_name = CString::new(settings.engine_name.as_str())
        .map_err(|_| BootstrapError::InvalidName(settings.engine_name.clone()))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(settings.app_version)
        .engine_name(&engine_name)
        .engine_version(settings.engine_version)
        .api_version(vk::API_VERSION_1_3);

    let flags = if enabled_extensions.iter().any(|name| name == PORTABILITY_ENUMERATION_EXTENSION) {
        vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
    } else {
        vk::InstanceCreateFlags::empty()
    };

    let debug_enabled = settings.enable_validation && enabled_extensions.iter().any(|name| name == DEBUG_UTILS_EXTENSION);
    let mut debug_info = debug_messenger_info();

    let mut create_info = vk::InstanceCreateInfo::default()
        .flags(flags)
        .application_info(&app_info)
        .enabled_layer_names(&layer_ptrs)
        .enabled_extension_names(&extension_ptrs);

    // Chained so errors raised by vkCreateInstance itself are reported too
    if debug_enabled {
        create_info = create_info.push_next(&mut debug_info);
    }

    let instance = unsafe { entry.create_instance(&create_info, None) }
        .map_err(BootstrapError::vulkan("vkCreateInstance"))?;
    log::trace!("VkInstance: {:?}", instance.handle());

    let debug_utils = if debug_enabled {
        let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
        match unsafe { loader.create_debug_utils_messenger(&debug_messenger_info(), None) } {
            Ok(messenger) => Some((loader, messenger)),
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(BootstrapError::Vulkan {
                    context: "vkCreateDebugUtilsMessengerEXT",
                    result: e,
                });
            }
        }
    } else {
        None
    };

    log::info!(
        "Vulkan instance created ({} layer(s), {} extension(s), validation {})",
        enabled_layers.len(),
        enabled_extensions.len(),
        if debug_utils.is_some() { "on" } else { "off" }
    );

    Ok(VulkanInstance {
        instance,
        debug_utils,
        enabled_layers,
        enabled_extensions,
        entry,
    })
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

/// Map a validation message to the log level it is reported at, if any
pub fn classify_message(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
) -> Option<log::Level> {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Some(log::Level::Error)
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING)
        || message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE)
    {
        Some(log::Level::Warn)
    } else {
        None
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let Some(level) = classify_message(message_severity, message_type) else {
        return vk::FALSE;
    };

    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);
    log::log!(level, "[Vulkan] {}", message.to_string_lossy());

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_error() {
        let level = classify_message(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
        );
        assert_eq!(level, Some(log::Level::Error));
    }

    #[test]
    fn warnings_and_performance_map_to_warn() {
        let warning = classify_message(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
        );
        let performance = classify_message(
            vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        );
        assert_eq!(warning, Some(log::Level::Warn));
        assert_eq!(performance, Some(log::Level::Warn));
    }

    #[test]
    fn info_and_verbose_are_ignored() {
        for severity in [
            vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
        ] {
            assert_eq!(classify_message(severity, vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION), None);
        }
    }

    #[test]
    fn debug_utils_only_requested_when_validating() {
        let with = engine_extensions(true);
        let without = engine_extensions(false);

        assert!(with.iter().any(|r| r.name == DEBUG_UTILS_EXTENSION && !r.mandatory));
        assert!(!without.iter().any(|r| r.name == DEBUG_UTILS_EXTENSION));
        assert!(without.iter().any(|r| r.name == "VK_KHR_surface" && r.mandatory));
    }

    #[test]
    fn merged_extension_list_has_no_duplicates() {
        let window = [
            FeatureRequest::required("VK_KHR_surface"),
            FeatureRequest::required("VK_KHR_surface"),
        ];
        let merged = feature::merge_requests(&engine_extensions(true), &window);

        let surface_count = merged.iter().filter(|r| r.name == "VK_KHR_surface").count();
        assert_eq!(surface_count, 1);
    }

    #[test]
    fn window_surface_extension_stays_mandatory_after_merge() {
        let window = [FeatureRequest::required("VK_KHR_xcb_surface")];
        let merged = feature::merge_requests(&engine_extensions(false), &window);

        let xcb = merged.iter().find(|r| r.name == "VK_KHR_xcb_surface").unwrap();
        assert!(xcb.mandatory);

        let err = feature::negotiate("Instance Extensions", true, &["VK_KHR_surface"], &merged).unwrap_err();
        assert!(matches!(err, BootstrapError::MissingFeature { ref name, .. } if name == "VK_KHR_xcb_surface"));
    }
}
