// Surface binding
//
// The window collaborator only has to hand over native display/window
// handles. Anything that implements raw-window-handle's traits (a winit
// window, for example) qualifies.

use ash::vk;
use raw_window_handle::{HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};

use super::error::{BootstrapError, BootstrapResult};
use super::instance::VulkanInstance;

/// A window that can produce native handles for surface creation
pub trait NativeSurfaceSource {
    fn native_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle), HandleError>;
}

impl<T: HasWindowHandle + HasDisplayHandle + ?Sized> NativeSurfaceSource for T {
    fn native_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle), HandleError> {
        let display = self.display_handle()?.as_raw();
        let window = self.window_handle()?.as_raw();
        Ok((display, window))
    }
}

/// Whether the compiled-in platform branch can build a surface for `handle`
pub fn platform_supports(handle: &RawWindowHandle) -> bool {
    #[cfg(target_os = "windows")]
    {
        matches!(handle, RawWindowHandle::Win32(_))
    }

    #[cfg(target_os = "macos")]
    {
        matches!(handle, RawWindowHandle::AppKit(_))
    }

    #[cfg(all(unix, not(any(target_os = "macos", target_os = "ios"))))]
    {
        matches!(
            handle,
            RawWindowHandle::Xlib(_) | RawWindowHandle::Xcb(_) | RawWindowHandle::Wayland(_)
        )
    }
}

/// Resolve the native handles of `window`, checking it against the platform
pub fn resolve_handles(window: Option<&dyn NativeSurfaceSource>) -> BootstrapResult<(RawDisplayHandle, RawWindowHandle)> {
    let Some(window) = window else {
        log::error!("Must supply a window before creating a surface");
        return Err(BootstrapError::WindowMissing);
    };

    let (display, handle) = window.native_handles().map_err(|e| {
        log::error!("Window does not expose native handles: {}", e);
        BootstrapError::IncompatibleWindow(e.to_string())
    })?;

    if !platform_supports(&handle) {
        log::error!("Window handle {:?} is not supported on this platform", handle);
        return Err(BootstrapError::IncompatibleWindow(format!("{handle:?}")));
    }

    Ok((display, handle))
}

/// Presentable surface bound to a window
pub struct VulkanSurface {
    pub surface: vk::SurfaceKHR,
    pub loader: ash::khr::surface::Instance,
}

impl Drop for VulkanSurface {
    fn drop(&mut self) {
        log::debug!("Destroying surface");
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

pub fn create_surface(
    instance: &VulkanInstance,
    window: Option<&dyn NativeSurfaceSource>,
) -> BootstrapResult<VulkanSurface> {
    let (display, handle) = resolve_handles(window)?;

    let surface = unsafe {
        ash_window::create_surface(&instance.entry, &instance.instance, display, handle, None)
    }
    .map_err(BootstrapError::vulkan("vkCreate*SurfaceKHR"))?;
    log::trace!("VkSurfaceKHR: {:?}", surface);

    let loader = ash::khr::surface::Instance::new(&instance.entry, &instance.instance);
    Ok(VulkanSurface { surface, loader })
}
