// =============================================================================
// VULKAN BRING-UP - Device setup smoke test
// =============================================================================
//
// Opens a window, walks the whole bring-up chain against it and reports what
// was selected:
//
// 1. Load Vulkan, negotiate layers/extensions, create the instance
// 2. Bind a surface to the window
// 3. Score physical devices and pick graphic/present queue families
// 4. Create the logical device and fetch its queues
// 5. Drain every queue, destroy the device
//
// The rendering context stays alive until the window is closed.
//
// =============================================================================

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use vk_bringup::backend::{context, physical, Bootstrap, RenderingContext};
use vk_bringup::Config;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    // Initialize logging
    init_logging(&config);
    log::info!("Starting Vulkan bring-up");
    log::info!(
        "Requesting {} graphic / {} present queue(s)",
        config.device.graphic_queue_count,
        config.device.present_queue_count
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Initialize logging with optional file output
fn init_logging(config: &Config) {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();
    builder.init();

    // Create/clear log file if enabled
    if config.debug.log_to_file {
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            let _ = writeln!(file, "=== Vulkan Bring-up Log ===");
            let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
            let _ = writeln!(file);
        }
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// IMPORTANT: Field order matters for Drop! The context owns the surface,
/// which must go before the window it was created from.
struct App {
    config: Config,
    context: Option<RenderingContext>,
    window: Option<Arc<Window>>,
    /// First fatal bring-up error, returned from `main`
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            context: None,
            window: None,
            failure: None,
        }
    }

    /// Instance -> surface -> physical device, in that order
    fn init_vulkan(&mut self, window: &Window) -> Result<()> {
        log::info!("Initializing Vulkan...");

        let window_extensions = context::window_extensions(Some(window))
            .context("Failed to query window-system extensions")?;

        let rendering_context = Bootstrap::new(self.config.instance_settings())?
            .create_instance(&window_extensions)
            .context("Failed to create Vulkan instance")?
            .create_surface(Some(window))
            .context("Failed to create window surface")?
            .select_physical_device()
            .context("Failed to select a physical device")?;

        if !rendering_context.is_qualified() {
            log::warn!("Selected device may not be able to render to this window");
        }

        let properties = rendering_context.properties();
        log::info!(
            "Selected GPU: {} (device {})",
            physical::device_name(properties),
            rendering_context.device_index()
        );
        log::info!(
            "API Version: {}.{}.{}",
            ash::vk::api_version_major(properties.api_version),
            ash::vk::api_version_minor(properties.api_version),
            ash::vk::api_version_patch(properties.api_version)
        );

        Self::exercise_device(&rendering_context, &self.config)?;

        self.context = Some(rendering_context);
        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    /// Create the logical device, report its queues and drain them.
    ///
    /// The device borrows the context, so it is scoped to this call.
    fn exercise_device(rendering_context: &RenderingContext, config: &Config) -> Result<()> {
        let device = rendering_context
            .create_device(
                config.device.graphic_queue_count,
                config.device.present_queue_count,
                &config.device_settings(),
            )
            .context("Failed to create logical device")?;

        for queue in device.graphic_queues().iter().chain(device.present_queues()) {
            log::info!(
                "Queue {} - {} (present: {})",
                queue.family_index(),
                queue.index(),
                queue.can_present()
            );
            queue.wait_idle().context("Queue wait failed")?;
        }

        device.wait_idle().context("Device wait failed")?;
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = WindowAttributes::default()
            .with_title(self.config.window.title.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                self.failure = Some(e.into());
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_vulkan(&window) {
            log::error!("Failed to initialize Vulkan: {:?}", e);
            self.failure = Some(e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        if let WindowEvent::CloseRequested = event {
            log::info!("Close requested, shutting down...");
            self.context = None;
            self.window = None;
            event_loop.exit();
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        self.context = None;
        self.window = None;
        log::info!("Cleanup complete");
    }
}
