// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;

use crate::backend::{DeviceSettings, FeatureRequest, InstanceSettings};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub application: ApplicationConfig,
    pub window: WindowConfig,
    pub debug: DebugConfig,
    pub device: DeviceConfig,
}

/// Application and engine identity reported to the driver
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,
    pub version: [u32; 3],
    pub engine_name: String,
    pub engine_version: [u32; 3],
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "vk-bringup".to_string(),
            version: [0, 1, 0],
            engine_name: "vk-bringup".to_string(),
            engine_version: [0, 1, 0],
        }
    }
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Bring-up".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "vulkan_debug.log".to_string(),
        }
    }
}

/// One extra device extension; `mandatory` defaults to false
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ExtensionEntry {
    pub name: String,
    #[serde(default)]
    pub mandatory: bool,
}

/// Logical device settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub graphic_queue_count: u32,
    pub present_queue_count: u32,
    pub graphic_priority: f32,
    pub present_priority: f32,
    pub extra_extensions: Vec<ExtensionEntry>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            graphic_queue_count: 1,
            present_queue_count: 1,
            graphic_priority: 0.0,
            present_priority: 1.0,
            extra_extensions: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validation is only ever enabled in debug builds
    pub fn instance_settings(&self) -> InstanceSettings {
        let [major, minor, patch] = self.application.version;
        let [engine_major, engine_minor, engine_patch] = self.application.engine_version;
        InstanceSettings {
            app_name: self.application.name.clone(),
            app_version: vk::make_api_version(0, major, minor, patch),
            engine_name: self.application.engine_name.clone(),
            engine_version: vk::make_api_version(0, engine_major, engine_minor, engine_patch),
            enable_validation: cfg!(debug_assertions) && self.debug.validation_layers,
        }
    }

    pub fn device_settings(&self) -> DeviceSettings {
        DeviceSettings {
            extra_extensions: self
                .device
                .extra_extensions
                .iter()
                .map(|ext| FeatureRequest::owned(ext.name.clone(), ext.mandatory))
                .collect(),
            graphic_priority: self.device.graphic_priority,
            present_priority: self.device.present_priority,
        }
    }
}
