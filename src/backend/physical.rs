// Physical device selection
//
// Scores every enumerated GPU by device class and surface format support,
// discovers graphic and present queue families, and keeps the first
// candidate at the highest score that resolved both families.

use ash::vk;

use super::error::{BootstrapError, BootstrapResult};
use super::surface::VulkanSurface;

const PREFERRED_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;
const PREFERRED_COLOR_SPACE: vk::ColorSpaceKHR = vk::ColorSpaceKHR::SRGB_NONLINEAR;
const PREFERRED_FORMAT_BONUS: u32 = 10;

/// A queue family slot; `family_index == -1` means not found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub family_index: i32,
    pub queue_count: u32,
}

impl Default for QueueFamilyInfo {
    fn default() -> Self {
        Self {
            family_index: -1,
            queue_count: 0,
        }
    }
}

impl QueueFamilyInfo {
    pub fn is_found(&self) -> bool {
        self.family_index >= 0
    }

    /// Vulkan family index, `None` while unassigned
    pub fn index(&self) -> Option<u32> {
        u32::try_from(self.family_index).ok()
    }

    /// Both slots are assigned and point at the same family
    pub fn shares_family_with(&self, other: &QueueFamilyInfo) -> bool {
        self.is_found() && self.family_index == other.family_index
    }
}

/// Runtime queries the selector needs, one implementation per backend
pub trait AdapterProbe {
    type Adapter: Copy;

    fn enumerate(&self) -> BootstrapResult<Vec<Self::Adapter>>;
    fn properties(&self, adapter: Self::Adapter) -> vk::PhysicalDeviceProperties;
    fn surface_formats(&self, adapter: Self::Adapter) -> BootstrapResult<Vec<vk::SurfaceFormatKHR>>;
    fn queue_families(&self, adapter: Self::Adapter) -> Vec<vk::QueueFamilyProperties>;
    fn supports_present(&self, adapter: Self::Adapter, family_index: u32) -> BootstrapResult<bool>;
}

/// Probe backed by a live instance and surface
pub struct VulkanProbe<'a> {
    pub instance: &'a ash::Instance,
    pub surface: &'a VulkanSurface,
}

impl AdapterProbe for VulkanProbe<'_> {
    type Adapter = vk::PhysicalDevice;

    fn enumerate(&self) -> BootstrapResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance.enumerate_physical_devices() }
            .map_err(BootstrapError::vulkan("vkEnumeratePhysicalDevices"))
    }

    fn properties(&self, adapter: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        unsafe { self.instance.get_physical_device_properties(adapter) }
    }

    fn surface_formats(&self, adapter: vk::PhysicalDevice) -> BootstrapResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface
                .loader
                .get_physical_device_surface_formats(adapter, self.surface.surface)
        }
        .map_err(BootstrapError::vulkan("vkGetPhysicalDeviceSurfaceFormatsKHR"))
    }

    fn queue_families(&self, adapter: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe { self.instance.get_physical_device_queue_family_properties(adapter) }
    }

    fn supports_present(&self, adapter: vk::PhysicalDevice, family_index: u32) -> BootstrapResult<bool> {
        unsafe {
            self.surface
                .loader
                .get_physical_device_surface_support(adapter, family_index, self.surface.surface)
        }
        .map_err(BootstrapError::vulkan("vkGetPhysicalDeviceSurfaceSupportKHR"))
    }
}

/// Outcome of the selection scan
#[derive(Debug, Clone, Copy)]
pub struct Selection<A> {
    pub adapter: A,
    pub index: usize,
    pub score: u32,
    pub graphic: QueueFamilyInfo,
    pub present: QueueFamilyInfo,
    pub properties: vk::PhysicalDeviceProperties,
    /// False when no candidate resolved both families and index 0 was taken
    pub qualified: bool,
}

pub fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 50,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 40,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 20,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 0,
    }
}

pub fn has_preferred_format(formats: &[vk::SurfaceFormatKHR]) -> bool {
    formats
        .iter()
        .any(|f| f.format == PREFERRED_FORMAT && f.color_space == PREFERRED_COLOR_SPACE)
}

pub fn score_candidate(properties: &vk::PhysicalDeviceProperties, formats: &[vk::SurfaceFormatKHR]) -> u32 {
    let mut score = device_type_score(properties.device_type);
    if has_preferred_format(formats) {
        score += PREFERRED_FORMAT_BONUS;
    }
    score
}

/// First graphics family and first present-capable family, in index order.
///
/// Stops as soon as both are known and live in different families.
pub fn discover_queue_families<P: AdapterProbe>(
    probe: &P,
    adapter: P::Adapter,
) -> BootstrapResult<(QueueFamilyInfo, QueueFamilyInfo)> {
    let mut graphic = QueueFamilyInfo::default();
    let mut present = QueueFamilyInfo::default();

    for (i, family) in probe.queue_families(adapter).iter().enumerate() {
        let index = i as u32;

        if !graphic.is_found() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphic = QueueFamilyInfo {
                family_index: index as i32,
                queue_count: family.queue_count,
            };
        }

        if !present.is_found() && probe.supports_present(adapter, index)? {
            present = QueueFamilyInfo {
                family_index: index as i32,
                queue_count: family.queue_count,
            };
        }

        if graphic.is_found() && present.is_found() && graphic.family_index != present.family_index {
            break;
        }
    }

    Ok((graphic, present))
}

pub fn select_physical_device<P: AdapterProbe>(probe: &P) -> BootstrapResult<Selection<P::Adapter>> {
    let adapters = probe.enumerate()?;
    if adapters.is_empty() {
        log::error!("No Vulkan-capable GPU found");
        return Err(BootstrapError::NoPhysicalDevice);
    }
    log::debug!("Found {} physical device(s)", adapters.len());

    let mut best: Option<Selection<P::Adapter>> = None;
    let mut fallback: Option<Selection<P::Adapter>> = None;
    let mut max_score = 0u32;

    for (index, &adapter) in adapters.iter().enumerate() {
        let properties = probe.properties(adapter);
        log_device_info(index, &properties);

        let formats = probe.surface_formats(adapter)?;
        let score = score_candidate(&properties, &formats);
        log::debug!("\tscore: {}", score);

        let mut candidate = Selection {
            adapter,
            index,
            score,
            graphic: QueueFamilyInfo::default(),
            present: QueueFamilyInfo::default(),
            properties,
            qualified: false,
        };

        if score < max_score {
            continue;
        }

        let (graphic, present) = discover_queue_families(probe, adapter)?;
        candidate.graphic = graphic;
        candidate.present = present;

        if index == 0 {
            fallback = Some(candidate);
        }

        if graphic.is_found() && present.is_found() && (best.is_none() || score > max_score) {
            max_score = score;
            best = Some(Selection {
                qualified: true,
                ..candidate
            });
        }
    }

    let selection = match best {
        Some(selection) => selection,
        None => {
            log::warn!("No physical device resolved both graphic and present queue families, using device 0");
            match fallback {
                Some(selection) => selection,
                None => return Err(BootstrapError::NoPhysicalDevice),
            }
        }
    };

    log::info!(
        "Selected physical device {} (score {}): graphic family {} x{}, present family {} x{}",
        selection.index,
        selection.score,
        selection.graphic.family_index,
        selection.graphic.queue_count,
        selection.present.family_index,
        selection.present.queue_count,
    );

    Ok(selection)
}

pub fn device_name(properties: &vk::PhysicalDeviceProperties) -> String {
    properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".to_string())
}

fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "Other",
    }
}

fn log_device_info(index: usize, properties: &vk::PhysicalDeviceProperties) {
    log::debug!("Physical device {}: {}", index, device_name(properties));
    log::debug!("\ttype: {}", device_type_name(properties.device_type));
    log::debug!("\tvendor id: {:#06x}, device id: {:#06x}", properties.vendor_id, properties.device_id);
    log::debug!(
        "\tdriver version: {}.{}.{}",
        vk::api_version_major(properties.driver_version),
        vk::api_version_minor(properties.driver_version),
        vk::api_version_patch(properties.driver_version)
    );
    log::debug!(
        "\tapi version: {}.{}.{}",
        vk::api_version_major(properties.api_version),
        vk::api_version_minor(properties.api_version),
        vk::api_version_patch(properties.api_version)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeFamily {
        flags: vk::QueueFlags,
        count: u32,
        present: bool,
    }

    struct FakeAdapter {
        device_type: vk::PhysicalDeviceType,
        preferred_format: bool,
        families: Vec<FakeFamily>,
    }

    #[derive(Default)]
    struct FakeProbe {
        adapters: Vec<FakeAdapter>,
        present_queries: Cell<u32>,
    }

    impl AdapterProbe for FakeProbe {
        type Adapter = usize;

        fn enumerate(&self) -> BootstrapResult<Vec<usize>> {
            Ok((0..self.adapters.len()).collect())
        }

        fn properties(&self, adapter: usize) -> vk::PhysicalDeviceProperties {
            vk::PhysicalDeviceProperties {
                device_type: self.adapters[adapter].device_type,
                ..Default::default()
            }
        }

        fn surface_formats(&self, adapter: usize) -> BootstrapResult<Vec<vk::SurfaceFormatKHR>> {
            let format = if self.adapters[adapter].preferred_format {
                vk::Format::B8G8R8A8_UNORM
            } else {
                vk::Format::R8G8B8A8_SRGB
            };
            Ok(vec![vk::SurfaceFormatKHR {
                format,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }])
        }

        fn queue_families(&self, adapter: usize) -> Vec<vk::QueueFamilyProperties> {
            self.adapters[adapter]
                .families
                .iter()
                .map(|f| vk::QueueFamilyProperties {
                    queue_flags: f.flags,
                    queue_count: f.count,
                    ..Default::default()
                })
                .collect()
        }

        fn supports_present(&self, adapter: usize, family_index: u32) -> BootstrapResult<bool> {
            self.present_queries.set(self.present_queries.get() + 1);
            Ok(self.adapters[adapter].families[family_index as usize].present)
        }
    }

    fn family(flags: vk::QueueFlags, count: u32, present: bool) -> FakeFamily {
        FakeFamily { flags, count, present }
    }

    fn adapter(device_type: vk::PhysicalDeviceType, preferred_format: bool, families: Vec<FakeFamily>) -> FakeAdapter {
        FakeAdapter {
            device_type,
            preferred_format,
            families,
        }
    }

    fn renderable() -> Vec<FakeFamily> {
        vec![family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 16, true)]
    }

    fn compute_only() -> Vec<FakeFamily> {
        vec![family(vk::QueueFlags::COMPUTE, 4, false)]
    }

    fn probe(adapters: Vec<FakeAdapter>) -> FakeProbe {
        FakeProbe {
            adapters,
            ..Default::default()
        }
    }

    #[test]
    fn class_scores() {
        assert_eq!(device_type_score(vk::PhysicalDeviceType::DISCRETE_GPU), 50);
        assert_eq!(device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU), 40);
        assert_eq!(device_type_score(vk::PhysicalDeviceType::VIRTUAL_GPU), 20);
        assert_eq!(device_type_score(vk::PhysicalDeviceType::CPU), 10);
        assert_eq!(device_type_score(vk::PhysicalDeviceType::OTHER), 0);
    }

    #[test]
    fn discrete_with_format_beats_integrated_without() {
        let discrete = vk::PhysicalDeviceProperties {
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            ..Default::default()
        };
        let integrated = vk::PhysicalDeviceProperties {
            device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
            ..Default::default()
        };
        let preferred = [vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];

        assert_eq!(score_candidate(&discrete, &preferred), 60);
        assert_eq!(score_candidate(&integrated, &[]), 40);
    }

    #[test]
    fn format_bonus_needs_exact_color_space() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        }];
        assert!(!has_preferred_format(&formats));
    }

    #[test]
    fn only_qualifying_candidate_is_picked() {
        let probe = probe(vec![
            adapter(vk::PhysicalDeviceType::DISCRETE_GPU, true, compute_only()),
            adapter(vk::PhysicalDeviceType::CPU, false, renderable()),
            adapter(vk::PhysicalDeviceType::DISCRETE_GPU, true, compute_only()),
        ]);

        let selection = select_physical_device(&probe).unwrap();
        assert_eq!(selection.index, 1);
        assert_eq!(selection.score, 10);
        assert!(selection.qualified);
    }

    #[test]
    fn second_max_scorer_wins_when_first_is_unusable() {
        let probe = probe(vec![
            adapter(vk::PhysicalDeviceType::DISCRETE_GPU, true, compute_only()),
            adapter(vk::PhysicalDeviceType::INTEGRATED_GPU, false, compute_only()),
            adapter(vk::PhysicalDeviceType::DISCRETE_GPU, true, renderable()),
        ]);

        let selection = select_physical_device(&probe).unwrap();
        assert_eq!(selection.index, 2);
        assert_eq!(selection.score, 60);
    }

    #[test]
    fn first_qualifying_max_scorer_wins_ties() {
        let probe = probe(vec![
            adapter(vk::PhysicalDeviceType::DISCRETE_GPU, true, renderable()),
            adapter(vk::PhysicalDeviceType::DISCRETE_GPU, true, renderable()),
        ]);

        let selection = select_physical_device(&probe).unwrap();
        assert_eq!(selection.index, 0);
    }

    #[test]
    fn higher_score_replaces_earlier_pick() {
        let probe = probe(vec![
            adapter(vk::PhysicalDeviceType::INTEGRATED_GPU, false, renderable()),
            adapter(vk::PhysicalDeviceType::DISCRETE_GPU, false, renderable()),
        ]);

        let selection = select_physical_device(&probe).unwrap();
        assert_eq!(selection.index, 1);
        assert_eq!(selection.score, 50);
    }

    #[test]
    fn lower_scorer_is_pruned_without_queue_scan() {
        let probe = probe(vec![
            adapter(vk::PhysicalDeviceType::DISCRETE_GPU, true, renderable()),
            adapter(vk::PhysicalDeviceType::CPU, false, renderable()),
        ]);

        select_physical_device(&probe).unwrap();
        assert_eq!(probe.present_queries.get(), 1);
    }

    #[test]
    fn falls_back_to_first_device() {
        let probe = probe(vec![
            adapter(vk::PhysicalDeviceType::INTEGRATED_GPU, false, compute_only()),
            adapter(vk::PhysicalDeviceType::DISCRETE_GPU, true, compute_only()),
        ]);

        let selection = select_physical_device(&probe).unwrap();
        assert_eq!(selection.index, 0);
        assert!(!selection.qualified);
        assert!(!selection.graphic.is_found());
    }

    #[test]
    fn no_devices_is_an_error() {
        let probe = probe(Vec::new());
        assert!(matches!(select_physical_device(&probe), Err(BootstrapError::NoPhysicalDevice)));
    }

    #[test]
    fn split_families_are_discovered_in_order() {
        let probe = probe(vec![adapter(
            vk::PhysicalDeviceType::DISCRETE_GPU,
            true,
            vec![
                family(vk::QueueFlags::TRANSFER, 2, false),
                family(vk::QueueFlags::GRAPHICS, 16, false),
                family(vk::QueueFlags::COMPUTE, 8, true),
                family(vk::QueueFlags::GRAPHICS, 4, true),
            ],
        )]);

        let (graphic, present) = discover_queue_families(&probe, 0).unwrap();
        assert_eq!(graphic, QueueFamilyInfo { family_index: 1, queue_count: 16 });
        assert_eq!(present, QueueFamilyInfo { family_index: 2, queue_count: 8 });
        // stopped after family 2
        assert_eq!(probe.present_queries.get(), 3);
    }

    #[test]
    fn shared_family_stops_querying_once_found() {
        let probe = probe(vec![adapter(
            vk::PhysicalDeviceType::DISCRETE_GPU,
            true,
            vec![
                family(vk::QueueFlags::GRAPHICS, 16, true),
                family(vk::QueueFlags::GRAPHICS, 1, true),
            ],
        )]);

        let (graphic, present) = discover_queue_families(&probe, 0).unwrap();
        assert_eq!(graphic.family_index, 0);
        assert_eq!(present.family_index, 0);
        assert_eq!(probe.present_queries.get(), 1);
    }

    #[test]
    fn unassigned_family_has_no_index() {
        let info = QueueFamilyInfo::default();
        assert!(!info.is_found());
        assert_eq!(info.index(), None);
        assert_eq!(QueueFamilyInfo { family_index: 3, queue_count: 1 }.index(), Some(3));
    }

    #[test]
    fn unassigned_families_are_not_shared() {
        let unassigned = QueueFamilyInfo::default();
        let family = QueueFamilyInfo { family_index: 0, queue_count: 4 };

        assert!(!unassigned.shares_family_with(&unassigned));
        assert!(family.shares_family_with(&QueueFamilyInfo { family_index: 0, queue_count: 4 }));
        assert!(!family.shares_family_with(&QueueFamilyInfo { family_index: 1, queue_count: 4 }));
    }
}
