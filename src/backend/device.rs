// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation after checking layers and extensions are available
// - Physical device selection (first suitable device, no scoring)
// - Logical device + graphics/present queue creation
//
// `InstanceContext` and `DeviceContext` are the parents in the ownership
// graph: every child handle keeps an `Arc` to one of them, so the device is
// destroyed after its children and the instance after the device.

use super::capability::{self, CapabilityProbe, DeviceCandidate, DeviceRequirements};
use super::error::{RenderResult, RendererError};
use super::surface::InstanceLoaders;
use ash::extensions::{ext, khr};
use ash::{vk, Entry};
use std::collections::BTreeSet;
use std::ffi::CString;
use std::os::raw::c_char;
use std::sync::Arc;

/// Instance-level configuration resolved at startup.
#[derive(Debug, Clone, Default)]
pub struct InstanceRequirements {
    /// Extensions the window system needs for presentation.
    pub extensions: Vec<CString>,
    /// Validation layers; empty when validation is disabled.
    pub layers: Vec<CString>,
    /// Append `VK_EXT_debug_utils` so the diagnostics callback can be set up.
    pub debug_utils: bool,
}

impl InstanceRequirements {
    pub fn enabled_extensions(&self) -> Vec<CString> {
        let mut extensions = self.extensions.clone();
        let debug_utils = ext::DebugUtils::name();
        if self.debug_utils && !extensions.iter().any(|e| e.as_c_str() == debug_utils) {
            extensions.push(debug_utils.to_owned());
        }
        extensions
    }
}

pub struct InstanceContext {
    pub loaders: InstanceLoaders,
    pub instance: ash::Instance,
    pub entry: Entry,
    /// Layers enabled on the instance, repeated on the logical device.
    pub layers: Vec<CString>,
}

impl InstanceContext {
    pub fn new(app_name: &str, requirements: &InstanceRequirements) -> RenderResult<Arc<Self>> {
        log::info!("Creating Vulkan instance: {}", app_name);

        let entry = unsafe { Entry::load() }
            .map_err(|e| RendererError::LoaderUnavailable(e.to_string()))?;

        let available_layers = capability::instance_layers(&entry)?;
        log::debug!("Available instance layers: {:?}", available_layers);
        capability::require_all("layer", &requirements.layers, &available_layers)?;

        let extensions = requirements.enabled_extensions();
        let available_extensions = capability::instance_extensions(&entry)?;
        log::debug!("Available instance extensions: {:?}", available_extensions);
        capability::require_all("instance extension", &extensions, &available_extensions)?;

        let app_name_cstr = CString::new(app_name).unwrap_or_else(|_| CString::from(c"Vulkan"));
        let engine_name = c"Triangle Renderer";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_ptrs = as_ptrs(&extensions);
        let layer_ptrs = as_ptrs(&requirements.layers);

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(RendererError::InstanceCreationFailed)?;

        let loaders = InstanceLoaders::load(&entry, &instance, &extensions);

        Ok(Arc::new(Self {
            loaders,
            instance,
            entry,
            layers: requirements.layers.clone(),
        }))
    }
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");
        unsafe { self.instance.destroy_instance(None) };
    }
}

/// First candidate, in enumeration order, that meets every requirement.
/// Candidates are pulled one at a time; nothing after the chosen one is
/// evaluated, so a later device's query failure cannot affect the pick.
pub fn select_first_suitable(
    candidates: impl IntoIterator<Item = RenderResult<DeviceCandidate>>,
    requirements: &DeviceRequirements,
) -> RenderResult<DeviceCandidate> {
    for candidate in candidates {
        let candidate = candidate?;
        if candidate.is_suitable(requirements) {
            return Ok(candidate);
        }
        log::debug!(
            "Skipping {}: {}",
            candidate.name(),
            candidate.unmet_requirements(requirements).join(", ")
        );
    }
    Err(RendererError::NoSuitableGpu)
}

/// Walks the physical devices visible through a probe and picks one.
pub struct DeviceSelector<'a> {
    probe: CapabilityProbe<'a>,
    requirements: &'a DeviceRequirements,
}

impl<'a> DeviceSelector<'a> {
    pub fn new(probe: CapabilityProbe<'a>, requirements: &'a DeviceRequirements) -> Self {
        Self { probe, requirements }
    }

    pub fn select(&self) -> RenderResult<DeviceCandidate> {
        let devices = self.probe.physical_devices()?;
        for &device in &devices {
            log_device(&self.probe.properties(device));
        }

        let candidates = devices
            .iter()
            .map(|&device| self.probe.candidate(device, self.requirements));
        let chosen = select_first_suitable(candidates, self.requirements)?;
        log::info!("Selected GPU: {}", chosen.name());
        Ok(chosen)
    }
}

fn log_device(props: &vk::PhysicalDeviceProperties) {
    log::info!(
        "[{}] {:?}, API {}.{}.{}, driver {:08x}, vendor {:04x}",
        capability::name_from_raw(&props.device_name),
        props.device_type,
        vk::api_version_major(props.api_version),
        vk::api_version_minor(props.api_version),
        vk::api_version_patch(props.api_version),
        props.driver_version,
        props.vendor_id,
    );
}

/// One queue per distinct family, priority 1.0.
pub fn queue_create_infos(
    families: &BTreeSet<u32>,
    priorities: &[f32],
) -> Vec<vk::DeviceQueueCreateInfo> {
    families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(priorities)
                .build()
        })
        .collect()
}

pub struct DeviceContext {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub swapchain_loader: khr::Swapchain,

    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue: vk::Queue,
    pub present_queue_family: u32,

    pub properties: vk::PhysicalDeviceProperties,
    pub instance: Arc<InstanceContext>,
}

impl DeviceContext {
    pub fn new(
        instance: Arc<InstanceContext>,
        candidate: &DeviceCandidate,
        requirements: &DeviceRequirements,
    ) -> RenderResult<Arc<Self>> {
        let (graphics_queue_family, present_queue_family) =
            candidate.queue_families.pair().ok_or(RendererError::NoSuitableGpu)?;

        let priorities = [1.0];
        let queue_infos = queue_create_infos(&candidate.queue_families.unique(), &priorities);

        let extension_ptrs = as_ptrs(&requirements.extensions);
        let layer_ptrs = as_ptrs(&instance.layers);
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .instance
                .create_device(candidate.physical_device, &create_info, None)
        }
        .map_err(RendererError::DeviceCreationFailed)?;

        // Same handle twice when both roles share a family.
        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_queue_family, 0) };

        let swapchain_loader = khr::Swapchain::new(&instance.instance, &device);

        log::info!(
            "Created logical device (graphics family {}, present family {})",
            graphics_queue_family,
            present_queue_family
        );

        Ok(Arc::new(Self {
            device,
            physical_device: candidate.physical_device,
            swapchain_loader,
            graphics_queue,
            graphics_queue_family,
            present_queue,
            present_queue_family,
            properties: candidate.properties,
            instance,
        }))
    }

    /// Blocks until every queue on the device is idle.
    pub fn wait_idle(&self) -> RenderResult<()> {
        unsafe { self.device.device_wait_idle() }
            .map_err(RendererError::query("vkDeviceWaitIdle"))
    }

    pub fn name(&self) -> String {
        capability::name_from_raw(&self.properties.device_name)
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");
        unsafe { self.device.destroy_device(None) };
    }
}

fn as_ptrs(names: &[CString]) -> Vec<*const c_char> {
    names.iter().map(|n| n.as_ptr()).collect()
}
