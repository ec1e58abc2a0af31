// Capability probing
//
// Enumerates what the Vulkan loader and each physical device offer:
// layers, extensions, queue families and surface support. The decision
// helpers here work on plain data so the selection rules can be checked
// without a GPU.

use super::error::{RenderResult, RendererError};
use ash::extensions::khr;
use ash::{vk, Entry};
use std::collections::BTreeSet;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// What a physical device must offer to be picked.
#[derive(Debug, Clone)]
pub struct DeviceRequirements {
    pub extensions: Vec<CString>,
    pub require_discrete_gpu: bool,
    /// Nothing in the triangle pipeline uses geometry shaders; kept as a
    /// switch so hardware without them can still be selected.
    pub require_geometry_shader: bool,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self {
            extensions: vec![khr::Swapchain::name().to_owned()],
            require_discrete_gpu: true,
            require_geometry_shader: true,
        }
    }
}

/// Converts a fixed-size, NUL-terminated name array from a Vulkan property
/// struct into an owned string.
pub fn name_from_raw(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Names from `required` that do not appear in `available`.
pub fn missing_names<'a>(required: &'a [CString], available: &[String]) -> Vec<&'a CStr> {
    required
        .iter()
        .filter(|name| {
            let name = name.to_string_lossy();
            !available.iter().any(|a| *a == name)
        })
        .map(CString::as_c_str)
        .collect()
}

/// Fails with `MissingCapability` on the first required name that is not
/// available.
pub fn require_all(
    kind: &'static str,
    required: &[CString],
    available: &[String],
) -> RenderResult<()> {
    match missing_names(required, available).first() {
        Some(name) => Err(RendererError::missing(kind, name.to_string_lossy())),
        None => Ok(()),
    }
}

pub fn instance_layers(entry: &Entry) -> RenderResult<Vec<String>> {
    let layers = entry
        .enumerate_instance_layer_properties()
        .map_err(RendererError::query("vkEnumerateInstanceLayerProperties"))?;
    Ok(layers.iter().map(|l| name_from_raw(&l.layer_name)).collect())
}

pub fn instance_extensions(entry: &Entry) -> RenderResult<Vec<String>> {
    let extensions = entry
        .enumerate_instance_extension_properties(None)
        .map_err(RendererError::query("vkEnumerateInstanceExtensionProperties"))?;
    Ok(extensions
        .iter()
        .map(|e| name_from_raw(&e.extension_name))
        .collect())
}

/// First graphics-capable and first present-capable queue family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Resolves both indices independently. `supports_present` is only
    /// asked while no present family has been found yet.
    pub fn resolve(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> RenderResult<bool>,
    ) -> RenderResult<Self> {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            if family.queue_count == 0 {
                continue;
            }
            if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }
            if indices.present.is_none() && supports_present(index)? {
                indices.present = Some(index);
            }
            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// `(graphics, present)` once both are known.
    pub fn pair(&self) -> Option<(u32, u32)> {
        Some((self.graphics?, self.present?))
    }

    /// Distinct family indices, one queue is requested per entry.
    pub fn unique(&self) -> BTreeSet<u32> {
        self.graphics.into_iter().chain(self.present).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Everything the selector needs to judge one physical device.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub queue_families: QueueFamilyIndices,
    pub extensions_supported: bool,
    /// Only probed when the required extensions are present.
    pub swapchain_support: Option<SwapchainSupport>,
}

impl DeviceCandidate {
    pub fn evaluate(
        physical_device: vk::PhysicalDevice,
        properties: vk::PhysicalDeviceProperties,
        features: vk::PhysicalDeviceFeatures,
        queue_families: QueueFamilyIndices,
        available_extensions: &[String],
        requirements: &DeviceRequirements,
        probe_swapchain: impl FnOnce() -> RenderResult<SwapchainSupport>,
    ) -> RenderResult<Self> {
        let extensions_supported = missing_names(&requirements.extensions, available_extensions).is_empty();
        let swapchain_support = if extensions_supported {
            Some(probe_swapchain()?)
        } else {
            None
        };

        Ok(Self {
            physical_device,
            properties,
            features,
            queue_families,
            extensions_supported,
            swapchain_support,
        })
    }

    pub fn name(&self) -> String {
        name_from_raw(&self.properties.device_name)
    }

    /// Suitability clauses this device fails. Empty means suitable.
    pub fn unmet_requirements(&self, requirements: &DeviceRequirements) -> Vec<&'static str> {
        let mut unmet = Vec::new();

        if requirements.require_discrete_gpu
            && self.properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU
        {
            unmet.push("not a discrete GPU");
        }
        if !self.extensions_supported {
            unmet.push("missing required device extensions");
        }
        if requirements.require_geometry_shader && self.features.geometry_shader != vk::TRUE {
            unmet.push("no geometry shader support");
        }
        if !self.queue_families.is_complete() {
            unmet.push("no graphics or present queue family");
        }
        let swapchain_ok = self
            .swapchain_support
            .as_ref()
            .is_some_and(SwapchainSupport::is_adequate);
        if !swapchain_ok {
            unmet.push("no surface formats or present modes");
        }

        unmet
    }

    pub fn is_suitable(&self, requirements: &DeviceRequirements) -> bool {
        self.unmet_requirements(requirements).is_empty()
    }
}

/// Queries bound to one instance and one target surface.
pub struct CapabilityProbe<'a> {
    instance: &'a ash::Instance,
    surface_loader: &'a khr::Surface,
    surface: vk::SurfaceKHR,
}

impl<'a> CapabilityProbe<'a> {
    pub fn new(
        instance: &'a ash::Instance,
        surface_loader: &'a khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Self {
        Self { instance, surface_loader, surface }
    }

    pub fn physical_devices(&self) -> RenderResult<Vec<vk::PhysicalDevice>> {
        let devices = unsafe { self.instance.enumerate_physical_devices() }
            .map_err(RendererError::query("vkEnumeratePhysicalDevices"))?;
        if devices.is_empty() {
            return Err(RendererError::NoGpuFound);
        }
        Ok(devices)
    }

    pub fn properties(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        unsafe { self.instance.get_physical_device_properties(device) }
    }

    pub fn device_extensions(&self, device: vk::PhysicalDevice) -> RenderResult<Vec<String>> {
        let extensions = unsafe { self.instance.enumerate_device_extension_properties(device) }
            .map_err(RendererError::query("vkEnumerateDeviceExtensionProperties"))?;
        Ok(extensions
            .iter()
            .map(|e| name_from_raw(&e.extension_name))
            .collect())
    }

    pub fn queue_families(&self, device: vk::PhysicalDevice) -> RenderResult<QueueFamilyIndices> {
        let families = unsafe {
            self.instance
                .get_physical_device_queue_family_properties(device)
        };
        QueueFamilyIndices::resolve(&families, |index| unsafe {
            self.surface_loader
                .get_physical_device_surface_support(device, index, self.surface)
                .map_err(RendererError::query("vkGetPhysicalDeviceSurfaceSupportKHR"))
        })
    }

    pub fn swapchain_support(&self, device: vk::PhysicalDevice) -> RenderResult<SwapchainSupport> {
        unsafe {
            let capabilities = self
                .surface_loader
                .get_physical_device_surface_capabilities(device, self.surface)
                .map_err(RendererError::query("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))?;
            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(device, self.surface)
                .map_err(RendererError::query("vkGetPhysicalDeviceSurfaceFormatsKHR"))?;
            let present_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(device, self.surface)
                .map_err(RendererError::query("vkGetPhysicalDeviceSurfacePresentModesKHR"))?;

            Ok(SwapchainSupport { capabilities, formats, present_modes })
        }
    }

    pub fn candidate(
        &self,
        device: vk::PhysicalDevice,
        requirements: &DeviceRequirements,
    ) -> RenderResult<DeviceCandidate> {
        let properties = self.properties(device);
        let features = unsafe { self.instance.get_physical_device_features(device) };
        let queue_families = self.queue_families(device)?;
        let extensions = self.device_extensions(device)?;
        log::debug!(
            "{}: {} device extensions available",
            name_from_raw(&properties.device_name),
            extensions.len()
        );

        DeviceCandidate::evaluate(
            device,
            properties,
            features,
            queue_families,
            &extensions,
            requirements,
            || self.swapchain_support(device),
        )
    }
}
