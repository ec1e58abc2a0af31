// Window surface and instance-level extension loaders
//
// Extension entry points are loaded once, right after the instance exists,
// and looked up by extension name afterwards. Asking for a loader whose
// extension was never enabled is a `MissingCapability` error.

use super::device::InstanceContext;
use super::error::{RenderResult, RendererError};
use super::owner::{owned, ResourceOwner};
use ash::extensions::{ext, khr};
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{CStr, CString};
use std::sync::Arc;

#[derive(Default)]
pub struct InstanceLoaders {
    enabled: Vec<CString>,
    surface: Option<khr::Surface>,
    debug_utils: Option<ext::DebugUtils>,
}

impl InstanceLoaders {
    pub fn load(entry: &Entry, instance: &ash::Instance, enabled: &[CString]) -> Self {
        let mut loaders = Self {
            enabled: enabled.to_vec(),
            ..Default::default()
        };

        if loaders.is_enabled(khr::Surface::name()) {
            loaders.surface = Some(khr::Surface::new(entry, instance));
        }
        if loaders.is_enabled(ext::DebugUtils::name()) {
            loaders.debug_utils = Some(ext::DebugUtils::new(entry, instance));
        }

        log::debug!("Loaded entry points for {} instance extensions", loaders.enabled.len());
        loaders
    }

    pub fn is_enabled(&self, name: &CStr) -> bool {
        self.enabled.iter().any(|e| e.as_c_str() == name)
    }

    pub fn surface(&self) -> RenderResult<&khr::Surface> {
        lookup(&self.surface, khr::Surface::name())
    }

    pub fn debug_utils(&self) -> RenderResult<&ext::DebugUtils> {
        lookup(&self.debug_utils, ext::DebugUtils::name())
    }
}

fn lookup<'a, L>(slot: &'a Option<L>, name: &CStr) -> RenderResult<&'a L> {
    slot.as_ref()
        .ok_or_else(|| RendererError::missing("instance extension", name.to_string_lossy()))
}

/// Instance extensions the window system needs to present to `display`.
pub fn required_instance_extensions(display: RawDisplayHandle) -> RenderResult<Vec<CString>> {
    let names = ash_window::enumerate_required_extensions(display)
        .map_err(RendererError::query("vkEnumerateRequiredExtensions"))?;

    Ok(names
        .iter()
        .map(|&ptr| unsafe { CStr::from_ptr(ptr) }.to_owned())
        .collect())
}

/// Creates a presentable surface for the window. The surface keeps the
/// instance alive and is destroyed through the surface loader.
pub fn create_surface(
    instance: &Arc<InstanceContext>,
    display: RawDisplayHandle,
    window: RawWindowHandle,
) -> RenderResult<ResourceOwner<vk::SurfaceKHR>> {
    let surface_loader = instance.loaders.surface()?.clone();

    let surface = unsafe {
        ash_window::create_surface(&instance.entry, &instance.instance, display, window, None)
    }
    .map_err(RendererError::SurfaceCreationFailed)?;

    log::info!("Created window surface");
    Ok(owned(instance, surface, move |_: &InstanceContext, surface| unsafe {
        surface_loader.destroy_surface(surface, None);
    }))
}
