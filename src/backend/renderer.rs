// Renderer - setup sequence and frame entry point
//
// Builds the whole object graph in creation order and keeps it in fields
// declared in reverse order, so dropping the renderer tears everything down
// children-first: semaphores, command pool, framebuffers, pipeline, render
// pass, image views, swapchain, device, messenger, surface, instance.

use super::capability::{CapabilityProbe, DeviceRequirements};
use super::debug;
use super::device::{DeviceContext, DeviceSelector, InstanceContext, InstanceRequirements};
use super::error::{RenderResult, RendererError};
use super::frame::{FrameScheduler, VulkanFrame};
use super::owner::ResourceOwner;
use super::pipeline::{PipelineSettings, PresentationPipeline};
use super::surface;
use super::swapchain::Swapchain;
use super::sync::SyncObjects;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::CString;
use std::sync::Arc;

/// Everything the renderer takes from configuration.
#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub app_name: String,
    /// Empty disables validation and the debug messenger.
    pub validation_layers: Vec<CString>,
    pub device: DeviceRequirements,
    pub pipeline: PipelineSettings,
}

pub struct Renderer {
    scheduler: FrameScheduler,
    sync: SyncObjects,
    presentation: PresentationPipeline,
    swapchain: Swapchain,
    device: Arc<DeviceContext>,
    _messenger: ResourceOwner<vk::DebugUtilsMessengerEXT>,
    _surface: ResourceOwner<vk::SurfaceKHR>,
    _instance: Arc<InstanceContext>,
}

impl Renderer {
    pub fn new(
        settings: &RendererSettings,
        display: RawDisplayHandle,
        window: RawWindowHandle,
        window_extent: vk::Extent2D,
    ) -> RenderResult<Self> {
        let instance_requirements = InstanceRequirements {
            extensions: surface::required_instance_extensions(display)?,
            layers: settings.validation_layers.clone(),
            debug_utils: !settings.validation_layers.is_empty(),
        };
        let instance = InstanceContext::new(&settings.app_name, &instance_requirements)?;

        // Null when validation is off; dropping it then does nothing.
        let messenger = if instance_requirements.debug_utils {
            debug::create_messenger(&instance)?
        } else {
            ResourceOwner::empty()
        };

        let surface = surface::create_surface(&instance, display, window)?;

        let probe = CapabilityProbe::new(
            &instance.instance,
            instance.loaders.surface()?,
            surface.get(),
        );
        let candidate = DeviceSelector::new(probe, &settings.device).select()?;
        let support = candidate
            .swapchain_support
            .as_ref()
            .ok_or(RendererError::NoSuitableGpu)?;

        let device = DeviceContext::new(instance.clone(), &candidate, &settings.device)?;

        let swapchain = Swapchain::new(device.clone(), surface.get(), support, window_extent)?;
        let presentation = PresentationPipeline::new(&device, &swapchain, &settings.pipeline)?;
        let sync = SyncObjects::new(&device)?;

        log::info!("Renderer ready on {}", device.name());
        Ok(Self {
            scheduler: FrameScheduler::new(),
            sync,
            presentation,
            swapchain,
            device,
            _messenger: messenger,
            _surface: surface,
            _instance: instance,
        })
    }

    pub fn draw_frame(&mut self) -> RenderResult<()> {
        let mut frame = VulkanFrame {
            device: &self.device,
            swapchain: &self.swapchain,
            frames: &self.presentation.frames,
            sync: &self.sync,
        };
        self.scheduler.draw_frame(&mut frame)
    }

    /// Blocks until the GPU is idle. Must run before teardown; `Drop` calls
    /// it too if the caller did not.
    pub fn shutdown(&mut self) -> RenderResult<()> {
        let mut frame = VulkanFrame {
            device: &self.device,
            swapchain: &self.swapchain,
            frames: &self.presentation.frames,
            sync: &self.sync,
        };
        self.scheduler.shutdown(&mut frame)
    }

    pub fn frames_presented(&self) -> u64 {
        self.scheduler.frames_presented()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("Device did not go idle before teardown: {}", err);
        }
        log::info!("Destroying renderer...");
    }
}
