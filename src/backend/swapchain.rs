// Swapchain - Window presentation
//
// Negotiates format, present mode, extent and image count against what the
// surface reports, then builds the swapchain and one view per image.
// There is no recreation path: the window is not resizable.

use super::capability::SwapchainSupport;
use super::device::DeviceContext;
use super::error::{FrameStage, RenderResult, RendererError};
use super::owner::{owned, ResourceOwner};
use ash::vk;
use std::sync::Arc;

pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// A single `UNDEFINED` entry means the surface has no preference.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return PREFERRED_FORMAT;
        }
    }

    formats
        .iter()
        .copied()
        .find(|f| f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space)
        .or_else(|| formats.first().copied())
        .unwrap_or(PREFERRED_FORMAT)
}

/// MAILBOX when offered, FIFO otherwise (FIFO support is mandatory).
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface dictates the extent unless it reports `u32::MAX` as the
/// current width, in which case the window size is clamped into range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    // min/max rather than clamp: a surface reporting min > max gets min.
    vk::Extent2D {
        width: window
            .width
            .min(caps.max_image_extent.width)
            .max(caps.min_image_extent.width),
        height: window
            .height
            .min(caps.max_image_extent.height)
            .max(caps.min_image_extent.height),
    }
}

/// One more than the minimum; `max_image_count == 0` means unbounded.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && count > caps.max_image_count {
        caps.max_image_count
    } else {
        count
    }
}

/// Images are shared concurrently when graphics and present live in
/// different queue families.
pub fn sharing_mode(graphics_family: u32, present_family: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics_family != present_family {
        (vk::SharingMode::CONCURRENT, vec![graphics_family, present_family])
    } else {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    }
}

/// The negotiated swapchain parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainConfig {
    pub fn negotiate(support: &SwapchainSupport, window: vk::Extent2D) -> Self {
        Self {
            format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, window),
            image_count: choose_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        }
    }
}

pub struct Swapchain {
    // Views go before the swapchain that owns their images.
    pub image_views: Vec<ResourceOwner<vk::ImageView>>,
    pub images: Vec<vk::Image>,
    pub swapchain: ResourceOwner<vk::SwapchainKHR>,
    pub config: SwapchainConfig,
    device: Arc<DeviceContext>,
}

impl Swapchain {
    pub fn new(
        device: Arc<DeviceContext>,
        surface: vk::SurfaceKHR,
        support: &SwapchainSupport,
        window: vk::Extent2D,
    ) -> RenderResult<Self> {
        let config = SwapchainConfig::negotiate(support, window);
        log::info!(
            "Creating swapchain: {}x{}, {} images, {:?}, {:?}",
            config.extent.width,
            config.extent.height,
            config.image_count,
            config.format.format,
            config.present_mode
        );

        let (sharing, family_indices) =
            sharing_mode(device.graphics_queue_family, device.present_queue_family);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(config.image_count)
            .image_format(config.format.format)
            .image_color_space(config.format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing)
            .queue_family_indices(&family_indices)
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true);

        let handle = unsafe { device.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(RendererError::swapchain("vkCreateSwapchainKHR"))?;
        let swapchain = owned(&device, handle, |ctx: &DeviceContext, swapchain| unsafe {
            ctx.swapchain_loader.destroy_swapchain(swapchain, None);
        });

        // The driver may hand back more images than requested.
        let images = unsafe { device.swapchain_loader.get_swapchain_images(handle) }
            .map_err(RendererError::swapchain("vkGetSwapchainImagesKHR"))?;
        log::info!("Created swapchain with {} images", images.len());

        let image_views = images
            .iter()
            .map(|&image| create_image_view(&device, image, config.format.format))
            .collect::<RenderResult<Vec<_>>>()?;

        Ok(Self {
            image_views,
            images,
            swapchain,
            config,
            device,
        })
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    pub fn format(&self) -> vk::Format {
        self.config.format.format
    }

    /// Requests the next presentable image; `semaphore` is signaled once it
    /// can be rendered to. Returns the index and the suboptimal flag.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RenderResult<(u32, bool)> {
        unsafe {
            self.device.swapchain_loader.acquire_next_image(
                self.swapchain.get(),
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
        .map_err(RendererError::frame(FrameStage::Acquire))
    }

    /// Queues `image_index` for presentation once `wait_semaphores` signal.
    /// Returns the suboptimal flag.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> RenderResult<bool> {
        let swapchains = [self.swapchain.get()];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.device.swapchain_loader.queue_present(queue, &present_info) }
            .map_err(RendererError::frame(FrameStage::Present))
    }
}

fn create_image_view(
    device: &Arc<DeviceContext>,
    image: vk::Image,
    format: vk::Format,
) -> RenderResult<ResourceOwner<vk::ImageView>> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    let view = unsafe { device.device.create_image_view(&create_info, None) }
        .map_err(RendererError::swapchain("vkCreateImageView"))?;

    Ok(owned(device, view, |ctx: &DeviceContext, view| unsafe {
        ctx.device.destroy_image_view(view, None);
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: vk::Extent2D = vk::Extent2D { width: 800, height: 600 };

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn sentinel_caps(min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            ..Default::default()
        }
    }

    #[test]
    fn undefined_format_means_free_choice() {
        let formats = [format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        assert_eq!(choose_surface_format(&formats), PREFERRED_FORMAT);
    }

    #[test]
    fn preferred_format_is_found_anywhere_in_the_list() {
        let formats = [
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            PREFERRED_FORMAT,
        ];
        assert_eq!(choose_surface_format(&formats), PREFERRED_FORMAT);
        // Same answer on a second pass.
        assert_eq!(choose_surface_format(&formats), PREFERRED_FORMAT);
    }

    #[test]
    fn first_format_is_the_fallback() {
        let formats = [
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), formats[0]);
    }

    #[test]
    fn undefined_among_others_is_not_special() {
        let formats = [
            format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), formats[0]);
    }

    #[test]
    fn mailbox_is_preferred_over_fifo() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);

        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn window_size_fits_inside_bounds() {
        let caps = sentinel_caps((400, 300), (1920, 1080));
        assert_eq!(choose_extent(&caps, WINDOW), WINDOW);
    }

    #[test]
    fn window_size_is_clamped_up_to_minimum() {
        let caps = sentinel_caps((900, 700), (1920, 1080));
        assert_eq!(
            choose_extent(&caps, WINDOW),
            vk::Extent2D { width: 900, height: 700 }
        );
    }

    #[test]
    fn window_size_is_clamped_down_to_maximum() {
        let caps = sentinel_caps((100, 100), (640, 480));
        assert_eq!(
            choose_extent(&caps, WINDOW),
            vk::Extent2D { width: 640, height: 480 }
        );
    }

    #[test]
    fn inverted_bounds_resolve_to_the_minimum() {
        let caps = sentinel_caps((900, 700), (0, 0));
        assert_eq!(
            choose_extent(&caps, WINDOW),
            vk::Extent2D { width: 900, height: 700 }
        );
    }

    #[test]
    fn reported_extent_is_used_verbatim() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 1024, height: 768 },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 800, height: 600 },
            ..Default::default()
        };
        assert_eq!(
            choose_extent(&caps, WINDOW),
            vk::Extent2D { width: 1024, height: 768 }
        );
    }

    #[test]
    fn image_count_is_min_plus_one_within_cap() {
        let uncapped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&uncapped), 3);

        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capped), 3);
    }

    #[test]
    fn sharing_mode_follows_queue_families() {
        assert_eq!(sharing_mode(0, 0), (vk::SharingMode::EXCLUSIVE, vec![]));
        assert_eq!(sharing_mode(0, 2), (vk::SharingMode::CONCURRENT, vec![0, 2]));
    }

    #[test]
    fn negotiation_combines_every_choice() {
        let support = SwapchainSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..sentinel_caps((1, 1), (4096, 4096))
            },
            formats: vec![format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let config = SwapchainConfig::negotiate(&support, WINDOW);
        assert_eq!(config.format, PREFERRED_FORMAT);
        assert_eq!(config.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(config.extent, WINDOW);
        assert_eq!(config.image_count, 3);
        assert_eq!(config.pre_transform, vk::SurfaceTransformFlagsKHR::IDENTITY);
    }
}
