// Synchronization primitives
//
// One frame is in flight at a time, so a single pair of semaphores covers
// GPU-GPU ordering. CPU-GPU ordering comes from waiting for the device to go
// idle at shutdown; there are no fences.

use super::device::DeviceContext;
use super::error::{RenderResult, RendererError};
use super::owner::ResourceOwner;
use ash::vk;
use std::sync::Arc;

pub struct SyncObjects {
    /// Signaled by acquire once the image may be rendered to.
    pub image_available: ResourceOwner<vk::Semaphore>,
    /// Signaled by the submit once rendering is done; present waits on it.
    pub render_finished: ResourceOwner<vk::Semaphore>,
}

impl SyncObjects {
    pub fn new(device: &Arc<DeviceContext>) -> RenderResult<Self> {
        let mut image_available = semaphore_owner(device);
        create_semaphore(device, &mut image_available)?;

        let mut render_finished = semaphore_owner(device);
        create_semaphore(device, &mut render_finished)?;

        log::debug!("Created frame semaphores");
        Ok(Self {
            image_available,
            render_finished,
        })
    }
}

fn semaphore_owner(device: &Arc<DeviceContext>) -> ResourceOwner<vk::Semaphore> {
    ResourceOwner::with_parent(device.clone(), |ctx: &DeviceContext, semaphore| unsafe {
        ctx.device.destroy_semaphore(semaphore, None);
    })
}

/// Writes a fresh semaphore straight into the owner's slot.
fn create_semaphore(
    device: &DeviceContext,
    owner: &mut ResourceOwner<vk::Semaphore>,
) -> RenderResult<()> {
    let create_info = vk::SemaphoreCreateInfo::builder();
    unsafe {
        (device.device.fp_v1_0().create_semaphore)(
            device.device.handle(),
            &*create_info,
            std::ptr::null(),
            owner.address_for_write(),
        )
    }
    .result()
    .map_err(RendererError::SyncObjectCreationFailed)
}
