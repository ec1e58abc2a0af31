// Frame loop
//
// Each iteration runs acquire -> submit -> present, in that order, against a
// `FrameBackend`. Only one frame is in flight and the two semaphores are
// reused every time. The only CPU/GPU barrier is the wait-idle at shutdown.

use super::device::DeviceContext;
use super::error::{FrameStage, RenderResult, RendererError};
use super::pipeline::FrameResources;
use super::swapchain::Swapchain;
use super::sync::SyncObjects;
use ash::vk;

/// The three GPU-facing steps of a frame plus the shutdown barrier.
pub trait FrameBackend {
    /// Returns the acquired image index and whether the swapchain is
    /// suboptimal.
    fn acquire(&mut self) -> RenderResult<(u32, bool)>;
    fn submit(&mut self, image_index: u32) -> RenderResult<()>;
    /// Returns whether the swapchain is suboptimal.
    fn present(&mut self, image_index: u32) -> RenderResult<bool>;
    fn wait_idle(&mut self) -> RenderResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Failed,
    ShutDown,
}

#[derive(Debug)]
pub struct FrameScheduler {
    state: SchedulerState,
    frames_presented: u64,
    suboptimal_reported: bool,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Running,
            frames_presented: 0,
            suboptimal_reported: false,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Runs one frame. Does nothing once the scheduler has failed or shut
    /// down; the first error moves it to `Failed` and is returned.
    pub fn draw_frame(&mut self, backend: &mut impl FrameBackend) -> RenderResult<()> {
        if self.state != SchedulerState::Running {
            return Ok(());
        }

        match self.run_frame(backend) {
            Ok(()) => {
                self.frames_presented += 1;
                Ok(())
            }
            Err(err) => {
                self.state = SchedulerState::Failed;
                Err(err)
            }
        }
    }

    fn run_frame(&mut self, backend: &mut impl FrameBackend) -> RenderResult<()> {
        let (image_index, suboptimal) = backend.acquire()?;
        self.note_suboptimal(suboptimal, FrameStage::Acquire);

        backend.submit(image_index)?;

        let suboptimal = backend.present(image_index)?;
        self.note_suboptimal(suboptimal, FrameStage::Present);
        Ok(())
    }

    // Without a recreation path there is nothing to do but say so once.
    fn note_suboptimal(&mut self, suboptimal: bool, stage: FrameStage) {
        if suboptimal && !self.suboptimal_reported {
            log::warn!("Swapchain reported suboptimal during {}", stage);
            self.suboptimal_reported = true;
        }
    }

    /// Waits for the device to finish outstanding work. Safe to call more
    /// than once; only the first call waits.
    pub fn shutdown(&mut self, backend: &mut impl FrameBackend) -> RenderResult<()> {
        if self.state == SchedulerState::ShutDown {
            return Ok(());
        }
        self.state = SchedulerState::ShutDown;

        log::info!("Shutting down after {} frames", self.frames_presented);
        backend.wait_idle()
    }
}

/// The real backend: borrows everything a frame touches for one call.
pub struct VulkanFrame<'a> {
    pub device: &'a DeviceContext,
    pub swapchain: &'a Swapchain,
    pub frames: &'a FrameResources,
    pub sync: &'a SyncObjects,
}

impl FrameBackend for VulkanFrame<'_> {
    fn acquire(&mut self) -> RenderResult<(u32, bool)> {
        self.swapchain
            .acquire_next_image(self.sync.image_available.get())
    }

    fn submit(&mut self, image_index: u32) -> RenderResult<()> {
        let command_buffer = self
            .frames
            .command_buffer(image_index)
            .ok_or(RendererError::FrameSubmitFailed {
                stage: FrameStage::Submit,
                result: vk::Result::ERROR_UNKNOWN,
            })?;

        let wait_semaphores = [self.sync.image_available.get()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [self.sync.render_finished.get()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info],
                vk::Fence::null(),
            )
        }
        .map_err(RendererError::frame(FrameStage::Submit))
    }

    fn present(&mut self, image_index: u32) -> RenderResult<bool> {
        self.swapchain.present(
            self.device.present_queue,
            image_index,
            &[self.sync.render_finished.get()],
        )
    }

    fn wait_idle(&mut self) -> RenderResult<()> {
        self.device.wait_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Acquire,
        Submit(u32),
        Present(u32),
        WaitIdle,
    }

    #[derive(Default)]
    struct RecordingBackend {
        calls: Vec<Call>,
        next_image: u32,
        image_count: u32,
        fail_acquire: bool,
        fail_submit: bool,
        fail_present: bool,
        suboptimal: bool,
    }

    impl RecordingBackend {
        fn with_images(image_count: u32) -> Self {
            Self {
                image_count,
                ..Default::default()
            }
        }
    }

    impl FrameBackend for RecordingBackend {
        fn acquire(&mut self) -> RenderResult<(u32, bool)> {
            self.calls.push(Call::Acquire);
            if self.fail_acquire {
                return Err(RendererError::frame(FrameStage::Acquire)(
                    vk::Result::ERROR_OUT_OF_DATE_KHR,
                ));
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok((index, self.suboptimal))
        }

        fn submit(&mut self, image_index: u32) -> RenderResult<()> {
            self.calls.push(Call::Submit(image_index));
            if self.fail_submit {
                return Err(RendererError::frame(FrameStage::Submit)(
                    vk::Result::ERROR_DEVICE_LOST,
                ));
            }
            Ok(())
        }

        fn present(&mut self, image_index: u32) -> RenderResult<bool> {
            self.calls.push(Call::Present(image_index));
            if self.fail_present {
                return Err(RendererError::frame(FrameStage::Present)(
                    vk::Result::ERROR_SURFACE_LOST_KHR,
                ));
            }
            Ok(self.suboptimal)
        }

        fn wait_idle(&mut self) -> RenderResult<()> {
            self.calls.push(Call::WaitIdle);
            Ok(())
        }
    }

    #[test]
    fn frame_runs_acquire_submit_present_with_acquired_index() {
        let mut backend = RecordingBackend::with_images(3);
        let mut scheduler = FrameScheduler::new();

        scheduler.draw_frame(&mut backend).unwrap();
        scheduler.draw_frame(&mut backend).unwrap();

        assert_eq!(
            backend.calls,
            vec![
                Call::Acquire,
                Call::Submit(0),
                Call::Present(0),
                Call::Acquire,
                Call::Submit(1),
                Call::Present(1),
            ]
        );
        assert_eq!(scheduler.frames_presented(), 2);
        assert_eq!(scheduler.state(), SchedulerState::Running);
    }

    #[test]
    fn failed_acquire_skips_submit_and_present() {
        let mut backend = RecordingBackend::with_images(2);
        backend.fail_acquire = true;
        let mut scheduler = FrameScheduler::new();

        let err = scheduler.draw_frame(&mut backend).unwrap_err();
        assert!(matches!(
            err,
            RendererError::FrameSubmitFailed {
                stage: FrameStage::Acquire,
                result: vk::Result::ERROR_OUT_OF_DATE_KHR,
            }
        ));
        assert_eq!(backend.calls, vec![Call::Acquire]);
        assert_eq!(scheduler.frames_presented(), 0);
        assert_eq!(scheduler.state(), SchedulerState::Failed);
    }

    #[test]
    fn failed_present_does_not_count_the_frame() {
        let mut backend = RecordingBackend::with_images(2);
        let mut scheduler = FrameScheduler::new();
        scheduler.draw_frame(&mut backend).unwrap();

        backend.fail_present = true;
        let err = scheduler.draw_frame(&mut backend).unwrap_err();
        assert!(matches!(
            err,
            RendererError::FrameSubmitFailed { stage: FrameStage::Present, .. }
        ));
        assert_eq!(
            &backend.calls[3..],
            &[Call::Acquire, Call::Submit(1), Call::Present(1)]
        );
        assert_eq!(scheduler.frames_presented(), 1);
        assert_eq!(scheduler.state(), SchedulerState::Failed);

        scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(backend.calls.len(), 6);
    }

    #[test]
    fn failed_submit_skips_present_and_stops_the_loop() {
        let mut backend = RecordingBackend::with_images(2);
        backend.fail_submit = true;
        let mut scheduler = FrameScheduler::new();

        let err = scheduler.draw_frame(&mut backend).unwrap_err();
        assert!(matches!(
            err,
            RendererError::FrameSubmitFailed { stage: FrameStage::Submit, .. }
        ));
        assert_eq!(backend.calls, vec![Call::Acquire, Call::Submit(0)]);
        assert_eq!(scheduler.state(), SchedulerState::Failed);
        assert_eq!(scheduler.frames_presented(), 0);

        // A failed scheduler issues no further GPU work.
        scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(backend.calls.len(), 2);
    }

    #[test]
    fn shutdown_waits_for_idle_once() {
        let mut backend = RecordingBackend::with_images(2);
        let mut scheduler = FrameScheduler::new();

        scheduler.draw_frame(&mut backend).unwrap();
        scheduler.shutdown(&mut backend).unwrap();
        scheduler.shutdown(&mut backend).unwrap();

        assert_eq!(backend.calls.last(), Some(&Call::WaitIdle));
        assert_eq!(
            backend.calls.iter().filter(|c| **c == Call::WaitIdle).count(),
            1
        );
        assert_eq!(scheduler.state(), SchedulerState::ShutDown);

        scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(scheduler.frames_presented(), 1);
    }

    #[test]
    fn failed_scheduler_still_waits_for_idle() {
        let mut backend = RecordingBackend::with_images(1);
        backend.fail_submit = true;
        let mut scheduler = FrameScheduler::new();

        assert!(scheduler.draw_frame(&mut backend).is_err());
        scheduler.shutdown(&mut backend).unwrap();
        assert_eq!(backend.calls.last(), Some(&Call::WaitIdle));
    }

    #[test]
    fn suboptimal_is_not_an_error() {
        let mut backend = RecordingBackend::with_images(2);
        backend.suboptimal = true;
        let mut scheduler = FrameScheduler::new();

        for _ in 0..3 {
            scheduler.draw_frame(&mut backend).unwrap();
        }
        assert_eq!(scheduler.frames_presented(), 3);
        assert!(scheduler.suboptimal_reported);
    }
}
