// Renderer errors
//
// Every fallible setup call maps onto one of these variants. Nothing is
// retried: the first error unwinds setup and the owners release whatever
// was already created.

use ash::vk;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type RenderResult<T> = std::result::Result<T, RendererError>;

/// Which step of a frame iteration failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    Acquire,
    Submit,
    Present,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameStage::Acquire => "acquire",
            FrameStage::Submit => "submit",
            FrameStage::Present => "present",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("required {kind} `{name}` is not available")]
    MissingCapability { kind: &'static str, name: String },

    #[error("no Vulkan-capable GPU found")]
    NoGpuFound,

    #[error("no suitable GPU found")]
    NoSuitableGpu,

    #[error("failed to load the Vulkan library: {0}")]
    LoaderUnavailable(String),

    #[error("failed to create Vulkan instance: {0}")]
    InstanceCreationFailed(vk::Result),

    #[error("failed to create window surface: {0}")]
    SurfaceCreationFailed(vk::Result),

    #[error("failed to create logical device: {0}")]
    DeviceCreationFailed(vk::Result),

    #[error("{call} failed: {result}")]
    QueryFailed { call: &'static str, result: vk::Result },

    #[error("swapchain creation failed ({step}): {result}")]
    SwapchainCreationFailed { step: &'static str, result: vk::Result },

    #[error("pipeline creation failed ({step}): {result}")]
    PipelineCreationFailed { step: &'static str, result: vk::Result },

    #[error("failed to load shader {}: {reason}", path.display())]
    ShaderLoadFailed { path: PathBuf, reason: String },

    #[error("failed to create semaphore: {0}")]
    SyncObjectCreationFailed(vk::Result),

    #[error("frame {stage} failed: {result}")]
    FrameSubmitFailed { stage: FrameStage, result: vk::Result },
}

impl RendererError {
    pub(crate) fn missing(kind: &'static str, name: impl Into<String>) -> Self {
        Self::MissingCapability { kind, name: name.into() }
    }

    pub(crate) fn query(call: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::QueryFailed { call, result }
    }

    pub(crate) fn swapchain(step: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::SwapchainCreationFailed { step, result }
    }

    pub(crate) fn pipeline(step: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::PipelineCreationFailed { step, result }
    }

    pub(crate) fn frame(stage: FrameStage) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::FrameSubmitFailed { stage, result }
    }
}
