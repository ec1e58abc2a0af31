// Backend module - Vulkan abstraction layer
//
// Design: thin wrapper around ash. Every handle lives in a `ResourceOwner`
// that keeps its parent context alive, so teardown order follows ownership.

pub mod capability;
pub mod debug;
pub mod device;
pub mod error;
pub mod frame;
pub mod owner;
pub mod pipeline;
pub mod renderer;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use renderer::Renderer;
