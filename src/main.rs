// =============================================================================
// TRIANGLE RENDERER - Vulkan bring-up with a single hard-coded draw
// =============================================================================
//
// Picks a GPU, negotiates a swapchain for a fixed-size window, records one
// command buffer per swapchain image and then loops acquire/submit/present
// until the window closes.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (App)                                         │
// │    └── Renderer                                                 │
// │          └── Instance -> Surface -> Device -> Swapchain         │
// │                └── Render pass, pipeline, framebuffers          │
// │                      └── Pre-recorded command buffers           │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Acquire swapchain image (signals image-available)
// 2. Submit that image's command buffer (waits image-available,
//    signals render-finished)
// 3. Present (waits render-finished)
//
// =============================================================================

mod backend;
mod config;

use anyhow::{Context, Result};
use ash::vk;
use backend::Renderer;
use config::{Config, CONFIG_PATH};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::path::Path;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let (config, load_error) = Config::load();

    init_logging(&config);
    match load_error {
        Some(e) => log::warn!("Failed to load {}: {:#}. Using defaults.", CONFIG_PATH, e),
        None if Path::new(CONFIG_PATH).exists() => {
            log::info!("Loaded configuration from {}", CONFIG_PATH)
        }
        None => log::info!("Config file {} not found, using defaults", CONFIG_PATH),
    }
    log::info!("Starting triangle renderer");
    log::debug!("Config: {:?}", config);
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        config.window.title
    );

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(config);
    event_loop
        .run_app(&mut app)
        .context("Event loop terminated abnormally")?;

    match app.fatal_error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// `debug.log_level` sets the default filter; `RUST_LOG` still wins.
fn init_logging(config: &Config) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = config
        .debug
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);

    Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// IMPORTANT: the renderer is declared before the window so the surface is
/// destroyed while the window still exists.
struct App {
    config: Config,
    renderer: Option<Renderer>,
    window: Option<Window>,
    fatal_error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            fatal_error: None,
        }
    }

    fn init_renderer(&self, window: &Window) -> Result<Renderer> {
        let settings = self.config.renderer_settings()?;
        let extent = vk::Extent2D {
            width: self.config.window.width,
            height: self.config.window.height,
        };

        let renderer = Renderer::new(
            &settings,
            window.raw_display_handle(),
            window.raw_window_handle(),
            extent,
        )
        .context("Failed to initialize Vulkan")?;
        Ok(renderer)
    }

    /// Records the first fatal error and leaves the event loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{:#}", err);
        if self.fatal_error.is_none() {
            self.fatal_error = Some(err);
        }
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        if let Some(renderer) = self.renderer.as_mut() {
            if let Err(err) = renderer.shutdown() {
                log::error!("Device did not go idle: {}", err);
            }
            log::info!("Presented {} frames", renderer.frames_presented());
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => w,
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        match self.init_renderer(&window) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                self.fail(event_loop, e);
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown();
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => {
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };
                if let Err(e) = renderer.draw_frame() {
                    let context =
                        format!("Frame loop stopped after {} frames", renderer.frames_presented());
                    self.shutdown();
                    self.fail(event_loop, anyhow::Error::new(e).context(context));
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    self.shutdown();
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    /// Keeps frames coming as fast as presentation allows.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
