// =============================================================================
// GPU-BRIDGE DEMO - one window, either backend
// =============================================================================
//
// Opens a window and renders a color-cycling clear plus a triangle through the
// backend-neutral API. The backend comes from config.toml ("auto" tries
// Vulkan and falls back to the software backend).
//
// FRAME FLOW:
// 1. Acquire the next swapchain texture
// 2. Record clear + triangle into the command list
// 3. Submit the command list
// 4. Present (software frames are then blitted to the window by softbuffer)
//
// =============================================================================

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use gpu_bridge::config::Config;
use gpu_bridge::{
    Backend, Buffer, BufferDescription, BufferUsage, ColorF, CommandList, Device, Format, Frame,
    GpuError, Instance, Pipeline, PipelineDescription, PresentTarget, RenderPassDescription,
    ShaderModuleDescription, ShaderStage, Size2D, Surface, Swapchain, VertexAttribute,
    VertexBufferLayout, VertexStepMode,
};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

const VERTEX_SHADER_PATH: &str = "shaders/triangle.vert.spv";
const FRAGMENT_SHADER_PATH: &str = "shaders/triangle.frag.spv";

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting gpu-bridge demo");
    log::info!(
        "Window: {}x{}, backend: {}, present mode: {}",
        config.window.width,
        config.window.height,
        config.instance.backend,
        config.swapchain.present_mode
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Initialize logging with optional file output
fn init_logging(config: &Config) {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();
    builder.init();

    // Create/clear log file if enabled
    if config.debug.log_to_file {
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            let _ = writeln!(file, "=== gpu-bridge Log ===");
            let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
            let _ = writeln!(file);
        }
    }
}

// =============================================================================
// SOFTWARE PRESENTATION
// =============================================================================

/// Latest software frame, already converted to softbuffer's 0RGB pixels.
type FrameSlot = Arc<Mutex<Option<(Size2D, Vec<u32>)>>>;

/// Receives frames from the software swapchain. The window blit happens on
/// the event loop thread, so this only converts and stores.
struct WindowTarget {
    slot: FrameSlot,
}

impl PresentTarget for WindowTarget {
    fn present(&mut self, frame: Frame<'_>) -> gpu_bridge::Result<()> {
        let swizzle: fn(&[u8]) -> u32 = match frame.format {
            Format::B8G8R8A8Unorm | Format::B8G8R8A8UnormSrgb => {
                |p| u32::from_le_bytes([p[0], p[1], p[2], 0])
            }
            Format::R8G8B8A8Unorm | Format::R8G8B8A8UnormSrgb => {
                |p| u32::from_le_bytes([p[2], p[1], p[0], 0])
            }
            other => {
                return Err(GpuError::invalid_state(format!("cannot show {other:?} frames")));
            }
        };
        let pixels = frame.pixels.chunks_exact(4).map(swizzle).collect();
        *self.slot.lock() = Some((frame.size, pixels));
        Ok(())
    }
}

struct WindowBlitter {
    _context: softbuffer::Context<Arc<Window>>,
    surface: softbuffer::Surface<Arc<Window>, Arc<Window>>,
    slot: FrameSlot,
}

impl WindowBlitter {
    fn new(window: Arc<Window>, slot: FrameSlot) -> Result<Self> {
        let context = softbuffer::Context::new(window.clone())
            .map_err(|e| anyhow::anyhow!("softbuffer context: {e}"))?;
        let surface = softbuffer::Surface::new(&context, window)
            .map_err(|e| anyhow::anyhow!("softbuffer surface: {e}"))?;
        Ok(Self { _context: context, surface, slot })
    }

    fn blit(&mut self) -> Result<()> {
        let Some((size, pixels)) = self.slot.lock().take() else {
            return Ok(());
        };
        let (Some(width), Some(height)) = (NonZeroU32::new(size.width), NonZeroU32::new(size.height)) else {
            return Ok(());
        };
        self.surface
            .resize(width, height)
            .map_err(|e| anyhow::anyhow!("softbuffer resize: {e}"))?;
        let mut buffer = self
            .surface
            .buffer_mut()
            .map_err(|e| anyhow::anyhow!("softbuffer buffer: {e}"))?;
        let len = buffer.len().min(pixels.len());
        buffer[..len].copy_from_slice(&pixels[..len]);
        buffer.present().map_err(|e| anyhow::anyhow!("softbuffer present: {e}"))?;
        Ok(())
    }
}

// =============================================================================
// RENDERER
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: Vec2,
    color: Vec3,
}

const TRIANGLE: [Vertex; 3] = [
    Vertex { position: Vec2::new(0.0, -0.5), color: Vec3::new(1.0, 0.0, 0.0) },
    Vertex { position: Vec2::new(0.5, 0.5), color: Vec3::new(0.0, 1.0, 0.0) },
    Vertex { position: Vec2::new(-0.5, 0.5), color: Vec3::new(0.0, 0.0, 1.0) },
];

struct Triangle {
    vertices: Buffer,
    pipeline: Pipeline,
}

/// Everything created from the window. Field order is drop order: GPU
/// objects go before the device, the device before the surface.
struct Renderer {
    triangle: Option<Triangle>,
    command_list: CommandList,
    swapchain: Option<Swapchain>,
    device: Device,
    surface: Surface,
    blitter: Option<WindowBlitter>,
    _instance: Instance,
}

impl Renderer {
    fn new(config: &Config, window: Arc<Window>) -> Result<Self> {
        let instance = Instance::new(&config.instance_description()).context("Failed to create instance")?;
        for adapter in instance.enumerate_adapters()? {
            log::info!("Adapter {}", adapter);
        }

        let (surface, blitter) = match instance.backend() {
            Backend::Vulkan => {
                let surface = instance
                    .create_surface(&*window)
                    .context("Failed to create window surface")?;
                (surface, None)
            }
            Backend::Software => {
                let slot = FrameSlot::default();
                let blitter = WindowBlitter::new(window.clone(), slot.clone())?;
                (Surface::software(WindowTarget { slot }), Some(blitter))
            }
        };

        let device = instance
            .create_device(Some(&surface), 0)
            .context("Failed to create device")?;
        log::info!("Rendering with the {} backend on {}", device.backend(), device.adapter().name);

        let command_list = device.create_command_list()?;
        let mut renderer = Self {
            triangle: None,
            command_list,
            swapchain: None,
            device,
            surface,
            blitter,
            _instance: instance,
        };
        renderer.recreate_swapchain(config, &window)?;
        renderer.triangle = renderer.create_triangle()?;
        Ok(renderer)
    }

    /// Drop the old swapchain before creating a new one; a surface only
    /// supports one at a time.
    fn recreate_swapchain(&mut self, config: &Config, window: &Window) -> Result<()> {
        self.swapchain = None;
        self.device.wait_idle()?;

        let size = window.inner_size();
        let size = Size2D::new(size.width, size.height);
        if size.is_empty() {
            return Ok(());
        }

        let desc = config.swapchain_description(size);
        let swapchain = self
            .device
            .create_swapchain(&desc, &self.surface)
            .context("Failed to create swapchain")?;
        log::info!(
            "Swapchain ready: {} images of {:?} at {} ({:?})",
            swapchain.image_count(),
            swapchain.format(),
            swapchain.size(),
            swapchain.present_mode()
        );
        self.swapchain = Some(swapchain);
        Ok(())
    }

    /// Load the compiled shaders and build the triangle. Missing shader
    /// binaries are not an error; the demo then only clears.
    fn create_triangle(&self) -> Result<Option<Triangle>> {
        let Some(swapchain) = &self.swapchain else {
            return Ok(None);
        };
        let (vs, fs) = match (std::fs::read(VERTEX_SHADER_PATH), std::fs::read(FRAGMENT_SHADER_PATH)) {
            (Ok(vs), Ok(fs)) => (vs, fs),
            _ => {
                log::warn!("Shader binaries not found, compile shaders/ with glslc to draw the triangle");
                return Ok(None);
            }
        };

        let vs = self
            .device
            .create_shader_module(&ShaderModuleDescription::new(ShaderStage::Vertex, vs, "main"))
            .context("Failed to load vertex shader")?;
        let fs = self
            .device
            .create_shader_module(&ShaderModuleDescription::new(ShaderStage::Fragment, fs, "main"))
            .context("Failed to load fragment shader")?;

        let layout = VertexBufferLayout {
            stride: std::mem::size_of::<Vertex>() as u32,
            step_mode: VertexStepMode::Vertex,
            attributes: vec![
                VertexAttribute { location: 0, format: Format::R32G32Float, offset: 0 },
                VertexAttribute { location: 1, format: Format::R32G32B32Float, offset: 8 },
            ],
        };
        let pipeline = self
            .device
            .create_pipeline(&PipelineDescription::new(&vs, &fs, swapchain.format()).with_vertex_buffer(layout))
            .context("Failed to create triangle pipeline")?;

        let bytes: &[u8] = bytemuck::cast_slice(&TRIANGLE);
        let vertices = self.device.create_buffer(
            &BufferDescription::new(bytes.len() as u64, BufferUsage::VERTEX),
            Some(bytes),
        )?;

        Ok(Some(Triangle { vertices, pipeline }))
    }

    /// Render one frame. Returns false when nothing was presented.
    fn render(&mut self, clear: ColorF) -> gpu_bridge::Result<bool> {
        let Some(swapchain) = self.swapchain.as_mut() else {
            return Ok(false);
        };

        let texture = swapchain.get_next_texture()?;
        let list = &mut self.command_list;
        list.begin()?;
        list.begin_render_pass(&RenderPassDescription::clear(&texture, clear))?;
        if let Some(triangle) = &self.triangle {
            if triangle.pipeline.color_formats() == [texture.format()] {
                list.set_pipeline(&triangle.pipeline)?;
                list.set_vertex_buffer(0, &triangle.vertices, 0)?;
                list.draw(TRIANGLE.len() as u32, 0)?;
            }
        }
        list.end_render_pass()?;
        list.end()?;

        // Rendering is submitted before present; the swapchain does not
        // order the two on its own.
        self.device.submit_command_list(list)?;
        swapchain.present()?;

        if let Some(blitter) = &mut self.blitter {
            if let Err(e) = blitter.blit() {
                log::warn!("Window blit failed: {:#}", e);
            }
        }
        Ok(true)
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    config: Config,
    /// Declared before the window so GPU objects go first.
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,

    needs_resize: bool,
    started: Instant,
    frames: u64,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let now = Instant::now();
        Self {
            config,
            renderer: None,
            window: None,
            needs_resize: false,
            started: now,
            frames: 0,
            frame_count: 0,
            last_fps_update: now,
        }
    }

    /// Base clear color with its brightness cycling over time.
    fn clear_color(&self) -> ColorF {
        let t = self.started.elapsed().as_secs_f32();
        let base = Vec4::from_array(self.config.frame.clear_color);
        let pulse = Vec3::new(t.sin(), (t + 2.1).sin(), (t + 4.2).sin()) * 0.25 + Vec3::splat(0.75);
        let rgb = (base.truncate() * pulse).clamp(Vec3::ZERO, Vec3::ONE);
        ColorF::new(rgb.x, rgb.y, rgb.z, base.w)
    }

    fn render_frame(&mut self, event_loop: &ActiveEventLoop) {
        let clear = self.clear_color();
        let (Some(renderer), Some(window)) = (self.renderer.as_mut(), self.window.as_ref()) else {
            return;
        };

        if self.needs_resize {
            self.needs_resize = false;
            if let Err(e) = renderer.recreate_swapchain(&self.config, window) {
                log::error!("Swapchain recreation failed: {:#}", e);
                event_loop.exit();
                return;
            }
        }

        match renderer.render(clear) {
            Ok(true) => {
                self.frames += 1;
                self.update_fps();
            }
            Ok(false) => {}
            Err(GpuError::SwapchainOutOfDate) => {
                log::debug!("Swapchain out of date, recreating");
                self.needs_resize = true;
            }
            Err(e) if e.is_fatal() => {
                log::error!("Fatal render error: {}", e);
                event_loop.exit();
            }
            Err(e) => {
                log::error!("Render error: {}", e);
            }
        }

        let limit = self.config.frame.frame_limit;
        if limit != 0 && self.frames >= limit {
            log::info!("Frame limit of {} reached, exiting", limit);
            event_loop.exit();
        }
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        self.frame_count += 1;
        let elapsed = self.last_fps_update.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;
            if let (Some(window), Some(renderer)) = (&self.window, &self.renderer) {
                window.set_title(&format!(
                    "{} - {:.0} FPS [{}]",
                    self.config.window.title,
                    fps,
                    renderer.device.backend()
                ));
            }
            self.frame_count = 0;
            self.last_fps_update = Instant::now();
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
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(&self.config, window.clone()) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                log::error!("Failed to initialize renderer: {:#}", e);
                event_loop.exit();
                return;
            }
        }
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.needs_resize = true;
            }

            WindowEvent::RedrawRequested => self.render_frame(event_loop),

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            log::info!("Cleaning up after {} frames...", self.frames);
            if let Err(e) = renderer.device.wait_idle() {
                log::error!("Device did not go idle: {}", e);
            }
            drop(renderer);
        }
        log::info!("Cleanup complete");
    }
}
