//! Window, setup and the frame loop.

use std::sync::Arc;
use std::time::Instant;

use ember_core::config::SimulationConfig;
use ember_core::error::{EmberError, EmberResult, SetupError};
use ember_core::scheduler::{FrameClock, FrameScheduler};
use ember_rendering::{
    create_instance, GpuContext, GpuParticleDevice, GpuRenderer, ShaderSources, SpriteImage,
};
use winit::dpi::PhysicalSize;
use winit::event::{Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowBuilder};

use crate::input::{InputState, KeyAction};

type Scheduler = FrameScheduler<GpuParticleDevice, GpuRenderer>;

/// Window size when the primary monitor is unknown.
const FALLBACK_WINDOW: (u32, u32) = (1280, 720);

/// Opens the window and runs frames until quit.
///
/// # Errors
///
/// Any setup error, or the first frame error, which ends the loop.
pub fn run(config: &SimulationConfig) -> EmberResult<()> {
    let event_loop = EventLoop::new().map_err(|err| SetupError::Window(err.to_string()))?;
    let monitor = event_loop.primary_monitor().map(|monitor| monitor.size());
    let size = initial_size(monitor, config.render.window_fraction);
    let window = WindowBuilder::new()
        .with_title(&config.render.title)
        .with_inner_size(size)
        .build(&event_loop)
        .map_err(|err| SetupError::Window(err.to_string()))?;
    let window = Arc::new(window);
    tracing::info!(width = size.width, height = size.height, "window created");

    let mut app = Some(App::new(Arc::clone(&window), config)?);
    let mut failure: Option<EmberError> = None;

    event_loop
        .run(|event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);
            match event {
                Event::WindowEvent { event, window_id } if window_id == window.id() => {
                    if let Some(app) = app.as_mut() {
                        if let Err(err) = app.handle_window_event(event, elwt) {
                            failure = Some(err);
                            elwt.exit();
                        }
                    }
                }
                Event::AboutToWait => window.request_redraw(),
                Event::LoopExiting => {
                    if let Some(app) = app.take() {
                        if let Err(err) = app.shutdown() {
                            failure.get_or_insert(err);
                        }
                    }
                }
                _ => {}
            }
        })
        .map_err(|err| SetupError::Window(err.to_string()))?;

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// `fraction` of the monitor, or a fixed size if there is no monitor.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn initial_size(monitor: Option<PhysicalSize<u32>>, fraction: f32) -> PhysicalSize<u32> {
    match monitor {
        Some(monitor) if monitor.width > 0 && monitor.height > 0 => {
            let scale = |edge: u32| ((edge as f32 * fraction).round() as u32).max(1);
            PhysicalSize::new(scale(monitor.width), scale(monitor.height))
        }
        _ => PhysicalSize::new(FALLBACK_WINDOW.0, FALLBACK_WINDOW.1),
    }
}

/// `"<title> - <fps> fps"`.
fn window_title(base: &str, fps: f32) -> String {
    format!("{base} - {fps:.0} fps")
}

struct App {
    window: Arc<Window>,
    scheduler: Scheduler,
    clock: FrameClock,
    input: InputState,
    last_frame: Option<Instant>,
    title: String,
}

impl App {
    fn new(window: Arc<Window>, config: &SimulationConfig) -> EmberResult<Self> {
        let instance = create_instance();
        let surface = instance
            .create_surface(Arc::clone(&window))
            .map_err(|err| SetupError::Window(err.to_string()))?;
        let context = GpuContext::new(&instance, &surface, config)?;

        let sources = ShaderSources::load(&config.sources, config.group_size)?;
        let device = GpuParticleDevice::new(&context, config, &sources)?;
        let sprite = SpriteImage::load_or_fallback(config.sources.texture_path.as_deref());

        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));
        let renderer = GpuRenderer::new(
            &context,
            surface,
            width,
            height,
            &config.render,
            &sources,
            &sprite,
        )?;
        let scheduler = FrameScheduler::new(device, renderer, config, width, height);
        tracing::info!(
            capacity = config.capacity,
            spawn_rate = config.spawn_rate,
            sprite_mode = ?config.render.sprite_mode,
            "simulation ready"
        );

        Ok(Self {
            window,
            scheduler,
            clock: FrameClock::from_config(config),
            input: InputState::new(),
            last_frame: None,
            title: config.render.title.clone(),
        })
    }

    fn handle_window_event(
        &mut self,
        event: WindowEvent,
        elwt: &EventLoopWindowTarget<()>,
    ) -> EmberResult<()> {
        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("window closed");
                elwt.exit();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        ..
                    },
                ..
            } => {
                if self.input.handle_key(key, state) == KeyAction::Quit {
                    tracing::info!("escape pressed");
                    elwt.exit();
                }
            }
            WindowEvent::Focused(false) => self.input.clear(),
            WindowEvent::Resized(size) => self.scheduler.resize(size.width, size.height),
            WindowEvent::RedrawRequested => self.redraw()?,
            _ => {}
        }
        Ok(())
    }

    fn redraw(&mut self) -> EmberResult<()> {
        let now = Instant::now();
        let time = self.clock.tick_at(now);
        self.scheduler.run_frame(time, self.input.intents())?;

        if let Some(last) = self.last_frame.replace(now) {
            let elapsed = now.saturating_duration_since(last).as_secs_f32();
            if elapsed > 0.0 {
                self.window.set_title(&window_title(&self.title, 1.0 / elapsed));
            }
        }
        Ok(())
    }

    fn shutdown(self) -> EmberResult<()> {
        let stats = *self.scheduler.stats();
        let (device, renderer) = self.scheduler.shutdown()?;
        tracing::info!(
            frames = stats.total_frames,
            presented = stats.presented_frames,
            skipped = stats.skipped_presents,
            "shutdown complete"
        );
        drop(renderer);
        drop(device);
        Ok(())
    }
}
