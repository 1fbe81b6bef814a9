// app.rs
use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::*,
    event_loop::ActiveEventLoop,
    keyboard::PhysicalKey,
    window::{CursorGrabMode, Window, WindowId},
};

use crate::gfx::{Gpu, WgpuDevice};
use crate::input::{KeyState, Player, PlayerAction};
use crate::scene::Camera;
use crate::settings::{DemoSetting, RenderSettings};
use crate::time::Timing;

/// Pixels of trackpad scroll treated as one wheel line.
const PIXELS_PER_LINE: f32 = 40.0;

/// Handed to a demo while it builds its scene.
pub struct StartupContext<'a> {
    pub gpu: &'a Gpu,
    pub settings: &'a RenderSettings,
    pub camera: &'a mut Camera,
}

/// Per-frame state a demo may read while updating.
pub struct UpdateContext<'a> {
    pub camera: &'a Camera,
    pub keys: &'a KeyState,
    /// Seconds since start-up.
    pub elapsed: f32,
    pub delta_time: f32,
    pub aspect: f32,
}

/// A runnable scene: updated and drawn once per accepted frame.
pub trait Demo {
    fn name(&self) -> &str {
        "Demo"
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        let _ = ctx;
    }

    fn draw(&self, gpu: &Gpu);
}

pub type DemoFactory = Box<dyn FnMut(&DemoSetting, &mut StartupContext<'_>) -> Box<dyn Demo>>;

pub struct App {
    settings: RenderSettings,
    create_demo: DemoFactory,
    window: Option<Arc<Window>>,
    gpu: Option<Gpu>,
    demo: Option<Box<dyn Demo>>,
    camera: Camera,
    player: Player,
    keys: KeyState,
    timing: Timing,
    size: PhysicalSize<u32>,
}

impl App {
    pub fn new(settings: RenderSettings, create_demo: DemoFactory) -> Self {
        let size = PhysicalSize::new(settings.resolution.width, settings.resolution.height);
        let timing = Timing::new(settings.fps_limit);
        Self {
            settings,
            create_demo,
            window: None,
            gpu: None,
            demo: None,
            camera: Camera::default(),
            player: Player::new(),
            keys: KeyState::new(),
            timing,
            size,
        }
    }

    fn aspect(&self) -> f32 {
        self.size.width as f32 / self.size.height.max(1) as f32
    }

    /// Returns whether the grab took; without it the camera follows
    /// window cursor positions instead of raw device motion.
    fn grab_cursor(window: &Window) -> bool {
        let grabbed = window
            .set_cursor_grab(CursorGrabMode::Confined)
            .or_else(|_| window.set_cursor_grab(CursorGrabMode::Locked));
        window.set_cursor_visible(false);
        match grabbed {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Could not grab the cursor, using window positions: {}", err);
                false
            }
        }
    }

    fn frame(&mut self, event_loop: &ActiveEventLoop) {
        self.timing.tick();
        if !self.timing.should_render() {
            return;
        }
        let delta_time = self.timing.delta_time();

        if self.player.process_input(&mut self.camera, &self.keys, delta_time) == PlayerAction::Quit {
            event_loop.exit();
            return;
        }

        let aspect = self.aspect();
        let (Some(gpu), Some(demo)) = (self.gpu.as_ref(), self.demo.as_mut()) else {
            return;
        };
        demo.update(&mut UpdateContext {
            camera: &self.camera,
            keys: &self.keys,
            elapsed: self.timing.uptime() as f32,
            delta_time,
            aspect,
        });
        demo.draw(gpu);
        gpu.finish_frame();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(self.settings.title.clone())
            .with_inner_size(self.size);
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("Failed to create window: {}", err);
                event_loop.exit();
                return;
            }
        };
        self.player.mouse.set_grabbed(Self::grab_cursor(&window));
        self.size = window.inner_size();

        let device = match pollster::block_on(WgpuDevice::new(window.clone(), &self.settings)) {
            Ok(device) => device,
            Err(err) => {
                log::error!("Failed to initialise graphics: {}", err);
                event_loop.exit();
                return;
            }
        };
        let gpu = Gpu::new(device);

        let demo = (self.create_demo)(
            &self.settings.demo,
            &mut StartupContext {
                gpu: &gpu,
                settings: &self.settings,
                camera: &mut self.camera,
            },
        );
        log::info!("Running demo '{}'", demo.name());

        window.request_redraw();
        self.window = Some(window);
        self.gpu = Some(gpu);
        self.demo = Some(demo);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window.as_ref().map(|w| w.id()) != Some(id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.size = size;
                if let Some(gpu) = &self.gpu {
                    gpu.with(|device| device.resize(size.width, size.height));
                }
            }
            WindowEvent::Focused(false) => {
                self.keys.release_all();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                self.keys.set(code, state.is_pressed());
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / PIXELS_PER_LINE,
                };
                self.player.mouse.scrolled(lines);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.player.mouse.cursor_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::RedrawRequested => {
                self.frame(event_loop);
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.player.mouse.raw_motion(dx as f32, dy as f32);
        }
    }
}
