//! vkscene - Main Entry Point
//!
//! Opens a window, builds the Vulkan renderer from `vkscene.toml` and runs a
//! free-flying camera over an instanced, lit scene.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Error, Result};
use glam::Vec3;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use vkscene_core::{FpsCounter, RendererConfig};
use vkscene_platform::{InputState, KeyCode, Window};
use vkscene_renderer::Renderer;

const CONFIG_FILE: &str = "vkscene.toml";

/// Movement per frame, before camera velocity.
const DEFAULT_SPEED: f32 = 0.03;
const FAST_SPEED: f32 = 0.1;
/// Radians per frame while an arrow key is held.
const TURN_SPEED: f32 = 0.03;
/// Radians per pixel of mouse motion.
const MOUSE_SENSITIVITY: f32 = 0.002;
/// Keeps the camera from flipping over the poles.
const MAX_PITCH: f32 = 1.5;

/// Initial `(position, model)` pairs.
const STARTUP_INSTANCES: [([f32; 3], usize); 7] = [
    ([0.0, 0.0, 0.0], 3),
    ([0.0, 0.0, 0.0], 1),
    ([-1.0, -1.0, -1.0], 1),
    ([3.0, 0.1, 1.0], 2),
    ([5.0, 0.1, 0.0], 1),
    ([7.0, 0.1, 0.0], 0),
    ([9.0, 0.1, 2.0], 1),
];

/// Light colors spawned by the number keys.
const LIGHT_KEYS: [(KeyCode, Vec3); 3] = [
    (KeyCode::Digit1, Vec3::new(2.0, 0.0, 0.0)),
    (KeyCode::Digit2, Vec3::new(0.0, 2.0, 0.0)),
    (KeyCode::Digit3, Vec3::new(0.0, 0.0, 2.0)),
];

struct App {
    config: RendererConfig,
    window: Option<Window>,
    renderer: Option<Renderer>,
    input: InputState,
    fps: FpsCounter,
    /// First fatal error; the event loop exits once it is set.
    failure: Option<Error>,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            input: InputState::new(),
            fps: FpsCounter::new(),
            failure: None,
        }
    }

    /// Releases GPU state, renderer before window: the surface must go first.
    fn shutdown(&mut self) {
        if let Some(ref renderer) = self.renderer
            && let Err(e) = renderer.wait_idle()
        {
            warn!("Failed to wait for the GPU on exit: {}", e);
        }
        self.renderer = None;
        self.window = None;
    }

    /// Tears everything down and keeps `error` for `main` to report.
    fn record_failure(&mut self, error: Error) {
        error!("Fatal error: {:#}", error);
        self.shutdown();
        self.failure.get_or_insert(error);
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Error) {
        self.record_failure(error);
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window)?;
        let mut renderer = Renderer::new(&window, &self.config)?;

        for (pos, model) in STARTUP_INSTANCES {
            renderer.add_render_instance(Vec3::from_array(pos), model);
        }
        renderer.add_light(Vec3::ZERO, Vec3::ONE, 0.0);
        renderer.set_camera_angle(Vec3::ONE);
        renderer.set_camera_pos(Vec3::ZERO);

        info!("Initialization complete, entering main loop");
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    /// Applies this frame's input to the scene and camera.
    fn update(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let input = &self.input;

        let speed = if input.is_either_pressed(KeyCode::ControlLeft, KeyCode::ControlRight) {
            FAST_SPEED
        } else {
            DEFAULT_SPEED
        };

        let axis = |positive: KeyCode, negative: KeyCode| {
            if input.is_key_pressed(positive) {
                speed
            } else if input.is_key_pressed(negative) {
                -speed
            } else {
                0.0
            }
        };
        let x = axis(KeyCode::KeyD, KeyCode::KeyA);
        let y = if input.is_key_pressed(KeyCode::Space) {
            speed
        } else if input.is_either_pressed(KeyCode::ShiftLeft, KeyCode::ShiftRight) {
            -speed
        } else {
            0.0
        };
        let z = axis(KeyCode::KeyW, KeyCode::KeyS);
        if x != 0.0 || y != 0.0 || z != 0.0 {
            renderer.change_camera_pos(x, y, z);
        }

        let (dx, dy) = input.mouse_delta();
        let turn_yaw = axis_turn(input, KeyCode::ArrowLeft, KeyCode::ArrowRight);
        let turn_pitch = axis_turn(input, KeyCode::ArrowUp, KeyCode::ArrowDown);
        let mut angle = renderer.camera_angle();
        angle.x += turn_yaw - dx * MOUSE_SENSITIVITY;
        angle.y = (angle.y + turn_pitch - dy * MOUSE_SENSITIVITY).clamp(-MAX_PITCH, MAX_PITCH);
        renderer.set_camera_angle(angle);

        let camera_pos = renderer.camera_pos();
        if input.is_key_just_pressed(KeyCode::KeyF) {
            let last_model = renderer.model_count().saturating_sub(1);
            renderer.add_render_instance(camera_pos, last_model);
        }
        for (key, color) in LIGHT_KEYS {
            if input.is_key_just_pressed(key) {
                renderer.add_light(camera_pos, color, 1.0);
            }
        }
        if input.is_key_just_pressed(KeyCode::KeyR) {
            renderer.reset_lights();
        }
        if input.is_key_just_pressed(KeyCode::Backspace) {
            renderer.reset_render_instances();
        }
    }
}

fn axis_turn(input: &InputState, positive: KeyCode, negative: KeyCode) -> f32 {
    if input.is_key_pressed(positive) {
        TURN_SPEED
    } else if input.is_key_pressed(negative) {
        -TURN_SPEED
    } else {
        0.0
    }
}

/// Leaves a fatal error on screen briefly before the process ends.
fn fatal_exit() -> ExitCode {
    std::thread::sleep(Duration::from_secs(3));
    ExitCode::FAILURE
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && self.failure.is_none()
            && let Err(e) = self.init(event_loop)
        {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut window) = self.window {
                    window.resize(size.width, size.height);
                }
                if let Some(ref mut renderer) = self.renderer {
                    renderer.notify_resized(size.width, size.height);
                }
            }
            WindowEvent::Focused(false) => self.input.clear(),
            WindowEvent::RedrawRequested => {
                if self.window.as_ref().is_some_and(Window::is_minimized) {
                    return;
                }

                self.update();

                if let Some(ref mut renderer) = self.renderer
                    && let Err(e) = renderer.draw_frame()
                {
                    self.fail(event_loop, e.into());
                    return;
                }

                if let Some(fps) = self.fps.frame() {
                    info!("FPS: {:.0}", fps);
                }
                self.input.begin_frame();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if key == KeyCode::Escape && event.state == ElementState::Pressed {
                        info!("Escape pressed, shutting down");
                        event_loop.exit();
                        return;
                    }
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if state.is_pressed() {
                    self.input.on_mouse_pressed(button.into());
                } else {
                    self.input.on_mouse_released(button.into());
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input
                    .on_mouse_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::CursorLeft { .. } => self.input.on_mouse_left(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() -> Result<ExitCode> {
    vkscene_core::init_logging();
    info!("Starting vkscene");

    let config = match RendererConfig::load(Path::new(CONFIG_FILE)) {
        Ok(config) => config,
        Err(e) => {
            error!("Fatal error: {}", e);
            return Ok(fatal_exit());
        }
    };

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    let failed = app.failure.is_some();
    drop(app);
    if failed {
        return Ok(fatal_exit());
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_failure_releases_state() {
        let mut app = App::new(RendererConfig::default());
        app.record_failure(anyhow::anyhow!("device lost"));

        assert!(app.renderer.is_none());
        assert!(app.window.is_none());
        assert_eq!(app.failure.as_ref().map(ToString::to_string).as_deref(), Some("device lost"));
    }

    #[test]
    fn test_record_failure_keeps_first_error() {
        let mut app = App::new(RendererConfig::default());
        app.record_failure(anyhow::anyhow!("first"));
        app.record_failure(anyhow::anyhow!("second"));

        assert_eq!(app.failure.unwrap().to_string(), "first");
    }
}
