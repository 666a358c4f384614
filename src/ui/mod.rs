use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow};
use winit::window::{Window, WindowId};
use softbuffer::Surface;

use crate::ui::state::ViewerState;

pub mod render;
pub mod state;

/// Redraw interval while a page slide is running.
const ANIMATION_FRAME: Duration = Duration::from_millis(16);
const WHEEL_PIXELS_PER_LINE: f32 = 40.0;

// ---------------------------------------------------------------------------
// Application handler (winit 0.30 style)
// ---------------------------------------------------------------------------

pub struct App {
    pub state: ViewerState,
    pub window: Option<Arc<Window>>,
    pub context: Option<softbuffer::Context<Arc<Window>>>,
    pub surface: Option<Surface<Arc<Window>, Arc<Window>>>,
    pub next_redraw: Option<Instant>,
}

impl App {
    pub fn new(state: ViewerState) -> Self {
        Self {
            state,
            window: None,
            context: None,
            surface: None,
            next_redraw: None,
        }
    }

    fn request_redraw(&self) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn create_surface(
        &mut self,
        event_loop: &ActiveEventLoop,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let attrs = Window::default_attributes()
            .with_title(self.state.window_title())
            .with_inner_size(LogicalSize::new(1280u32, 900u32));
        let window = Arc::new(event_loop.create_window(attrs)?);
        let context = softbuffer::Context::new(Arc::clone(&window))?;
        let surface = Surface::new(&context, Arc::clone(&window))?;

        window.request_redraw();
        self.window = Some(window);
        self.context = Some(context);
        self.surface = Some(surface);
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.create_surface(event_loop) {
            log::error!("could not open a window: {e}");
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                self.state.save_settings();
                event_loop.exit();
            }

            WindowEvent::Resized(PhysicalSize { width, height }) => {
                let w = NonZeroU32::new(width.max(1));
                let h = NonZeroU32::new(height.max(1));
                if let (Some(surface), Some(w), Some(h)) = (self.surface.as_mut(), w, h) {
                    if let Err(e) = surface.resize(w, h) {
                        log::warn!("surface resize failed: {e}");
                    }
                }
                self.request_redraw();
            }

            WindowEvent::KeyboardInput { event, .. } => {
                let pressed = event.state == ElementState::Pressed;
                self.state.on_key(&event.logical_key, pressed, event.repeat);
                self.request_redraw();
            }

            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left && state == ElementState::Pressed {
                    self.state.clicked = true;
                    self.request_redraw();
                }
            }

            WindowEvent::CursorMoved {
                position: PhysicalPosition { x, y },
                ..
            } => {
                self.state.mouse_pos = (x, y);
            }

            WindowEvent::MouseWheel { delta, .. } => {
                self.state.wheel_y += match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(PhysicalPosition { y, .. }) => {
                        y as f32 / WHEEL_PIXELS_PER_LINE
                    }
                };
                self.request_redraw();
            }

            WindowEvent::RedrawRequested => {
                let Some(window) = self.window.clone() else {
                    return;
                };
                let quit = self.state.update(&window);
                if quit {
                    event_loop.exit();
                    return;
                }
                window.set_title(&self.state.window_title());

                if let Some(ref mut surface) = self.surface {
                    let size = window.inner_size();
                    let fb_w = size.width.max(1);
                    let fb_h = size.height.max(1);
                    if let Ok(mut buffer) = surface.buffer_mut() {
                        self.state.render(&mut buffer, fb_w, fb_h);
                        if let Err(e) = buffer.present() {
                            log::warn!("present failed: {e}");
                        }
                    }
                }

                // Schedule the next redraw for key-hold repeat or a running slide
                self.next_redraw = if self.state.animating() {
                    Some(Instant::now() + ANIMATION_FRAME)
                } else if self.state.nav_keys_held() {
                    let delay = if !self.state.nav_past_initial {
                        self.state.initial_delay
                    } else {
                        self.state.repeat_delay
                    };
                    let delay_ms = (delay * 1000.0) as u64;
                    Some(Instant::now() + Duration::from_millis(delay_ms.max(1)))
                } else {
                    None
                };
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(when) = self.next_redraw {
            if Instant::now() >= when {
                self.next_redraw = None;
                self.request_redraw();
            } else {
                event_loop.set_control_flow(ControlFlow::WaitUntil(when));
            }
        } else {
            event_loop.set_control_flow(ControlFlow::Wait);
        }
    }
}
