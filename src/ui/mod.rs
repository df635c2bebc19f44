use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;

use softbuffer::Surface;
use thiserror::Error;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::decode::{DecodeError, DecodeSession, FrameStatus, OUTPUT_FORMAT};
use crate::ui::render::{blit, rgb, BG_COLOR};
use crate::ui::state::{Action, ViewerEvent, ViewerState};

pub mod render;
pub mod state;

/// Failures the event loop cannot continue past.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The stream ended before a frame could be decoded; the viewer has no
    /// continuation policy beyond showing a first frame.
    #[error("{}: stream exhausted before a frame was decoded", .path.display())]
    ExhaustedStream { path: PathBuf },
}

// ---------------------------------------------------------------------------
// Application handler (winit 0.30 style)
// ---------------------------------------------------------------------------

pub struct App {
    pub state: ViewerState,
    session: Option<DecodeSession>,
    /// Off-screen buffer holding the last decoded frame as 0x00RRGGBB words.
    offscreen: Vec<u32>,
    image_size: (u32, u32),
    window: Option<Arc<Window>>,
    context: Option<softbuffer::Context<Arc<Window>>>,
    surface: Option<Surface<Arc<Window>, Arc<Window>>>,
    cursor: (i32, i32),
    needs_clear: bool,
    fatal: Option<ViewerError>,
}

impl App {
    pub fn new(state: ViewerState) -> Self {
        Self {
            state,
            session: None,
            offscreen: Vec::new(),
            image_size: (0, 0),
            window: None,
            context: None,
            surface: None,
            cursor: (0, 0),
            needs_clear: false,
            fatal: None,
        }
    }

    /// The error that ended the loop, if any.
    pub fn take_fatal(&mut self) -> Option<ViewerError> {
        self.fatal.take()
    }

    /// Open `files[index]` and size a fresh off-screen buffer to its stream.
    /// The previous session is closed before the new file opens.
    fn load_image(&mut self, index: usize) -> Result<(), DecodeError> {
        self.session = None;
        let path = self.state.file(index).to_path_buf();
        log::debug!(
            "load_image[{}/{}]: {}",
            index + 1,
            self.state.file_count(),
            path.display()
        );
        let session = DecodeSession::open(&path, OUTPUT_FORMAT)?;
        self.image_size = (session.width(), session.height());
        self.offscreen = vec![0; (session.width() * session.height()) as usize];
        self.session = Some(session);
        Ok(())
    }

    /// Decode the next frame of the current session into the off-screen
    /// buffer. The buffer was sized by `load_image` and the formats match
    /// for the lifetime of the file.
    fn load_frame(&mut self) -> Result<(), ViewerError> {
        let session = self.session.as_mut().expect("load_image before load_frame");
        match session.next_frame()? {
            FrameStatus::Decoded => {
                let bytes = session.frame_bytes();
                for (px, bgra) in self.offscreen.iter_mut().zip(bytes.chunks_exact(4)) {
                    *px = rgb(bgra[2], bgra[1], bgra[0]);
                }
                Ok(())
            }
            FrameStatus::NoMoreFrames => Err(ViewerError::ExhaustedStream {
                path: self.state.current_file().to_path_buf(),
            }),
        }
    }

    /// Close the current file and bring up the next one in the cycle.
    fn load_next(&mut self) -> Result<(), ViewerError> {
        let index = self.state.advance();
        self.load_image(index)?;
        self.load_frame()
    }

    /// Blit the off-screen image to the window at the current pan offset,
    /// clearing the background first when requested. Never re-decodes; the
    /// draw size is the geometry cached by the last exposure.
    fn render(&mut self, clear_background: bool) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        let (gw, gh) = self.state.last_geometry;
        let w = gw.max(1);
        let h = gh.max(1);
        log::trace!(
            "render: geometry {}x{} pan ({}, {}) clear={}",
            w,
            h,
            self.state.pan.0,
            self.state.pan.1,
            clear_background
        );

        if let Err(e) = surface.resize(
            NonZeroU32::new(w).unwrap(),
            NonZeroU32::new(h).unwrap(),
        ) {
            self.state.dispatch(ViewerEvent::ProtocolError {
                operation: "resize surface",
                detail: e.to_string(),
            });
            return;
        }

        match surface.buffer_mut() {
            Ok(mut buffer) => {
                if clear_background {
                    buffer.fill(BG_COLOR);
                }
                blit(
                    &mut buffer,
                    w,
                    h,
                    &self.offscreen,
                    self.image_size.0,
                    self.image_size.1,
                    self.state.pan.0,
                    self.state.pan.1,
                );
                if let Err(e) = buffer.present() {
                    self.state.dispatch(ViewerEvent::ProtocolError {
                        operation: "present",
                        detail: e.to_string(),
                    });
                }
            }
            Err(e) => {
                self.state.dispatch(ViewerEvent::ProtocolError {
                    operation: "acquire buffer",
                    detail: e.to_string(),
                });
            }
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: ViewerError) {
        self.fatal = Some(err);
        event_loop.exit();
    }

    /// Feed one viewer-level event through the state machine and carry out
    /// whatever it asks for.
    fn apply(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match self.state.dispatch(event) {
            Action::None => {}
            Action::Redraw { clear_background } => {
                self.needs_clear |= clear_background;
                if let Some(ref window) = self.window {
                    window.request_redraw();
                }
            }
            Action::LoadNext => {
                if let Err(e) = self.load_next() {
                    self.fail(event_loop, e);
                    return;
                }
                self.needs_clear = true;
                if let Some(ref window) = self.window {
                    window.request_redraw();
                }
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title("miv")
            .with_inner_size(LogicalSize::new(800u32, 600u32));
        let window = Arc::new(event_loop.create_window(attrs).expect("create window"));
        let context = softbuffer::Context::new(Arc::clone(&window)).expect("create context");
        let surface = Surface::new(&context, Arc::clone(&window)).expect("create surface");

        self.window = Some(window);
        self.context = Some(context);
        self.surface = Some(surface);

        // First file: decoded before anything is drawn.
        let loaded = match self.load_image(self.state.current_index) {
            Ok(()) => self.load_frame(),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = loaded {
            self.fail(event_loop, e);
            return;
        }
        self.needs_clear = true;
        self.window.as_ref().unwrap().request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            // The display connection going away is the only way out.
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }

            WindowEvent::Resized(_) => {
                if let Some(ref window) = self.window {
                    window.request_redraw();
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                let (x, y) = (position.x as i32, position.y as i32);
                self.cursor = (x, y);
                self.apply(event_loop, ViewerEvent::Motion { x, y });
            }

            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    let (x, y) = self.cursor;
                    let event = if state == ElementState::Pressed {
                        ViewerEvent::ButtonPress { x, y }
                    } else {
                        ViewerEvent::ButtonRelease { x, y }
                    };
                    self.apply(event_loop, event);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed {
                    let viewer_event = match &event.logical_key {
                        Key::Named(NamedKey::Space) => ViewerEvent::NextFile,
                        other => ViewerEvent::OtherKey(format!("{other:?}")),
                    };
                    self.apply(event_loop, viewer_event);
                }
            }

            WindowEvent::RedrawRequested => {
                // Exposure: refresh the cached geometry, then redraw from the
                // off-screen buffer. A pending drag or file switch upgrades
                // the redraw to a cleared one.
                let size = self.window.as_ref().unwrap().inner_size();
                let action = self.state.dispatch(ViewerEvent::Expose {
                    width: size.width,
                    height: size.height,
                });
                let clear = std::mem::take(&mut self.needs_clear);
                if let Action::Redraw { clear_background } = action {
                    self.render(clear_background || clear);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        // Block until the next input event; there is nothing to animate.
        event_loop.set_control_flow(ControlFlow::Wait);
    }
}
