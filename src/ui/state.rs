use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Event taxonomy
// ---------------------------------------------------------------------------

/// Viewer-level input events, translated from the windowing backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    Expose { width: u32, height: u32 },
    ButtonPress { x: i32, y: i32 },
    ButtonRelease { x: i32, y: i32 },
    Motion { x: i32, y: i32 },
    NextFile,
    OtherKey(String),
    /// A display-side request failed; reported, never fatal.
    ProtocolError {
        operation: &'static str,
        detail: String,
    },
}

/// What the controller must do after an event was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Redraw { clear_background: bool },
    LoadNext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DragState {
    Idle,
    Dragging,
}

// ---------------------------------------------------------------------------
// Viewer state
// ---------------------------------------------------------------------------

/// Interaction state for the single viewer session: the cyclic file list,
/// the pan offset applied when blitting, and the drag state machine.
pub struct ViewerState {
    files: Vec<PathBuf>,
    pub current_index: usize,
    /// Translation applied when copying the off-screen image to the window.
    pub pan: (i32, i32),
    anchor: (i32, i32),
    drag: DragState,
    /// Window size as of the last exposure.
    pub last_geometry: (u32, u32),
}

impl ViewerState {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            current_index: 0,
            pan: (0, 0),
            anchor: (0, 0),
            drag: DragState::Idle,
            last_geometry: (0, 0),
        }
    }

    pub fn file(&self, index: usize) -> &Path {
        &self.files[index]
    }

    pub fn current_file(&self) -> &Path {
        self.file(self.current_index)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Advance the cyclic file index, returning the new index.
    pub fn advance(&mut self) -> usize {
        self.current_index = (self.current_index + 1) % self.files.len();
        self.current_index
    }

    pub fn dispatch(&mut self, event: ViewerEvent) -> Action {
        match event {
            ViewerEvent::Expose { width, height } => {
                log::debug!("expose: {}x{}", width, height);
                self.last_geometry = (width, height);
                Action::Redraw {
                    clear_background: false,
                }
            }
            ViewerEvent::ButtonPress { x, y } => {
                self.anchor = (x, y);
                self.drag = DragState::Dragging;
                Action::None
            }
            ViewerEvent::ButtonRelease { x, y } => {
                // Re-anchor without resetting the offset; panning is sticky.
                self.anchor = (x, y);
                self.drag = DragState::Idle;
                Action::None
            }
            ViewerEvent::Motion { x, y } => {
                if self.drag != DragState::Dragging {
                    return Action::None;
                }
                let offset = (x - self.anchor.0, y - self.anchor.1);
                // Redraw only when the offset moved in both axes.
                if offset.0 != self.pan.0 && offset.1 != self.pan.1 {
                    self.pan = offset;
                    Action::Redraw {
                        clear_background: true,
                    }
                } else {
                    Action::None
                }
            }
            ViewerEvent::NextFile => Action::LoadNext,
            ViewerEvent::OtherKey(key) => {
                log::debug!("key {key}");
                Action::None
            }
            ViewerEvent::ProtocolError { operation, detail } => {
                log::error!("display error: op={operation} {detail}");
                Action::None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn state(n: usize) -> ViewerState {
        let files = (0..n).map(|i| PathBuf::from(format!("{i}.mkv"))).collect();
        ViewerState::new(files)
    }

    #[test]
    fn drag_sequence_stores_final_offset() {
        let mut s = state(1);
        assert_eq!(s.dispatch(ViewerEvent::ButtonPress { x: 10, y: 10 }), Action::None);
        assert_eq!(
            s.dispatch(ViewerEvent::Motion { x: 40, y: 30 }),
            Action::Redraw {
                clear_background: true
            }
        );
        s.dispatch(ViewerEvent::ButtonRelease { x: 40, y: 30 });
        assert_eq!(s.pan, (30, 20));
    }

    #[test]
    fn single_axis_motion_suppresses_redraw() {
        let mut s = state(1);
        s.dispatch(ViewerEvent::ButtonPress { x: 0, y: 0 });
        s.dispatch(ViewerEvent::Motion { x: 30, y: 20 });
        assert_eq!(s.pan, (30, 20));

        // Only y differs from the stored offset: no redraw, offset untouched.
        assert_eq!(s.dispatch(ViewerEvent::Motion { x: 30, y: 25 }), Action::None);
        assert_eq!(s.pan, (30, 20));
    }

    #[test]
    fn motion_without_press_does_nothing() {
        let mut s = state(1);
        assert_eq!(s.dispatch(ViewerEvent::Motion { x: 12, y: 34 }), Action::None);
        assert_eq!(s.pan, (0, 0));
    }

    #[test]
    fn pan_is_sticky_across_drags() {
        let mut s = state(1);
        s.dispatch(ViewerEvent::ButtonPress { x: 0, y: 0 });
        s.dispatch(ViewerEvent::Motion { x: 5, y: 7 });
        s.dispatch(ViewerEvent::ButtonRelease { x: 5, y: 7 });
        assert_eq!(s.pan, (5, 7));

        // A new press re-anchors but keeps the offset.
        s.dispatch(ViewerEvent::ButtonPress { x: 100, y: 100 });
        assert_eq!(s.pan, (5, 7));
    }

    #[test]
    fn advance_wraps_after_full_cycle() {
        let mut s = state(3);
        let start = s.current_index;
        for _ in 0..3 {
            s.advance();
        }
        assert_eq!(s.current_index, start);
        assert_eq!(s.advance(), 1);
    }

    #[test]
    fn next_file_requests_a_load() {
        let mut s = state(2);
        assert_eq!(s.dispatch(ViewerEvent::NextFile), Action::LoadNext);
        // Dispatch itself does not advance; the controller does that once
        // the old session is closed.
        assert_eq!(s.current_index, 0);
    }

    #[test]
    fn expose_caches_geometry_and_redraws_incrementally() {
        let mut s = state(1);
        let action = s.dispatch(ViewerEvent::Expose {
            width: 640,
            height: 480,
        });
        assert_eq!(
            action,
            Action::Redraw {
                clear_background: false
            }
        );
        assert_eq!(s.last_geometry, (640, 480));
    }

    #[test]
    fn protocol_error_does_not_stop_dispatch() {
        let mut s = state(1);
        let action = s.dispatch(ViewerEvent::ProtocolError {
            operation: "present",
            detail: "bad drawable".into(),
        });
        assert_eq!(action, Action::None);

        // A later event is still handled normally.
        assert_eq!(
            s.dispatch(ViewerEvent::Expose {
                width: 100,
                height: 100
            }),
            Action::Redraw {
                clear_background: false
            }
        );
    }

    #[test]
    fn other_keys_change_nothing() {
        let mut s = state(2);
        assert_eq!(s.dispatch(ViewerEvent::OtherKey("F5".into())), Action::None);
        assert_eq!(s.current_index, 0);
        assert_eq!(s.pan, (0, 0));
    }
}
