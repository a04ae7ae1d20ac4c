//! Keyboard to camera intents.
//!
//! | Key          | Intent                      |
//! |--------------|-----------------------------|
//! | Up / Down    | move forward / backward     |
//! | O / L        | move up / down              |
//! | Left / Right | move left / right           |
//! | I / K        | tilt up / down              |
//! | Escape       | quit                        |

use ember_core::camera::{CameraIntent, CameraIntents};
use winit::event::ElementState;
use winit::keyboard::KeyCode;

/// What the frame loop should do after a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Keep running.
    Continue,
    /// Close the window.
    Quit,
}

/// The camera intent bound to `key`, if any.
#[must_use]
pub fn intent_for(key: KeyCode) -> Option<CameraIntent> {
    let intent = match key {
        KeyCode::ArrowUp => CameraIntent::MoveForward,
        KeyCode::ArrowDown => CameraIntent::MoveBackward,
        KeyCode::KeyO => CameraIntent::MoveUp,
        KeyCode::KeyL => CameraIntent::MoveDown,
        KeyCode::ArrowLeft => CameraIntent::MoveLeft,
        KeyCode::ArrowRight => CameraIntent::MoveRight,
        KeyCode::KeyI => CameraIntent::TiltUp,
        KeyCode::KeyK => CameraIntent::TiltDown,
        _ => return None,
    };
    Some(intent)
}

/// Intents held down right now.
#[derive(Debug, Default)]
pub struct InputState {
    held: CameraIntents,
}

impl InputState {
    /// Nothing held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one key event in.
    pub fn handle_key(&mut self, key: KeyCode, state: ElementState) -> KeyAction {
        if key == KeyCode::Escape {
            return match state {
                ElementState::Pressed => KeyAction::Quit,
                ElementState::Released => KeyAction::Continue,
            };
        }
        if let Some(intent) = intent_for(key) {
            match state {
                ElementState::Pressed => self.held.insert(intent),
                ElementState::Released => self.held.remove(intent),
            }
        }
        KeyAction::Continue
    }

    /// Drops every held intent, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.held = CameraIntents::NONE;
    }

    /// Intents for this frame.
    #[must_use]
    pub fn intents(&self) -> CameraIntents {
        self.held
    }
}
