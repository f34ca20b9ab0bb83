//! Input handling for keyboard and mouse.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            _ => MouseButton::Left,
        }
    }
}

/// Tracks the current state of keyboard and mouse input.
///
/// Call [`InputState::begin_frame`] once per frame after the frame's input
/// has been consumed; "just pressed" sets and the mouse delta are per-frame.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,
    pressed_buttons: HashSet<MouseButton>,
    /// Last cursor position, `None` until the first move event
    mouse_position: Option<(f32, f32)>,
    /// Cursor movement accumulated since the last frame
    mouse_delta: (f32, f32),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears per-frame state.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.mouse_delta = (0.0, 0.0);
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        self.pressed_buttons.insert(button);
    }

    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.pressed_buttons.remove(&button);
    }

    /// Records a cursor position. The first event only sets the origin.
    pub fn on_mouse_moved(&mut self, x: f32, y: f32) {
        if let Some((old_x, old_y)) = self.mouse_position {
            self.mouse_delta.0 += x - old_x;
            self.mouse_delta.1 += y - old_y;
        }
        self.mouse_position = Some((x, y));
    }

    /// Forgets the cursor origin, e.g. when the cursor leaves the window.
    pub fn on_mouse_left(&mut self) {
        self.mouse_position = None;
    }

    /// Releases everything, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.pressed_keys.clear();
        self.just_pressed_keys.clear();
        self.pressed_buttons.clear();
        self.mouse_position = None;
        self.mouse_delta = (0.0, 0.0);
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// True only in the frame the key went down.
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    /// True if either of two keys is held, e.g. left/right modifiers.
    pub fn is_either_pressed(&self, a: KeyCode, b: KeyCode) -> bool {
        self.is_key_pressed(a) || self.is_key_pressed(b)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_just_pressed_is_edge_triggered() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyF);
        assert!(input.is_key_just_pressed(KeyCode::KeyF));

        input.begin_frame();
        // key repeat while held
        input.on_key_pressed(KeyCode::KeyF);
        assert!(input.is_key_pressed(KeyCode::KeyF));
        assert!(!input.is_key_just_pressed(KeyCode::KeyF));

        input.on_key_released(KeyCode::KeyF);
        input.on_key_pressed(KeyCode::KeyF);
        assert!(input.is_key_just_pressed(KeyCode::KeyF));
    }

    #[test]
    fn test_mouse_delta_accumulates() {
        let mut input = InputState::new();
        input.on_mouse_moved(100.0, 100.0);
        assert_eq!(input.mouse_delta(), (0.0, 0.0));

        input.on_mouse_moved(110.0, 95.0);
        input.on_mouse_moved(115.0, 90.0);
        assert_eq!(input.mouse_delta(), (15.0, -10.0));

        input.begin_frame();
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_mouse_left_resets_origin() {
        let mut input = InputState::new();
        input.on_mouse_moved(10.0, 10.0);
        input.on_mouse_left();
        input.on_mouse_moved(500.0, 500.0);
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_clear_releases_keys() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::ShiftLeft);
        input.on_mouse_pressed(MouseButton::Left);
        input.clear();
        assert!(!input.is_either_pressed(KeyCode::ShiftLeft, KeyCode::ShiftRight));
        assert!(!input.is_mouse_pressed(MouseButton::Left));
    }
}
