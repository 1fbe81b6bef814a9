// input.rs
//
// Per-frame input state fed from winit events: held keys, mouse motion and
// scroll, and the player controls that move the camera.

use std::collections::HashSet;

use glam::Vec2;
use winit::keyboard::KeyCode;

use crate::scene::{Camera, CameraMovement};

/// Mouse motion and scroll collected between frames.
#[derive(Clone, Debug, Default)]
pub struct Mouse {
    grabbed: bool,
    last_position: Option<Vec2>,
    offset: Vec2,
    scroll: f32,
}

impl Mouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// A grabbed cursor reports raw device motion; a free one reports
    /// window positions.
    pub fn set_grabbed(&mut self, grabbed: bool) {
        self.grabbed = grabbed;
        self.last_position = None;
    }

    /// Device motion, counted only while the cursor is grabbed.
    pub fn raw_motion(&mut self, dx: f32, dy: f32) {
        if self.grabbed {
            self.motion(dx, dy);
        }
    }

    /// Absolute cursor position in window coordinates, counted only while
    /// the cursor is free. The first event only sets the reference point.
    pub fn cursor_moved(&mut self, x: f32, y: f32) {
        if self.grabbed {
            return;
        }
        let position = Vec2::new(x, y);
        let last = self.last_position.unwrap_or(position);
        self.motion(position.x - last.x, position.y - last.y);
        self.last_position = Some(position);
    }

    /// Relative motion in window axes (y grows downwards).
    fn motion(&mut self, dx: f32, dy: f32) {
        self.offset += Vec2::new(dx, -dy);
    }

    pub fn scrolled(&mut self, lines: f32) {
        self.scroll += lines;
    }

    pub fn take_offsets(&mut self) -> Vec2 {
        std::mem::take(&mut self.offset)
    }

    pub fn take_scroll(&mut self) -> f32 {
        std::mem::take(&mut self.scroll)
    }
}

/// Keys currently held down.
#[derive(Clone, Debug, Default)]
pub struct KeyState {
    held: HashSet<KeyCode>,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.held.insert(key);
        } else {
            self.held.remove(&key);
        }
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }

    pub fn release_all(&mut self) {
        self.held.clear();
    }
}

/// Reports a key once per press rather than every frame it is held.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyLatch {
    held: bool,
}

impl KeyLatch {
    pub fn pressed(&mut self, down: bool) -> bool {
        let rising = down && !self.held;
        self.held = down;
        rising
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerAction {
    Continue,
    Quit,
}

const MOVEMENT_KEYS: [(KeyCode, CameraMovement); 6] = [
    (KeyCode::KeyW, CameraMovement::Forward),
    (KeyCode::KeyS, CameraMovement::Backward),
    (KeyCode::KeyA, CameraMovement::Left),
    (KeyCode::KeyD, CameraMovement::Right),
    (KeyCode::Space, CameraMovement::Up),
    (KeyCode::KeyC, CameraMovement::Down),
];

/// Mouse-look and WASD movement for a camera.
#[derive(Clone, Debug, Default)]
pub struct Player {
    pub mouse: Mouse,
}

impl Player {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_input(&mut self, camera: &mut Camera, keys: &KeyState, delta_time: f32) -> PlayerAction {
        let offset = self.mouse.take_offsets();
        camera.process_mouse_movement(offset.x, offset.y, true);
        camera.process_mouse_scroll(self.mouse.take_scroll());

        if keys.is_pressed(KeyCode::Escape) {
            return PlayerAction::Quit;
        }
        for (key, movement) in MOVEMENT_KEYS {
            if keys.is_pressed(key) {
                camera.process_keyboard(movement, delta_time);
            }
        }
        PlayerAction::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn first_cursor_event_sets_the_baseline() {
        let mut mouse = Mouse::new();
        mouse.cursor_moved(600.0, 450.0);
        assert_eq!(mouse.take_offsets(), Vec2::ZERO);

        mouse.cursor_moved(610.0, 440.0);
        mouse.cursor_moved(615.0, 430.0);
        assert_eq!(mouse.take_offsets(), Vec2::new(15.0, 20.0));
        assert_eq!(mouse.take_offsets(), Vec2::ZERO);
    }

    #[test]
    fn grab_state_picks_the_motion_source() {
        let mut mouse = Mouse::new();
        mouse.raw_motion(5.0, 5.0);
        mouse.cursor_moved(0.0, 0.0);
        mouse.cursor_moved(3.0, 4.0);
        assert_eq!(mouse.take_offsets(), Vec2::new(3.0, -4.0));

        mouse.set_grabbed(true);
        mouse.cursor_moved(50.0, 50.0);
        mouse.raw_motion(2.0, -1.0);
        assert_eq!(mouse.take_offsets(), Vec2::new(2.0, 1.0));

        // releasing the grab starts a fresh baseline
        mouse.set_grabbed(false);
        mouse.cursor_moved(100.0, 100.0);
        assert_eq!(mouse.take_offsets(), Vec2::ZERO);
    }

    #[test]
    fn scroll_is_drained() {
        let mut mouse = Mouse::new();
        mouse.scrolled(1.0);
        mouse.scrolled(2.0);
        assert_eq!(mouse.take_scroll(), 3.0);
        assert_eq!(mouse.take_scroll(), 0.0);
    }

    #[test]
    fn latch_fires_on_press_only() {
        let mut latch = KeyLatch::default();
        assert!(latch.pressed(true));
        assert!(!latch.pressed(true));
        assert!(!latch.pressed(false));
        assert!(latch.pressed(true));
    }

    #[test]
    fn player_moves_and_quits() {
        let mut camera = Camera::default();
        let mut keys = KeyState::new();
        let mut player = Player::new();

        keys.set(KeyCode::KeyW, true);
        keys.set(KeyCode::Space, true);
        assert_eq!(player.process_input(&mut camera, &keys, 0.4), PlayerAction::Continue);
        assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 1.0, 2.0), 1e-4));

        keys.set(KeyCode::KeyW, false);
        keys.set(KeyCode::Escape, true);
        assert_eq!(player.process_input(&mut camera, &keys, 0.4), PlayerAction::Quit);
    }
}
