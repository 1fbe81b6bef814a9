use glam::{Mat4, Vec2, Vec3};

pub const DEFAULT_YAW: f32 = -90.0;
pub const DEFAULT_PITCH: f32 = 0.0;
pub const DEFAULT_SPEED: f32 = 2.5;
pub const DEFAULT_SENSITIVITY: f32 = 0.1;
pub const DEFAULT_ZOOM: f32 = 45.0;

const PITCH_LIMIT: f32 = 89.0;
const MIN_ZOOM: f32 = 1.0;
const MAX_ZOOM: f32 = 45.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CameraMovement {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

/// Fly camera driven by yaw/pitch angles in degrees.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub front: Vec3,
    pub up: Vec3,
    pub right: Vec3,
    pub world_up: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub movement_speed: f32,
    pub mouse_sensitivity: f32,
    /// Vertical field of view in degrees.
    pub zoom: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO)
    }
}

impl Camera {
    /// Camera at `position` turned to face `focus`.
    pub fn new(position: Vec3, focus: Vec3) -> Self {
        let mut camera = Self {
            position,
            front: Vec3::NEG_Z,
            up: Vec3::Y,
            right: Vec3::X,
            world_up: Vec3::Y,
            yaw: DEFAULT_YAW,
            pitch: DEFAULT_PITCH,
            movement_speed: DEFAULT_SPEED,
            mouse_sensitivity: DEFAULT_SENSITIVITY,
            zoom: DEFAULT_ZOOM,
            near: 0.1,
            far: 100.0,
        };
        camera.update_vectors();
        camera.turn_to(focus);
        camera
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.zoom.to_radians(), aspect, self.near, self.far)
    }

    /// Point the camera at `point`. A point straight above or below keeps
    /// the pitch inside the usual limit.
    pub fn turn_to(&mut self, point: Vec3) {
        let offset = self.position - point;
        if offset == Vec3::ZERO {
            return;
        }
        let offset_xz = Vec2::new(offset.x, offset.z).length();

        if offset.x == 0.0 {
            self.yaw = if offset.z > 0.0 { -90.0 } else { 90.0 };
        } else {
            let angle = (offset.z / offset.x).atan().to_degrees();
            self.yaw = if offset.x < 0.0 {
                angle
            } else if offset.z < 0.0 {
                angle + 180.0
            } else {
                angle - 180.0
            };
        }
        self.pitch = (-offset.y / offset_xz)
            .atan()
            .to_degrees()
            .clamp(-PITCH_LIMIT, PITCH_LIMIT);

        self.update_vectors();
    }

    pub fn process_keyboard(&mut self, movement: CameraMovement, delta_time: f32) {
        let velocity = self.movement_speed * delta_time;
        let ground_front = Vec3::new(self.front.x, 0.0, self.front.z).normalize_or_zero();
        match movement {
            CameraMovement::Forward => self.position += ground_front * velocity,
            CameraMovement::Backward => self.position -= ground_front * velocity,
            CameraMovement::Left => self.position -= self.right * velocity,
            CameraMovement::Right => self.position += self.right * velocity,
            CameraMovement::Up => self.position += self.world_up * velocity,
            CameraMovement::Down => self.position -= self.world_up * velocity,
        }
    }

    pub fn process_mouse_movement(&mut self, x_offset: f32, y_offset: f32, constrain_pitch: bool) {
        self.yaw += x_offset * self.mouse_sensitivity;
        self.pitch += y_offset * self.mouse_sensitivity;
        if constrain_pitch {
            self.pitch = self.pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        }
        self.update_vectors();
    }

    pub fn process_mouse_scroll(&mut self, y_offset: f32) {
        self.zoom = (self.zoom - y_offset).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    fn update_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos())
            .normalize();
        self.right = self.front.cross(self.world_up).normalize();
        self.up = self.right.cross(self.front).normalize();
    }
}
