use glam::{Mat4, Quat, Vec3, Vec4};
use winit::{event::MouseButton, keyboard::KeyCode};

const MOVE_SPEED: f32 = 0.07;
const MOUSE_SENSITIVITY: f32 = 1.0 / 500.0;

/// First person fly camera: WASD moves along the view axes, right mouse drag looks around.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub velocity: Vec3,
    pub position: Vec3,
    /// Radians around +X.
    pub pitch: f32,
    /// Radians around -Y.
    pub yaw: f32,
    looking: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 5.0))
    }
}

impl Camera {
    pub fn new(position: Vec3) -> Self {
        Self { velocity: Vec3::ZERO, position, pitch: 0.0, yaw: 0.0, looking: false }
    }

    pub fn rotation_matrix(&self) -> Mat4 {
        let pitch_rotation = Quat::from_axis_angle(Vec3::X, self.pitch);
        let yaw_rotation = Quat::from_axis_angle(Vec3::NEG_Y, self.yaw);
        Mat4::from_quat(yaw_rotation) * Mat4::from_quat(pitch_rotation)
    }

    /// Inverse of the camera's world transform.
    pub fn view_matrix(&self) -> Mat4 {
        (Mat4::from_translation(self.position) * self.rotation_matrix()).inverse()
    }

    pub fn update(&mut self) {
        let step = self.rotation_matrix() * Vec4::from((self.velocity * MOVE_SPEED, 0.0));
        self.position += step.truncate();
    }

    pub fn process_key(&mut self, key: KeyCode, pressed: bool) {
        let amount = |value: f32| if pressed { value } else { 0.0 };
        match key {
            KeyCode::KeyW => self.velocity.z = amount(-1.0),
            KeyCode::KeyS => self.velocity.z = amount(1.0),
            KeyCode::KeyA => self.velocity.x = amount(-1.0),
            KeyCode::KeyD => self.velocity.x = amount(1.0),
            _ => (),
        }
    }

    pub fn process_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        if button == MouseButton::Right {
            self.looking = pressed;
        }
    }

    pub fn looking(&self) -> bool {
        self.looking
    }

    /// Raw pointer motion; ignored unless the right button is held.
    pub fn process_mouse_motion(&mut self, delta_x: f64, delta_y: f64) {
        if !self.looking {
            return;
        }
        self.yaw += delta_x as f32 * MOUSE_SENSITIVITY;
        self.pitch -= delta_y as f32 * MOUSE_SENSITIVITY;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!(a.abs_diff_eq(b, 1e-5), "{a} != {b}");
    }

    #[test]
    fn view_moves_world_opposite_to_camera() {
        let camera = Camera::new(Vec3::new(1.0, 2.0, 3.0));
        assert_close(camera.view_matrix().transform_point3(Vec3::new(1.0, 2.0, 3.0)), Vec3::ZERO);
    }

    #[test]
    fn forward_follows_yaw() {
        let mut camera = Camera::new(Vec3::ZERO);
        camera.process_key(KeyCode::KeyW, true);
        camera.update();
        assert_close(camera.position, Vec3::new(0.0, 0.0, -MOVE_SPEED));

        camera.position = Vec3::ZERO;
        camera.yaw = std::f32::consts::FRAC_PI_2;
        camera.update();
        assert_close(camera.position, Vec3::new(MOVE_SPEED, 0.0, 0.0));

        camera.process_key(KeyCode::KeyW, false);
        assert_eq!(camera.velocity, Vec3::ZERO);
    }

    #[test]
    fn mouse_look_requires_right_button() {
        let mut camera = Camera::default();
        camera.process_mouse_motion(500.0, 250.0);
        assert_eq!((camera.yaw, camera.pitch), (0.0, 0.0));

        camera.process_mouse_button(MouseButton::Right, true);
        camera.process_mouse_motion(500.0, 250.0);
        assert_eq!((camera.yaw, camera.pitch), (1.0, -0.5));

        camera.process_mouse_button(MouseButton::Right, false);
        assert!(!camera.looking());
    }
}
