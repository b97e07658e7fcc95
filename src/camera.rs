use crate::globe::point_to_lat_lng;
use crate::primitives::{CameraView, GroundPicker, ScreenPoint};
use glam::{DMat4, DQuat, DVec3, DVec4, EulerRot};
use h3o::LatLng;
use std::f64::consts::FRAC_PI_2;
use wgpu::util::DeviceExt;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};

pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

// Altitudes are in globe radii above the surface.
const DEFAULT_ALTITUDE: f64 = 2.0;
const MIN_ALTITUDE: f64 = 0.002;
const MAX_ALTITUDE: f64 = 12.0;
const FOVY_DEGREES: f64 = 45.0;

const ORBIT_SENSITIVITY: f64 = 0.002; // radians per pixel at the default altitude
const SCROLL_ZOOM_FACTOR: f64 = 0.85; // altitude multiplier per wheel line
const PIXEL_SCROLL_PER_LINE: f64 = 40.0;
const ORBIT_SMOOTHING: f64 = 0.85; // 0-1, higher = more smoothing
const PITCH_LIMIT: f64 = FRAC_PI_2 - 0.05;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    view_position: [f32; 4],
}

/// Where the camera is, independent of any GPU state. Orbits the globe
/// centre at `altitude` radii above the surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrbitPose {
    pub yaw: f64,
    pub pitch: f64,
    pub altitude: f64,
    pub fovy: f64,
    pub viewport: (u32, u32),
}

impl OrbitPose {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            altitude: DEFAULT_ALTITUDE,
            fovy: FOVY_DEGREES.to_radians(),
            viewport: (width.max(1), height.max(1)),
        }
    }

    pub fn position(&self) -> DVec3 {
        let rotation = DQuat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0);
        rotation * DVec3::new(0.0, 0.0, 1.0 + self.altitude)
    }

    fn aspect_ratio(&self) -> f64 {
        f64::from(self.viewport.0) / f64::from(self.viewport.1)
    }

    /// Near plane tracks altitude so close-up views keep depth precision.
    fn clip_planes(&self) -> (f64, f64) {
        let znear = (self.altitude * 0.5).max(1e-5);
        let zfar = 1.0 + self.altitude + 1.5;
        (znear, zfar)
    }

    pub fn view_proj(&self) -> DMat4 {
        let (znear, zfar) = self.clip_planes();
        let projection = DMat4::perspective_rh(self.fovy, self.aspect_ratio(), znear, zfar);
        let view = DMat4::look_at_rh(self.position(), DVec3::ZERO, DVec3::Y);
        projection * view
    }

    fn uniform(&self) -> CameraUniform {
        let position = self.position().as_vec3();
        CameraUniform {
            view_proj: self.view_proj().as_mat4().to_cols_array_2d(),
            view_position: [position.x, position.y, position.z, 1.0],
        }
    }
}

impl GroundPicker for OrbitPose {
    fn pick_ground(&self, point: ScreenPoint) -> Option<LatLng> {
        let (width, height) = self.viewport;
        let ndc_x = 2.0 * f64::from(point.x) / f64::from(width) - 1.0;
        let ndc_y = 1.0 - 2.0 * f64::from(point.y) / f64::from(height);

        let inverse = self.view_proj().inverse();
        let unproject = |z: f64| {
            let p = inverse * DVec4::new(ndc_x, ndc_y, z, 1.0);
            p.truncate() / p.w
        };
        let origin = self.position();
        let direction = (unproject(1.0) - unproject(0.0)).try_normalize()?;

        // ray against the unit sphere
        let b = origin.dot(direction);
        let c = origin.length_squared() - 1.0;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let t = -b - discriminant.sqrt();
        if t < 0.0 {
            return None;
        }
        point_to_lat_lng(origin + direction * t)
    }
}

impl CameraView for OrbitPose {
    fn height_m(&self) -> f64 {
        self.altitude * EARTH_RADIUS_M
    }

    fn fov_y_radians(&self) -> f64 {
        self.fovy
    }

    fn aspect(&self) -> f64 {
        self.aspect_ratio()
    }

    fn viewport_center(&self) -> ScreenPoint {
        ScreenPoint::new(self.viewport.0 as f32 / 2.0, self.viewport.1 as f32 / 2.0)
    }
}

pub struct Camera {
    pose: OrbitPose,
    target_yaw: f64,
    target_pitch: f64,
    target_altitude: f64,

    is_orbiting: bool,
    last_mouse_position: Option<(f64, f64)>,

    uniform_buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
}

impl Camera {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let pose = OrbitPose::new(width, height);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Camera Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Uniform Buffer"),
            contents: bytemuck::cast_slice(&[pose.uniform()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Self {
            target_yaw: pose.yaw,
            target_pitch: pose.pitch,
            target_altitude: pose.altitude,
            pose,
            is_orbiting: false,
            last_mouse_position: None,
            uniform_buffer,
            bind_group_layout,
            bind_group,
        }
    }

    pub fn pose(&self) -> &OrbitPose {
        &self.pose
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.pose.viewport = (width.max(1), height.max(1));
    }

    pub fn reset(&mut self) {
        let defaults = OrbitPose::new(self.pose.viewport.0, self.pose.viewport.1);
        self.target_yaw = defaults.yaw;
        self.target_pitch = defaults.pitch;
        self.target_altitude = defaults.altitude;
    }

    /// Returns true when the event changed where the camera is heading.
    pub fn process_input(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        logical_key: winit::keyboard::Key::Character(k),
                        ..
                    },
                ..
            } if k.eq_ignore_ascii_case("r") => {
                self.reset();
                true
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.is_orbiting = *state == ElementState::Pressed;
                self.last_mouse_position = None;
                false
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => f64::from(*y),
                    MouseScrollDelta::PixelDelta(pos) => pos.y / PIXEL_SCROLL_PER_LINE,
                };
                self.target_altitude =
                    (self.target_altitude * SCROLL_ZOOM_FACTOR.powf(lines)).clamp(MIN_ALTITUDE, MAX_ALTITUDE);
                true
            }
            WindowEvent::CursorMoved { position, .. } if self.is_orbiting => {
                let new_pos = (position.x, position.y);
                if let Some((last_x, last_y)) = self.last_mouse_position {
                    // closer to the ground, the globe turns slower per pixel
                    let sensitivity = ORBIT_SENSITIVITY * (self.pose.altitude / DEFAULT_ALTITUDE).min(1.5);
                    self.target_yaw -= (new_pos.0 - last_x) * sensitivity;
                    self.target_pitch =
                        (self.target_pitch - (new_pos.1 - last_y) * sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
                }
                self.last_mouse_position = Some(new_pos);
                true
            }
            _ => false,
        }
    }

    /// Eases the pose toward its targets. Returns true while still moving.
    pub fn update(&mut self) -> bool {
        let mut moving = false;
        let mut ease = |current: &mut f64, target: f64, tolerance: f64| {
            if (*current - target).abs() > tolerance {
                *current = *current * ORBIT_SMOOTHING + target * (1.0 - ORBIT_SMOOTHING);
                moving = true;
            } else {
                *current = target;
            }
        };
        ease(&mut self.pose.yaw, self.target_yaw, 1e-5);
        ease(&mut self.pose.pitch, self.target_pitch, 1e-5);
        ease(&mut self.pose.altitude, self.target_altitude, self.target_altitude * 1e-3);
        moving
    }

    pub fn update_buffer(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[self.pose.uniform()]));
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn viewport_centre_picks_the_subcamera_point() {
        let mut pose = OrbitPose::new(1280, 720);
        pose.yaw = 0.7;
        pose.pitch = -0.4;
        let expected = point_to_lat_lng(pose.position()).unwrap();
        let picked = pose.pick_ground(pose.viewport_center()).unwrap();
        assert_relative_eq!(picked.lat(), expected.lat(), epsilon = 1e-6);
        assert_relative_eq!(picked.lng(), expected.lng(), epsilon = 1e-6);
    }

    #[test]
    fn corners_miss_the_globe_from_far_away() {
        let mut pose = OrbitPose::new(800, 600);
        pose.altitude = MAX_ALTITUDE;
        assert!(pose.pick_ground(ScreenPoint::new(0.0, 0.0)).is_none());
        assert!(pose.pick_ground(pose.viewport_center()).is_some());
    }

    #[test]
    fn close_up_picks_stay_near_the_centre() {
        let mut pose = OrbitPose::new(800, 600);
        pose.altitude = MIN_ALTITUDE;
        let centre = pose.pick_ground(pose.viewport_center()).unwrap();
        let corner = pose.pick_ground(ScreenPoint::new(0.0, 0.0)).unwrap();
        assert!((centre.lat() - corner.lat()).abs() < 1.0);
        assert!((centre.lng() - corner.lng()).abs() < 1.0);
    }

    #[test]
    fn view_reports_height_and_aspect() {
        let pose = OrbitPose::new(1000, 500);
        assert_relative_eq!(pose.height_m(), DEFAULT_ALTITUDE * EARTH_RADIUS_M);
        assert_relative_eq!(pose.aspect(), 2.0);
        assert_relative_eq!(pose.fov_y_radians(), FOVY_DEGREES.to_radians());
        assert_eq!(pose.viewport_center(), ScreenPoint::new(500.0, 250.0));
    }
}
