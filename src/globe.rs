use crate::camera::Camera;
use crate::render::{create_render_pipeline, create_shader_module, Capabilities, PipelineDesc};
use bytemuck::{Pod, Zeroable};
use glam::{DVec3, Mat4};
use h3o::LatLng;
use wgpu::util::DeviceExt;

const EARTH_RADIUS: f64 = 1.0; // Normalized globe radius

const STACKS: u32 = 90;
const SLICES: u32 = 180;

const OCEAN_COLOR: [f32; 3] = [0.06, 0.16, 0.32];
const POLAR_COLOR: [f32; 3] = [0.55, 0.62, 0.7];

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
    color: [f32; 3],
}

impl Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // Position
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // Normal
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // Color
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct GlobeUniform {
    model: [[f32; 4]; 4],
}

/// The solid globe the grid is drawn over.
pub struct Globe {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,
    globe_bind_group: wgpu::BindGroup,
}

impl Globe {
    pub fn new(device: &wgpu::Device, camera: &Camera, caps: &Capabilities) -> Self {
        let (vertices, indices) = generate_sphere(STACKS, SLICES);

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Globe Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Globe Index Buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let globe_uniform = GlobeUniform {
            model: Mat4::IDENTITY.to_cols_array_2d(),
        };
        let globe_uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Globe Uniform Buffer"),
            contents: bytemuck::cast_slice(&[globe_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let globe_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Globe Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let globe_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Globe Bind Group"),
            layout: &globe_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globe_uniform_buffer.as_entire_binding(),
            }],
        });

        let shader = create_shader_module(device, "Globe Shader", include_str!("../shaders/globe.wgsl"));
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Globe Pipeline Layout"),
            bind_group_layouts: &[&globe_bind_group_layout, camera.bind_group_layout()],
            push_constant_ranges: &[],
        });
        let pipeline = create_render_pipeline(
            device,
            &PipelineDesc {
                label: "Globe Render Pipeline",
                shader: &shader,
                layout: &pipeline_layout,
                vertex_layouts: &[Vertex::desc()],
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                depth_write: true,
            },
            caps,
        );

        Self {
            pipeline,
            vertex_buffer,
            index_buffer,
            num_indices: indices.len() as u32,
            globe_bind_group,
        }
    }

    pub fn render<'a>(&'a self, render_pass: &mut wgpu::RenderPass<'a>, camera: &'a Camera) {
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        render_pass.set_bind_group(0, &self.globe_bind_group, &[]);
        render_pass.set_bind_group(1, camera.bind_group(), &[]);
        render_pass.draw_indexed(0..self.num_indices, 0, 0..1);
    }
}

/// Degrees to a point on the globe, scaled by `radius`.
pub fn lat_lng_to_point(lat: f64, lng: f64, radius: f64) -> DVec3 {
    let lat_rad = lat.to_radians();
    let lng_rad = lng.to_radians();

    let x = (-lng_rad).cos() * lat_rad.cos();
    let z = (-lng_rad).sin() * lat_rad.cos();
    let y = lat_rad.sin();

    DVec3::new(x, y, z) * radius * EARTH_RADIUS
}

/// Inverse of [`lat_lng_to_point`] for any point off the origin.
pub fn point_to_lat_lng(point: DVec3) -> Option<LatLng> {
    let p = point.try_normalize()?;
    let lat = p.y.clamp(-1.0, 1.0).asin().to_degrees();
    let lng = (-p.z).atan2(p.x).to_degrees();
    LatLng::new(lat, lng).ok()
}

/// Points along the great arc from `start` to `end` (both on the unit
/// sphere), endpoints included, no more than `max_step` radians apart.
pub fn great_arc(start: DVec3, end: DVec3, max_step: f64) -> Vec<DVec3> {
    let angle = start.dot(end).clamp(-1.0, 1.0).acos();
    let segments = ((angle / max_step).ceil() as usize).max(1);
    let sin_angle = angle.sin();
    if sin_angle.abs() < 1e-12 {
        return vec![start, end];
    }

    let mut points = Vec::with_capacity(segments + 1);
    points.push(start);
    for i in 1..segments {
        let t = i as f64 / segments as f64;
        let a = (angle * (1.0 - t)).sin() / sin_angle;
        let b = (angle * t).sin() / sin_angle;
        points.push((start * a + end * b).normalize());
    }
    points.push(end);
    points
}

fn generate_sphere(stacks: u32, slices: u32) -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::with_capacity(((stacks + 1) * (slices + 1)) as usize);
    for i in 0..=stacks {
        let lat = 90.0 - 180.0 * f64::from(i) / f64::from(stacks);
        let polar = (lat.abs() / 90.0).powi(6) as f32;
        let color = std::array::from_fn(|c| OCEAN_COLOR[c] + (POLAR_COLOR[c] - OCEAN_COLOR[c]) * polar);
        for j in 0..=slices {
            let lng = -180.0 + 360.0 * f64::from(j) / f64::from(slices);
            let position = lat_lng_to_point(lat, lng, 1.0).as_vec3().to_array();
            vertices.push(Vertex {
                position,
                normal: position,
                color,
            });
        }
    }

    // Rows run north to south, columns west to east; both windings below
    // face outward. Triangles collapsed onto a pole are skipped.
    let row = slices + 1;
    let mut indices = Vec::with_capacity((stacks * slices * 6) as usize);
    for i in 0..stacks {
        for j in 0..slices {
            let a = i * row + j;
            let b = a + row;
            let c = a + 1;
            let d = b + 1;
            if i != 0 {
                indices.extend_from_slice(&[a, b, c]);
            }
            if i != stacks - 1 {
                indices.extend_from_slice(&[c, b, d]);
            }
        }
    }
    (vertices, indices)
}
