//! GPU side of the grid: turns the outlines and fill the grid core asks for
//! into line and triangle buffers drawn over the globe.

use crate::camera::Camera;
use crate::geometry::{CellKey, Polygon};
use crate::globe::{great_arc, lat_lng_to_point};
use crate::primitives::{PrimitiveSink, Rgba};
use crate::render::{create_render_pipeline, create_shader_module, Capabilities, PipelineDesc};
use bytemuck::{Pod, Zeroable};
use glam::DVec3;
use log::trace;
use std::collections::HashMap;
use wgpu::util::DeviceExt;

// Lifted off the surface so the globe's depth doesn't swallow them.
const OUTLINE_LIFT: f64 = 1.0001;
const FILL_LIFT: f64 = 1.00005;
/// Longest straight segment along a cell edge, radians.
const MAX_ARC_STEP: f64 = 0.01;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
struct OverlayVertex {
    position: [f32; 3],
    color: [f32; 4],
}

impl OverlayVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4];

    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<OverlayVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[derive(Clone, Debug)]
struct Shape {
    /// Ring on the unit sphere, without the closing vertex.
    ring: Vec<DVec3>,
    color: Rgba,
}

impl Shape {
    fn new(polygon: &Polygon, color: Rgba) -> Self {
        let mut ring: Vec<DVec3> = polygon
            .vertices()
            .iter()
            .map(|v| lat_lng_to_point(v.lat, v.lon, 1.0))
            .collect();
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        Self { ring, color }
    }
}

/// CPU copy of every primitive currently alive. Knows nothing about wgpu.
#[derive(Default)]
struct OverlayScene {
    outlines: HashMap<CellKey, Shape>,
    fill: Option<Shape>,
    dirty: bool,
}

impl OverlayScene {
    fn line_vertices(&self) -> Vec<OverlayVertex> {
        let mut vertices = Vec::new();
        for shape in self.outlines.values() {
            if shape.color.alpha() <= 0.0 || shape.ring.len() < 2 {
                continue;
            }
            let color = shape.color.0;
            for (i, start) in shape.ring.iter().enumerate() {
                let end = shape.ring[(i + 1) % shape.ring.len()];
                let arc = great_arc(*start, end, MAX_ARC_STEP);
                for pair in arc.windows(2) {
                    vertices.push(vertex(pair[0], OUTLINE_LIFT, color));
                    vertices.push(vertex(pair[1], OUTLINE_LIFT, color));
                }
            }
        }
        vertices
    }

    /// Fan triangulation; H3 cells are convex.
    fn fill_vertices(&self) -> Vec<OverlayVertex> {
        let Some(shape) = self.fill.as_ref().filter(|s| s.ring.len() >= 3) else {
            return Vec::new();
        };
        let color = shape.color.0;
        let apex = shape.ring[0];
        shape.ring[1..]
            .windows(2)
            .flat_map(|pair| [apex, pair[0], pair[1]])
            .map(|p| vertex(p, FILL_LIFT, color))
            .collect()
    }
}

fn vertex(point: DVec3, lift: f64, color: [f32; 4]) -> OverlayVertex {
    OverlayVertex {
        position: (point * lift).as_vec3().to_array(),
        color,
    }
}

impl PrimitiveSink for OverlayScene {
    fn add_outline(&mut self, key: CellKey, polygon: &Polygon, color: Rgba) {
        self.outlines.insert(key, Shape::new(polygon, color));
        self.dirty = true;
    }

    fn update_outline(&mut self, key: CellKey, polygon: &Polygon, color: Rgba) {
        match self.outlines.get_mut(&key) {
            Some(shape) if shape.color != color => {
                shape.color = color;
                self.dirty = true;
            }
            Some(_) => {}
            None => self.add_outline(key, polygon, color),
        }
    }

    fn remove_outline(&mut self, key: CellKey) {
        if self.outlines.remove(&key).is_some() {
            self.dirty = true;
        }
    }

    fn set_fill(&mut self, polygon: &Polygon, color: Rgba) {
        self.fill = Some(Shape::new(polygon, color));
        self.dirty = true;
    }

    fn remove_fill(&mut self) {
        if self.fill.take().is_some() {
            self.dirty = true;
        }
    }
}

struct DrawBuffer {
    buffer: wgpu::Buffer,
    count: u32,
}

impl DrawBuffer {
    fn create(device: &wgpu::Device, label: &str, vertices: &[OverlayVertex]) -> Option<Self> {
        if vertices.is_empty() {
            return None;
        }
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Some(Self {
            buffer,
            count: vertices.len() as u32,
        })
    }
}

/// [`PrimitiveSink`] backed by wgpu. Changes are batched and uploaded once
/// per frame by [`OverlayRenderer::upload`].
pub struct OverlayRenderer {
    scene: OverlayScene,
    line_pipeline: wgpu::RenderPipeline,
    fill_pipeline: wgpu::RenderPipeline,
    lines: Option<DrawBuffer>,
    fill: Option<DrawBuffer>,
}

impl OverlayRenderer {
    pub fn new(device: &wgpu::Device, camera: &Camera, caps: &Capabilities) -> Self {
        let shader = create_shader_module(device, "Overlay Shader", include_str!("../shaders/overlay.wgsl"));
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Overlay Pipeline Layout"),
            bind_group_layouts: &[camera.bind_group_layout()],
            push_constant_ranges: &[],
        });
        let vertex_layouts = [OverlayVertex::desc()];
        let pipeline = |label, topology| {
            create_render_pipeline(
                device,
                &PipelineDesc {
                    label,
                    shader: &shader,
                    layout: &layout,
                    vertex_layouts: &vertex_layouts,
                    topology,
                    cull_mode: None,
                    depth_write: false,
                },
                caps,
            )
        };

        Self {
            scene: OverlayScene::default(),
            line_pipeline: pipeline("Overlay Line Pipeline", wgpu::PrimitiveTopology::LineList),
            fill_pipeline: pipeline("Overlay Fill Pipeline", wgpu::PrimitiveTopology::TriangleList),
            lines: None,
            fill: None,
        }
    }

    pub fn outline_count(&self) -> usize {
        self.scene.outlines.len()
    }

    /// Rebuilds the vertex buffers if anything changed since the last call.
    pub fn upload(&mut self, device: &wgpu::Device) {
        if !std::mem::take(&mut self.scene.dirty) {
            return;
        }
        let lines = self.scene.line_vertices();
        let fill = self.scene.fill_vertices();
        trace!("overlay upload: {} line vertices, {} fill vertices", lines.len(), fill.len());
        self.lines = DrawBuffer::create(device, "Overlay Line Buffer", &lines);
        self.fill = DrawBuffer::create(device, "Overlay Fill Buffer", &fill);
    }

    pub fn render<'a>(&'a self, render_pass: &mut wgpu::RenderPass<'a>, camera: &'a Camera) {
        render_pass.set_bind_group(0, camera.bind_group(), &[]);
        for (pipeline, buffer) in [(&self.fill_pipeline, &self.fill), (&self.line_pipeline, &self.lines)] {
            if let Some(buffer) = buffer {
                render_pass.set_pipeline(pipeline);
                render_pass.set_vertex_buffer(0, buffer.buffer.slice(..));
                render_pass.draw(0..buffer.count, 0..1);
            }
        }
    }
}

impl PrimitiveSink for OverlayRenderer {
    fn add_outline(&mut self, key: CellKey, polygon: &Polygon, color: Rgba) {
        self.scene.add_outline(key, polygon, color);
    }

    fn update_outline(&mut self, key: CellKey, polygon: &Polygon, color: Rgba) {
        self.scene.update_outline(key, polygon, color);
    }

    fn remove_outline(&mut self, key: CellKey) {
        self.scene.remove_outline(key);
    }

    fn set_fill(&mut self, polygon: &Polygon, color: Rgba) {
        self.scene.set_fill(polygon, color);
    }

    fn remove_fill(&mut self) {
        self.scene.remove_fill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::cell_to_polygon;
    use crate::primitives::GRID_COLOR;
    use h3o::{LatLng, Resolution};

    fn hexagon() -> (CellKey, Polygon) {
        let cell = LatLng::new(48.85, 2.35).unwrap().to_cell(Resolution::Six);
        (CellKey::from_cell(cell), cell_to_polygon(cell))
    }

    #[test]
    fn small_cells_draw_one_segment_per_edge() {
        let (key, polygon) = hexagon();
        let mut scene = OverlayScene::default();
        scene.add_outline(key, &polygon, GRID_COLOR.with_alpha(0.5));
        assert_eq!(scene.line_vertices().len(), 6 * 2);

        scene.add_outline(key, &polygon, GRID_COLOR.with_alpha(0.0));
        assert!(scene.line_vertices().is_empty());
    }

    #[test]
    fn large_cells_follow_great_arcs() {
        let cell = LatLng::new(10.0, 10.0).unwrap().to_cell(Resolution::Zero);
        let mut scene = OverlayScene::default();
        scene.add_outline(CellKey::from_cell(cell), &cell_to_polygon(cell), GRID_COLOR);
        let vertices = scene.line_vertices();
        assert!(vertices.len() > 6 * 2);
        for v in vertices {
            let radius = glam::Vec3::from(v.position).length() as f64;
            assert!((radius - OUTLINE_LIFT).abs() < 1e-5);
        }
    }

    #[test]
    fn fill_is_a_fan() {
        let (_, polygon) = hexagon();
        let mut scene = OverlayScene::default();
        scene.set_fill(&polygon, GRID_COLOR.with_alpha(0.4));
        assert_eq!(scene.fill_vertices().len(), 4 * 3);
        scene.remove_fill();
        assert!(scene.fill_vertices().is_empty());
    }

    #[test]
    fn only_real_changes_mark_the_scene_dirty() {
        let (key, polygon) = hexagon();
        let mut scene = OverlayScene::default();
        scene.add_outline(key, &polygon, GRID_COLOR);
        scene.dirty = false;

        scene.update_outline(key, &polygon, GRID_COLOR);
        assert!(!scene.dirty);
        scene.update_outline(key, &polygon, GRID_COLOR.with_alpha(0.3));
        assert!(scene.dirty);

        scene.dirty = false;
        scene.remove_fill();
        scene.remove_outline(CellKey::from_cell(LatLng::new(0.0, 0.0).unwrap().to_cell(Resolution::Six)));
        assert!(!scene.dirty);
        scene.remove_outline(key);
        assert!(scene.dirty);
        assert!(scene.outlines.is_empty());
    }
}
