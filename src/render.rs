use log::info;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const MSAA_SAMPLES: u32 = 4;

/// Optional rendering enhancements, decided once per adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub color_format: wgpu::TextureFormat,
    pub sample_count: u32,
}

impl Capabilities {
    pub fn negotiate(adapter: &wgpu::Adapter, color_format: wgpu::TextureFormat) -> Self {
        let supports = |format| {
            adapter
                .get_texture_format_features(format)
                .flags
                .sample_count_supported(MSAA_SAMPLES)
        };
        let caps = Self::from_support(color_format, supports(color_format), supports(DEPTH_FORMAT));
        info!("render capabilities: {:?}, {}x samples", caps.color_format, caps.sample_count);
        caps
    }

    /// Multisampling is only worth it when both targets can do it.
    pub fn from_support(color_format: wgpu::TextureFormat, color_msaa: bool, depth_msaa: bool) -> Self {
        Self {
            color_format,
            sample_count: if color_msaa && depth_msaa { MSAA_SAMPLES } else { 1 },
        }
    }

    pub fn multisampled(&self) -> bool {
        self.sample_count > 1
    }
}

/// Depth buffer plus, when multisampling, the color target resolved into the
/// swapchain image. Rebuilt on resize.
pub struct FrameTargets {
    depth_view: wgpu::TextureView,
    msaa_view: Option<wgpu::TextureView>,
}

impl FrameTargets {
    pub fn new(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration, caps: &Capabilities) -> Self {
        let size = wgpu::Extent3d {
            width: config.width.max(1),
            height: config.height.max(1),
            depth_or_array_layers: 1,
        };
        let depth_view = create_target(device, "Depth Texture", size, DEPTH_FORMAT, caps.sample_count);
        let msaa_view = caps
            .multisampled()
            .then(|| create_target(device, "MSAA Color Texture", size, caps.color_format, caps.sample_count));
        Self { depth_view, msaa_view }
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }

    /// Returns the attachment to draw into and the one to resolve into.
    pub fn color_attachment<'a>(
        &'a self,
        frame: &'a wgpu::TextureView,
    ) -> (&'a wgpu::TextureView, Option<&'a wgpu::TextureView>) {
        match &self.msaa_view {
            Some(msaa) => (msaa, Some(frame)),
            None => (frame, None),
        }
    }
}

fn create_target(
    device: &wgpu::Device,
    label: &str,
    size: wgpu::Extent3d,
    format: wgpu::TextureFormat,
    sample_count: u32,
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

pub struct PipelineDesc<'a> {
    pub label: &'a str,
    pub shader: &'a wgpu::ShaderModule,
    pub layout: &'a wgpu::PipelineLayout,
    pub vertex_layouts: &'a [wgpu::VertexBufferLayout<'a>],
    pub topology: wgpu::PrimitiveTopology,
    pub cull_mode: Option<wgpu::Face>,
    /// Overlays test against the globe's depth but never write it.
    pub depth_write: bool,
}

pub fn create_render_pipeline(
    device: &wgpu::Device,
    desc: &PipelineDesc<'_>,
    caps: &Capabilities,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(desc.layout),
        vertex: wgpu::VertexState {
            module: desc.shader,
            entry_point: Some("vs_main"),
            buffers: desc.vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: desc.shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: caps.color_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: desc.topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: desc.cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: desc.depth_write,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: caps.sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

pub fn create_shader_module(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8UnormSrgb;

    #[test]
    fn msaa_needs_both_formats() {
        assert_eq!(Capabilities::from_support(FORMAT, true, true).sample_count, 4);
        assert!(!Capabilities::from_support(FORMAT, true, false).multisampled());
        assert!(!Capabilities::from_support(FORMAT, false, true).multisampled());
    }
}
