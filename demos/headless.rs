//! Headless frame loop: a small deferred-style frame recorded against the
//! null device, printing the command stream it produces.
//!
//! Run with `RUST_LOG=rendergraph=trace cargo run --example headless` to
//! watch the pools and passes work.

use glam::Mat4;
use rendergraph::backend::{
    ClearColor, ClearDepthStencil, CullMode, FrontFace, GpuShaderModule, LoadAction, NullDevice,
    PrimitiveTopology, RenderPipelineDescriptor, StoreAction, TextureFormat, VertexAttribute,
    VertexBufferLayout, VertexFormat, VertexStepMode,
};
use rendergraph::{compile, FrameRing, GraphExecutor, RenderGraph};

fn main() {
    env_logger::init();

    let mut device = NullDevice::new();
    let mut executor = GraphExecutor::new();
    let mut ring = FrameRing::new();

    for frame in 0..4u64 {
        ring.begin_frame(&mut device);

        let mut graph = RenderGraph::new();

        let angle = frame as f32 * 0.02;
        let view_proj = Mat4::perspective_rh(1.2, 16.0 / 9.0, 0.1, 100.0)
            * Mat4::from_rotation_y(angle);
        let camera = graph.declare_uniform_buffer("camera", &view_proj.to_cols_array());

        let mesh = graph.declare_buffer("triangle_vertices");
        graph.buffer_set_size(mesh, 3 * 12);
        graph.add_upload_buffer_pass(
            "upload_triangle",
            mesh,
            0,
            bytemuck::cast_slice(&[
                [0.0f32, 0.5, 0.0],
                [-0.5, -0.5, 0.0],
                [0.5, -0.5, 0.0],
            ]),
        );

        let depth = graph.declare_texture("depth");
        graph.texture_set_extent(depth, 1280, 720);
        graph.texture_set_depth_format(depth, TextureFormat::Depth32Float);

        let hdr = graph.declare_texture("hdr");
        graph.texture_set_extent(hdr, 1280, 720);
        graph.texture_set_format(hdr, TextureFormat::Rgba16Float);

        let out = graph.declare_texture("out");
        graph.texture_set_extent(out, 1280, 720);
        graph.texture_set_format(out, TextureFormat::Bgra8UnormSrgb);

        graph
            .add_render_pass("forward")
            .color(hdr, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
            .depth(
                depth,
                LoadAction::Clear,
                ClearDepthStencil::default(),
                StoreAction::Discard,
            )
            .uniform(camera)
            .vertex(mesh)
            .executable(move |encoder| {
                encoder.bind_render_pipeline(&RenderPipelineDescriptor {
                    vertex_shader: GpuShaderModule(1),
                    fragment_shader: Some(GpuShaderModule(2)),
                    vertex_layouts: vec![VertexBufferLayout {
                        array_stride: 12,
                        step_mode: VertexStepMode::Vertex,
                        attributes: vec![VertexAttribute {
                            location: 0,
                            format: VertexFormat::Float32x3,
                            offset: 0,
                        }],
                    }],
                    primitive_topology: PrimitiveTopology::TriangleList,
                    front_face: FrontFace::Ccw,
                    cull_mode: CullMode::Back,
                    depth_stencil: None,
                    color_targets: vec![],
                })?;
                encoder.set_vertex_buffer(0, mesh, 0);
                encoder.draw(0..3, 0..1);
                Ok(())
            });

        graph
            .add_render_pass("tonemap")
            .color(out, LoadAction::DontCare, ClearColor::BLACK, StoreAction::Store)
            .sample(hdr)
            .executable(|encoder| {
                encoder.draw(0..3, 0..1);
                Ok(())
            });
        graph.present(out);

        let compiled = compile(graph).expect("graph compiles");
        println!(
            "frame {frame}: {} passes, {} resources, {} pooled backings",
            compiled.pass_count(),
            compiled.resource_count(),
            compiled.backing_count()
        );
        executor.execute(compiled, &mut device).expect("frame executes");

        ring.end_frame(&mut device).expect("submit");
    }

    println!("\nrecorded commands:");
    for command in device.commands() {
        println!("  {command}");
    }

    ring.destroy(&mut device);
    executor.destroy(&mut device);
}
