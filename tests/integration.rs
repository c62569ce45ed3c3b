//! Full-frame scenarios against the recording device: graphs built,
//! compiled, and executed the way an application would drive them.

use rendergraph::backend::{
    ClearColor, ClearDepthStencil, ComputePipelineDescriptor, GpuShaderModule, GpuTexture,
    LoadAction, NullDevice, ObjectKind, StoreAction, TextureDescriptor, TextureFormat,
    TextureUsage,
};
use rendergraph::{compile, FrameRing, GraphExecutor, RenderGraph, ResourceUsage};

fn scene_graph(width: u32) -> RenderGraph {
    let mut graph = RenderGraph::new();
    let depth = graph.declare_texture("depth");
    graph.texture_set_extent(depth, width, 720);
    graph.texture_set_depth_format(depth, TextureFormat::Depth32Float);

    let out = graph.declare_texture("out");
    graph.texture_set_extent(out, width, 720);
    graph.texture_set_format(out, TextureFormat::Bgra8UnormSrgb);

    graph
        .add_render_pass("scene")
        .color(out, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
        .depth(
            depth,
            LoadAction::Clear,
            ClearDepthStencil::default(),
            StoreAction::Discard,
        )
        .executable(|encoder| {
            encoder.draw(0..3, 0..1);
            Ok(())
        });
    graph.present(out);
    graph
}

#[test]
fn frame_records_passes_transitions_and_present() {
    let mut device = NullDevice::new();
    let mut executor = GraphExecutor::new();

    let compiled = compile(scene_graph(1280)).unwrap();
    executor.execute(compiled, &mut device).unwrap();

    let commands = device.commands();
    let position = |needle: &str| {
        commands
            .iter()
            .position(|c| c.contains(needle))
            .unwrap_or_else(|| panic!("missing command '{needle}' in {commands:#?}"))
    };
    let begin = position("begin_render_pass");
    let draw = position("draw");
    let end = position("end_render_pass");
    assert!(begin < draw && draw < end);

    let to_target = position("-> RenderTarget");
    let to_present = position("-> Present");
    assert!(to_target < begin);
    assert!(to_present > end);
}

#[test]
fn pools_reuse_native_objects_across_frames() {
    let mut device = NullDevice::new();
    let mut executor = GraphExecutor::new();

    for _ in 0..3 {
        let compiled = compile(scene_graph(1280)).unwrap();
        executor.execute(compiled, &mut device).unwrap();
    }

    // Same descriptors every frame: one texture for color, one for depth,
    // one view each, one render pass, one framebuffer.
    assert_eq!(device.created(ObjectKind::Texture), 2);
    assert_eq!(device.created(ObjectKind::TextureView), 2);
    assert_eq!(device.created(ObjectKind::RenderPass), 1);
    assert_eq!(device.created(ObjectKind::Framebuffer), 1);
    assert_eq!(device.destroyed(ObjectKind::Texture), 0);
}

#[test]
fn idle_objects_evict_after_the_retention_window() {
    let mut device = NullDevice::new();
    let mut executor = GraphExecutor::new();

    // One frame at 1280 wide, then the window resizes.
    let compiled = compile(scene_graph(1280)).unwrap();
    executor.execute(compiled, &mut device).unwrap();

    for _ in 0..rendergraph::DEFAULT_RETENTION_FRAMES + 2 {
        let compiled = compile(scene_graph(1920)).unwrap();
        executor.execute(compiled, &mut device).unwrap();
    }

    // Both 1280-wide textures aged out; the 1920-wide set stays warm.
    assert_eq!(device.destroyed(ObjectKind::Texture), 2);
    assert_eq!(device.created(ObjectKind::Texture), 4);
}

#[test]
fn aliasable_targets_share_one_native_texture() {
    let mut device = NullDevice::new();
    let mut executor = GraphExecutor::new();

    let mut graph = RenderGraph::new();
    let a = graph.declare_texture("blur_h");
    graph.texture_set_extent(a, 640, 360);
    let mid = graph.declare_texture("mid");
    graph.texture_set_extent(mid, 320, 180);
    let b = graph.declare_texture("blur_v");
    graph.texture_set_extent(b, 640, 360);
    let out = graph.declare_texture("out");
    graph.texture_set_extent(out, 1280, 720);

    graph
        .add_render_pass("p0")
        .color(a, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);
    graph
        .add_render_pass("p1")
        .color(mid, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
        .sample(a);
    graph
        .add_render_pass("p2")
        .color(b, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
        .sample(mid);
    graph
        .add_render_pass("p3")
        .color(out, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
        .sample(b);
    graph.present(out);

    let compiled = compile(graph).unwrap();
    assert_eq!(compiled.backing_count(), 3);
    executor.execute(compiled, &mut device).unwrap();

    // blur_h dies before blur_v is born, so the pool hands blur_v the
    // same native texture: 3 creations for 4 declared targets.
    assert_eq!(device.created(ObjectKind::Texture), 3);
}

#[test]
fn imported_resources_are_never_created_or_destroyed() {
    let mut device = NullDevice::new();
    let mut executor = GraphExecutor::new();

    let swapchain_desc = TextureDescriptor {
        width: 1280,
        height: 720,
        format: TextureFormat::Bgra8UnormSrgb,
        usage: TextureUsage::RENDER_ATTACHMENT,
        ..Default::default()
    };

    for _ in 0..2 {
        let mut graph = RenderGraph::new();
        let swapchain = graph.import_texture("swapchain", GpuTexture(900), &swapchain_desc);
        graph
            .add_render_pass("blit")
            .color(swapchain, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);
        graph.present(swapchain);

        let compiled = compile(graph).unwrap();
        executor.execute(compiled, &mut device).unwrap();
    }

    assert_eq!(device.created(ObjectKind::Texture), 0);
    assert_eq!(device.destroyed(ObjectKind::Texture), 0);
    // The view over the imported texture is still pooled.
    assert_eq!(device.created(ObjectKind::TextureView), 1);
}

#[test]
fn device_failure_abandons_the_frame_and_recovers() {
    let mut device = NullDevice::new();
    let mut executor = GraphExecutor::new();

    device.fail_next_create(ObjectKind::Texture);
    let compiled = compile(scene_graph(1280)).unwrap();
    assert!(executor.execute(compiled, &mut device).is_err());

    // The next frame proceeds as if nothing happened.
    let compiled = compile(scene_graph(1280)).unwrap();
    executor.execute(compiled, &mut device).unwrap();
    assert!(device.commands().iter().any(|c| c.contains("draw")));
}

#[test]
fn upload_then_compute_then_draw() {
    let mut device = NullDevice::new();
    let mut executor = GraphExecutor::new();

    let mut graph = RenderGraph::new();
    let particles = graph.declare_buffer("particles");
    graph.buffer_set_size(particles, 4096);
    graph.add_upload_buffer_pass("seed_particles", particles, 0, &[7u8; 4096]);

    graph
        .add_compute_pass("simulate")
        .read_write_buffer(particles)
        .executable(|encoder| {
            encoder.bind_compute_pipeline(&ComputePipelineDescriptor {
                shader: GpuShaderModule(1),
            })?;
            encoder.dispatch(16, 1, 1);
            Ok(())
        });

    let out = graph.declare_texture("out");
    graph.texture_set_extent(out, 1280, 720);
    graph
        .add_render_pass("draw_particles")
        .color(out, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
        .read_buffer(particles, ResourceUsage::Vertex)
        .executable(|encoder| {
            encoder.draw(0..4096, 0..1);
            Ok(())
        });
    graph.present(out);

    let compiled = compile(graph).unwrap();
    executor.execute(compiled, &mut device).unwrap();

    let commands = device.commands();
    let position = |needle: &str| {
        commands
            .iter()
            .position(|c| c.contains(needle))
            .unwrap_or_else(|| panic!("missing command '{needle}' in {commands:#?}"))
    };
    let write = position("write_buffer");
    let copy = position("copy_buffer_to_buffer");
    let to_uav = position("-> UnorderedAccess");
    let dispatch = position("dispatch");
    let to_vertex = position("-> VertexBuffer");
    let draw = position("draw");
    assert!(write < copy);
    assert!(copy < to_uav && to_uav < dispatch);
    assert!(dispatch < to_vertex && to_vertex < draw);
}

#[test]
fn uniform_data_flows_through_a_pooled_staging_buffer() {
    let mut device = NullDevice::new();
    let mut executor = GraphExecutor::new();

    for frame in 0..2u32 {
        let mut graph = RenderGraph::new();
        let uniforms = graph.declare_uniform_buffer("camera", &[frame as f32; 16]);

        let out = graph.declare_texture("out");
        graph.texture_set_extent(out, 640, 480);
        graph
            .add_render_pass("lit")
            .color(out, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
            .uniform(uniforms)
            .executable(|encoder| {
                encoder.draw(0..3, 0..1);
                Ok(())
            });
        graph.present(out);

        let compiled = compile(graph).unwrap();
        executor.execute(compiled, &mut device).unwrap();
    }

    // One staging buffer and one uniform buffer, both reused frame two.
    assert_eq!(device.created(ObjectKind::Buffer), 2);
    assert_eq!(
        device
            .commands()
            .iter()
            .filter(|c| c.contains("write_buffer"))
            .count(),
        2
    );
}

#[test]
fn same_frame_uploads_get_distinct_staging_buffers() {
    let mut device = NullDevice::new();
    let mut executor = GraphExecutor::new();

    for _ in 0..2 {
        let mut graph = RenderGraph::new();
        let a = graph.declare_buffer("mesh_a");
        graph.buffer_set_size(a, 64);
        graph.add_upload_buffer_pass("upload_a", a, 0, &[1u8; 64]);
        let b = graph.declare_buffer("mesh_b");
        graph.buffer_set_size(b, 64);
        graph.add_upload_buffer_pass("upload_b", b, 0, &[2u8; 64]);

        let compiled = compile(graph).unwrap();
        executor.execute(compiled, &mut device).unwrap();
    }

    // Both copies in a frame still read their own staging buffer when it
    // is submitted, so the second upload must not recycle the first
    // upload's staging memory mid-frame.
    let staging_of = |c: &String| c.split_whitespace().nth(1).unwrap().to_string();
    let writes: Vec<String> = device
        .commands()
        .iter()
        .filter(|c| c.starts_with("write_buffer"))
        .map(staging_of)
        .collect();
    assert_eq!(writes.len(), 4);
    assert_ne!(writes[0], writes[1]);

    // The destinations have disjoint lifetimes and alias to one native
    // buffer; the staging pair plus that backing is three buffers total,
    // all reused by the second frame.
    assert_eq!(device.created(ObjectKind::Buffer), 3);
}

#[test]
fn paced_frame_loop_submits_with_fences() {
    let mut device = NullDevice::new();
    let mut executor = GraphExecutor::new();
    let mut ring = FrameRing::new();

    for _ in 0..5 {
        ring.begin_frame(&mut device);
        let compiled = compile(scene_graph(1280)).unwrap();
        executor.execute(compiled, &mut device).unwrap();
        ring.end_frame(&mut device).unwrap();
    }

    let submits = device
        .commands()
        .iter()
        .filter(|c| c.starts_with("submit signal"))
        .count();
    assert_eq!(submits, 5);
    assert_eq!(ring.frame(), 5);

    ring.destroy(&mut device);
    executor.destroy(&mut device);
    assert_eq!(
        device.created(ObjectKind::Texture),
        device.destroyed(ObjectKind::Texture)
    );
}
