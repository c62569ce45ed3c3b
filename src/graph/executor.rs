//! Execution of a compiled graph against a device.
//!
//! The executor owns the persistent resource pools, so native objects
//! outlive the one-frame graphs that request them. Per pass it acquires
//! the backings scheduled for devirtualization, settles resource states,
//! runs the pass's executable through a recording encoder, and hands back
//! backings whose last use has passed — which is what makes compiled
//! aliasing real: the pool gives the freed object to the next compatible
//! request in the same frame.
//!
//! Any device error abandons the frame: every outstanding pool entry is
//! released, the error propagates, and the pools stay warm for the next
//! frame.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::graph::compiler::{
    CompiledPass, CompiledRenderGraph, CompiledResource, CompiledResourceKind,
};
use crate::graph::pass::{PassKind, UploadTarget};
use crate::graph::resource::{BufferHandle, TextureHandle};
use crate::pool::{
    BindGroupPool, BufferPool, ComputePipelinePool, FramebufferPool, PoolToken, RenderPassPool,
    RenderPipelinePool, ResourcePool, TexturePool, TextureViewPool, DEFAULT_RETENTION_FRAMES,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Device-wide pipeline caches an application can share between several
/// executors. A local miss migrates an idle upstream entry instead of
/// recompiling the pipeline.
pub struct SharedPools {
    render_pipelines: Arc<Mutex<RenderPipelinePool>>,
    compute_pipelines: Arc<Mutex<ComputePipelinePool>>,
}

impl SharedPools {
    pub fn new() -> Self {
        Self {
            render_pipelines: Arc::new(Mutex::new(ResourcePool::new(
                DEFAULT_RETENTION_FRAMES,
                None,
            ))),
            compute_pipelines: Arc::new(Mutex::new(ResourcePool::new(
                DEFAULT_RETENTION_FRAMES,
                None,
            ))),
        }
    }
}

impl Default for SharedPools {
    fn default() -> Self {
        Self::new()
    }
}

/// Runtime identity of one compiled resource during a frame.
enum Backing {
    Unrealized,
    Texture {
        handle: GpuTexture,
        token: Option<PoolToken>,
    },
    Buffer {
        handle: GpuBuffer,
        token: Option<PoolToken>,
    },
}

/// Per-pass pool acquisitions, released when the pass ends.
#[derive(Default)]
struct PassTokens {
    views: Vec<PoolToken>,
    framebuffers: Vec<PoolToken>,
    render_passes: Vec<PoolToken>,
    render_pipelines: Vec<PoolToken>,
    compute_pipelines: Vec<PoolToken>,
    bind_groups: Vec<PoolToken>,
}

/// Executes compiled graphs and owns the pools backing them.
pub struct GraphExecutor {
    textures: TexturePool,
    views: TextureViewPool,
    buffers: BufferPool,
    render_passes: RenderPassPool,
    framebuffers: FramebufferPool,
    render_pipelines: RenderPipelinePool,
    compute_pipelines: ComputePipelinePool,
    bind_groups: BindGroupPool,
}

impl GraphExecutor {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// An executor whose pipeline pools delegate misses to `shared`.
    pub fn with_shared(shared: &SharedPools) -> Self {
        Self::build(Some(shared))
    }

    fn build(shared: Option<&SharedPools>) -> Self {
        let retention = DEFAULT_RETENTION_FRAMES;
        Self {
            textures: ResourcePool::new(retention, None),
            views: ResourcePool::new(retention, None),
            buffers: ResourcePool::new(retention, None),
            render_passes: ResourcePool::new(retention, None),
            framebuffers: ResourcePool::new(retention, None),
            render_pipelines: ResourcePool::new(
                retention,
                shared.map(|s| s.render_pipelines.clone()),
            ),
            compute_pipelines: ResourcePool::new(
                retention,
                shared.map(|s| s.compute_pipelines.clone()),
            ),
            bind_groups: ResourcePool::new(retention, None),
        }
    }

    /// Execute a compiled graph. On success all pools tick, advancing the
    /// eviction clock; on failure the frame is abandoned and the error
    /// returned, leaving the pools consistent.
    pub fn execute(
        &mut self,
        mut graph: CompiledRenderGraph,
        device: &mut dyn RenderDevice,
    ) -> DeviceResult<()> {
        let mut backings: Vec<Backing> = graph
            .resources
            .iter()
            .map(|res| match &res.kind {
                CompiledResourceKind::Texture(t) => match t.imported {
                    Some(handle) => Backing::Texture {
                        handle,
                        token: None,
                    },
                    None => Backing::Unrealized,
                },
                CompiledResourceKind::Buffer(b) => match b.imported {
                    Some(handle) => Backing::Buffer {
                        handle,
                        token: None,
                    },
                    None => Backing::Unrealized,
                },
            })
            .collect();
        let mut states = vec![ResourceState::Undefined; graph.resources.len()];
        let mut staging: Vec<PoolToken> = Vec::new();

        let result = self.run(&mut graph, device, &mut backings, &mut states, &mut staging);

        // Staging buffers stay referenced until recording is done: the
        // exclusive pool must not recycle one for a later upload in the
        // same frame while an earlier copy still reads from it. Across
        // frames, reuse relies on the caller pacing submissions (the
        // frame ring) so a slot's copies retire before its staging memory
        // is rewritten.
        for token in staging.drain(..) {
            self.buffers.release(token);
        }

        match result {
            Ok(()) => {
                self.release_backings(&mut backings);
                self.tick(device);
                Ok(())
            }
            Err(err) => {
                log::warn!("abandoning frame for graph {}: {err}", graph.graph_id);
                self.release_backings(&mut backings);
                Err(err)
            }
        }
    }

    fn run(
        &mut self,
        graph: &mut CompiledRenderGraph,
        device: &mut dyn RenderDevice,
        backings: &mut [Backing],
        states: &mut [ResourceState],
        staging: &mut Vec<PoolToken>,
    ) -> DeviceResult<()> {
        let resources = std::mem::take(&mut graph.resources);
        let passes = std::mem::take(&mut graph.passes);

        for mut pass in passes {
            for &ci in &pass.devirtualize {
                self.devirtualize(&resources, backings, device, ci)?;
            }

            for &(ci, state) in &pass.transitions {
                let current = states[ci as usize];
                if current != state {
                    match &backings[ci as usize] {
                        Backing::Texture { handle, .. } => {
                            device.transition_texture(*handle, current, state)
                        }
                        Backing::Buffer { handle, .. } => {
                            device.transition_buffer(*handle, current, state)
                        }
                        Backing::Unrealized => unreachable!("transition before devirtualization"),
                    }
                    states[ci as usize] = state;
                }
            }

            log::trace!("pass '{}'", pass.name);
            let mut tokens = PassTokens::default();
            let result = match pass.kind {
                PassKind::Render => self.record_render_pass(
                    graph,
                    &resources,
                    backings,
                    device,
                    &mut pass,
                    &mut tokens,
                ),
                PassKind::Compute => self.record_compute_pass(
                    graph,
                    &resources,
                    backings,
                    device,
                    &mut pass,
                    &mut tokens,
                ),
                PassKind::UploadBuffer | PassKind::UploadTexture => {
                    self.record_upload_pass(backings, device, &mut pass, staging)
                }
            };
            self.release_pass_tokens(tokens);
            result?;

            for &ci in &pass.destroy {
                self.release_backing(&resources, backings, ci);
            }
        }

        if let Some(p) = graph.present {
            let current = states[p as usize];
            if current != ResourceState::Present {
                match &backings[p as usize] {
                    Backing::Texture { handle, .. } => {
                        device.transition_texture(*handle, current, ResourceState::Present)
                    }
                    _ => unreachable!("present target is always a texture"),
                }
                states[p as usize] = ResourceState::Present;
            }
        }

        graph.resources = resources;
        Ok(())
    }

    fn devirtualize(
        &mut self,
        resources: &[CompiledResource],
        backings: &mut [Backing],
        device: &mut dyn RenderDevice,
        ci: u16,
    ) -> DeviceResult<()> {
        let res = &resources[ci as usize];
        match &res.kind {
            CompiledResourceKind::Texture(t) => {
                let token = self.textures.get(device, &t.desc)?;
                backings[ci as usize] = Backing::Texture {
                    handle: self.textures.payload(token).handle,
                    token: Some(token),
                };
            }
            CompiledResourceKind::Buffer(b) => {
                let token = self.buffers.get(device, &b.desc)?;
                backings[ci as usize] = Backing::Buffer {
                    handle: self.buffers.payload(token).handle,
                    token: Some(token),
                };
            }
        }
        log::trace!("devirtualized '{}'", res.name);
        Ok(())
    }

    fn record_render_pass(
        &mut self,
        graph: &CompiledRenderGraph,
        resources: &[CompiledResource],
        backings: &[Backing],
        device: &mut dyn RenderDevice,
        pass: &mut CompiledPass,
        tokens: &mut PassTokens,
    ) -> DeviceResult<()> {
        let mut attachments = Vec::new();
        let mut clear_colors = Vec::new();
        for color in &pass.color_attachments {
            attachments.push(view_for(
                &mut self.views,
                device,
                resources,
                backings,
                color.resource,
                false,
                &mut tokens.views,
            )?);
            clear_colors.push(color.clear);
        }
        let mut clear_depth_stencil = None;
        if let Some(depth) = &pass.depth_attachment {
            attachments.push(view_for(
                &mut self.views,
                device,
                resources,
                backings,
                depth.resource,
                false,
                &mut tokens.views,
            )?);
            if !depth.read_only {
                clear_depth_stencil = Some(depth.clear);
            }
        }

        let rp_desc = pass
            .render_pass_desc
            .take()
            .expect("render pass without attachment layout");
        let rp_token = self.render_passes.get(device, &rp_desc)?;
        tokens.render_passes.push(rp_token);
        let rp = self.render_passes.payload(rp_token).handle;

        let fb_desc = FramebufferDescriptor {
            render_pass: rp,
            attachments,
            width: pass.extent.0,
            height: pass.extent.1,
            layers: 1,
        };
        let fb_token = self.framebuffers.get(device, &fb_desc)?;
        tokens.framebuffers.push(fb_token);
        let fb = self.framebuffers.payload(fb_token).handle;

        device.begin_render_pass(rp, fb, &clear_colors, clear_depth_stencil);
        let body = match pass.render_executable.take() {
            Some(exec) => {
                let mut encoder = RenderPassEncoder {
                    device,
                    graph_id: graph.graph_id,
                    remap: &graph.remap,
                    resources,
                    backings,
                    views: &mut self.views,
                    pipelines: &mut self.render_pipelines,
                    bind_groups: &mut self.bind_groups,
                    tokens,
                };
                let result = exec(&mut encoder);
                encoder.device.end_render_pass();
                result
            }
            None => {
                device.end_render_pass();
                Ok(())
            }
        };
        body
    }

    fn record_compute_pass(
        &mut self,
        graph: &CompiledRenderGraph,
        resources: &[CompiledResource],
        backings: &[Backing],
        device: &mut dyn RenderDevice,
        pass: &mut CompiledPass,
        tokens: &mut PassTokens,
    ) -> DeviceResult<()> {
        device.begin_compute_pass(&pass.name);
        let body = match pass.compute_executable.take() {
            Some(exec) => {
                let mut encoder = ComputePassEncoder {
                    device,
                    graph_id: graph.graph_id,
                    remap: &graph.remap,
                    resources,
                    backings,
                    views: &mut self.views,
                    pipelines: &mut self.compute_pipelines,
                    bind_groups: &mut self.bind_groups,
                    tokens,
                };
                let result = exec(&mut encoder);
                encoder.device.end_compute_pass();
                result
            }
            None => {
                device.end_compute_pass();
                Ok(())
            }
        };
        body
    }

    fn record_upload_pass(
        &mut self,
        backings: &[Backing],
        device: &mut dyn RenderDevice,
        pass: &mut CompiledPass,
        staging_tokens: &mut Vec<PoolToken>,
    ) -> DeviceResult<()> {
        let upload = pass.upload.take().expect("upload pass without payload");

        let staging_desc = BufferDescriptor {
            size: upload.size,
            usage: BufferUsage::COPY_SRC,
            memory: MemoryLocation::CpuToGpu,
        };
        let token = self.buffers.get(device, &staging_desc)?;
        // Held for the rest of the frame; the recorded copy reads from
        // this buffer, so it must not be handed to another upload yet.
        staging_tokens.push(token);
        let staging = self.buffers.payload(token).handle;

        let mut bytes = vec![0u8; upload.size as usize];
        (upload.fill)(&mut bytes);
        device.write_buffer(staging, 0, &bytes);
        match upload.target {
            UploadTarget::Buffer { resource, offset } => {
                let dst = buffer_handle(backings, resource);
                device.copy_buffer_to_buffer(staging, 0, dst, offset, upload.size);
            }
            UploadTarget::Texture {
                resource,
                mip_level,
                array_layer,
            } => {
                let dst = texture_handle(backings, resource);
                device.copy_buffer_to_texture(staging, 0, dst, mip_level, array_layer);
            }
        }

        Ok(())
    }

    fn release_backing(&mut self, resources: &[CompiledResource], backings: &mut [Backing], ci: u16) {
        match &mut backings[ci as usize] {
            Backing::Texture { token, .. } => {
                if let Some(token) = token.take() {
                    self.textures.release(token);
                }
            }
            Backing::Buffer { token, .. } => {
                if let Some(token) = token.take() {
                    self.buffers.release(token);
                }
            }
            Backing::Unrealized => {}
        }
        log::trace!("released '{}'", resources[ci as usize].name);
    }

    fn release_backings(&mut self, backings: &mut [Backing]) {
        for backing in backings {
            match backing {
                Backing::Texture { token, .. } => {
                    if let Some(token) = token.take() {
                        self.textures.release(token);
                    }
                }
                Backing::Buffer { token, .. } => {
                    if let Some(token) = token.take() {
                        self.buffers.release(token);
                    }
                }
                Backing::Unrealized => {}
            }
        }
    }

    fn release_pass_tokens(&mut self, tokens: PassTokens) {
        for t in tokens.views {
            self.views.release(t);
        }
        for t in tokens.framebuffers {
            self.framebuffers.release(t);
        }
        for t in tokens.render_passes {
            self.render_passes.release(t);
        }
        for t in tokens.render_pipelines {
            self.render_pipelines.release(t);
        }
        for t in tokens.compute_pipelines {
            self.compute_pipelines.release(t);
        }
        for t in tokens.bind_groups {
            self.bind_groups.release(t);
        }
    }

    /// Advance every pool's eviction clock.
    pub fn tick(&mut self, device: &mut dyn RenderDevice) {
        self.textures.tick(device);
        self.views.tick(device);
        self.buffers.tick(device);
        self.render_passes.tick(device);
        self.framebuffers.tick(device);
        self.render_pipelines.tick(device);
        self.compute_pipelines.tick(device);
        self.bind_groups.tick(device);
    }

    /// Destroy every cached native object. Call before dropping the device.
    pub fn destroy(&mut self, device: &mut dyn RenderDevice) {
        self.views.drain(device);
        self.framebuffers.drain(device);
        self.render_passes.drain(device);
        self.bind_groups.drain(device);
        self.render_pipelines.drain(device);
        self.compute_pipelines.drain(device);
        self.textures.drain(device);
        self.buffers.drain(device);
    }

    /// Cached texture count, exposed for pool pressure diagnostics.
    pub fn cached_textures(&self) -> usize {
        self.textures.len()
    }

    /// Cached buffer count, exposed for pool pressure diagnostics.
    pub fn cached_buffers(&self) -> usize {
        self.buffers.len()
    }
}

impl Default for GraphExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn texture_handle(backings: &[Backing], ci: u16) -> GpuTexture {
    match &backings[ci as usize] {
        Backing::Texture { handle, .. } => *handle,
        _ => unreachable!("expected texture backing"),
    }
}

fn buffer_handle(backings: &[Backing], ci: u16) -> GpuBuffer {
    match &backings[ci as usize] {
        Backing::Buffer { handle, .. } => *handle,
        _ => unreachable!("expected buffer backing"),
    }
}

/// Acquire a view over the node at `ci`, resolving sub-views to their
/// backing root. `full_range` selects all mips and layers of a root node
/// (the shape sampling wants); attachments always bind a single subresource.
fn view_for(
    views: &mut TextureViewPool,
    device: &mut dyn RenderDevice,
    resources: &[CompiledResource],
    backings: &[Backing],
    ci: u16,
    full_range: bool,
    acquired: &mut Vec<PoolToken>,
) -> DeviceResult<GpuTextureView> {
    let node = match &resources[ci as usize].kind {
        CompiledResourceKind::Texture(t) => t,
        CompiledResourceKind::Buffer(_) => unreachable!("view of a buffer"),
    };
    let mut root = ci;
    loop {
        match &resources[root as usize].kind {
            CompiledResourceKind::Texture(t) => match t.parent {
                Some(parent) => root = parent,
                None => break,
            },
            CompiledResourceKind::Buffer(_) => unreachable!(),
        }
    }

    let format = node.desc.format;
    let aspect = if format.is_depth() {
        if format.has_stencil() {
            TextureAspect::DepthStencil
        } else {
            TextureAspect::Depth
        }
    } else {
        TextureAspect::Color
    };
    let whole_root = node.parent.is_none() && full_range;
    let desc = TextureViewDescriptor {
        texture: texture_handle(backings, root),
        format,
        aspect,
        base_mip_level: node.mip_level,
        mip_level_count: if whole_root { node.desc.mip_levels } else { 1 },
        base_array_layer: node.array_layer,
        array_layer_count: if whole_root { node.desc.array_layers } else { 1 },
    };
    let token = views.get(device, &desc)?;
    acquired.push(token);
    Ok(views.payload(token).handle)
}

/// Recording surface handed to a render pass executable. Pipelines, bind
/// groups, and views bound through it come from the executor's pools.
pub struct RenderPassEncoder<'a> {
    device: &'a mut dyn RenderDevice,
    graph_id: u32,
    remap: &'a [Option<u16>],
    resources: &'a [CompiledResource],
    backings: &'a [Backing],
    views: &'a mut TextureViewPool,
    pipelines: &'a mut RenderPipelinePool,
    bind_groups: &'a mut BindGroupPool,
    tokens: &'a mut PassTokens,
}

impl RenderPassEncoder<'_> {
    fn resolve_texture(&self, handle: TextureHandle) -> u16 {
        assert_eq!(
            handle.graph, self.graph_id,
            "texture handle from a different graph"
        );
        self.remap[handle.index as usize]
            .expect("texture was culled from the compiled graph")
    }

    fn resolve_buffer(&self, handle: BufferHandle) -> u16 {
        assert_eq!(
            handle.graph, self.graph_id,
            "buffer handle from a different graph"
        );
        self.remap[handle.index as usize]
            .expect("buffer was culled from the compiled graph")
    }

    /// Bind a render pipeline matching `desc`, compiling it on first use.
    pub fn bind_render_pipeline(&mut self, desc: &RenderPipelineDescriptor) -> DeviceResult<()> {
        let token = self.pipelines.get(&mut *self.device, desc)?;
        self.tokens.render_pipelines.push(token);
        let handle = self.pipelines.payload(token).handle;
        self.device.set_render_pipeline(handle);
        Ok(())
    }

    /// Bind the group described by `desc` at its group index.
    pub fn bind_group(&mut self, desc: &BindGroupDescriptor) -> DeviceResult<()> {
        let token = self.bind_groups.get(&mut *self.device, desc)?;
        self.tokens.bind_groups.push(token);
        let handle = self.bind_groups.payload(token).handle;
        self.device.set_bind_group(desc.group, handle);
        Ok(())
    }

    /// A shader-visible view of `texture`, for building bind groups.
    pub fn texture_view(&mut self, texture: TextureHandle) -> DeviceResult<GpuTextureView> {
        let ci = self.resolve_texture(texture);
        view_for(
            self.views,
            &mut *self.device,
            self.resources,
            self.backings,
            ci,
            true,
            &mut self.tokens.views,
        )
    }

    /// The native buffer behind `buffer`, for building bind groups.
    pub fn buffer(&self, buffer: BufferHandle) -> GpuBuffer {
        buffer_handle(self.backings, self.resolve_buffer(buffer))
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        let handle = self.buffer(buffer);
        self.device.set_vertex_buffer(slot, handle, offset);
    }

    pub fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        let handle = self.buffer(buffer);
        self.device.set_index_buffer(handle, offset, format);
    }

    pub fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.device.set_viewport(x, y, width, height, 0.0, 1.0);
    }

    pub fn set_scissor_rect(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.device.set_scissor_rect(x, y, width, height);
    }

    pub fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>) {
        self.device.draw(vertices, instances);
    }

    pub fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        base_vertex: i32,
        instances: std::ops::Range<u32>,
    ) {
        self.device.draw_indexed(indices, base_vertex, instances);
    }
}

/// Recording surface handed to a compute pass executable.
pub struct ComputePassEncoder<'a> {
    device: &'a mut dyn RenderDevice,
    graph_id: u32,
    remap: &'a [Option<u16>],
    resources: &'a [CompiledResource],
    backings: &'a [Backing],
    views: &'a mut TextureViewPool,
    pipelines: &'a mut ComputePipelinePool,
    bind_groups: &'a mut BindGroupPool,
    tokens: &'a mut PassTokens,
}

impl ComputePassEncoder<'_> {
    fn resolve_texture(&self, handle: TextureHandle) -> u16 {
        assert_eq!(
            handle.graph, self.graph_id,
            "texture handle from a different graph"
        );
        self.remap[handle.index as usize]
            .expect("texture was culled from the compiled graph")
    }

    fn resolve_buffer(&self, handle: BufferHandle) -> u16 {
        assert_eq!(
            handle.graph, self.graph_id,
            "buffer handle from a different graph"
        );
        self.remap[handle.index as usize]
            .expect("buffer was culled from the compiled graph")
    }

    /// Bind a compute pipeline matching `desc`, compiling it on first use.
    pub fn bind_compute_pipeline(&mut self, desc: &ComputePipelineDescriptor) -> DeviceResult<()> {
        let token = self.pipelines.get(&mut *self.device, desc)?;
        self.tokens.compute_pipelines.push(token);
        let handle = self.pipelines.payload(token).handle;
        self.device.set_compute_pipeline(handle);
        Ok(())
    }

    pub fn bind_group(&mut self, desc: &BindGroupDescriptor) -> DeviceResult<()> {
        let token = self.bind_groups.get(&mut *self.device, desc)?;
        self.tokens.bind_groups.push(token);
        let handle = self.bind_groups.payload(token).handle;
        self.device.set_bind_group(desc.group, handle);
        Ok(())
    }

    pub fn texture_view(&mut self, texture: TextureHandle) -> DeviceResult<GpuTextureView> {
        let ci = self.resolve_texture(texture);
        view_for(
            self.views,
            &mut *self.device,
            self.resources,
            self.backings,
            ci,
            true,
            &mut self.tokens.views,
        )
    }

    pub fn buffer(&self, buffer: BufferHandle) -> GpuBuffer {
        buffer_handle(self.backings, self.resolve_buffer(buffer))
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.device.dispatch(x, y, z);
    }
}
