//! Headless device that records commands instead of talking to a GPU.
//!
//! Useful for running the graph without a graphics stack and for tests
//! that assert on create/destroy counts or the recorded command stream.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;

/// Kinds of native objects the device can create, for bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Texture,
    TextureView,
    Buffer,
    RenderPass,
    Framebuffer,
    RenderPipeline,
    ComputePipeline,
    BindGroup,
    Sampler,
    Fence,
}

/// A [`RenderDevice`] that allocates sequential handles and logs commands.
#[derive(Default)]
pub struct NullDevice {
    next_handle: u64,
    creates: HashMap<ObjectKind, usize>,
    destroys: HashMap<ObjectKind, usize>,
    commands: Vec<String>,
    fail_next: Option<ObjectKind>,
}

impl NullDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arrange for the next creation of `kind` to fail with out-of-memory.
    pub fn fail_next_create(&mut self, kind: ObjectKind) {
        self.fail_next = Some(kind);
    }

    /// How many objects of `kind` have been created so far.
    pub fn created(&self, kind: ObjectKind) -> usize {
        self.creates.get(&kind).copied().unwrap_or(0)
    }

    /// How many objects of `kind` have been destroyed so far.
    pub fn destroyed(&self, kind: ObjectKind) -> usize {
        self.destroys.get(&kind).copied().unwrap_or(0)
    }

    /// The recorded command stream, in order.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    fn alloc(&mut self, kind: ObjectKind) -> DeviceResult<u64> {
        if self.fail_next == Some(kind) {
            self.fail_next = None;
            return Err(DeviceError::OutOfMemory);
        }
        self.next_handle += 1;
        *self.creates.entry(kind).or_default() += 1;
        Ok(self.next_handle)
    }

    fn free(&mut self, kind: ObjectKind) {
        *self.destroys.entry(kind).or_default() += 1;
    }

    fn record(&mut self, cmd: String) {
        self.commands.push(cmd);
    }
}

impl RenderDevice for NullDevice {
    fn create_texture(&mut self, _desc: &TextureDescriptor) -> DeviceResult<GpuTexture> {
        self.alloc(ObjectKind::Texture).map(GpuTexture)
    }

    fn destroy_texture(&mut self, _texture: GpuTexture) {
        self.free(ObjectKind::Texture);
    }

    fn create_texture_view(&mut self, _desc: &TextureViewDescriptor) -> DeviceResult<GpuTextureView> {
        self.alloc(ObjectKind::TextureView).map(GpuTextureView)
    }

    fn destroy_texture_view(&mut self, _view: GpuTextureView) {
        self.free(ObjectKind::TextureView);
    }

    fn create_buffer(&mut self, _desc: &BufferDescriptor) -> DeviceResult<GpuBuffer> {
        self.alloc(ObjectKind::Buffer).map(GpuBuffer)
    }

    fn destroy_buffer(&mut self, _buffer: GpuBuffer) {
        self.free(ObjectKind::Buffer);
    }

    fn create_render_pass(&mut self, _desc: &RenderPassDescriptor) -> DeviceResult<GpuRenderPass> {
        self.alloc(ObjectKind::RenderPass).map(GpuRenderPass)
    }

    fn destroy_render_pass(&mut self, _render_pass: GpuRenderPass) {
        self.free(ObjectKind::RenderPass);
    }

    fn create_framebuffer(&mut self, _desc: &FramebufferDescriptor) -> DeviceResult<GpuFramebuffer> {
        self.alloc(ObjectKind::Framebuffer).map(GpuFramebuffer)
    }

    fn destroy_framebuffer(&mut self, _framebuffer: GpuFramebuffer) {
        self.free(ObjectKind::Framebuffer);
    }

    fn create_render_pipeline(
        &mut self,
        _desc: &RenderPipelineDescriptor,
    ) -> DeviceResult<GpuRenderPipeline> {
        self.alloc(ObjectKind::RenderPipeline).map(GpuRenderPipeline)
    }

    fn destroy_render_pipeline(&mut self, _pipeline: GpuRenderPipeline) {
        self.free(ObjectKind::RenderPipeline);
    }

    fn create_compute_pipeline(
        &mut self,
        _desc: &ComputePipelineDescriptor,
    ) -> DeviceResult<GpuComputePipeline> {
        self.alloc(ObjectKind::ComputePipeline).map(GpuComputePipeline)
    }

    fn destroy_compute_pipeline(&mut self, _pipeline: GpuComputePipeline) {
        self.free(ObjectKind::ComputePipeline);
    }

    fn create_bind_group(&mut self, _desc: &BindGroupDescriptor) -> DeviceResult<GpuBindGroup> {
        self.alloc(ObjectKind::BindGroup).map(GpuBindGroup)
    }

    fn destroy_bind_group(&mut self, _bind_group: GpuBindGroup) {
        self.free(ObjectKind::BindGroup);
    }

    fn create_sampler(&mut self, _desc: &SamplerDescriptor) -> DeviceResult<GpuSampler> {
        self.alloc(ObjectKind::Sampler).map(GpuSampler)
    }

    fn destroy_sampler(&mut self, _sampler: GpuSampler) {
        self.free(ObjectKind::Sampler);
    }

    fn write_buffer(&mut self, buffer: GpuBuffer, offset: u64, data: &[u8]) {
        self.record(format!(
            "write_buffer {} offset {} len {}",
            buffer.0,
            offset,
            data.len()
        ));
    }

    fn transition_texture(&mut self, texture: GpuTexture, from: ResourceState, to: ResourceState) {
        self.record(format!("transition_texture {} {:?} -> {:?}", texture.0, from, to));
    }

    fn transition_buffer(&mut self, buffer: GpuBuffer, from: ResourceState, to: ResourceState) {
        self.record(format!("transition_buffer {} {:?} -> {:?}", buffer.0, from, to));
    }

    fn begin_render_pass(
        &mut self,
        render_pass: GpuRenderPass,
        framebuffer: GpuFramebuffer,
        _clear_colors: &[ClearColor],
        _clear_depth_stencil: Option<ClearDepthStencil>,
    ) {
        self.record(format!("begin_render_pass {} fb {}", render_pass.0, framebuffer.0));
    }

    fn end_render_pass(&mut self) {
        self.record("end_render_pass".to_string());
    }

    fn begin_compute_pass(&mut self, label: &str) {
        self.record(format!("begin_compute_pass {label}"));
    }

    fn end_compute_pass(&mut self) {
        self.record("end_compute_pass".to_string());
    }

    fn set_render_pipeline(&mut self, pipeline: GpuRenderPipeline) {
        self.record(format!("set_render_pipeline {}", pipeline.0));
    }

    fn set_compute_pipeline(&mut self, pipeline: GpuComputePipeline) {
        self.record(format!("set_compute_pipeline {}", pipeline.0));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: GpuBindGroup) {
        self.record(format!("set_bind_group {index} {}", bind_group.0));
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: GpuBuffer, offset: u64) {
        self.record(format!("set_vertex_buffer {slot} {} offset {offset}", buffer.0));
    }

    fn set_index_buffer(&mut self, buffer: GpuBuffer, offset: u64, format: IndexFormat) {
        self.record(format!("set_index_buffer {} offset {offset} {format:?}", buffer.0));
    }

    fn set_viewport(
        &mut self,
        _x: f32,
        _y: f32,
        width: f32,
        height: f32,
        _min_depth: f32,
        _max_depth: f32,
    ) {
        self.record(format!("set_viewport {width}x{height}"));
    }

    fn set_scissor_rect(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.record(format!("set_scissor_rect {x},{y} {width}x{height}"));
    }

    fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>) {
        self.record(format!("draw {vertices:?} x{}", instances.len()));
    }

    fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        base_vertex: i32,
        instances: std::ops::Range<u32>,
    ) {
        self.record(format!("draw_indexed {indices:?} base {base_vertex} x{}", instances.len()));
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.record(format!("dispatch {x} {y} {z}"));
    }

    fn copy_buffer_to_buffer(
        &mut self,
        src: GpuBuffer,
        src_offset: u64,
        dst: GpuBuffer,
        dst_offset: u64,
        size: u64,
    ) {
        self.record(format!(
            "copy_buffer_to_buffer {} +{src_offset} -> {} +{dst_offset} size {size}",
            src.0, dst.0
        ));
    }

    fn copy_buffer_to_texture(
        &mut self,
        src: GpuBuffer,
        src_offset: u64,
        dst: GpuTexture,
        mip_level: u32,
        array_layer: u32,
    ) {
        self.record(format!(
            "copy_buffer_to_texture {} +{src_offset} -> {} mip {mip_level} layer {array_layer}",
            src.0, dst.0
        ));
    }

    fn create_fence(&mut self) -> DeviceResult<GpuFence> {
        self.alloc(ObjectKind::Fence).map(GpuFence)
    }

    fn destroy_fence(&mut self, _fence: GpuFence) {
        self.free(ObjectKind::Fence);
    }

    fn submit(&mut self, signal_fence: Option<GpuFence>) {
        match signal_fence {
            Some(fence) => self.record(format!("submit signal {}", fence.0)),
            None => self.record("submit".to_string()),
        }
    }

    fn wait_fence(&mut self, fence: GpuFence) {
        self.record(format!("wait_fence {}", fence.0));
    }
}
