//! Device abstraction consumed by the pools and the executor.
//!
//! The graph never talks to a native graphics API directly. Everything it
//! needs — creating and destroying native objects that match a descriptor,
//! recording commands, fences — goes through [`RenderDevice`], which is
//! object safe so pools and encoders can hold `&mut dyn RenderDevice`.

use crate::backend::types::*;
use thiserror::Error;

/// Device error type. Creation failures propagate through the pools up to
/// the executor, which abandons the frame.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create texture view: {0}")]
    TextureViewCreationFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create render pass: {0}")]
    RenderPassCreationFailed(String),
    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Failed to create bind group: {0}")]
    BindGroupCreationFailed(String),
    #[error("Failed to create sampler: {0}")]
    SamplerCreationFailed(String),
    #[error("Failed to create fence: {0}")]
    FenceCreationFailed(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Handle to a native texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuTexture(pub u64);

/// Handle to a native texture view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuTextureView(pub u64);

/// Handle to a native buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuBuffer(pub u64);

/// Handle to a native render pass object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuRenderPass(pub u64);

/// Handle to a native framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuFramebuffer(pub u64);

/// Handle to a native render pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuRenderPipeline(pub u64);

/// Handle to a native compute pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuComputePipeline(pub u64);

/// Handle to a native bind group / descriptor set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuBindGroup(pub u64);

/// Handle to a compiled shader module, owned by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuShaderModule(pub u64);

/// Handle to a native sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuSampler(pub u64);

/// Handle to a native fence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuFence(pub u64);

/// Object-safe device interface.
///
/// Creation hooks are the pool miss path; command recording is what pass
/// executables drive through the encoders. A backend records into whatever
/// command stream is current for the frame; this crate only guarantees it
/// calls these methods in pass-declaration order from a single thread.
pub trait RenderDevice {
    // Native object creation and destruction

    fn create_texture(&mut self, desc: &TextureDescriptor) -> DeviceResult<GpuTexture>;
    fn destroy_texture(&mut self, texture: GpuTexture);

    fn create_texture_view(&mut self, desc: &TextureViewDescriptor) -> DeviceResult<GpuTextureView>;
    fn destroy_texture_view(&mut self, view: GpuTextureView);

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> DeviceResult<GpuBuffer>;
    fn destroy_buffer(&mut self, buffer: GpuBuffer);

    fn create_render_pass(&mut self, desc: &RenderPassDescriptor) -> DeviceResult<GpuRenderPass>;
    fn destroy_render_pass(&mut self, render_pass: GpuRenderPass);

    fn create_framebuffer(&mut self, desc: &FramebufferDescriptor) -> DeviceResult<GpuFramebuffer>;
    fn destroy_framebuffer(&mut self, framebuffer: GpuFramebuffer);

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> DeviceResult<GpuRenderPipeline>;
    fn destroy_render_pipeline(&mut self, pipeline: GpuRenderPipeline);

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> DeviceResult<GpuComputePipeline>;
    fn destroy_compute_pipeline(&mut self, pipeline: GpuComputePipeline);

    fn create_bind_group(&mut self, desc: &BindGroupDescriptor) -> DeviceResult<GpuBindGroup>;
    fn destroy_bind_group(&mut self, bind_group: GpuBindGroup);

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> DeviceResult<GpuSampler>;
    fn destroy_sampler(&mut self, sampler: GpuSampler);

    // Data upload

    /// Write bytes into a CPU-visible buffer.
    fn write_buffer(&mut self, buffer: GpuBuffer, offset: u64, data: &[u8]);

    // Barriers / state transitions

    fn transition_texture(&mut self, texture: GpuTexture, from: ResourceState, to: ResourceState);
    fn transition_buffer(&mut self, buffer: GpuBuffer, from: ResourceState, to: ResourceState);

    // Command recording

    fn begin_render_pass(
        &mut self,
        render_pass: GpuRenderPass,
        framebuffer: GpuFramebuffer,
        clear_colors: &[ClearColor],
        clear_depth_stencil: Option<ClearDepthStencil>,
    );
    fn end_render_pass(&mut self);

    fn begin_compute_pass(&mut self, label: &str);
    fn end_compute_pass(&mut self);

    fn set_render_pipeline(&mut self, pipeline: GpuRenderPipeline);
    fn set_compute_pipeline(&mut self, pipeline: GpuComputePipeline);
    fn set_bind_group(&mut self, index: u32, bind_group: GpuBindGroup);
    fn set_vertex_buffer(&mut self, slot: u32, buffer: GpuBuffer, offset: u64);
    fn set_index_buffer(&mut self, buffer: GpuBuffer, offset: u64, format: IndexFormat);
    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32);
    fn set_scissor_rect(&mut self, x: u32, y: u32, width: u32, height: u32);

    fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>);
    fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        base_vertex: i32,
        instances: std::ops::Range<u32>,
    );
    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    fn copy_buffer_to_buffer(
        &mut self,
        src: GpuBuffer,
        src_offset: u64,
        dst: GpuBuffer,
        dst_offset: u64,
        size: u64,
    );
    fn copy_buffer_to_texture(
        &mut self,
        src: GpuBuffer,
        src_offset: u64,
        dst: GpuTexture,
        mip_level: u32,
        array_layer: u32,
    );

    // Submission and synchronization

    fn create_fence(&mut self) -> DeviceResult<GpuFence>;
    fn destroy_fence(&mut self, fence: GpuFence);

    /// Submit everything recorded so far, optionally signaling `fence`.
    fn submit(&mut self, signal_fence: Option<GpuFence>);

    /// Block until `fence` signals. A submission that never completes is a
    /// fatal hang at this layer, not a cancellable operation.
    fn wait_fence(&mut self, fence: GpuFence);
}
