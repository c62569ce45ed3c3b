//! Render pass and framebuffer pools.
//!
//! Both are keyed on resolved attachment descriptors and shared: every
//! pass in every frame with the same attachment layout reuses one native
//! render pass object, and framebuffers binding the same concrete views
//! reuse one native framebuffer.

use crate::backend::traits::{DeviceResult, GpuFramebuffer, GpuRenderPass, RenderDevice};
use crate::backend::types::{FramebufferDescriptor, RenderPassDescriptor};
use crate::pool::{PoolMode, PooledResource, ResourcePool};

pub struct PooledRenderPass {
    pub handle: GpuRenderPass,
}

impl PooledResource for PooledRenderPass {
    type Desc = RenderPassDescriptor;
    const MODE: PoolMode = PoolMode::Shared;
    const KIND: &'static str = "render pass";

    fn create(device: &mut dyn RenderDevice, desc: &Self::Desc) -> DeviceResult<Self> {
        Ok(Self {
            handle: device.create_render_pass(desc)?,
        })
    }

    fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_render_pass(self.handle);
    }
}

pub type RenderPassPool = ResourcePool<PooledRenderPass>;

pub struct PooledFramebuffer {
    pub handle: GpuFramebuffer,
}

impl PooledResource for PooledFramebuffer {
    type Desc = FramebufferDescriptor;
    const MODE: PoolMode = PoolMode::Shared;
    const KIND: &'static str = "framebuffer";

    fn create(device: &mut dyn RenderDevice, desc: &Self::Desc) -> DeviceResult<Self> {
        Ok(Self {
            handle: device.create_framebuffer(desc)?,
        })
    }

    fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_framebuffer(self.handle);
    }
}

pub type FramebufferPool = ResourcePool<PooledFramebuffer>;
