//! Render and compute pipeline pools. Shared; pipeline state objects are
//! the most expensive things the pools amortize.

use crate::backend::traits::{DeviceResult, GpuComputePipeline, GpuRenderPipeline, RenderDevice};
use crate::backend::types::{ComputePipelineDescriptor, RenderPipelineDescriptor};
use crate::pool::{PoolMode, PooledResource, ResourcePool};

pub struct PooledRenderPipeline {
    pub handle: GpuRenderPipeline,
}

impl PooledResource for PooledRenderPipeline {
    type Desc = RenderPipelineDescriptor;
    const MODE: PoolMode = PoolMode::Shared;
    const KIND: &'static str = "render pipeline";

    fn create(device: &mut dyn RenderDevice, desc: &Self::Desc) -> DeviceResult<Self> {
        Ok(Self {
            handle: device.create_render_pipeline(desc)?,
        })
    }

    fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_render_pipeline(self.handle);
    }
}

pub type RenderPipelinePool = ResourcePool<PooledRenderPipeline>;

pub struct PooledComputePipeline {
    pub handle: GpuComputePipeline,
}

impl PooledResource for PooledComputePipeline {
    type Desc = ComputePipelineDescriptor;
    const MODE: PoolMode = PoolMode::Shared;
    const KIND: &'static str = "compute pipeline";

    fn create(device: &mut dyn RenderDevice, desc: &Self::Desc) -> DeviceResult<Self> {
        Ok(Self {
            handle: device.create_compute_pipeline(desc)?,
        })
    }

    fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_compute_pipeline(self.handle);
    }
}

pub type ComputePipelinePool = ResourcePool<PooledComputePipeline>;
