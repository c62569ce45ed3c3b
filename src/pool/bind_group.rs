//! Bind group (descriptor set) pool. Shared; keyed on the exact set of
//! bound resources, so a frame re-binding the same views and buffers hits
//! the cache.

use crate::backend::traits::{DeviceResult, GpuBindGroup, RenderDevice};
use crate::backend::types::BindGroupDescriptor;
use crate::pool::{PoolMode, PooledResource, ResourcePool};

pub struct PooledBindGroup {
    pub handle: GpuBindGroup,
}

impl PooledResource for PooledBindGroup {
    type Desc = BindGroupDescriptor;
    const MODE: PoolMode = PoolMode::Shared;
    const KIND: &'static str = "bind group";

    fn create(device: &mut dyn RenderDevice, desc: &Self::Desc) -> DeviceResult<Self> {
        Ok(Self {
            handle: device.create_bind_group(desc)?,
        })
    }

    fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_bind_group(self.handle);
    }
}

pub type BindGroupPool = ResourcePool<PooledBindGroup>;
