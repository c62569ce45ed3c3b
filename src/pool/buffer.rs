//! Buffer pool. Exclusive, like textures: the same staging-buffer
//! descriptor requested twice in one frame yields two native buffers.

use crate::backend::traits::{DeviceResult, GpuBuffer, RenderDevice};
use crate::backend::types::BufferDescriptor;
use crate::pool::{PoolMode, PooledResource, ResourcePool};

pub struct PooledBuffer {
    pub handle: GpuBuffer,
}

impl PooledResource for PooledBuffer {
    type Desc = BufferDescriptor;
    const MODE: PoolMode = PoolMode::Exclusive;
    const KIND: &'static str = "buffer";

    fn create(device: &mut dyn RenderDevice, desc: &Self::Desc) -> DeviceResult<Self> {
        Ok(Self {
            handle: device.create_buffer(desc)?,
        })
    }

    fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_buffer(self.handle);
    }
}

pub type BufferPool = ResourcePool<PooledBuffer>;
