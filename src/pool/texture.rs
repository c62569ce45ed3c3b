//! Texture and texture-view pools.
//!
//! Textures back transient graph resources and are handed out exclusively:
//! two resources alive at the same time never share a native texture, even
//! with equal descriptors. Views are cheap derived objects and are shared.

use crate::backend::traits::{DeviceResult, GpuTexture, GpuTextureView, RenderDevice};
use crate::backend::types::{TextureDescriptor, TextureViewDescriptor};
use crate::pool::{PoolMode, PooledResource, ResourcePool};

pub struct PooledTexture {
    pub handle: GpuTexture,
}

impl PooledResource for PooledTexture {
    type Desc = TextureDescriptor;
    const MODE: PoolMode = PoolMode::Exclusive;
    const KIND: &'static str = "texture";

    fn create(device: &mut dyn RenderDevice, desc: &Self::Desc) -> DeviceResult<Self> {
        Ok(Self {
            handle: device.create_texture(desc)?,
        })
    }

    fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_texture(self.handle);
    }
}

pub type TexturePool = ResourcePool<PooledTexture>;

pub struct PooledTextureView {
    pub handle: GpuTextureView,
}

impl PooledResource for PooledTextureView {
    type Desc = TextureViewDescriptor;
    const MODE: PoolMode = PoolMode::Shared;
    const KIND: &'static str = "texture view";

    fn create(device: &mut dyn RenderDevice, desc: &Self::Desc) -> DeviceResult<Self> {
        Ok(Self {
            handle: device.create_texture_view(desc)?,
        })
    }

    fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_texture_view(self.handle);
    }
}

pub type TextureViewPool = ResourcePool<PooledTextureView>;
