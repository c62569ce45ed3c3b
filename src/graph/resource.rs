//! Frame-local virtual resources.
//!
//! Handles are opaque indices into the graph that produced them, stamped
//! with that graph's id; using a handle against another graph (or a later
//! frame's graph) is a caller bug and panics. No native object exists
//! behind a managed handle until the executor devirtualizes it.

use crate::backend::traits::{GpuBuffer, GpuTexture};
use crate::backend::types::*;

/// Handle to a texture declared in or imported into a render graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle {
    pub(crate) index: u16,
    pub(crate) graph: u32,
}

/// Handle to a buffer declared in or imported into a render graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    pub(crate) index: u16,
    pub(crate) graph: u32,
}

/// How a pass accesses a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceUsage {
    /// Sampled in a shader
    Sampled,
    /// Written as a color render target
    RenderTarget,
    /// Depth attachment, written
    DepthWrite,
    /// Depth attachment, read only
    DepthRead,
    /// Storage texture / buffer, read
    StorageRead,
    /// Storage texture / buffer, written
    StorageWrite,
    /// Read as a uniform buffer
    Uniform,
    /// Bound as a vertex buffer
    Vertex,
    /// Bound as an index buffer
    Index,
    /// Source of a copy
    CopySrc,
    /// Destination of a copy
    CopyDst,
    /// Final presented output
    Present,
}

impl ResourceUsage {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ResourceUsage::RenderTarget
                | ResourceUsage::DepthWrite
                | ResourceUsage::StorageWrite
                | ResourceUsage::CopyDst
        )
    }

    /// The state the resource must be transitioned to for this access.
    pub(crate) fn state(&self) -> ResourceState {
        match self {
            ResourceUsage::Sampled => ResourceState::ShaderResource,
            ResourceUsage::RenderTarget => ResourceState::RenderTarget,
            ResourceUsage::DepthWrite => ResourceState::DepthWrite,
            ResourceUsage::DepthRead => ResourceState::DepthRead,
            ResourceUsage::StorageRead | ResourceUsage::StorageWrite => {
                ResourceState::UnorderedAccess
            }
            ResourceUsage::Uniform => ResourceState::UniformBuffer,
            ResourceUsage::Vertex => ResourceState::VertexBuffer,
            ResourceUsage::Index => ResourceState::IndexBuffer,
            ResourceUsage::CopySrc => ResourceState::CopySource,
            ResourceUsage::CopyDst => ResourceState::CopyDest,
            ResourceUsage::Present => ResourceState::Present,
        }
    }

    /// The creation usage flags this access implies for a managed texture.
    pub(crate) fn texture_usage(&self) -> TextureUsage {
        match self {
            ResourceUsage::Sampled => TextureUsage::SAMPLED,
            ResourceUsage::RenderTarget
            | ResourceUsage::DepthWrite
            | ResourceUsage::DepthRead
            | ResourceUsage::Present => TextureUsage::RENDER_ATTACHMENT,
            ResourceUsage::StorageRead | ResourceUsage::StorageWrite => TextureUsage::STORAGE,
            ResourceUsage::CopySrc => TextureUsage::COPY_SRC,
            ResourceUsage::CopyDst => TextureUsage::COPY_DST,
            ResourceUsage::Uniform | ResourceUsage::Vertex | ResourceUsage::Index => {
                TextureUsage::NONE
            }
        }
    }

    /// The creation usage flags this access implies for a managed buffer.
    pub(crate) fn buffer_usage(&self) -> BufferUsage {
        match self {
            ResourceUsage::Uniform => BufferUsage::UNIFORM,
            ResourceUsage::Vertex => BufferUsage::VERTEX,
            ResourceUsage::Index => BufferUsage::INDEX,
            ResourceUsage::StorageRead | ResourceUsage::StorageWrite => BufferUsage::STORAGE,
            ResourceUsage::CopySrc => BufferUsage::COPY_SRC,
            ResourceUsage::CopyDst => BufferUsage::COPY_DST,
            _ => BufferUsage::NONE,
        }
    }
}

/// A read or write declared by a pass: resource index plus access.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Edge {
    pub resource: u16,
    pub usage: ResourceUsage,
}

pub(crate) struct TextureNode {
    pub name: String,
    pub desc: TextureDescriptor,
    pub imported: Option<GpuTexture>,
    /// Sub-view of another texture resource (mip/slice selection).
    pub parent: Option<u16>,
    pub mip_level: u32,
    pub array_layer: u32,
}

pub(crate) struct BufferNode {
    pub name: String,
    pub desc: BufferDescriptor,
    pub imported: Option<GpuBuffer>,
}

/// A resource slot in the builder: either a texture or a buffer.
pub(crate) enum ResourceNode {
    Texture(TextureNode),
    Buffer(BufferNode),
}

impl ResourceNode {
    pub fn name(&self) -> &str {
        match self {
            ResourceNode::Texture(t) => &t.name,
            ResourceNode::Buffer(b) => &b.name,
        }
    }
}
