//! Per-frame declaration surface.
//!
//! A [`RenderGraph`] is rebuilt every frame: declare resources, declare
//! passes in execution order, attach executables, mark the present target,
//! then hand the graph to [`compile`](crate::graph::compiler::compile).
//! Nothing here touches the device.
//!
//! Pass order contract: compiled execution order is declaration order.
//! A pass must be declared after every pass that produces one of its
//! inputs; the compiler checks this in debug builds.

use crate::backend::traits::{GpuBuffer, GpuTexture};
use crate::backend::types::*;
use crate::graph::pass::*;
use crate::graph::resource::*;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(0);

/// The per-frame render graph builder.
pub struct RenderGraph {
    pub(crate) id: u32,
    pub(crate) resources: Vec<ResourceNode>,
    pub(crate) passes: Vec<PassNode>,
    pub(crate) present: Option<u16>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            resources: Vec::new(),
            passes: Vec::new(),
            present: None,
        }
    }

    // Resource declaration

    /// Register a managed texture. Size and format are filled in with the
    /// mutators below before compile.
    pub fn declare_texture(&mut self, name: &str) -> TextureHandle {
        self.push_texture(TextureNode {
            name: name.to_string(),
            desc: TextureDescriptor {
                usage: TextureUsage::NONE,
                ..Default::default()
            },
            imported: None,
            parent: None,
            mip_level: 0,
            array_layer: 0,
        })
    }

    /// Register a managed buffer.
    pub fn declare_buffer(&mut self, name: &str) -> BufferHandle {
        self.push_buffer(BufferNode {
            name: name.to_string(),
            desc: BufferDescriptor::default(),
            imported: None,
        })
    }

    /// Register a texture whose native backing is owned outside the graph
    /// (e.g. the swapchain image). The graph never allocates or frees it.
    pub fn import_texture(
        &mut self,
        name: &str,
        texture: GpuTexture,
        desc: &TextureDescriptor,
    ) -> TextureHandle {
        self.push_texture(TextureNode {
            name: name.to_string(),
            desc: desc.clone(),
            imported: Some(texture),
            parent: None,
            mip_level: 0,
            array_layer: 0,
        })
    }

    /// Register a buffer backed by an externally owned native object
    /// (e.g. a persistent mesh buffer).
    pub fn import_buffer(
        &mut self,
        name: &str,
        buffer: GpuBuffer,
        desc: &BufferDescriptor,
    ) -> BufferHandle {
        self.push_buffer(BufferNode {
            name: name.to_string(),
            desc: desc.clone(),
            imported: Some(buffer),
        })
    }

    /// Register a sub-view of `parent` selecting one mip level and array
    /// layer. The view shares the parent's backing; its uses extend the
    /// parent's lifetime.
    pub fn declare_texture_view(
        &mut self,
        name: &str,
        parent: TextureHandle,
        mip_level: u32,
        array_layer: u32,
    ) -> TextureHandle {
        let parent_index = self.check_texture(parent);
        let desc = match &self.resources[parent_index as usize] {
            ResourceNode::Texture(t) => {
                assert!(mip_level < t.desc.mip_levels, "mip level out of range");
                assert!(array_layer < t.desc.array_layers, "array layer out of range");
                t.desc.clone()
            }
            ResourceNode::Buffer(_) => unreachable!(),
        };
        self.push_texture(TextureNode {
            name: name.to_string(),
            desc,
            imported: None,
            parent: Some(parent_index),
            mip_level,
            array_layer,
        })
    }

    // Texture mutators

    pub fn texture_set_extent(&mut self, handle: TextureHandle, width: u32, height: u32) {
        let t = self.texture_mut(handle);
        t.desc.width = width;
        t.desc.height = height;
    }

    pub fn texture_set_format(&mut self, handle: TextureHandle, format: TextureFormat) {
        self.texture_mut(handle).desc.format = format;
    }

    /// Shortcut for declaring a depth attachment target.
    pub fn texture_set_depth_format(&mut self, handle: TextureHandle, format: TextureFormat) {
        assert!(format.is_depth(), "not a depth format: {format:?}");
        let t = self.texture_mut(handle);
        t.desc.format = format;
        t.desc.usage |= TextureUsage::RENDER_ATTACHMENT;
    }

    pub fn texture_set_mip_levels(&mut self, handle: TextureHandle, mip_levels: u32) {
        self.texture_mut(handle).desc.mip_levels = mip_levels;
    }

    pub fn texture_set_array_layers(&mut self, handle: TextureHandle, array_layers: u32) {
        self.texture_mut(handle).desc.array_layers = array_layers;
    }

    pub fn texture_extent(&self, handle: TextureHandle) -> (u32, u32) {
        match &self.resources[self.check_texture(handle) as usize] {
            ResourceNode::Texture(t) => (t.desc.width, t.desc.height),
            ResourceNode::Buffer(_) => unreachable!(),
        }
    }

    // Buffer mutators

    pub fn buffer_set_size(&mut self, handle: BufferHandle, size: u64) {
        self.buffer_mut(handle).desc.size = size;
    }

    pub fn buffer_set_usage(&mut self, handle: BufferHandle, usage: BufferUsage) {
        self.buffer_mut(handle).desc.usage |= usage;
    }

    pub fn buffer_set_memory(&mut self, handle: BufferHandle, memory: MemoryLocation) {
        self.buffer_mut(handle).desc.memory = memory;
    }

    // Pass declaration

    /// Begin a render pass. Declare attachments and usages through the
    /// returned builder; the pass joins the graph when the builder drops.
    pub fn add_render_pass(&mut self, name: &str) -> RenderPassBuilder<'_> {
        RenderPassBuilder {
            pass: Some(PassNode::new(name, PassKind::Render)),
            graph: self,
        }
    }

    /// Begin a compute pass.
    pub fn add_compute_pass(&mut self, name: &str) -> ComputePassBuilder<'_> {
        ComputePassBuilder {
            pass: Some(PassNode::new(name, PassKind::Compute)),
            graph: self,
        }
    }

    /// Record an upload into `dst` at `offset`. `fill` runs at execution
    /// time against the staging slice; the copy is recorded right after.
    pub fn add_upload_buffer_pass_with(
        &mut self,
        name: &str,
        dst: BufferHandle,
        offset: u64,
        size: u64,
        fill: impl FnOnce(&mut [u8]) + 'static,
    ) {
        let resource = self.check_buffer(dst);
        let mut pass = PassNode::new(name, PassKind::UploadBuffer);
        pass.writes.push(Edge {
            resource,
            usage: ResourceUsage::CopyDst,
        });
        pass.upload = Some(UploadInfo {
            target: UploadTarget::Buffer { resource, offset },
            size,
            fill: Box::new(fill),
        });
        self.passes.push(pass);
    }

    /// Upload `data` into `dst` at `offset`.
    pub fn add_upload_buffer_pass(&mut self, name: &str, dst: BufferHandle, offset: u64, data: &[u8]) {
        let bytes = data.to_vec();
        self.add_upload_buffer_pass_with(name, dst, offset, bytes.len() as u64, move |staging| {
            staging.copy_from_slice(&bytes)
        });
    }

    /// Record an upload into one mip/layer of `dst`.
    pub fn add_upload_texture_pass_with(
        &mut self,
        name: &str,
        dst: TextureHandle,
        mip_level: u32,
        array_layer: u32,
        size: u64,
        fill: impl FnOnce(&mut [u8]) + 'static,
    ) {
        let resource = self.check_texture(dst);
        let mut pass = PassNode::new(name, PassKind::UploadTexture);
        pass.writes.push(Edge {
            resource,
            usage: ResourceUsage::CopyDst,
        });
        pass.upload = Some(UploadInfo {
            target: UploadTarget::Texture {
                resource,
                mip_level,
                array_layer,
            },
            size,
            fill: Box::new(fill),
        });
        self.passes.push(pass);
    }

    /// Upload `data` into one mip/layer of `dst`.
    pub fn add_upload_texture_pass(
        &mut self,
        name: &str,
        dst: TextureHandle,
        mip_level: u32,
        array_layer: u32,
        data: &[u8],
    ) {
        let bytes = data.to_vec();
        self.add_upload_texture_pass_with(
            name,
            dst,
            mip_level,
            array_layer,
            bytes.len() as u64,
            move |staging| staging.copy_from_slice(&bytes),
        );
    }

    /// Declare a transient uniform buffer and upload `data` into it in one
    /// call. The buffer lives for this frame only.
    pub fn declare_uniform_buffer<T: bytemuck::NoUninit>(
        &mut self,
        name: &str,
        data: &[T],
    ) -> BufferHandle {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let handle = self.declare_buffer(name);
        self.buffer_set_size(handle, bytes.len() as u64);
        self.buffer_set_usage(handle, BufferUsage::UNIFORM | BufferUsage::COPY_DST);
        self.add_upload_buffer_pass(name, handle, 0, bytes);
        handle
    }

    /// Mark `handle` as the frame's output. Liveness analysis anchors
    /// here: passes with no path to the present target and no side effect
    /// are dead code.
    pub fn present(&mut self, handle: TextureHandle) {
        let index = self.check_texture(handle);
        self.present = Some(index);
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    // Internals

    fn push_texture(&mut self, node: TextureNode) -> TextureHandle {
        let index = self.push_resource(ResourceNode::Texture(node));
        TextureHandle {
            index,
            graph: self.id,
        }
    }

    fn push_buffer(&mut self, node: BufferNode) -> BufferHandle {
        let index = self.push_resource(ResourceNode::Buffer(node));
        BufferHandle {
            index,
            graph: self.id,
        }
    }

    fn push_resource(&mut self, node: ResourceNode) -> u16 {
        let index = self.resources.len();
        assert!(index <= u16::MAX as usize, "too many resources in one graph");
        self.resources.push(node);
        index as u16
    }

    pub(crate) fn check_texture(&self, handle: TextureHandle) -> u16 {
        assert_eq!(
            handle.graph, self.id,
            "texture handle used outside the graph that created it"
        );
        debug_assert!(matches!(
            self.resources[handle.index as usize],
            ResourceNode::Texture(_)
        ));
        handle.index
    }

    pub(crate) fn check_buffer(&self, handle: BufferHandle) -> u16 {
        assert_eq!(
            handle.graph, self.id,
            "buffer handle used outside the graph that created it"
        );
        debug_assert!(matches!(
            self.resources[handle.index as usize],
            ResourceNode::Buffer(_)
        ));
        handle.index
    }

    fn texture_mut(&mut self, handle: TextureHandle) -> &mut TextureNode {
        let index = self.check_texture(handle);
        match &mut self.resources[index as usize] {
            ResourceNode::Texture(t) => {
                assert!(t.imported.is_none(), "cannot mutate an imported texture");
                t
            }
            ResourceNode::Buffer(_) => unreachable!(),
        }
    }

    fn buffer_mut(&mut self, handle: BufferHandle) -> &mut BufferNode {
        let index = self.check_buffer(handle);
        match &mut self.resources[index as usize] {
            ResourceNode::Buffer(b) => {
                assert!(b.imported.is_none(), "cannot mutate an imported buffer");
                b
            }
            ResourceNode::Texture(_) => unreachable!(),
        }
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent builder for a render pass. The pass is appended to the graph in
/// declaration position when the builder goes out of scope; attaching an
/// executable consumes the builder.
pub struct RenderPassBuilder<'g> {
    graph: &'g mut RenderGraph,
    pass: Option<PassNode>,
}

impl<'g> RenderPassBuilder<'g> {
    /// Attach a color render target.
    pub fn color(
        mut self,
        target: TextureHandle,
        load_action: LoadAction,
        clear: ClearColor,
        store_action: StoreAction,
    ) -> Self {
        let resource = self.graph.check_texture(target);
        let pass = self.pass.as_mut().unwrap();
        pass.color_attachments.push(ColorAttachmentInfo {
            resource,
            load_action,
            store_action,
            clear,
        });
        pass.writes.push(Edge {
            resource,
            usage: ResourceUsage::RenderTarget,
        });
        self
    }

    /// Attach a writable depth/stencil target.
    pub fn depth(
        mut self,
        target: TextureHandle,
        load_action: LoadAction,
        clear: ClearDepthStencil,
        store_action: StoreAction,
    ) -> Self {
        let resource = self.graph.check_texture(target);
        let pass = self.pass.as_mut().unwrap();
        assert!(pass.depth_attachment.is_none(), "depth attachment already set");
        pass.depth_attachment = Some(DepthAttachmentInfo {
            resource,
            depth_load_action: load_action,
            depth_store_action: store_action,
            stencil_load_action: load_action,
            stencil_store_action: store_action,
            clear,
            read_only: false,
        });
        pass.writes.push(Edge {
            resource,
            usage: ResourceUsage::DepthWrite,
        });
        self
    }

    /// Attach a read-only depth target (depth testing without writes).
    pub fn depth_read(mut self, target: TextureHandle) -> Self {
        let resource = self.graph.check_texture(target);
        let pass = self.pass.as_mut().unwrap();
        assert!(pass.depth_attachment.is_none(), "depth attachment already set");
        pass.depth_attachment = Some(DepthAttachmentInfo {
            resource,
            depth_load_action: LoadAction::Load,
            depth_store_action: StoreAction::Store,
            stencil_load_action: LoadAction::Load,
            stencil_store_action: StoreAction::Store,
            clear: ClearDepthStencil::default(),
            read_only: true,
        });
        pass.reads.push(Edge {
            resource,
            usage: ResourceUsage::DepthRead,
        });
        self
    }

    /// Declare a texture read.
    pub fn read_texture(mut self, texture: TextureHandle, usage: ResourceUsage) -> Self {
        assert!(!usage.is_write(), "read_texture given a write usage");
        let resource = self.graph.check_texture(texture);
        self.pass.as_mut().unwrap().reads.push(Edge { resource, usage });
        self
    }

    /// Declare a sampled texture read.
    pub fn sample(self, texture: TextureHandle) -> Self {
        self.read_texture(texture, ResourceUsage::Sampled)
    }

    /// Declare a buffer read.
    pub fn read_buffer(mut self, buffer: BufferHandle, usage: ResourceUsage) -> Self {
        assert!(!usage.is_write(), "read_buffer given a write usage");
        let resource = self.graph.check_buffer(buffer);
        self.pass.as_mut().unwrap().reads.push(Edge { resource, usage });
        self
    }

    /// Declare a buffer write.
    pub fn write_buffer(mut self, buffer: BufferHandle, usage: ResourceUsage) -> Self {
        assert!(usage.is_write(), "write_buffer given a read usage");
        let resource = self.graph.check_buffer(buffer);
        self.pass.as_mut().unwrap().writes.push(Edge { resource, usage });
        self
    }

    /// Declare a uniform buffer read.
    pub fn uniform(self, buffer: BufferHandle) -> Self {
        self.read_buffer(buffer, ResourceUsage::Uniform)
    }

    /// Declare a vertex buffer read.
    pub fn vertex(self, buffer: BufferHandle) -> Self {
        self.read_buffer(buffer, ResourceUsage::Vertex)
    }

    /// Declare an index buffer read.
    pub fn index(self, buffer: BufferHandle) -> Self {
        self.read_buffer(buffer, ResourceUsage::Index)
    }

    /// Attach the closure the executor invokes between begin and end of
    /// the native pass.
    pub fn executable(
        mut self,
        f: impl FnOnce(&mut crate::graph::executor::RenderPassEncoder<'_>) -> crate::backend::DeviceResult<()>
            + 'static,
    ) {
        self.pass.as_mut().unwrap().render_executable = Some(Box::new(f));
    }
}

impl Drop for RenderPassBuilder<'_> {
    fn drop(&mut self) {
        if let Some(pass) = self.pass.take() {
            self.graph.passes.push(pass);
        }
    }
}

/// Fluent builder for a compute pass.
pub struct ComputePassBuilder<'g> {
    graph: &'g mut RenderGraph,
    pass: Option<PassNode>,
}

impl<'g> ComputePassBuilder<'g> {
    pub fn read_texture(mut self, texture: TextureHandle, usage: ResourceUsage) -> Self {
        assert!(!usage.is_write(), "read_texture given a write usage");
        let resource = self.graph.check_texture(texture);
        self.pass.as_mut().unwrap().reads.push(Edge { resource, usage });
        self
    }

    pub fn write_texture(mut self, texture: TextureHandle, usage: ResourceUsage) -> Self {
        assert!(usage.is_write(), "write_texture given a read usage");
        let resource = self.graph.check_texture(texture);
        self.pass.as_mut().unwrap().writes.push(Edge { resource, usage });
        self
    }

    pub fn read_buffer(mut self, buffer: BufferHandle, usage: ResourceUsage) -> Self {
        assert!(!usage.is_write(), "read_buffer given a write usage");
        let resource = self.graph.check_buffer(buffer);
        self.pass.as_mut().unwrap().reads.push(Edge { resource, usage });
        self
    }

    pub fn write_buffer(mut self, buffer: BufferHandle, usage: ResourceUsage) -> Self {
        assert!(usage.is_write(), "write_buffer given a read usage");
        let resource = self.graph.check_buffer(buffer);
        self.pass.as_mut().unwrap().writes.push(Edge { resource, usage });
        self
    }

    /// Declare a storage buffer the pass both reads and writes.
    pub fn read_write_buffer(mut self, buffer: BufferHandle) -> Self {
        let resource = self.graph.check_buffer(buffer);
        let pass = self.pass.as_mut().unwrap();
        pass.reads.push(Edge {
            resource,
            usage: ResourceUsage::StorageRead,
        });
        pass.writes.push(Edge {
            resource,
            usage: ResourceUsage::StorageWrite,
        });
        self
    }

    pub fn executable(
        mut self,
        f: impl FnOnce(&mut crate::graph::executor::ComputePassEncoder<'_>) -> crate::backend::DeviceResult<()>
            + 'static,
    ) {
        self.pass.as_mut().unwrap().compute_executable = Some(Box::new(f));
    }
}

impl Drop for ComputePassBuilder<'_> {
    fn drop(&mut self) {
        if let Some(pass) = self.pass.take() {
            self.graph.passes.push(pass);
        }
    }
}
