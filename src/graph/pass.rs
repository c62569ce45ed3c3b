//! Pass nodes: one discrete unit of GPU work with declared reads/writes.
//!
//! The executable attached to a pass is a boxed `FnOnce` invoked by the
//! executor with a recording encoder; captures travel inside the closure,
//! so there is no per-pass payload arena to manage.

use crate::backend::traits::DeviceResult;
use crate::backend::types::{ClearColor, ClearDepthStencil, LoadAction, StoreAction};
use crate::graph::executor::{ComputePassEncoder, RenderPassEncoder};
use crate::graph::resource::Edge;

/// Kind of work a pass records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Render,
    Compute,
    UploadBuffer,
    UploadTexture,
}

impl PassKind {
    /// Upload passes have externally visible side effects and survive
    /// dead-pass elimination unconditionally.
    pub fn has_side_effect(&self) -> bool {
        matches!(self, PassKind::UploadBuffer | PassKind::UploadTexture)
    }
}

pub type RenderPassExecutable =
    Box<dyn FnOnce(&mut RenderPassEncoder<'_>) -> DeviceResult<()>>;
pub type ComputePassExecutable =
    Box<dyn FnOnce(&mut ComputePassEncoder<'_>) -> DeviceResult<()>>;
/// Fills the staging slice an upload pass copies from.
pub type UploadFill = Box<dyn FnOnce(&mut [u8])>;

pub(crate) struct ColorAttachmentInfo {
    pub resource: u16,
    pub load_action: LoadAction,
    pub store_action: StoreAction,
    pub clear: ClearColor,
}

pub(crate) struct DepthAttachmentInfo {
    pub resource: u16,
    pub depth_load_action: LoadAction,
    pub depth_store_action: StoreAction,
    pub stencil_load_action: LoadAction,
    pub stencil_store_action: StoreAction,
    pub clear: ClearDepthStencil,
    pub read_only: bool,
}

pub(crate) enum UploadTarget {
    Buffer { resource: u16, offset: u64 },
    Texture { resource: u16, mip_level: u32, array_layer: u32 },
}

pub(crate) struct UploadInfo {
    pub target: UploadTarget,
    pub size: u64,
    pub fill: UploadFill,
}

pub(crate) struct PassNode {
    pub name: String,
    pub kind: PassKind,
    pub reads: Vec<Edge>,
    pub writes: Vec<Edge>,
    pub color_attachments: Vec<ColorAttachmentInfo>,
    pub depth_attachment: Option<DepthAttachmentInfo>,
    pub render_executable: Option<RenderPassExecutable>,
    pub compute_executable: Option<ComputePassExecutable>,
    pub upload: Option<UploadInfo>,
}

impl PassNode {
    pub fn new(name: &str, kind: PassKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            reads: Vec::new(),
            writes: Vec::new(),
            color_attachments: Vec::new(),
            depth_attachment: None,
            render_executable: None,
            compute_executable: None,
            upload: None,
        }
    }
}
