//! The frame graph: declare, compile, execute.
//!
//! A frame follows one shape: build a [`RenderGraph`], declare resources
//! and passes in the order they should run, [`compile`] it into a
//! [`CompiledRenderGraph`], and hand that to a [`GraphExecutor`]. The
//! graph is rebuilt from scratch every frame; the executor and its pools
//! persist.

pub mod builder;
pub mod compiler;
pub mod executor;
pub mod pass;
pub mod resource;

pub use builder::{ComputePassBuilder, RenderGraph, RenderPassBuilder};
pub use compiler::{compile, CompileError, CompiledRenderGraph};
pub use executor::{ComputePassEncoder, GraphExecutor, RenderPassEncoder, SharedPools};
pub use pass::PassKind;
pub use resource::{BufferHandle, ResourceUsage, TextureHandle};
