//! A frame graph over an abstract GPU device.
//!
//! Rendering is declared once per frame as a graph of passes and virtual
//! resources, compiled into a linear execution plan, and executed against
//! a [`RenderDevice`](backend::RenderDevice) backend. Expensive native
//! objects — textures, buffers, pipelines, render passes, framebuffers,
//! bind groups — live in descriptor-keyed [pools](pool) owned by the
//! executor, so identical requests across frames reuse one object and
//! transient targets alias within a frame.
//!
//! ```no_run
//! use rendergraph::backend::{NullDevice, TextureFormat, LoadAction, StoreAction, ClearColor};
//! use rendergraph::graph::{compile, GraphExecutor, RenderGraph};
//!
//! let mut device = NullDevice::new();
//! let mut executor = GraphExecutor::new();
//!
//! let mut graph = RenderGraph::new();
//! let target = graph.declare_texture("frame");
//! graph.texture_set_extent(target, 1280, 720);
//! graph.texture_set_format(target, TextureFormat::Bgra8UnormSrgb);
//! graph
//!     .add_render_pass("clear")
//!     .color(target, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
//!     .executable(|_encoder| Ok(()));
//! graph.present(target);
//!
//! let compiled = compile(graph).expect("graph compiles");
//! executor.execute(compiled, &mut device).expect("frame executes");
//! ```

pub mod backend;
pub mod frame;
pub mod graph;
pub mod pool;

pub use backend::{DeviceError, DeviceResult, RenderDevice};
pub use frame::{FrameRing, FRAMES_IN_FLIGHT};
pub use graph::{
    compile, BufferHandle, CompileError, CompiledRenderGraph, GraphExecutor, RenderGraph,
    ResourceUsage, SharedPools, TextureHandle,
};
pub use pool::{PoolToken, ResourcePool, DEFAULT_RETENTION_FRAMES};
