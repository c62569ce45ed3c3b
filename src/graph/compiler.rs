//! Graph compilation: turns the declared frame into an execution plan.
//!
//! Compilation runs four phases over the declared graph:
//! 1. liveness — walk passes in reverse from the present target, dropping
//!    passes whose output nothing consumes (uploads always survive);
//! 2. lifetimes — per surviving resource, the `[first_use, last_use]`
//!    interval in compiled pass order, with sub-views charged to their
//!    parent texture;
//! 3. aliasing — managed resources with equal descriptors and disjoint
//!    intervals are assigned the same backing slot, which the executor
//!    realizes by releasing one pool entry before acquiring the next;
//! 4. state resolution — each pass edge becomes the concrete
//!    [`ResourceState`] its access requires, ready for the executor to
//!    diff against tracked state.
//!
//! Execution order is declaration order; compilation never reorders
//! passes. Reading a resource before any pass has written it is a caller
//! bug checked in debug builds.

use crate::backend::traits::{GpuBuffer, GpuTexture};
use crate::backend::types::*;
use crate::graph::builder::RenderGraph;
use crate::graph::pass::*;
use crate::graph::resource::*;
use std::collections::HashSet;
use thiserror::Error;

/// Frame-recoverable compilation failure. The caller drops the graph,
/// skips the frame, and may rebuild next frame.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("present target '{0}' is never written by any pass")]
    PresentTargetNeverWritten(String),
}

pub(crate) struct CompiledTexture {
    pub desc: TextureDescriptor,
    pub imported: Option<GpuTexture>,
    /// Compiled index of the texture this node is a sub-view of.
    pub parent: Option<u16>,
    pub mip_level: u32,
    pub array_layer: u32,
}

pub(crate) struct CompiledBuffer {
    pub desc: BufferDescriptor,
    pub imported: Option<GpuBuffer>,
}

pub(crate) enum CompiledResourceKind {
    Texture(CompiledTexture),
    Buffer(CompiledBuffer),
}

pub(crate) struct CompiledResource {
    pub name: String,
    pub kind: CompiledResourceKind,
    /// First and last compiled pass index touching this resource (through
    /// any sub-view, for parents).
    pub first_use: u16,
    pub last_use: u16,
    /// Backing slot for managed root resources. Equal slots mean the
    /// executor reuses one native object across disjoint lifetimes.
    pub slot: Option<u32>,
}

impl CompiledResource {
    pub fn is_imported(&self) -> bool {
        match &self.kind {
            CompiledResourceKind::Texture(t) => t.imported.is_some(),
            CompiledResourceKind::Buffer(b) => b.imported.is_some(),
        }
    }

    fn is_root(&self) -> bool {
        !matches!(&self.kind, CompiledResourceKind::Texture(t) if t.parent.is_some())
    }
}

pub(crate) struct CompiledPass {
    pub name: String,
    pub kind: PassKind,
    /// States to settle before the pass runs, one per accessed backing.
    pub transitions: Vec<(u16, ResourceState)>,
    /// Managed backings whose first use is this pass; acquired from the
    /// pools right before the pass.
    pub devirtualize: Vec<u16>,
    /// Managed backings whose last use is this pass; handed back to the
    /// pools right after, freeing them for aliases later in the frame.
    pub destroy: Vec<u16>,
    pub color_attachments: Vec<ColorAttachmentInfo>,
    pub depth_attachment: Option<DepthAttachmentInfo>,
    /// Attachment layout for the render pass object, precomputed so the
    /// executor's pool lookup is a plain hash probe.
    pub render_pass_desc: Option<RenderPassDescriptor>,
    /// Render area (width, height) taken from the first attachment.
    pub extent: (u32, u32),
    pub render_executable: Option<RenderPassExecutable>,
    pub compute_executable: Option<ComputePassExecutable>,
    pub upload: Option<UploadInfo>,
}

/// The execution plan produced by [`compile`]. Consumed once by
/// [`GraphExecutor::execute`](crate::graph::executor::GraphExecutor::execute).
pub struct CompiledRenderGraph {
    pub(crate) graph_id: u32,
    /// Declaration index to compiled index; `None` for culled resources.
    /// Executables resolve their captured handles through this.
    pub(crate) remap: Vec<Option<u16>>,
    pub(crate) resources: Vec<CompiledResource>,
    pub(crate) passes: Vec<CompiledPass>,
    /// Compiled index of the present target's backing, transitioned to
    /// [`ResourceState::Present`] after the last pass.
    pub(crate) present: Option<u16>,
    pub(crate) slot_count: u32,
}

impl CompiledRenderGraph {
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Distinct managed backings the frame will acquire.
    pub fn backing_count(&self) -> u32 {
        self.slot_count
    }
}

fn canonical(resources: &[ResourceNode], mut index: u16) -> u16 {
    loop {
        match &resources[index as usize] {
            ResourceNode::Texture(t) => match t.parent {
                Some(parent) => index = parent,
                None => return index,
            },
            ResourceNode::Buffer(_) => return index,
        }
    }
}

/// Compile the declared graph into an execution plan.
pub fn compile(graph: RenderGraph) -> Result<CompiledRenderGraph, CompileError> {
    let RenderGraph {
        id,
        resources,
        mut passes,
        present,
    } = graph;

    let canonical_of: Vec<u16> = (0..resources.len() as u16)
        .map(|i| canonical(&resources, i))
        .collect();
    let present_root = present.map(|p| canonical_of[p as usize]);

    // Phase 1: liveness. Reverse walk; a pass survives if it has a side
    // effect, writes the present target, or writes something a surviving
    // later pass consumes. No present target means nothing can be proven
    // dead.
    let mut alive = vec![false; passes.len()];
    let mut needed: HashSet<u16> = HashSet::new();
    if let Some(root) = present_root {
        needed.insert(root);
    }
    let mut present_written = false;
    for (i, pass) in passes.iter().enumerate().rev() {
        let writes_needed = pass
            .writes
            .iter()
            .any(|e| needed.contains(&canonical_of[e.resource as usize]));
        let keep = present.is_none() || pass.kind.has_side_effect() || writes_needed;
        if !keep {
            log::debug!("culling dead pass '{}'", pass.name);
            continue;
        }
        alive[i] = true;
        if let Some(root) = present_root {
            if pass.writes.iter().any(|e| canonical_of[e.resource as usize] == root) {
                present_written = true;
            }
        }
        for edge in &pass.reads {
            needed.insert(canonical_of[edge.resource as usize]);
        }
        // An attachment that loads consumes its previous contents.
        for color in &pass.color_attachments {
            if color.load_action == LoadAction::Load {
                needed.insert(canonical_of[color.resource as usize]);
            }
        }
        if let Some(depth) = &pass.depth_attachment {
            if depth.depth_load_action == LoadAction::Load {
                needed.insert(canonical_of[depth.resource as usize]);
            }
        }
    }

    if let Some(p) = present {
        if !present_written {
            return Err(CompileError::PresentTargetNeverWritten(
                resources[p as usize].name().to_string(),
            ));
        }
    }

    // Collect referenced resources: everything a surviving pass touches,
    // plus view parents, plus the present target.
    let mut referenced = vec![false; resources.len()];
    let reference = |index: u16, referenced: &mut Vec<bool>| {
        let mut i = index;
        loop {
            referenced[i as usize] = true;
            match &resources[i as usize] {
                ResourceNode::Texture(t) if t.parent.is_some() => i = t.parent.unwrap(),
                _ => break,
            }
        }
    };
    for (i, pass) in passes.iter().enumerate() {
        if !alive[i] {
            continue;
        }
        for edge in pass.reads.iter().chain(&pass.writes) {
            reference(edge.resource, &mut referenced);
        }
        for color in &pass.color_attachments {
            reference(color.resource, &mut referenced);
        }
        if let Some(depth) = &pass.depth_attachment {
            reference(depth.resource, &mut referenced);
        }
    }
    if let Some(p) = present {
        reference(p, &mut referenced);
    }

    // Remap declaration indices to the compacted compiled index space.
    let mut remap: Vec<Option<u16>> = vec![None; resources.len()];
    let mut next = 0u16;
    for (i, used) in referenced.iter().enumerate() {
        if *used {
            remap[i] = Some(next);
            next += 1;
        }
    }
    let remapped = |index: u16| remap[index as usize].expect("unreferenced resource in live pass");

    // Phase 2 prep: augment managed descriptors with the creation usage
    // every surviving access implies, charged to the backing root.
    let mut augment_tex: Vec<TextureUsage> = vec![TextureUsage::NONE; resources.len()];
    let mut augment_buf: Vec<BufferUsage> = vec![BufferUsage::NONE; resources.len()];
    for (i, pass) in passes.iter().enumerate() {
        if !alive[i] {
            continue;
        }
        for edge in pass.reads.iter().chain(&pass.writes) {
            let root = canonical_of[edge.resource as usize] as usize;
            match &resources[root] {
                ResourceNode::Texture(_) => augment_tex[root] |= edge.usage.texture_usage(),
                ResourceNode::Buffer(_) => augment_buf[root] |= edge.usage.buffer_usage(),
            }
        }
    }
    if let Some(root) = present_root {
        augment_tex[root as usize] |= ResourceUsage::Present.texture_usage();
    }

    // Build compiled resource nodes in declaration order.
    let mut compiled_resources: Vec<CompiledResource> = Vec::with_capacity(next as usize);
    for (i, node) in resources.iter().enumerate() {
        if !referenced[i] {
            continue;
        }
        let kind = match node {
            ResourceNode::Texture(t) => {
                let mut desc = t.desc.clone();
                if t.imported.is_none() {
                    desc.usage |= augment_tex[i];
                }
                CompiledResourceKind::Texture(CompiledTexture {
                    desc,
                    imported: t.imported,
                    parent: t.parent.map(remapped),
                    mip_level: t.mip_level,
                    array_layer: t.array_layer,
                })
            }
            ResourceNode::Buffer(b) => {
                let mut desc = b.desc.clone();
                if b.imported.is_none() {
                    desc.usage |= augment_buf[i];
                }
                CompiledResourceKind::Buffer(CompiledBuffer {
                    desc,
                    imported: b.imported,
                })
            }
        };
        compiled_resources.push(CompiledResource {
            name: node.name().to_string(),
            kind,
            first_use: u16::MAX,
            last_use: 0,
            slot: None,
        });
    }

    // Phase 2: lifetimes over compiled pass indices. A use through a
    // sub-view extends both the view node and its backing root.
    let mut compiled_pass_index = 0u16;
    for (i, pass) in passes.iter().enumerate() {
        if !alive[i] {
            continue;
        }
        for edge in pass.reads.iter().chain(&pass.writes) {
            for index in [edge.resource, canonical_of[edge.resource as usize]] {
                let ci = remapped(index) as usize;
                let res = &mut compiled_resources[ci];
                res.first_use = res.first_use.min(compiled_pass_index);
                res.last_use = res.last_use.max(compiled_pass_index);
            }
        }
        compiled_pass_index += 1;
    }
    let compiled_pass_count = compiled_pass_index;

    // The present target stays alive until the end-of-frame transition.
    if let Some(root) = present_root {
        let ci = remapped(root) as usize;
        compiled_resources[ci].last_use = compiled_pass_count.saturating_sub(1);
    }

    // Phase 3: aliasing. Greedy interval assignment per descriptor; a
    // backing slot is reusable once its previous occupant's last use has
    // passed.
    #[derive(PartialEq, Eq, Hash, Clone)]
    enum SlotKey {
        Texture(TextureDescriptor),
        Buffer(BufferDescriptor),
    }
    let mut slots: Vec<(SlotKey, u16)> = Vec::new();
    for res in compiled_resources.iter_mut() {
        if res.is_imported() || !res.is_root() || res.first_use == u16::MAX {
            continue;
        }
        let key = match &res.kind {
            CompiledResourceKind::Texture(t) => SlotKey::Texture(t.desc.clone()),
            CompiledResourceKind::Buffer(b) => SlotKey::Buffer(b.desc.clone()),
        };
        let found = slots
            .iter_mut()
            .enumerate()
            .find(|(_, (k, last))| *k == key && *last < res.first_use);
        let slot = match found {
            Some((index, entry)) => {
                entry.1 = res.last_use;
                index as u32
            }
            None => {
                slots.push((key, res.last_use));
                (slots.len() - 1) as u32
            }
        };
        res.slot = Some(slot);
    }
    let slot_count = slots.len() as u32;

    // Phase 4: per-pass transitions plus devirtualize/destroy schedules.
    let mut compiled_passes: Vec<CompiledPass> = Vec::with_capacity(compiled_pass_count as usize);
    let mut written: HashSet<u16> = HashSet::new();
    for (ci, res) in compiled_resources.iter().enumerate() {
        if res.is_imported() {
            written.insert(ci as u16);
        }
    }

    for (i, pass) in passes.iter_mut().enumerate() {
        if !alive[i] {
            continue;
        }

        let mut transitions: Vec<(u16, ResourceState)> = Vec::new();
        for edge in pass.reads.iter().chain(&pass.writes) {
            let root = remapped(canonical_of[edge.resource as usize]);
            let state = edge.usage.state();
            match transitions.iter().find(|(r, _)| *r == root) {
                Some((_, existing)) => {
                    debug_assert_eq!(
                        *existing, state,
                        "pass '{}' needs resource {root} in two states",
                        pass.name
                    );
                }
                None => transitions.push((root, state)),
            }
        }

        for edge in &pass.reads {
            let root = remapped(canonical_of[edge.resource as usize]);
            debug_assert!(
                written.contains(&root) || compiled_resources[root as usize].is_imported(),
                "pass '{}' reads '{}' before any pass writes it",
                pass.name,
                compiled_resources[root as usize].name
            );
        }
        for edge in &pass.writes {
            written.insert(remapped(canonical_of[edge.resource as usize]));
        }

        let render_pass_desc = (pass.kind == PassKind::Render).then(|| RenderPassDescriptor {
            sample_count: 1,
            color_attachments: pass
                .color_attachments
                .iter()
                .map(|c| ColorAttachmentDesc {
                    format: texture_format(&resources, c.resource),
                    load_action: c.load_action,
                    store_action: c.store_action,
                })
                .collect(),
            depth_stencil_attachment: pass.depth_attachment.as_ref().map(|d| {
                DepthStencilAttachmentDesc {
                    format: texture_format(&resources, d.resource),
                    depth_load_action: d.depth_load_action,
                    depth_store_action: d.depth_store_action,
                    stencil_load_action: d.stencil_load_action,
                    stencil_store_action: d.stencil_store_action,
                }
            }),
        });

        let extent = pass
            .color_attachments
            .first()
            .map(|c| c.resource)
            .or_else(|| pass.depth_attachment.as_ref().map(|d| d.resource))
            .map(|r| attachment_extent(&resources, r))
            .unwrap_or((0, 0));

        let mut color_attachments = std::mem::take(&mut pass.color_attachments);
        for color in &mut color_attachments {
            color.resource = remapped(color.resource);
        }
        let mut depth_attachment = pass.depth_attachment.take();
        if let Some(depth) = &mut depth_attachment {
            depth.resource = remapped(depth.resource);
        }
        let mut upload = pass.upload.take();
        if let Some(upload) = &mut upload {
            match &mut upload.target {
                UploadTarget::Buffer { resource, .. } => *resource = remapped(*resource),
                UploadTarget::Texture { resource, .. } => *resource = remapped(*resource),
            }
        }

        compiled_passes.push(CompiledPass {
            name: std::mem::take(&mut pass.name),
            kind: pass.kind,
            transitions,
            devirtualize: Vec::new(),
            destroy: Vec::new(),
            color_attachments,
            depth_attachment,
            render_pass_desc,
            extent,
            render_executable: pass.render_executable.take(),
            compute_executable: pass.compute_executable.take(),
            upload,
        });
    }

    for (ci, res) in compiled_resources.iter().enumerate() {
        if res.is_imported() || !res.is_root() || res.first_use == u16::MAX {
            continue;
        }
        compiled_passes[res.first_use as usize].devirtualize.push(ci as u16);
        compiled_passes[res.last_use as usize].destroy.push(ci as u16);
    }

    log::debug!(
        "compiled graph {id}: {} passes ({} declared), {} resources, {} backings",
        compiled_passes.len(),
        passes.len(),
        compiled_resources.len(),
        slot_count
    );

    let present = present_root.map(remapped);
    Ok(CompiledRenderGraph {
        graph_id: id,
        remap,
        resources: compiled_resources,
        passes: compiled_passes,
        present,
        slot_count,
    })
}

fn texture_format(resources: &[ResourceNode], index: u16) -> TextureFormat {
    match &resources[index as usize] {
        ResourceNode::Texture(t) => t.desc.format,
        ResourceNode::Buffer(_) => unreachable!("buffer used as attachment"),
    }
}

fn attachment_extent(resources: &[ResourceNode], index: u16) -> (u32, u32) {
    match &resources[index as usize] {
        ResourceNode::Texture(t) => (
            (t.desc.width >> t.mip_level).max(1),
            (t.desc.height >> t.mip_level).max(1),
        ),
        ResourceNode::Buffer(_) => unreachable!("buffer used as attachment"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::*;
    use crate::graph::builder::RenderGraph;

    fn color_target(graph: &mut RenderGraph, name: &str) -> crate::graph::TextureHandle {
        let t = graph.declare_texture(name);
        graph.texture_set_extent(t, 64, 64);
        graph.texture_set_format(t, TextureFormat::Rgba8Unorm);
        t
    }

    #[test]
    fn execution_order_is_declaration_order() {
        let mut graph = RenderGraph::new();
        let a = color_target(&mut graph, "a");
        let b = color_target(&mut graph, "b");
        let out = color_target(&mut graph, "out");

        graph
            .add_render_pass("first")
            .color(a, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);
        graph
            .add_render_pass("second")
            .color(b, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
            .sample(a);
        graph
            .add_render_pass("third")
            .color(out, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
            .sample(b);
        graph.present(out);

        let compiled = compile(graph).unwrap();
        let names: Vec<&str> = compiled.passes.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["first", "second", "third"]);
    }

    #[test]
    fn pass_with_unconsumed_output_is_culled() {
        let mut graph = RenderGraph::new();
        let unused = color_target(&mut graph, "unused");
        let out = color_target(&mut graph, "out");

        graph
            .add_render_pass("dead")
            .color(unused, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);
        graph
            .add_render_pass("main")
            .color(out, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);
        graph.present(out);

        let compiled = compile(graph).unwrap();
        assert_eq!(compiled.pass_count(), 1);
        assert_eq!(compiled.passes[0].name, "main");
        // The dead pass's target vanishes with it.
        assert!(compiled.resources.iter().all(|r| r.name != "unused"));
    }

    #[test]
    fn culling_follows_transitive_consumers() {
        let mut graph = RenderGraph::new();
        let a = color_target(&mut graph, "a");
        let b = color_target(&mut graph, "b");
        let out = color_target(&mut graph, "out");

        // a -> b -> out: all three passes must survive.
        graph
            .add_render_pass("produce_a")
            .color(a, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);
        graph
            .add_render_pass("produce_b")
            .color(b, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
            .sample(a);
        graph
            .add_render_pass("composite")
            .color(out, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
            .sample(b);
        graph.present(out);

        let compiled = compile(graph).unwrap();
        assert_eq!(compiled.pass_count(), 3);
    }

    #[test]
    fn upload_pass_survives_without_consumers() {
        let mut graph = RenderGraph::new();
        let persistent = graph.declare_buffer("persistent");
        graph.buffer_set_size(persistent, 64);
        graph.buffer_set_usage(persistent, BufferUsage::COPY_DST);
        graph.add_upload_buffer_pass("upload", persistent, 0, &[0u8; 64]);

        let out = color_target(&mut graph, "out");
        graph
            .add_render_pass("main")
            .color(out, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);
        graph.present(out);

        let compiled = compile(graph).unwrap();
        assert_eq!(compiled.pass_count(), 2);
    }

    #[test]
    fn no_present_target_retains_everything() {
        let mut graph = RenderGraph::new();
        let a = color_target(&mut graph, "a");
        graph
            .add_render_pass("offscreen")
            .color(a, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);

        let compiled = compile(graph).unwrap();
        assert_eq!(compiled.pass_count(), 1);
    }

    #[test]
    fn present_target_never_written_is_an_error() {
        let mut graph = RenderGraph::new();
        let out = color_target(&mut graph, "out");
        let other = color_target(&mut graph, "other");
        graph
            .add_render_pass("main")
            .color(other, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);
        graph.present(out);

        match compile(graph) {
            Err(CompileError::PresentTargetNeverWritten(name)) => assert_eq!(name, "out"),
            other => panic!("expected PresentTargetNeverWritten, got {other:?}",
                other = other.map(|_| "Ok")),
        }
    }

    #[test]
    fn disjoint_lifetimes_share_a_backing_slot() {
        let mut graph = RenderGraph::new();
        let a = color_target(&mut graph, "a");
        let b = color_target(&mut graph, "b");
        let out = color_target(&mut graph, "out");
        graph.texture_set_extent(out, 32, 32);

        // a dies after "mid"; b is born in "mid". Same descriptor.
        graph
            .add_render_pass("start")
            .color(a, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);
        graph
            .add_render_pass("mid")
            .color(b, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
            .sample(a);
        graph
            .add_render_pass("end")
            .color(out, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
            .sample(b);
        graph.present(out);

        let compiled = compile(graph).unwrap();
        let slot = |name: &str| {
            compiled
                .resources
                .iter()
                .find(|r| r.name == name)
                .unwrap()
                .slot
                .unwrap()
        };
        // a: [0,1], b: [1,2] overlap in pass 1 and must not alias.
        assert_ne!(slot("a"), slot("b"));

        // Distinct descriptor never aliases either.
        assert_ne!(slot("out"), slot("a"));
        assert_ne!(slot("out"), slot("b"));
    }

    #[test]
    fn truly_disjoint_intervals_alias() {
        let mut graph = RenderGraph::new();
        let a = color_target(&mut graph, "a");
        let mid = color_target(&mut graph, "mid");
        graph.texture_set_extent(mid, 16, 16);
        let b = color_target(&mut graph, "b");
        let out = color_target(&mut graph, "out");
        graph.texture_set_extent(out, 32, 32);

        graph
            .add_render_pass("p0")
            .color(a, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);
        graph
            .add_render_pass("p1")
            .color(mid, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
            .sample(a);
        // a's last use was p1; b first used in p2 with an equal descriptor.
        graph
            .add_render_pass("p2")
            .color(b, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
            .sample(mid);
        graph
            .add_render_pass("p3")
            .color(out, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
            .sample(b);
        graph.present(out);

        let compiled = compile(graph).unwrap();
        let find = |name: &str| compiled.resources.iter().find(|r| r.name == name).unwrap();
        assert_eq!(find("a").slot, find("b").slot);
    }

    #[test]
    fn devirtualize_and_destroy_bracket_each_lifetime() {
        let mut graph = RenderGraph::new();
        let a = color_target(&mut graph, "a");
        let out = color_target(&mut graph, "out");
        graph.texture_set_extent(out, 32, 32);

        graph
            .add_render_pass("produce")
            .color(a, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);
        graph
            .add_render_pass("consume")
            .color(out, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
            .sample(a);
        graph.present(out);

        let compiled = compile(graph).unwrap();
        for (ci, res) in compiled.resources.iter().enumerate() {
            let ci = ci as u16;
            let births: usize = compiled
                .passes
                .iter()
                .map(|p| p.devirtualize.iter().filter(|&&r| r == ci).count())
                .sum();
            let deaths: usize = compiled
                .passes
                .iter()
                .map(|p| p.destroy.iter().filter(|&&r| r == ci).count())
                .sum();
            assert_eq!(births, 1, "{} devirtualized once", res.name);
            assert_eq!(deaths, 1, "{} destroyed once", res.name);
            assert!(res.first_use <= res.last_use);
        }
        // "a" is born in pass 0 and dies in pass 1.
        let a = compiled.resources.iter().position(|r| r.name == "a").unwrap() as u16;
        assert!(compiled.passes[0].devirtualize.contains(&a));
        assert!(compiled.passes[1].destroy.contains(&a));
    }

    #[test]
    fn present_target_lives_until_the_final_pass() {
        let mut graph = RenderGraph::new();
        let out = color_target(&mut graph, "out");
        graph
            .add_render_pass("main")
            .color(out, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);
        // A retained pass after the present target's last declared use.
        let persistent = graph.declare_buffer("persistent");
        graph.buffer_set_size(persistent, 64);
        graph.add_upload_buffer_pass("late_upload", persistent, 0, &[0u8; 64]);
        graph.present(out);

        let compiled = compile(graph).unwrap();
        assert_eq!(compiled.pass_count(), 2);

        // The end-of-frame present transition keeps the target alive
        // through the last pass, so its backing is not freed early.
        let out_ci = compiled.resources.iter().position(|r| r.name == "out").unwrap();
        let out_res = &compiled.resources[out_ci];
        assert_eq!(out_res.first_use, 0);
        assert_eq!(out_res.last_use, 1);
        assert!(compiled.passes[0].devirtualize.contains(&(out_ci as u16)));
        assert!(compiled.passes[1].destroy.contains(&(out_ci as u16)));
    }

    #[test]
    fn imported_resources_are_never_devirtualized() {
        let mut graph = RenderGraph::new();
        let swapchain = graph.import_texture(
            "swapchain",
            crate::backend::GpuTexture(7),
            &TextureDescriptor {
                width: 64,
                height: 64,
                usage: TextureUsage::RENDER_ATTACHMENT,
                ..Default::default()
            },
        );
        graph
            .add_render_pass("main")
            .color(swapchain, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);
        graph.present(swapchain);

        let compiled = compile(graph).unwrap();
        assert!(compiled.passes.iter().all(|p| p.devirtualize.is_empty()));
        assert!(compiled.passes.iter().all(|p| p.destroy.is_empty()));
        assert_eq!(compiled.backing_count(), 0);
    }

    #[test]
    fn sub_view_use_extends_parent_lifetime() {
        let mut graph = RenderGraph::new();
        let chain = graph.declare_texture("chain");
        graph.texture_set_extent(chain, 64, 64);
        graph.texture_set_mip_levels(chain, 2);
        let mip1 = graph.declare_texture_view("chain_mip1", chain, 1, 0);
        let out = color_target(&mut graph, "out");

        graph
            .add_render_pass("write_mip0")
            .color(chain, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);
        graph
            .add_render_pass("downsample")
            .color(mip1, LoadAction::DontCare, ClearColor::BLACK, StoreAction::Store);
        graph
            .add_render_pass("composite")
            .color(out, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
            .sample(mip1);
        graph.present(out);

        let compiled = compile(graph).unwrap();
        let parent = compiled.resources.iter().find(|r| r.name == "chain").unwrap();
        assert_eq!(parent.first_use, 0);
        assert_eq!(parent.last_use, 2);
        // The view's extent halves with the mip level.
        assert_eq!(compiled.passes[1].extent, (32, 32));
    }

    #[test]
    fn edge_usage_augments_creation_flags() {
        let mut graph = RenderGraph::new();
        let out = color_target(&mut graph, "out");
        let a = graph.declare_texture("a");
        graph.texture_set_extent(a, 64, 64);

        graph
            .add_render_pass("produce")
            .color(a, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);
        graph
            .add_render_pass("consume")
            .color(out, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
            .sample(a);
        graph.present(out);

        let compiled = compile(graph).unwrap();
        let a = compiled.resources.iter().find(|r| r.name == "a").unwrap();
        let CompiledResourceKind::Texture(tex) = &a.kind else {
            panic!("expected texture")
        };
        assert!(tex.desc.usage.contains(TextureUsage::RENDER_ATTACHMENT));
        assert!(tex.desc.usage.contains(TextureUsage::SAMPLED));
    }

    #[test]
    fn transitions_resolve_one_state_per_backing() {
        let mut graph = RenderGraph::new();
        let a = color_target(&mut graph, "a");
        let out = color_target(&mut graph, "out");
        graph.texture_set_extent(out, 32, 32);

        graph
            .add_render_pass("produce")
            .color(a, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store);
        graph
            .add_render_pass("consume")
            .color(out, LoadAction::Clear, ClearColor::BLACK, StoreAction::Store)
            .sample(a);
        graph.present(out);

        let compiled = compile(graph).unwrap();
        let a = compiled.resources.iter().position(|r| r.name == "a").unwrap() as u16;
        let produce = &compiled.passes[0];
        assert!(produce
            .transitions
            .contains(&(a, ResourceState::RenderTarget)));
        let consume = &compiled.passes[1];
        assert!(consume
            .transitions
            .contains(&(a, ResourceState::ShaderResource)));
    }
}
