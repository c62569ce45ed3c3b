//! Descriptor-keyed caches for expensive native objects.
//!
//! A [`ResourcePool`] maps a descriptor to a lazily-created native object.
//! Entries are ref-counted; releasing an entry does not destroy it, so a
//! later frame asking for an equal descriptor reuses the cached object
//! instead of paying creation cost again. [`ResourcePool::tick`] runs the
//! eviction pass: entries with no references that have been idle past the
//! pool's retention window are destroyed.
//!
//! The map is keyed by the descriptor value itself, so a hash collision
//! still falls back to `Eq` on the key — equal descriptors are the only
//! way to share an entry.

pub mod bind_group;
pub mod buffer;
pub mod pipeline;
pub mod render_pass;
pub mod texture;

pub use bind_group::{BindGroupPool, PooledBindGroup};
pub use buffer::{BufferPool, PooledBuffer};
pub use pipeline::{ComputePipelinePool, PooledComputePipeline, PooledRenderPipeline, RenderPipelinePool};
pub use render_pass::{FramebufferPool, PooledFramebuffer, PooledRenderPass, RenderPassPool};
pub use texture::{PooledTexture, PooledTextureView, TexturePool, TextureViewPool};

use crate::backend::traits::{DeviceResult, RenderDevice};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// How long an unreferenced entry survives before eviction, in frames.
pub const DEFAULT_RETENTION_FRAMES: u64 = 12;

/// How a pool hands out entries on a descriptor match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    /// A hit may return an entry that already has live references
    /// (pipelines, render passes, framebuffers, views, bind groups).
    Shared,
    /// A hit only returns entries with zero references; two concurrently
    /// live borrowers with equal descriptors get distinct native objects
    /// (textures and buffers backing transient graph resources).
    Exclusive,
}

/// A native object a pool knows how to create and destroy.
pub trait PooledResource: Sized {
    type Desc: Clone + Eq + Hash + fmt::Debug;

    /// Acquisition mode for pools of this resource.
    const MODE: PoolMode;
    /// Short name used in log output.
    const KIND: &'static str;

    fn create(device: &mut dyn RenderDevice, desc: &Self::Desc) -> DeviceResult<Self>;
    fn destroy(self, device: &mut dyn RenderDevice);
}

/// Reference to a live pool entry. Tokens are frame-transient: acquire
/// with [`ResourcePool::get`], hand back with [`ResourcePool::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolToken {
    index: u32,
    generation: u32,
}

struct Entry<R: PooledResource> {
    desc: R::Desc,
    resource: R,
    refs: u32,
    last_used: u64,
}

struct Slot<R: PooledResource> {
    generation: u32,
    entry: Option<Entry<R>>,
}

/// Generic LRU-with-ref-counting cache. See the module docs.
pub struct ResourcePool<R: PooledResource> {
    slots: Vec<Slot<R>>,
    lookup: HashMap<R::Desc, Vec<u32>>,
    free_slots: Vec<u32>,
    retention: u64,
    frame: u64,
    upstream: Option<Arc<Mutex<ResourcePool<R>>>>,
}

impl<R: PooledResource> ResourcePool<R> {
    pub fn new(retention: u64, upstream: Option<Arc<Mutex<ResourcePool<R>>>>) -> Self {
        Self {
            slots: Vec::new(),
            lookup: HashMap::new(),
            free_slots: Vec::new(),
            retention,
            frame: 0,
            upstream,
        }
    }

    /// Look up `desc`, creating the native object on a miss.
    ///
    /// Lookup checks this pool first, then the upstream pool (an idle
    /// upstream entry migrates here); the insert on a full miss always
    /// happens locally. Creation failure propagates — the pool never
    /// inserts a placeholder.
    pub fn get(
        &mut self,
        device: &mut dyn RenderDevice,
        desc: &R::Desc,
    ) -> DeviceResult<PoolToken> {
        if let Some(index) = self.find_local(desc) {
            let slot = &mut self.slots[index as usize];
            let entry = slot.entry.as_mut().unwrap();
            entry.refs += 1;
            entry.last_used = self.frame;
            log::trace!("{} pool hit: {:?}", R::KIND, desc);
            return Ok(PoolToken {
                index,
                generation: slot.generation,
            });
        }

        if let Some(upstream) = self.upstream.clone() {
            if let Some((desc, resource)) = upstream.lock().take_idle(desc) {
                log::trace!("{} pool upstream hit: {:?}", R::KIND, desc);
                return Ok(self.insert(desc, resource));
            }
        }

        log::trace!("{} pool miss: {:?}", R::KIND, desc);
        let resource = R::create(device, desc)?;
        Ok(self.insert(desc.clone(), resource))
    }

    /// Access the native object behind a token.
    pub fn payload(&self, token: PoolToken) -> &R {
        let slot = &self.slots[token.index as usize];
        assert_eq!(slot.generation, token.generation, "stale {} pool token", R::KIND);
        &slot.entry.as_ref().expect("freed pool entry").resource
    }

    /// Descriptor the entry behind a token was created from.
    pub fn descriptor(&self, token: PoolToken) -> &R::Desc {
        let slot = &self.slots[token.index as usize];
        assert_eq!(slot.generation, token.generation, "stale {} pool token", R::KIND);
        &slot.entry.as_ref().expect("freed pool entry").desc
    }

    /// Hand an entry back. The entry stays cached for reuse; it becomes
    /// eligible for eviction once its reference count reaches zero.
    pub fn release(&mut self, token: PoolToken) {
        let frame = self.frame;
        let slot = &mut self.slots[token.index as usize];
        assert_eq!(slot.generation, token.generation, "stale {} pool token", R::KIND);
        let entry = slot.entry.as_mut().expect("freed pool entry");
        assert!(entry.refs > 0, "unbalanced release on {} pool", R::KIND);
        entry.refs -= 1;
        entry.last_used = frame;
    }

    /// Advance the pool's frame counter and evict entries that have had
    /// no references for longer than the retention window.
    pub fn tick(&mut self, device: &mut dyn RenderDevice) {
        self.frame += 1;
        let frame = self.frame;
        let retention = self.retention;

        let mut evict = Vec::new();
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(entry) = &slot.entry {
                if entry.refs == 0 && frame - entry.last_used > retention {
                    evict.push(index as u32);
                }
            }
        }

        for index in evict {
            let entry = self.remove(index);
            log::trace!("{} pool evict: {:?}", R::KIND, entry.desc);
            entry.resource.destroy(device);
        }
    }

    /// Destroy every entry regardless of age. Entries must be unreferenced.
    pub fn drain(&mut self, device: &mut dyn RenderDevice) {
        for index in 0..self.slots.len() as u32 {
            if let Some(entry) = &self.slots[index as usize].entry {
                assert!(entry.refs == 0, "draining {} pool with live references", R::KIND);
                let entry = self.remove(index);
                entry.resource.destroy(device);
            }
        }
    }

    /// Number of cached entries, referenced or not.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_local(&self, desc: &R::Desc) -> Option<u32> {
        let indices = self.lookup.get(desc)?;
        // Prefer the most recently inserted entry so transient-resource
        // reuse inside one frame is deterministic.
        indices
            .iter()
            .rev()
            .copied()
            .find(|&index| match R::MODE {
                PoolMode::Shared => true,
                PoolMode::Exclusive => {
                    self.slots[index as usize]
                        .entry
                        .as_ref()
                        .map_or(false, |e| e.refs == 0)
                }
            })
    }

    /// Remove and return an idle entry matching `desc`, if any. Used by
    /// downstream pools migrating an upstream hit into their own scope.
    fn take_idle(&mut self, desc: &R::Desc) -> Option<(R::Desc, R)> {
        let indices = self.lookup.get(desc)?;
        let index = indices
            .iter()
            .copied()
            .find(|&index| {
                self.slots[index as usize]
                    .entry
                    .as_ref()
                    .map_or(false, |e| e.refs == 0)
            })?;
        let entry = self.remove(index);
        Some((entry.desc, entry.resource))
    }

    fn insert(&mut self, desc: R::Desc, resource: R) -> PoolToken {
        let entry = Entry {
            desc: desc.clone(),
            resource,
            refs: 1,
            last_used: self.frame,
        };
        let index = match self.free_slots.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation += 1;
                slot.entry = Some(entry);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.lookup.entry(desc).or_default().push(index);
        PoolToken {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn remove(&mut self, index: u32) -> Entry<R> {
        let slot = &mut self.slots[index as usize];
        slot.generation += 1;
        let entry = slot.entry.take().expect("removing freed pool entry");
        if let Some(indices) = self.lookup.get_mut(&entry.desc) {
            indices.retain(|&i| i != index);
            if indices.is_empty() {
                self.lookup.remove(&entry.desc);
            }
        }
        self.free_slots.push(index);
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NullDevice, ObjectKind, TextureDescriptor, TextureFormat, TextureUsage};

    fn desc(width: u32) -> TextureDescriptor {
        TextureDescriptor {
            width,
            height: 4,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::RENDER_ATTACHMENT,
            ..Default::default()
        }
    }

    fn pool() -> TexturePool {
        ResourcePool::new(DEFAULT_RETENTION_FRAMES, None)
    }

    #[test]
    fn equal_descriptors_share_one_creation() {
        let mut device = NullDevice::new();
        let mut pool = pool();

        let a = pool.get(&mut device, &desc(8)).unwrap();
        let handle = pool.payload(a).handle;
        pool.release(a);

        let b = pool.get(&mut device, &desc(8)).unwrap();
        assert_eq!(pool.payload(b).handle, handle);
        assert_eq!(device.created(ObjectKind::Texture), 1);
        pool.release(b);
    }

    #[test]
    fn exclusive_mode_never_shares_live_entries() {
        let mut device = NullDevice::new();
        let mut pool = pool();

        let a = pool.get(&mut device, &desc(8)).unwrap();
        let b = pool.get(&mut device, &desc(8)).unwrap();
        assert_ne!(pool.payload(a).handle, pool.payload(b).handle);
        assert_eq!(device.created(ObjectKind::Texture), 2);
        pool.release(a);
        pool.release(b);
    }

    #[test]
    fn shared_mode_shares_live_entries() {
        let mut device = NullDevice::new();
        let mut pool: RenderPassPool = ResourcePool::new(DEFAULT_RETENTION_FRAMES, None);
        let rp_desc = crate::backend::RenderPassDescriptor::default();

        let a = pool.get(&mut device, &rp_desc).unwrap();
        let b = pool.get(&mut device, &rp_desc).unwrap();
        assert_eq!(pool.payload(a).handle, pool.payload(b).handle);
        assert_eq!(device.created(ObjectKind::RenderPass), 1);
        pool.release(a);
        pool.release(b);
    }

    #[test]
    fn entry_evicted_after_retention_window() {
        let mut device = NullDevice::new();
        let mut pool = pool();

        let token = pool.get(&mut device, &desc(8)).unwrap();
        pool.release(token);

        // Idle for the whole window: still cached.
        for _ in 0..DEFAULT_RETENTION_FRAMES {
            pool.tick(&mut device);
            assert_eq!(device.destroyed(ObjectKind::Texture), 0);
        }
        // The first tick past the window evicts.
        pool.tick(&mut device);
        assert_eq!(device.destroyed(ObjectKind::Texture), 1);
        assert!(pool.is_empty());

        // A fresh get re-creates.
        let token = pool.get(&mut device, &desc(8)).unwrap();
        assert_eq!(device.created(ObjectKind::Texture), 2);
        pool.release(token);
    }

    #[test]
    fn referenced_entry_survives_ticks() {
        let mut device = NullDevice::new();
        let mut pool = pool();

        let token = pool.get(&mut device, &desc(8)).unwrap();
        for _ in 0..DEFAULT_RETENTION_FRAMES * 3 {
            pool.tick(&mut device);
        }
        assert_eq!(device.destroyed(ObjectKind::Texture), 0);
        pool.release(token);
    }

    #[test]
    fn release_keeps_entry_until_window_elapses() {
        let mut device = NullDevice::new();
        let mut pool = pool();

        let token = pool.get(&mut device, &desc(8)).unwrap();
        pool.release(token);
        pool.tick(&mut device);

        // Still cached: a new get hits without creating.
        let token = pool.get(&mut device, &desc(8)).unwrap();
        assert_eq!(device.created(ObjectKind::Texture), 1);
        pool.release(token);
    }

    #[test]
    fn upstream_miss_migrates_idle_entry() {
        let mut device = NullDevice::new();
        let upstream = Arc::new(Mutex::new(pool()));

        // Seed the upstream pool.
        {
            let mut up = upstream.lock();
            let token = up.get(&mut device, &desc(8)).unwrap();
            up.release(token);
        }

        let mut local: TexturePool =
            ResourcePool::new(DEFAULT_RETENTION_FRAMES, Some(upstream.clone()));
        let token = local.get(&mut device, &desc(8)).unwrap();
        assert_eq!(device.created(ObjectKind::Texture), 1);
        assert_eq!(upstream.lock().len(), 0);
        assert_eq!(local.len(), 1);
        local.release(token);
    }

    #[test]
    fn creation_failure_propagates_and_inserts_nothing() {
        let mut device = NullDevice::new();
        let mut pool = pool();

        device.fail_next_create(ObjectKind::Texture);
        assert!(pool.get(&mut device, &desc(8)).is_err());
        assert!(pool.is_empty());

        // The pool recovers on the next attempt.
        let token = pool.get(&mut device, &desc(8)).unwrap();
        pool.release(token);
    }

    #[test]
    #[should_panic(expected = "unbalanced release")]
    fn unbalanced_release_panics() {
        let mut device = NullDevice::new();
        let mut pool = pool();
        let token = pool.get(&mut device, &desc(8)).unwrap();
        pool.release(token);
        pool.release(token);
    }
}
