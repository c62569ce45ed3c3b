//! Frame pacing: keeps a bounded number of frames in flight.
//!
//! [`FrameRing`] owns one fence per in-flight slot. `begin_frame` blocks
//! until the slot's previous submission has retired, `end_frame` submits
//! the recorded work signaling the slot's fence. With [`FRAMES_IN_FLIGHT`]
//! slots the CPU can run that many frames ahead of the GPU before
//! stalling.

use crate::backend::traits::{DeviceResult, GpuFence, RenderDevice};

/// Maximum frames the CPU records ahead of the GPU.
pub const FRAMES_IN_FLIGHT: usize = 3;

/// Fence ring pacing frame submission.
pub struct FrameRing {
    fences: [Option<GpuFence>; FRAMES_IN_FLIGHT],
    cursor: usize,
    frame: u64,
}

impl FrameRing {
    pub fn new() -> Self {
        Self {
            fences: [None; FRAMES_IN_FLIGHT],
            cursor: 0,
            frame: 0,
        }
    }

    /// Block until the current slot's previous submission retires. A slot
    /// that has never been submitted returns immediately.
    pub fn begin_frame(&mut self, device: &mut dyn RenderDevice) {
        if let Some(fence) = self.fences[self.cursor] {
            device.wait_fence(fence);
        }
    }

    /// Submit the frame's recorded work and advance to the next slot.
    pub fn end_frame(&mut self, device: &mut dyn RenderDevice) -> DeviceResult<()> {
        let fence = match self.fences[self.cursor] {
            Some(fence) => fence,
            None => {
                let fence = device.create_fence()?;
                self.fences[self.cursor] = Some(fence);
                fence
            }
        };
        device.submit(Some(fence));
        self.cursor = (self.cursor + 1) % FRAMES_IN_FLIGHT;
        self.frame += 1;
        Ok(())
    }

    /// Frames submitted so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Wait out every in-flight frame and free the fences.
    pub fn destroy(&mut self, device: &mut dyn RenderDevice) {
        for fence in self.fences.iter_mut() {
            if let Some(fence) = fence.take() {
                device.wait_fence(fence);
                device.destroy_fence(fence);
            }
        }
    }
}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NullDevice, ObjectKind};

    #[test]
    fn first_frames_never_wait() {
        let mut device = NullDevice::new();
        let mut ring = FrameRing::new();

        for _ in 0..FRAMES_IN_FLIGHT {
            ring.begin_frame(&mut device);
            ring.end_frame(&mut device).unwrap();
        }
        assert!(device.commands().iter().all(|c| !c.starts_with("wait_fence")));
    }

    #[test]
    fn wrapping_the_ring_waits_on_the_oldest_fence() {
        let mut device = NullDevice::new();
        let mut ring = FrameRing::new();

        for _ in 0..FRAMES_IN_FLIGHT {
            ring.begin_frame(&mut device);
            ring.end_frame(&mut device).unwrap();
        }
        device.clear_commands();

        ring.begin_frame(&mut device);
        assert_eq!(device.commands().len(), 1);
        assert!(device.commands()[0].starts_with("wait_fence"));
        ring.end_frame(&mut device).unwrap();
    }

    #[test]
    fn fences_are_created_once_per_slot() {
        let mut device = NullDevice::new();
        let mut ring = FrameRing::new();

        for _ in 0..FRAMES_IN_FLIGHT * 4 {
            ring.begin_frame(&mut device);
            ring.end_frame(&mut device).unwrap();
        }
        assert_eq!(device.created(ObjectKind::Fence), FRAMES_IN_FLIGHT);
        assert_eq!(ring.frame(), (FRAMES_IN_FLIGHT * 4) as u64);

        ring.destroy(&mut device);
        assert_eq!(device.destroyed(ObjectKind::Fence), FRAMES_IN_FLIGHT);
    }
}
