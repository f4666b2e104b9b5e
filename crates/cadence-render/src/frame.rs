// SPDX-License-Identifier: CEPL-1.0
//! Per-frame-in-flight synchronization slots.
//!
//! ```text
//! 1. wait on in_flight (CPU waits for the last submission from this slot)
//! 2. acquire a swapchain image, signaling image_acquired
//! 3. record into command_buffer
//! 4. submit: wait image_acquired, signal render_complete + in_flight
//! 5. present: wait render_complete
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::device::GpuDevice;
use crate::handle::{CommandBufferHandle, CommandPoolHandle, FenceHandle, SemaphoreHandle};
use crate::{RenderError, RenderResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// The CPU may record into this slot.
    Idle,
    /// Work from this slot may still be executing on the GPU.
    Submitted,
}

#[derive(Debug)]
pub struct FrameSlot {
    image_acquired: SemaphoreHandle,
    render_complete: SemaphoreHandle,
    in_flight: FenceHandle,
    command_buffer: CommandBufferHandle,
    state: SlotState,
}

impl FrameSlot {
    #[inline]
    pub fn image_acquired(&self) -> SemaphoreHandle {
        self.image_acquired
    }

    #[inline]
    pub fn render_complete(&self) -> SemaphoreHandle {
        self.render_complete
    }

    #[inline]
    pub fn in_flight(&self) -> FenceHandle {
        self.in_flight
    }

    #[inline]
    pub fn command_buffer(&self) -> CommandBufferHandle {
        self.command_buffer
    }

    #[inline]
    pub fn state(&self) -> SlotState {
        self.state
    }
}

/// Fixed ring of [`FrameSlot`]s cycled by index.
///
/// Fences start signaled so the first wait on each slot returns at once.
pub struct FrameSlotRing<B: GpuDevice> {
    backend: Arc<B>,
    pool: CommandPoolHandle,
    slots: Vec<FrameSlot>,
    current: usize,
}

impl<B: GpuDevice> FrameSlotRing<B> {
    pub fn new(backend: Arc<B>, count: usize) -> RenderResult<Self> {
        if count == 0 {
            return Err(RenderError::InvalidConfig(
                "at least one frame in flight is required".into(),
            ));
        }

        let pool = backend.create_command_pool()?;
        // Anything created before a failure is released by Drop.
        let mut ring = FrameSlotRing {
            backend,
            pool,
            slots: Vec::with_capacity(count),
            current: 0,
        };

        let buffers = ring.backend.allocate_command_buffers(pool, count as u32)?;
        for command_buffer in buffers {
            let image_acquired = ring.backend.create_semaphore()?;
            let render_complete = match ring.backend.create_semaphore() {
                Ok(s) => s,
                Err(e) => {
                    ring.backend.destroy_semaphore(image_acquired);
                    return Err(e);
                }
            };
            let in_flight = match ring.backend.create_fence(true) {
                Ok(f) => f,
                Err(e) => {
                    ring.backend.destroy_semaphore(image_acquired);
                    ring.backend.destroy_semaphore(render_complete);
                    return Err(e);
                }
            };
            ring.slots.push(FrameSlot {
                image_acquired,
                render_complete,
                in_flight,
                command_buffer,
                state: SlotState::Idle,
            });
        }

        debug!("frame slot ring created with {} slots", count);
        Ok(ring)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.current]
    }

    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    /// Blocks until the GPU has finished the current slot's last submission.
    ///
    /// A slot with nothing submitted returns at once, so a fence reset ahead
    /// of a failed submit is never waited on.
    pub fn wait_current(&mut self, timeout: Duration) -> RenderResult<()> {
        let index = self.current;
        self.wait_slot(index, timeout)
    }

    /// Waits out every submitted slot.
    pub fn wait_all(&mut self, timeout: Duration) -> RenderResult<()> {
        for index in 0..self.slots.len() {
            self.wait_slot(index, timeout)?;
        }
        Ok(())
    }

    fn wait_slot(&mut self, index: usize, timeout: Duration) -> RenderResult<()> {
        let slot = &mut self.slots[index];
        if slot.state == SlotState::Idle {
            return Ok(());
        }
        if !self.backend.wait_for_fence(slot.in_flight, timeout)? {
            return Err(RenderError::DeviceHung {
                operation: "wait_for_fence",
                timeout,
            });
        }
        slot.state = SlotState::Idle;
        Ok(())
    }

    /// Unsignals the current slot's fence ahead of a submission that will signal it.
    pub fn reset_current(&self) -> RenderResult<()> {
        debug_assert_eq!(self.current().state, SlotState::Idle);
        self.backend.reset_fence(self.current().in_flight)
    }

    pub fn mark_submitted(&mut self) {
        self.slots[self.current].state = SlotState::Submitted;
    }

    /// Moves to `(current + 1) mod N` and returns the new index.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.slots.len();
        self.current
    }

    pub fn submitted_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Submitted)
            .count()
    }
}

impl<B: GpuDevice> Drop for FrameSlotRing<B> {
    fn drop(&mut self) {
        self.backend.wait_idle().ok();
        for slot in self.slots.drain(..) {
            self.backend.destroy_semaphore(slot.image_acquired);
            self.backend.destroy_semaphore(slot.render_complete);
            self.backend.destroy_fence(slot.in_flight);
        }
        // Command buffers go with their pool.
        self.backend.destroy_command_pool(self.pool);
    }
}
