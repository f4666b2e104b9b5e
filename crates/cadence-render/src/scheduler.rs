// SPDX-License-Identifier: CEPL-1.0
//! One iteration of the render loop: wait, acquire, submit, present.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::device::{AcquireOutcome, GpuDevice, PresentationSurface, SubmitDesc, SurfaceStatus};
use crate::frame::FrameSlotRing;
use crate::handle::CommandBufferHandle;
use crate::swapchain::{SurfaceSwapchain, SwapchainConfig, VsyncMode};
use crate::{RenderError, RenderResult, RenderSize};

pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    pub frames_in_flight: usize,
    pub fence_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            frames_in_flight: 2,
            fence_timeout: Duration::from_secs(2),
            acquire_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_submitted: u64,
    pub swapchain_rebuilds: u64,
    pub skipped_frames: u64,
}

/// A frame between [`FrameScheduler::begin_frame`] and [`FrameScheduler::end_frame`].
#[derive(Debug)]
#[must_use = "a begun frame must be passed to end_frame or abandon_frame"]
pub struct FrameContext {
    slot_index: usize,
    image_index: u32,
    command_buffer: CommandBufferHandle,
    extra_commands: Vec<CommandBufferHandle>,
    must_rebuild_targets: bool,
}

impl FrameContext {
    #[inline]
    pub fn slot_index(&self) -> usize {
        self.slot_index
    }

    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// The slot's primary command buffer, already open for recording.
    #[inline]
    pub fn command_buffer(&self) -> CommandBufferHandle {
        self.command_buffer
    }

    /// Surface-driven targets must re-sync before their render pass begins.
    #[inline]
    pub fn must_rebuild_targets(&self) -> bool {
        self.must_rebuild_targets
    }

    /// Submits a separately recorded, already ended command buffer after the primary one.
    pub fn add_commands(&mut self, cmd: CommandBufferHandle) {
        self.extra_commands.push(cmd);
    }
}

/// Drives the swapchain and the frame slot ring.
///
/// Waiting on the next slot's fence in [`FrameScheduler::begin_frame`] is the
/// only backpressure: at most `frames_in_flight` frames are ever queued.
pub struct FrameScheduler<B: GpuDevice + PresentationSurface> {
    backend: Arc<B>,
    swapchain: SurfaceSwapchain<B>,
    ring: FrameSlotRing<B>,
    config: SchedulerConfig,

    pending_resize: Option<RenderSize>,
    rebuild_pending: bool,
    paused: bool,
    frame_open: bool,
    stats: FrameStats,
}

impl<B: GpuDevice + PresentationSurface> FrameScheduler<B> {
    pub fn new(
        backend: Arc<B>,
        swapchain_config: SwapchainConfig,
        config: SchedulerConfig,
        size: RenderSize,
    ) -> RenderResult<Self> {
        if config.frames_in_flight == 0 || config.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(RenderError::InvalidConfig(format!(
                "frames in flight must be within 1..={MAX_FRAMES_IN_FLIGHT}, got {}",
                config.frames_in_flight
            )));
        }

        let swapchain = SurfaceSwapchain::new(backend.clone(), swapchain_config, size)?;
        let ring = FrameSlotRing::new(backend.clone(), config.frames_in_flight)?;
        let rebuild_pending = swapchain.generation() == 0;

        info!(
            "frame scheduler ready ({} frames in flight, {} swapchain images)",
            config.frames_in_flight,
            swapchain.image_count()
        );

        Ok(FrameScheduler {
            backend,
            swapchain,
            ring,
            config,
            pending_resize: None,
            rebuild_pending,
            paused: size.is_zero(),
            frame_open: false,
            stats: FrameStats::default(),
        })
    }

    /// The window's surface size changed. Applied on the next `begin_frame`.
    pub fn notify_resize(&mut self, size: RenderSize) {
        self.pending_resize = Some(size);
    }

    pub fn set_present_policy(&mut self, vsync: bool, mode: VsyncMode) {
        if self.swapchain.set_present_policy(vsync, mode) {
            self.rebuild_pending = true;
        }
    }

    /// Starts a frame.
    ///
    /// Returns `Ok(None)` when there is nothing to render into (the surface
    /// is zero-sized, or still out of date after one rebuild); callers skip
    /// the frame. Out-of-date and suboptimal surfaces never surface as errors.
    pub fn begin_frame(&mut self) -> RenderResult<Option<FrameContext>> {
        assert!(!self.frame_open, "begin_frame called again before end_frame");

        if let Some(size) = self.pending_resize.take() {
            self.swapchain.set_requested_extent(size);
            let paused = size.is_zero();
            if paused != self.paused {
                info!("surface {size} → paused={paused}");
            }
            self.paused = paused;
            if !paused {
                self.rebuild_pending = true;
            }
        }
        if self.paused {
            self.stats.skipped_frames += 1;
            return Ok(None);
        }

        self.ring.wait_current(self.config.fence_timeout)?;

        let mut must_rebuild_targets = false;
        if self.rebuild_pending {
            if !self.rebuild_swapchain()? {
                self.stats.skipped_frames += 1;
                return Ok(None);
            }
            must_rebuild_targets = true;
        }

        let signal = self.ring.current().image_acquired();
        let image_index = match self.swapchain.acquire_image(signal, self.config.acquire_timeout)? {
            AcquireOutcome::Ready(index) => index,
            AcquireOutcome::Suboptimal(index) => {
                debug!("acquire suboptimal; rebuilding next frame");
                self.rebuild_pending = true;
                must_rebuild_targets = true;
                index
            }
            AcquireOutcome::OutOfDate => {
                if !self.rebuild_swapchain()? {
                    self.stats.skipped_frames += 1;
                    return Ok(None);
                }
                must_rebuild_targets = true;
                match self.swapchain.acquire_image(signal, self.config.acquire_timeout)? {
                    AcquireOutcome::Ready(index) => index,
                    AcquireOutcome::Suboptimal(index) => {
                        self.rebuild_pending = true;
                        index
                    }
                    AcquireOutcome::OutOfDate => {
                        warn!("swapchain still out of date after rebuild; skipping frame");
                        self.rebuild_pending = true;
                        self.stats.skipped_frames += 1;
                        return Ok(None);
                    }
                }
            }
        };

        let command_buffer = self.ring.current().command_buffer();
        self.backend.begin_command_buffer(command_buffer)?;
        self.frame_open = true;

        Ok(Some(FrameContext {
            slot_index: self.ring.current_index(),
            image_index,
            command_buffer,
            extra_commands: Vec::new(),
            must_rebuild_targets,
        }))
    }

    /// Submits the frame's commands, presents, and advances the ring.
    ///
    /// Returns true when targets must be resized before the next frame.
    pub fn end_frame(&mut self, frame: FrameContext) -> RenderResult<bool> {
        assert_eq!(
            frame.slot_index,
            self.ring.current_index(),
            "end_frame with a frame from another slot"
        );
        self.frame_open = false;
        self.backend.end_command_buffer(frame.command_buffer)?;

        let mut commands = Vec::with_capacity(1 + frame.extra_commands.len());
        commands.push(frame.command_buffer);
        commands.extend_from_slice(&frame.extra_commands);

        let (image_acquired, render_complete, in_flight) = {
            let slot = self.ring.current();
            (slot.image_acquired(), slot.render_complete(), slot.in_flight())
        };

        self.ring.reset_current()?;
        self.backend.submit(&SubmitDesc {
            wait_semaphores: &[image_acquired],
            command_buffers: &commands,
            signal_semaphores: &[render_complete],
            fence: Some(in_flight),
        })?;
        self.ring.mark_submitted();
        self.stats.frames_submitted += 1;

        let status = self.swapchain.present(frame.image_index, &[render_complete]);
        self.ring.advance();

        match status? {
            SurfaceStatus::Optimal => Ok(false),
            SurfaceStatus::Suboptimal | SurfaceStatus::OutOfDate => {
                debug!("present reported a stale surface; rebuilding next frame");
                self.rebuild_pending = true;
                Ok(true)
            }
        }
    }

    /// Gives up on a begun frame without drawing into it.
    ///
    /// Anything recorded is discarded, and callers must have ended any pass
    /// they began. The slot's command buffer is re-recorded with only a
    /// transition of the acquired image to the presentable layout, then the
    /// image goes back to the surface through a normal present. The
    /// swapchain is only rebuilt if that present reports a stale surface.
    pub fn abandon_frame(&mut self, frame: FrameContext) -> RenderResult<()> {
        assert_eq!(frame.slot_index, self.ring.current_index());
        self.frame_open = false;
        let cmd = frame.command_buffer;
        self.backend.end_command_buffer(cmd)?;
        self.backend.begin_command_buffer(cmd)?;
        let image = self.swapchain.images()[frame.image_index as usize];
        self.backend.cmd_prepare_present(cmd, image);
        self.backend.end_command_buffer(cmd)?;

        let (image_acquired, render_complete, in_flight) = {
            let slot = self.ring.current();
            (slot.image_acquired(), slot.render_complete(), slot.in_flight())
        };
        self.ring.reset_current()?;
        self.backend.submit(&SubmitDesc {
            wait_semaphores: &[image_acquired],
            command_buffers: &[cmd],
            signal_semaphores: &[render_complete],
            fence: Some(in_flight),
        })?;
        self.ring.mark_submitted();
        self.stats.skipped_frames += 1;

        let status = self.swapchain.present(frame.image_index, &[render_complete]);
        self.ring.advance();
        warn!("frame abandoned; image {} presented without drawing", frame.image_index);

        match status? {
            SurfaceStatus::Optimal => {}
            SurfaceStatus::Suboptimal | SurfaceStatus::OutOfDate => {
                debug!("present reported a stale surface; rebuilding next frame");
                self.rebuild_pending = true;
            }
        }
        Ok(())
    }

    /// Drains the GPU and rebuilds the chain. `Ok(false)` if the surface was zero-sized.
    fn rebuild_swapchain(&mut self) -> RenderResult<bool> {
        self.ring.wait_all(self.config.fence_timeout)?;
        self.backend.wait_idle()?;

        if !self.swapchain.rebuild()? {
            self.rebuild_pending = true;
            return Ok(false);
        }
        self.rebuild_pending = false;
        self.stats.swapchain_rebuilds += 1;
        Ok(true)
    }

    /// Waits for all submitted work; call before tearing down resources used by it.
    pub fn wait_idle(&mut self) -> RenderResult<()> {
        self.ring.wait_all(self.config.fence_timeout)?;
        self.backend.wait_idle()
    }

    pub fn swapchain(&self) -> &SurfaceSwapchain<B> {
        &self.swapchain
    }

    pub fn ring(&self) -> &FrameSlotRing<B> {
        &self.ring
    }

    pub fn frames_in_flight(&self) -> usize {
        self.ring.len()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}

impl<B: GpuDevice + PresentationSurface> Drop for FrameScheduler<B> {
    fn drop(&mut self) {
        self.backend.wait_idle().ok();
    }
}
