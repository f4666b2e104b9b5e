// SPDX-License-Identifier: CEPL-1.0
//! Material-rendering subsystems.
//!
//! Each material kind owns its own [`crate::DescriptorBatchAllocator`]; no
//! binding storage is shared between kinds.

mod registry;
pub mod unlit;

pub use registry::{MaterialId, MaterialRegistry};
pub use unlit::{UnlitMaterialSystem, UnlitParams};

use cadence_math::Camera;

use crate::device::GpuDevice;
use crate::handle::CommandBufferHandle;
use crate::render_pass::RenderPass;
use crate::target::RenderTarget;
use crate::RenderResult;

/// A material kind that records draws between `RenderTarget::begin` and `end`.
pub trait MaterialSystem<B: GpuDevice> {
    /// (Re)creates pipelines for `render_pass`.
    fn init(&mut self, render_pass: &RenderPass<B>) -> RenderResult<()>;

    /// Grows binding storage, writes stale parameter blocks and records the
    /// queued draws into `cmd`. `target` must be began.
    fn render(
        &mut self,
        cmd: CommandBufferHandle,
        target: &RenderTarget<B>,
        camera: &Camera,
    ) -> RenderResult<()>;

    /// Releases GPU objects; the GPU must be done with them.
    fn destroy(&mut self);
}
