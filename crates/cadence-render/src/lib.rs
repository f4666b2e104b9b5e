// SPDX-License-Identifier: CEPL-1.0
//! Frame orchestration and GPU resource lifetimes.
//!
//! Everything in this crate talks to the GPU through [`GpuDevice`] and
//! [`PresentationSurface`]; the Vulkan implementation lives in
//! `cadence-render-vk`.

pub mod descriptor;
pub mod device;
pub mod error;
pub mod frame;
pub mod handle;
pub mod material;
pub mod render_pass;
pub mod scheduler;
pub mod swapchain;
pub mod target;
pub mod types;

pub use descriptor::{DescriptorBatchAllocator, DescriptorBatchConfig, DescriptorBatchLayout, MaterialBindings};
pub use device::{
    AcquireOutcome, FramebufferDesc, GpuDevice, ImageDesc, PipelineDesc, PresentationSurface,
    RenderPassBegin, ResourceBinding, ShaderProgram, SubmitDesc, SurfaceStatus, SwapchainDesc,
};
pub use error::{RenderError, RenderResult};
pub use frame::{FrameSlot, FrameSlotRing, SlotState};
pub use handle::*;
pub use material::{MaterialId, MaterialRegistry, MaterialSystem, UnlitMaterialSystem, UnlitParams};
pub use render_pass::{AttachmentDesc, RenderPass, RenderPassDesc, SubpassDesc};
pub use scheduler::{FrameContext, FrameScheduler, FrameStats, SchedulerConfig, MAX_FRAMES_IN_FLIGHT};
pub use swapchain::{SurfaceSwapchain, SwapchainConfig, VsyncMode};
pub use target::{RenderTarget, RenderTargetConfig};
pub use types::*;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const ZERO: RenderSize = RenderSize { width: 0, height: 0 };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports 0 on either axis; nothing can be rendered.
    pub const fn is_zero(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

impl std::fmt::Display for RenderSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
