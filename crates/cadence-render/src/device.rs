// SPDX-License-Identifier: CEPL-1.0
//! The seam between the frame core and a GPU API.
//!
//! Methods take `&self` so components can share one backend through an
//! `Arc`; backends keep whatever bookkeeping they need behind interior
//! mutability. `cmd_*` methods record into a command buffer that is between
//! [`GpuDevice::begin_command_buffer`] and [`GpuDevice::end_command_buffer`].

use std::time::Duration;

use crate::descriptor::{DescriptorBatchLayout, MaterialBindings};
use crate::handle::*;
use crate::render_pass::RenderPassDesc;
use crate::types::*;
use crate::{RenderResult, RenderSize};

pub struct SubmitDesc<'a> {
    pub wait_semaphores: &'a [SemaphoreHandle],
    pub command_buffers: &'a [CommandBufferHandle],
    pub signal_semaphores: &'a [SemaphoreHandle],
    /// Signaled once every command buffer in the batch has finished.
    pub fence: Option<FenceHandle>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub min_image_count: u32,
    pub format: SurfaceFormat,
    pub extent: RenderSize,
    pub present_mode: PresentMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDesc {
    pub format: Format,
    pub extent: RenderSize,
    pub samples: SampleCount,
    pub usage: ImageUsage,
}

pub struct FramebufferDesc<'a> {
    pub render_pass: RenderPassHandle,
    pub attachments: &'a [ImageViewHandle],
    pub extent: RenderSize,
}

pub struct RenderPassBegin<'a> {
    pub render_pass: RenderPassHandle,
    pub framebuffer: FramebufferHandle,
    pub extent: RenderSize,
    pub clear_values: &'a [ClearValue],
}

/// Built-in shader programs the backend knows how to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderProgram {
    Unlit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineDesc {
    pub program: ShaderProgram,
    pub render_pass: RenderPassHandle,
    pub subpass: u32,
    pub samples: SampleCount,
    pub depth_test: bool,
    pub bindings: DescriptorBatchLayout,
    pub push_constant_size: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceBinding {
    pub view: ImageViewHandle,
    pub sampler: SamplerHandle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready(u32),
    /// Usable, but the chain no longer matches the surface exactly.
    Suboptimal(u32),
    /// No image was acquired; the chain must be rebuilt first.
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

pub trait GpuDevice {
    fn create_fence(&self, signaled: bool) -> RenderResult<FenceHandle>;
    /// Returns `Ok(false)` if `timeout` expired before the fence signaled.
    fn wait_for_fence(&self, fence: FenceHandle, timeout: Duration) -> RenderResult<bool>;
    fn reset_fence(&self, fence: FenceHandle) -> RenderResult<()>;
    fn destroy_fence(&self, fence: FenceHandle);

    fn create_semaphore(&self) -> RenderResult<SemaphoreHandle>;
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    /// Blocks until every queue is idle.
    fn wait_idle(&self) -> RenderResult<()>;

    fn create_command_pool(&self) -> RenderResult<CommandPoolHandle>;
    fn allocate_command_buffers(
        &self,
        pool: CommandPoolHandle,
        count: u32,
    ) -> RenderResult<Vec<CommandBufferHandle>>;
    fn destroy_command_pool(&self, pool: CommandPoolHandle);
    /// Resets and opens `cmd` for one-time recording.
    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> RenderResult<()>;
    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> RenderResult<()>;
    fn submit(&self, desc: &SubmitDesc<'_>) -> RenderResult<()>;

    fn create_render_pass(&self, desc: &RenderPassDesc) -> RenderResult<RenderPassHandle>;
    fn destroy_render_pass(&self, render_pass: RenderPassHandle);

    /// Allocates an image with backing memory plus a default view of it.
    fn create_image(&self, desc: &ImageDesc) -> RenderResult<(ImageHandle, ImageViewHandle)>;
    /// Destroys an image from [`GpuDevice::create_image`] along with its view and memory.
    fn destroy_image(&self, image: ImageHandle);
    /// A view of an image someone else owns (swapchain images).
    fn create_image_view(&self, image: ImageHandle, format: Format) -> RenderResult<ImageViewHandle>;
    fn destroy_image_view(&self, view: ImageViewHandle);
    fn create_sampler(&self, filter: Filter) -> RenderResult<SamplerHandle>;
    fn destroy_sampler(&self, sampler: SamplerHandle);

    fn create_framebuffer(&self, desc: &FramebufferDesc<'_>) -> RenderResult<FramebufferHandle>;
    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle);

    fn create_pipeline(&self, desc: &PipelineDesc) -> RenderResult<PipelineHandle>;
    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    /// Host-visible buffer for per-material parameter blocks.
    fn create_buffer(&self, size: u64) -> RenderResult<BufferHandle>;
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, bytes: &[u8]) -> RenderResult<()>;
    fn destroy_buffer(&self, buffer: BufferHandle);

    /// Pool able to hold `count` parameter sets plus `count` resource sets of `layout`.
    fn create_descriptor_pool(
        &self,
        layout: &DescriptorBatchLayout,
        count: u32,
    ) -> RenderResult<DescriptorPoolHandle>;
    fn allocate_material_bindings(
        &self,
        pool: DescriptorPoolHandle,
        layout: &DescriptorBatchLayout,
        count: u32,
    ) -> RenderResult<Vec<MaterialBindings>>;
    /// Frees the pool and every set allocated from it.
    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle);
    fn update_material_bindings(
        &self,
        bindings: MaterialBindings,
        parameters: BufferHandle,
        parameter_size: u64,
        resources: &[ResourceBinding],
    ) -> RenderResult<()>;

    fn cmd_begin_render_pass(&self, cmd: CommandBufferHandle, begin: &RenderPassBegin<'_>);
    fn cmd_end_render_pass(&self, cmd: CommandBufferHandle);
    /// Sets viewport and scissor to cover `extent`.
    fn cmd_set_viewport(&self, cmd: CommandBufferHandle, extent: RenderSize);
    fn cmd_bind_pipeline(&self, cmd: CommandBufferHandle, pipeline: PipelineHandle);
    fn cmd_bind_material(
        &self,
        cmd: CommandBufferHandle,
        pipeline: PipelineHandle,
        bindings: MaterialBindings,
    );
    fn cmd_push_constants(
        &self,
        cmd: CommandBufferHandle,
        pipeline: PipelineHandle,
        stages: ShaderStages,
        bytes: &[u8],
    );
    fn cmd_draw(&self, cmd: CommandBufferHandle, vertex_count: u32, instance_count: u32);
}

pub trait PresentationSurface {
    fn surface_capabilities(&self) -> RenderResult<SurfaceCapabilities>;

    /// Creates a chain, handing `old` to the driver for resource reuse. `old`
    /// stays valid until [`PresentationSurface::destroy_swapchain`].
    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        old: SwapchainHandle,
    ) -> RenderResult<(SwapchainHandle, Vec<ImageHandle>)>;
    fn destroy_swapchain(&self, swapchain: SwapchainHandle);

    /// Expiry of `timeout` is reported as [`crate::RenderError::DeviceHung`].
    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        signal: SemaphoreHandle,
        timeout: Duration,
    ) -> RenderResult<AcquireOutcome>;

    fn present(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        wait: &[SemaphoreHandle],
    ) -> RenderResult<SurfaceStatus>;

    /// Moves a chain image that no render pass wrote into the presentable
    /// layout. Its contents are undefined afterwards.
    fn cmd_prepare_present(&self, cmd: CommandBufferHandle, image: ImageHandle);
}
