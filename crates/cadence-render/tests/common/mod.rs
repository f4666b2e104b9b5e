// SPDX-License-Identifier: CEPL-1.0
//! In-memory backend that records every call and simulates GPU completion.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cadence_render::*;

#[derive(Clone, Debug, PartialEq)]
pub enum Recorded {
    BeginRenderPass {
        framebuffer: FramebufferHandle,
        extent: RenderSize,
    },
    EndRenderPass,
    SetViewport(RenderSize),
    BindPipeline(PipelineHandle),
    BindMaterial(MaterialBindings),
    PushConstants(usize),
    Draw {
        vertices: u32,
        instances: u32,
    },
    PreparePresent(ImageHandle),
}

#[derive(Clone, Debug)]
pub struct SubmitRecord {
    pub waits: Vec<SemaphoreHandle>,
    pub commands: Vec<CommandBufferHandle>,
    pub signals: Vec<SemaphoreHandle>,
    pub fence: Option<FenceHandle>,
}

pub struct MockState {
    next: u64,

    pub caps: SurfaceCapabilities,
    pub acquire_script: VecDeque<RenderResult<AcquireOutcome>>,
    pub present_script: VecDeque<SurfaceStatus>,
    /// Fences never complete while set.
    pub hung: bool,
    /// `create_buffer` calls that succeed before every further one fails.
    pub buffer_budget: Option<usize>,
    /// The next `submit` fails before reaching the queue.
    pub fail_next_submit: bool,

    fences: HashMap<u64, bool>,
    gpu_queue: VecDeque<u64>,
    pub max_in_flight: usize,
    pub fence_waits: usize,
    /// Largest number of queued submissions a single fence wait had to retire.
    pub max_retired_per_wait: usize,
    pub wait_idle_calls: usize,

    pub semaphores: HashSet<u64>,
    pub command_pools: HashSet<u64>,

    pub swapchains: HashMap<u64, Vec<ImageHandle>>,
    pub swapchains_created: usize,
    pub last_swapchain_desc: Option<SwapchainDesc>,
    next_image: HashMap<u64, u32>,
    pub acquires: usize,
    pub presented: Vec<u32>,

    pub owned_images: HashSet<u64>,
    pub images_created: usize,
    pub views: HashSet<u64>,
    pub framebuffers: HashMap<u64, Vec<ImageViewHandle>>,
    pub framebuffers_created: usize,
    pub render_passes: HashSet<u64>,
    pub pipelines: HashSet<u64>,
    pub samplers: HashSet<u64>,

    pub buffers: HashMap<u64, Vec<u8>>,
    pub buffers_created: usize,
    pub pools: HashMap<u64, Vec<MaterialBindings>>,
    pub binding_updates: HashMap<MaterialBindings, usize>,

    pub recorded: Vec<Recorded>,
    pub open_command_buffers: HashSet<u64>,
    pub submits: Vec<SubmitRecord>,
}

impl MockState {
    fn handle(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    /// GPU retires submissions in order until `fence` is signaled.
    fn complete_until(&mut self, fence: u64) -> usize {
        let mut retired = 0;
        while self.fences.get(&fence) == Some(&false) {
            let Some(f) = self.gpu_queue.pop_front() else {
                break;
            };
            self.fences.insert(f, true);
            retired += 1;
        }
        retired
    }

    pub fn in_flight(&self) -> usize {
        self.gpu_queue.len()
    }

    pub fn live_fences(&self) -> usize {
        self.fences.len()
    }
}

pub struct MockGpu {
    state: Mutex<MockState>,
}

pub fn surface_caps(extent: RenderSize, min_images: u32, max_images: u32) -> SurfaceCapabilities {
    SurfaceCapabilities {
        min_image_count: min_images,
        max_image_count: max_images,
        current_extent: Some(extent),
        min_extent: RenderSize::new(1, 1),
        max_extent: RenderSize::new(8192, 8192),
        formats: vec![SurfaceFormat::default()],
        present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox],
    }
}

impl MockGpu {
    /// A surface of `extent` that yields `images` swapchain images by default.
    pub fn new(extent: RenderSize, images: u32) -> Arc<Self> {
        Arc::new(MockGpu {
            state: Mutex::new(MockState {
                next: 0,
                caps: surface_caps(extent, images.saturating_sub(1).max(1), images),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                hung: false,
                buffer_budget: None,
                fail_next_submit: false,
                fences: HashMap::new(),
                gpu_queue: VecDeque::new(),
                max_in_flight: 0,
                fence_waits: 0,
                max_retired_per_wait: 0,
                wait_idle_calls: 0,
                semaphores: HashSet::new(),
                command_pools: HashSet::new(),
                swapchains: HashMap::new(),
                swapchains_created: 0,
                last_swapchain_desc: None,
                next_image: HashMap::new(),
                acquires: 0,
                presented: Vec::new(),
                owned_images: HashSet::new(),
                images_created: 0,
                views: HashSet::new(),
                framebuffers: HashMap::new(),
                framebuffers_created: 0,
                render_passes: HashSet::new(),
                pipelines: HashSet::new(),
                samplers: HashSet::new(),
                buffers: HashMap::new(),
                buffers_created: 0,
                pools: HashMap::new(),
                binding_updates: HashMap::new(),
                recorded: Vec::new(),
                open_command_buffers: HashSet::new(),
                submits: Vec::new(),
            }),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// The window was resized; the surface reports the new extent.
    pub fn resize_surface(&self, extent: RenderSize) {
        self.state().caps.current_extent = Some(extent);
    }
}

impl GpuDevice for MockGpu {
    fn create_fence(&self, signaled: bool) -> RenderResult<FenceHandle> {
        let mut s = self.state();
        let h = s.handle();
        s.fences.insert(h, signaled);
        Ok(FenceHandle::from_raw(h))
    }

    fn wait_for_fence(&self, fence: FenceHandle, _timeout: Duration) -> RenderResult<bool> {
        let mut s = self.state();
        s.fence_waits += 1;
        if s.fences.get(&fence.as_raw()) == Some(&true) {
            return Ok(true);
        }
        if s.hung {
            return Ok(false);
        }
        let retired = s.complete_until(fence.as_raw());
        s.max_retired_per_wait = s.max_retired_per_wait.max(retired);
        Ok(s.fences.get(&fence.as_raw()) == Some(&true))
    }

    fn reset_fence(&self, fence: FenceHandle) -> RenderResult<()> {
        let mut s = self.state();
        assert!(
            !s.gpu_queue.contains(&fence.as_raw()),
            "reset of a fence the GPU still owns"
        );
        s.fences.insert(fence.as_raw(), false);
        Ok(())
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        self.state().fences.remove(&fence.as_raw());
    }

    fn create_semaphore(&self) -> RenderResult<SemaphoreHandle> {
        let mut s = self.state();
        let h = s.handle();
        s.semaphores.insert(h);
        Ok(SemaphoreHandle::from_raw(h))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        self.state().semaphores.remove(&semaphore.as_raw());
    }

    fn wait_idle(&self) -> RenderResult<()> {
        let mut s = self.state();
        s.wait_idle_calls += 1;
        if s.hung {
            return Err(RenderError::DeviceLost);
        }
        while let Some(f) = s.gpu_queue.pop_front() {
            s.fences.insert(f, true);
        }
        Ok(())
    }

    fn create_command_pool(&self) -> RenderResult<CommandPoolHandle> {
        let mut s = self.state();
        let h = s.handle();
        s.command_pools.insert(h);
        Ok(CommandPoolHandle::from_raw(h))
    }

    fn allocate_command_buffers(
        &self,
        _pool: CommandPoolHandle,
        count: u32,
    ) -> RenderResult<Vec<CommandBufferHandle>> {
        let mut s = self.state();
        Ok((0..count)
            .map(|_| CommandBufferHandle::from_raw(s.handle()))
            .collect())
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        self.state().command_pools.remove(&pool.as_raw());
    }

    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> RenderResult<()> {
        assert!(
            self.state().open_command_buffers.insert(cmd.as_raw()),
            "command buffer begun twice"
        );
        Ok(())
    }

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> RenderResult<()> {
        assert!(
            self.state().open_command_buffers.remove(&cmd.as_raw()),
            "command buffer ended without begin"
        );
        Ok(())
    }

    fn submit(&self, desc: &SubmitDesc<'_>) -> RenderResult<()> {
        let mut s = self.state();
        if std::mem::take(&mut s.fail_next_submit) {
            return Err(RenderError::backend("submit", "out of device memory"));
        }
        s.submits.push(SubmitRecord {
            waits: desc.wait_semaphores.to_vec(),
            commands: desc.command_buffers.to_vec(),
            signals: desc.signal_semaphores.to_vec(),
            fence: desc.fence,
        });
        if let Some(fence) = desc.fence {
            assert_eq!(s.fences.get(&fence.as_raw()), Some(&false), "submit with a signaled fence");
            s.gpu_queue.push_back(fence.as_raw());
            s.max_in_flight = s.max_in_flight.max(s.gpu_queue.len());
        }
        Ok(())
    }

    fn create_render_pass(&self, _desc: &RenderPassDesc) -> RenderResult<RenderPassHandle> {
        let mut s = self.state();
        let h = s.handle();
        s.render_passes.insert(h);
        Ok(RenderPassHandle::from_raw(h))
    }

    fn destroy_render_pass(&self, render_pass: RenderPassHandle) {
        self.state().render_passes.remove(&render_pass.as_raw());
    }

    fn create_image(&self, _desc: &ImageDesc) -> RenderResult<(ImageHandle, ImageViewHandle)> {
        let mut s = self.state();
        let image = s.handle();
        s.owned_images.insert(image);
        s.images_created += 1;
        // The view handle is the image handle plus a large offset.
        let view = image | (1 << 40);
        s.views.insert(view);
        Ok((ImageHandle::from_raw(image), ImageViewHandle::from_raw(view)))
    }

    fn destroy_image(&self, image: ImageHandle) {
        let mut s = self.state();
        assert!(s.owned_images.remove(&image.as_raw()), "destroy of an image not created by create_image");
        s.views.remove(&(image.as_raw() | (1 << 40)));
    }

    fn create_image_view(&self, _image: ImageHandle, _format: Format) -> RenderResult<ImageViewHandle> {
        let mut s = self.state();
        let h = s.handle();
        s.views.insert(h);
        Ok(ImageViewHandle::from_raw(h))
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        assert!(self.state().views.remove(&view.as_raw()), "double destroy of an image view");
    }

    fn create_sampler(&self, _filter: Filter) -> RenderResult<SamplerHandle> {
        let mut s = self.state();
        let h = s.handle();
        s.samplers.insert(h);
        Ok(SamplerHandle::from_raw(h))
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        self.state().samplers.remove(&sampler.as_raw());
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc<'_>) -> RenderResult<FramebufferHandle> {
        let mut s = self.state();
        for view in desc.attachments {
            assert!(s.views.contains(&view.as_raw()), "framebuffer over a dead view");
        }
        let h = s.handle();
        s.framebuffers.insert(h, desc.attachments.to_vec());
        s.framebuffers_created += 1;
        Ok(FramebufferHandle::from_raw(h))
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        self.state().framebuffers.remove(&framebuffer.as_raw());
    }

    fn create_pipeline(&self, _desc: &PipelineDesc) -> RenderResult<PipelineHandle> {
        let mut s = self.state();
        let h = s.handle();
        s.pipelines.insert(h);
        Ok(PipelineHandle::from_raw(h))
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        self.state().pipelines.remove(&pipeline.as_raw());
    }

    fn create_buffer(&self, size: u64) -> RenderResult<BufferHandle> {
        let mut s = self.state();
        if let Some(budget) = s.buffer_budget {
            if budget == 0 {
                return Err(RenderError::backend("create_buffer", "out of device memory"));
            }
            s.buffer_budget = Some(budget - 1);
        }
        let h = s.handle();
        s.buffers.insert(h, vec![0; size as usize]);
        s.buffers_created += 1;
        Ok(BufferHandle::from_raw(h))
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, bytes: &[u8]) -> RenderResult<()> {
        let mut s = self.state();
        let data = s
            .buffers
            .get_mut(&buffer.as_raw())
            .ok_or_else(|| RenderError::backend("write_buffer", "unknown buffer"))?;
        let start = offset as usize;
        data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        self.state().buffers.remove(&buffer.as_raw());
    }

    fn create_descriptor_pool(
        &self,
        _layout: &DescriptorBatchLayout,
        _count: u32,
    ) -> RenderResult<DescriptorPoolHandle> {
        let mut s = self.state();
        let h = s.handle();
        s.pools.insert(h, Vec::new());
        Ok(DescriptorPoolHandle::from_raw(h))
    }

    fn allocate_material_bindings(
        &self,
        pool: DescriptorPoolHandle,
        _layout: &DescriptorBatchLayout,
        count: u32,
    ) -> RenderResult<Vec<MaterialBindings>> {
        let mut s = self.state();
        let bindings: Vec<_> = (0..count)
            .map(|_| MaterialBindings {
                parameters: DescriptorSetHandle::from_raw(s.handle()),
                resources: DescriptorSetHandle::from_raw(s.handle()),
            })
            .collect();
        s.pools
            .get_mut(&pool.as_raw())
            .expect("allocation from an unknown pool")
            .extend(bindings.iter().copied());
        Ok(bindings)
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        self.state().pools.remove(&pool.as_raw());
    }

    fn update_material_bindings(
        &self,
        bindings: MaterialBindings,
        _parameters: BufferHandle,
        _parameter_size: u64,
        _resources: &[ResourceBinding],
    ) -> RenderResult<()> {
        *self.state().binding_updates.entry(bindings).or_default() += 1;
        Ok(())
    }

    fn cmd_begin_render_pass(&self, _cmd: CommandBufferHandle, begin: &RenderPassBegin<'_>) {
        self.state().recorded.push(Recorded::BeginRenderPass {
            framebuffer: begin.framebuffer,
            extent: begin.extent,
        });
    }

    fn cmd_end_render_pass(&self, _cmd: CommandBufferHandle) {
        self.state().recorded.push(Recorded::EndRenderPass);
    }

    fn cmd_set_viewport(&self, _cmd: CommandBufferHandle, extent: RenderSize) {
        self.state().recorded.push(Recorded::SetViewport(extent));
    }

    fn cmd_bind_pipeline(&self, _cmd: CommandBufferHandle, pipeline: PipelineHandle) {
        self.state().recorded.push(Recorded::BindPipeline(pipeline));
    }

    fn cmd_bind_material(&self, _cmd: CommandBufferHandle, _pipeline: PipelineHandle, bindings: MaterialBindings) {
        self.state().recorded.push(Recorded::BindMaterial(bindings));
    }

    fn cmd_push_constants(
        &self,
        _cmd: CommandBufferHandle,
        _pipeline: PipelineHandle,
        _stages: ShaderStages,
        bytes: &[u8],
    ) {
        self.state().recorded.push(Recorded::PushConstants(bytes.len()));
    }

    fn cmd_draw(&self, _cmd: CommandBufferHandle, vertex_count: u32, instance_count: u32) {
        self.state().recorded.push(Recorded::Draw {
            vertices: vertex_count,
            instances: instance_count,
        });
    }
}

impl PresentationSurface for MockGpu {
    fn surface_capabilities(&self) -> RenderResult<SurfaceCapabilities> {
        Ok(self.state().caps.clone())
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        old: SwapchainHandle,
    ) -> RenderResult<(SwapchainHandle, Vec<ImageHandle>)> {
        let mut s = self.state();
        if !old.is_null() {
            assert!(s.swapchains.contains_key(&old.as_raw()), "old swapchain already retired");
        }
        let h = s.handle();
        let images: Vec<_> = (0..desc.min_image_count)
            .map(|_| ImageHandle::from_raw(s.handle()))
            .collect();
        s.swapchains.insert(h, images.clone());
        s.swapchains_created += 1;
        s.last_swapchain_desc = Some(*desc);
        Ok((SwapchainHandle::from_raw(h), images))
    }

    fn destroy_swapchain(&self, swapchain: SwapchainHandle) {
        self.state().swapchains.remove(&swapchain.as_raw());
    }

    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        _signal: SemaphoreHandle,
        _timeout: Duration,
    ) -> RenderResult<AcquireOutcome> {
        let mut s = self.state();
        s.acquires += 1;
        let count = s.swapchains[&swapchain.as_raw()].len() as u32;
        let next = s.next_image.entry(swapchain.as_raw()).or_insert(0);
        let index = *next;
        match s.acquire_script.pop_front() {
            Some(Ok(AcquireOutcome::OutOfDate)) => Ok(AcquireOutcome::OutOfDate),
            Some(Err(e)) => Err(e),
            scripted => {
                let next = s.next_image.get_mut(&swapchain.as_raw()).unwrap();
                *next = (index + 1) % count;
                match scripted {
                    Some(Ok(AcquireOutcome::Suboptimal(_))) => Ok(AcquireOutcome::Suboptimal(index)),
                    _ => Ok(AcquireOutcome::Ready(index)),
                }
            }
        }
    }

    fn present(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        _wait: &[SemaphoreHandle],
    ) -> RenderResult<SurfaceStatus> {
        let mut s = self.state();
        assert!(s.swapchains.contains_key(&swapchain.as_raw()), "present to a retired swapchain");
        s.presented.push(image_index);
        Ok(s.present_script.pop_front().unwrap_or(SurfaceStatus::Optimal))
    }

    fn cmd_prepare_present(&self, _cmd: CommandBufferHandle, image: ImageHandle) {
        self.state().recorded.push(Recorded::PreparePresent(image));
    }
}

pub const WINDOW: RenderSize = RenderSize::new(800, 600);

/// Scheduler over a mock surface of `images` images at [`WINDOW`].
pub fn scheduler(frames_in_flight: usize, images: u32) -> (Arc<MockGpu>, FrameScheduler<MockGpu>) {
    let gpu = MockGpu::new(WINDOW, images);
    let config = SchedulerConfig {
        frames_in_flight,
        ..SchedulerConfig::default()
    };
    let scheduler = FrameScheduler::new(gpu.clone(), SwapchainConfig::default(), config, WINDOW).unwrap();
    (gpu, scheduler)
}

/// Begins and ends one frame with nothing recorded; `None` if it was skipped.
pub fn run_frame(scheduler: &mut FrameScheduler<MockGpu>) -> Option<(usize, u32)> {
    let frame = scheduler.begin_frame().unwrap()?;
    let ids = (frame.slot_index(), frame.image_index());
    scheduler.end_frame(frame).unwrap();
    Some(ids)
}

pub fn presentable_pass(gpu: &Arc<MockGpu>, depth: bool) -> Arc<RenderPass<MockGpu>> {
    let depth = depth.then_some(Format::D32Sfloat);
    Arc::new(RenderPass::new(gpu.clone(), RenderPassDesc::presentable(Format::B8G8R8A8Unorm, depth)).unwrap())
}

pub fn clear_values(depth: bool) -> Vec<ClearValue> {
    let mut values = vec![ClearValue::Color([0.1, 0.1, 0.12, 1.0])];
    if depth {
        values.push(ClearValue::DepthStencil { depth: 1.0, stencil: 0 });
    }
    values
}
