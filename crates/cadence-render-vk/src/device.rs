// SPDX-License-Identifier: CEPL-1.0
use std::ptr;
use std::time::Duration;

use ash::vk;
use cadence_render::{
    BufferHandle, CommandBufferHandle, CommandPoolHandle, DescriptorBatchLayout, DescriptorPoolHandle,
    DescriptorSetHandle, FenceHandle, Filter, Format, FramebufferDesc, FramebufferHandle, GpuDevice,
    ImageDesc, ImageHandle, ImageViewHandle, MaterialBindings, PipelineDesc, PipelineHandle,
    RenderError, RenderPassBegin, RenderPassDesc, RenderPassHandle, RenderResult, RenderSize,
    ResourceBinding, SamplerHandle, SemaphoreHandle, ShaderStages, SubmitDesc,
};
use tracing::warn;

use crate::convert::{aspect_of, map_vk, timeout_ns, FromVk, ToVk, VkResultExt};
use crate::{memory, pipeline, Objects, OwnedImage, SetLayouts, VkBackend};

impl VkBackend {
    unsafe fn set_layouts_for(
        &self,
        objects: &mut Objects,
        layout: DescriptorBatchLayout,
    ) -> RenderResult<SetLayouts> {
        if let Some(sets) = objects.set_layouts.get(&layout) {
            return Ok(*sets);
        }

        let ubo = vk::DescriptorSetLayoutBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        };
        let ci = vk::DescriptorSetLayoutCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
            binding_count: 1,
            p_bindings: &ubo,
            ..Default::default()
        };
        let parameters = self
            .device
            .create_descriptor_set_layout(&ci, None)
            .check("create_descriptor_set_layout")?;

        let resources = if layout.resource_binding_count > 0 {
            let samplers = vk::DescriptorSetLayoutBinding {
                binding: 0,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: layout.resource_binding_count,
                stage_flags: vk::ShaderStageFlags::FRAGMENT,
                ..Default::default()
            };
            let ci = vk::DescriptorSetLayoutCreateInfo {
                s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
                binding_count: 1,
                p_bindings: &samplers,
                ..Default::default()
            };
            match self.device.create_descriptor_set_layout(&ci, None) {
                Ok(l) => Some(l),
                Err(e) => {
                    self.device.destroy_descriptor_set_layout(parameters, None);
                    return Err(map_vk("create_descriptor_set_layout", e));
                }
            }
        } else {
            None
        };

        let sets = SetLayouts {
            parameters,
            resources,
        };
        objects.set_layouts.insert(layout, sets);
        Ok(sets)
    }

    unsafe fn pipeline_layout_for(
        &self,
        objects: &mut Objects,
        layout: DescriptorBatchLayout,
        push_constant_size: u32,
    ) -> RenderResult<vk::PipelineLayout> {
        if let Some(l) = objects.pipeline_layouts.get(&(layout, push_constant_size)) {
            return Ok(*l);
        }

        let sets = self.set_layouts_for(objects, layout)?;
        let mut set_layouts = vec![sets.parameters];
        set_layouts.extend(sets.resources);

        let range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: push_constant_size,
        };
        let ci = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            set_layout_count: set_layouts.len() as u32,
            p_set_layouts: set_layouts.as_ptr(),
            push_constant_range_count: u32::from(push_constant_size > 0),
            p_push_constant_ranges: &range,
            ..Default::default()
        };
        let pl = self
            .device
            .create_pipeline_layout(&ci, None)
            .check("create_pipeline_layout")?;
        objects.pipeline_layouts.insert((layout, push_constant_size), pl);
        Ok(pl)
    }

    fn layout_of(&self, pipeline: PipelineHandle) -> Option<vk::PipelineLayout> {
        let layout = self.objects().pipelines.get(&pipeline.to_vk()).copied();
        if layout.is_none() {
            warn!("pipeline {:#x} is unknown to this device", pipeline.as_raw());
        }
        layout
    }

    unsafe fn create_view(&self, image: vk::Image, format: Format) -> RenderResult<vk::ImageView> {
        let ci = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: format.to_vk(),
            components: vk::ComponentMapping::default(),
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: aspect_of(format),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        self.device
            .create_image_view(&ci, None)
            .check("create_image_view")
    }
}

impl GpuDevice for VkBackend {
    fn create_fence(&self, signaled: bool) -> RenderResult<FenceHandle> {
        let ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        unsafe { self.device.create_fence(&ci, None) }
            .check("create_fence")
            .map(FenceHandle::from_vk)
    }

    fn wait_for_fence(&self, fence: FenceHandle, timeout: Duration) -> RenderResult<bool> {
        match unsafe {
            self.device
                .wait_for_fences(&[fence.to_vk()], true, timeout_ns(timeout))
        } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(map_vk("wait_for_fences", e)),
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> RenderResult<()> {
        unsafe { self.device.reset_fences(&[fence.to_vk()]) }.check("reset_fences")
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        unsafe { self.device.destroy_fence(fence.to_vk(), None) }
    }

    fn create_semaphore(&self) -> RenderResult<SemaphoreHandle> {
        let ci = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        unsafe { self.device.create_semaphore(&ci, None) }
            .check("create_semaphore")
            .map(SemaphoreHandle::from_vk)
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        unsafe { self.device.destroy_semaphore(semaphore.to_vk(), None) }
    }

    fn wait_idle(&self) -> RenderResult<()> {
        unsafe { self.device.device_wait_idle() }.check("device_wait_idle")
    }

    fn create_command_pool(&self) -> RenderResult<CommandPoolHandle> {
        let ci = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: self.queue_family,
            ..Default::default()
        };
        unsafe { self.device.create_command_pool(&ci, None) }
            .check("create_command_pool")
            .map(CommandPoolHandle::from_vk)
    }

    fn allocate_command_buffers(
        &self,
        pool: CommandPoolHandle,
        count: u32,
    ) -> RenderResult<Vec<CommandBufferHandle>> {
        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool.to_vk(),
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        let cmds = unsafe { self.device.allocate_command_buffers(&ai) }
            .check("allocate_command_buffers")?;
        Ok(cmds.into_iter().map(CommandBufferHandle::from_vk).collect())
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        unsafe { self.device.destroy_command_pool(pool.to_vk(), None) }
    }

    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> RenderResult<()> {
        let cmd = cmd.to_vk();
        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .check("reset_command_buffer")?;
            self.device
                .begin_command_buffer(cmd, &bi)
                .check("begin_command_buffer")
        }
    }

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> RenderResult<()> {
        unsafe { self.device.end_command_buffer(cmd.to_vk()) }.check("end_command_buffer")
    }

    fn submit(&self, desc: &SubmitDesc<'_>) -> RenderResult<()> {
        let waits: Vec<vk::Semaphore> = desc.wait_semaphores.iter().map(|s| s.to_vk()).collect();
        let stages = vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT; waits.len()];
        let cmds: Vec<vk::CommandBuffer> = desc.command_buffers.iter().map(|c| c.to_vk()).collect();
        let signals: Vec<vk::Semaphore> = desc.signal_semaphores.iter().map(|s| s.to_vk()).collect();

        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: waits.len() as u32,
            p_wait_semaphores: waits.as_ptr(),
            p_wait_dst_stage_mask: stages.as_ptr(),
            command_buffer_count: cmds.len() as u32,
            p_command_buffers: cmds.as_ptr(),
            signal_semaphore_count: signals.len() as u32,
            p_signal_semaphores: signals.as_ptr(),
            ..Default::default()
        };
        let fence = desc.fence.map(|f| f.to_vk()).unwrap_or_default();
        unsafe { self.device.queue_submit(self.queue, &[submit], fence) }.check("queue_submit")
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> RenderResult<RenderPassHandle> {
        unsafe { pipeline::create_render_pass(&self.device, desc) }.map(RenderPassHandle::from_vk)
    }

    fn destroy_render_pass(&self, render_pass: RenderPassHandle) {
        unsafe { self.device.destroy_render_pass(render_pass.to_vk(), None) }
    }

    fn create_image(&self, desc: &ImageDesc) -> RenderResult<(ImageHandle, ImageViewHandle)> {
        let ci = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format: desc.format.to_vk(),
            extent: vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: desc.samples.to_vk(),
            tiling: vk::ImageTiling::OPTIMAL,
            usage: desc.usage.to_vk(),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };

        unsafe {
            let d = &self.device;
            let image = d.create_image(&ci, None).check("create_image")?;
            let requirements = d.get_image_memory_requirements(image);
            let memory = match memory::allocate(
                d,
                &self.memory_props,
                requirements,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            ) {
                Ok(m) => m,
                Err(e) => {
                    d.destroy_image(image, None);
                    return Err(e);
                }
            };
            let view = d
                .bind_image_memory(image, memory, 0)
                .check("bind_image_memory")
                .and_then(|()| self.create_view(image, desc.format));
            let view = match view {
                Ok(v) => v,
                Err(e) => {
                    d.destroy_image(image, None);
                    d.free_memory(memory, None);
                    return Err(e);
                }
            };

            self.objects()
                .images
                .insert(image, OwnedImage { memory, view });
            Ok((ImageHandle::from_vk(image), ImageViewHandle::from_vk(view)))
        }
    }

    fn destroy_image(&self, image: ImageHandle) {
        let image = image.to_vk();
        let Some(owned) = self.objects().images.remove(&image) else {
            warn!("destroy_image: {image:?} was not created by this device");
            return;
        };
        unsafe {
            self.device.destroy_image_view(owned.view, None);
            self.device.destroy_image(image, None);
            self.device.free_memory(owned.memory, None);
        }
    }

    fn create_image_view(&self, image: ImageHandle, format: Format) -> RenderResult<ImageViewHandle> {
        unsafe { self.create_view(image.to_vk(), format) }.map(ImageViewHandle::from_vk)
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        unsafe { self.device.destroy_image_view(view.to_vk(), None) }
    }

    fn create_sampler(&self, filter: Filter) -> RenderResult<SamplerHandle> {
        let filter = filter.to_vk();
        let ci = vk::SamplerCreateInfo {
            s_type: vk::StructureType::SAMPLER_CREATE_INFO,
            mag_filter: filter,
            min_filter: filter,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
            address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_w: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            max_lod: 0.0,
            ..Default::default()
        };
        unsafe { self.device.create_sampler(&ci, None) }
            .check("create_sampler")
            .map(SamplerHandle::from_vk)
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        unsafe { self.device.destroy_sampler(sampler.to_vk(), None) }
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc<'_>) -> RenderResult<FramebufferHandle> {
        let attachments: Vec<vk::ImageView> = desc.attachments.iter().map(|v| v.to_vk()).collect();
        let ci = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass: desc.render_pass.to_vk(),
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            width: desc.extent.width,
            height: desc.extent.height,
            layers: 1,
            ..Default::default()
        };
        unsafe { self.device.create_framebuffer(&ci, None) }
            .check("create_framebuffer")
            .map(FramebufferHandle::from_vk)
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        unsafe { self.device.destroy_framebuffer(framebuffer.to_vk(), None) }
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> RenderResult<PipelineHandle> {
        let mut objects = self.objects();
        unsafe {
            let layout = self.pipeline_layout_for(&mut objects, desc.bindings, desc.push_constant_size)?;
            let pipeline =
                pipeline::create_graphics_pipeline(&self.device, self.pipeline_cache, layout, desc)?;
            objects.pipelines.insert(pipeline, layout);
            Ok(PipelineHandle::from_vk(pipeline))
        }
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        let pipeline = pipeline.to_vk();
        self.objects().pipelines.remove(&pipeline);
        // Layouts are shared between pipelines and live until the device goes.
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    fn create_buffer(&self, size: u64) -> RenderResult<BufferHandle> {
        let ci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        unsafe {
            let d = &self.device;
            let buffer = d.create_buffer(&ci, None).check("create_buffer")?;
            let requirements = d.get_buffer_memory_requirements(buffer);
            let memory = memory::allocate(
                d,
                &self.memory_props,
                requirements,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )
            .and_then(|m| match d.bind_buffer_memory(buffer, m, 0) {
                Ok(()) => Ok(m),
                Err(e) => {
                    d.free_memory(m, None);
                    Err(map_vk("bind_buffer_memory", e))
                }
            });
            let memory = match memory {
                Ok(m) => m,
                Err(e) => {
                    d.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };
            self.objects().buffers.insert(buffer, memory);
            Ok(BufferHandle::from_vk(buffer))
        }
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, bytes: &[u8]) -> RenderResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let memory = self
            .objects()
            .buffers
            .get(&buffer.to_vk())
            .copied()
            .ok_or_else(|| RenderError::backend("write_buffer", "buffer not created by this device"))?;
        unsafe {
            let dst = self
                .device
                .map_memory(memory, offset, bytes.len() as u64, vk::MemoryMapFlags::empty())
                .check("map_memory")?;
            ptr::copy_nonoverlapping(bytes.as_ptr(), dst.cast::<u8>(), bytes.len());
            self.device.unmap_memory(memory);
        }
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let buffer = buffer.to_vk();
        let Some(memory) = self.objects().buffers.remove(&buffer) else {
            warn!("destroy_buffer: {buffer:?} was not created by this device");
            return;
        };
        unsafe {
            self.device.destroy_buffer(buffer, None);
            self.device.free_memory(memory, None);
        }
    }

    fn create_descriptor_pool(
        &self,
        layout: &DescriptorBatchLayout,
        count: u32,
    ) -> RenderResult<DescriptorPoolHandle> {
        let mut sizes = vec![vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: count,
        }];
        let mut max_sets = count;
        if layout.resource_binding_count > 0 {
            sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: count * layout.resource_binding_count,
            });
            max_sets += count;
        }
        let ci = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets,
            pool_size_count: sizes.len() as u32,
            p_pool_sizes: sizes.as_ptr(),
            ..Default::default()
        };
        unsafe { self.device.create_descriptor_pool(&ci, None) }
            .check("create_descriptor_pool")
            .map(DescriptorPoolHandle::from_vk)
    }

    fn allocate_material_bindings(
        &self,
        pool: DescriptorPoolHandle,
        layout: &DescriptorBatchLayout,
        count: u32,
    ) -> RenderResult<Vec<MaterialBindings>> {
        let sets = {
            let mut objects = self.objects();
            unsafe { self.set_layouts_for(&mut objects, *layout)? }
        };
        let allocate = |set_layout: vk::DescriptorSetLayout| {
            let layouts = vec![set_layout; count as usize];
            let ai = vk::DescriptorSetAllocateInfo {
                s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
                descriptor_pool: pool.to_vk(),
                descriptor_set_count: layouts.len() as u32,
                p_set_layouts: layouts.as_ptr(),
                ..Default::default()
            };
            unsafe { self.device.allocate_descriptor_sets(&ai) }.check("allocate_descriptor_sets")
        };

        let parameters = allocate(sets.parameters)?;
        let resources = match sets.resources {
            Some(l) => allocate(l)?,
            None => vec![vk::DescriptorSet::null(); count as usize],
        };
        Ok(parameters
            .into_iter()
            .zip(resources)
            .map(|(p, r)| MaterialBindings {
                parameters: DescriptorSetHandle::from_vk(p),
                resources: DescriptorSetHandle::from_vk(r),
            })
            .collect())
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        unsafe { self.device.destroy_descriptor_pool(pool.to_vk(), None) }
    }

    fn update_material_bindings(
        &self,
        bindings: MaterialBindings,
        parameters: BufferHandle,
        parameter_size: u64,
        resources: &[ResourceBinding],
    ) -> RenderResult<()> {
        let buffer_info = vk::DescriptorBufferInfo {
            buffer: parameters.to_vk(),
            offset: 0,
            range: parameter_size,
        };
        let image_infos: Vec<vk::DescriptorImageInfo> = resources
            .iter()
            .map(|r| vk::DescriptorImageInfo {
                sampler: r.sampler.to_vk(),
                image_view: r.view.to_vk(),
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            })
            .collect();

        let mut writes = vec![vk::WriteDescriptorSet {
            s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
            dst_set: bindings.parameters.to_vk(),
            dst_binding: 0,
            descriptor_count: 1,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            p_buffer_info: &buffer_info,
            ..Default::default()
        }];
        if !image_infos.is_empty() && !bindings.resources.is_null() {
            writes.push(vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: bindings.resources.to_vk(),
                dst_binding: 0,
                descriptor_count: image_infos.len() as u32,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                p_image_info: image_infos.as_ptr(),
                ..Default::default()
            });
        }
        unsafe { self.device.update_descriptor_sets(&writes, &[]) };
        Ok(())
    }

    fn cmd_begin_render_pass(&self, cmd: CommandBufferHandle, begin: &RenderPassBegin<'_>) {
        let clears: Vec<vk::ClearValue> = begin.clear_values.iter().map(|c| c.to_vk()).collect();
        let info = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: begin.render_pass.to_vk(),
            framebuffer: begin.framebuffer.to_vk(),
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: begin.extent.to_vk(),
            },
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.device
                .cmd_begin_render_pass(cmd.to_vk(), &info, vk::SubpassContents::INLINE)
        }
    }

    fn cmd_end_render_pass(&self, cmd: CommandBufferHandle) {
        unsafe { self.device.cmd_end_render_pass(cmd.to_vk()) }
    }

    fn cmd_set_viewport(&self, cmd: CommandBufferHandle, extent: RenderSize) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: extent.to_vk(),
        };
        unsafe {
            self.device.cmd_set_viewport(cmd.to_vk(), 0, &[viewport]);
            self.device.cmd_set_scissor(cmd.to_vk(), 0, &[scissor]);
        }
    }

    fn cmd_bind_pipeline(&self, cmd: CommandBufferHandle, pipeline: PipelineHandle) {
        unsafe {
            self.device.cmd_bind_pipeline(
                cmd.to_vk(),
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.to_vk(),
            )
        }
    }

    fn cmd_bind_material(
        &self,
        cmd: CommandBufferHandle,
        pipeline: PipelineHandle,
        bindings: MaterialBindings,
    ) {
        let Some(layout) = self.layout_of(pipeline) else { return };
        let mut sets = vec![bindings.parameters.to_vk()];
        if !bindings.resources.is_null() {
            sets.push(bindings.resources.to_vk());
        }
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                cmd.to_vk(),
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &sets,
                &[],
            )
        }
    }

    fn cmd_push_constants(
        &self,
        cmd: CommandBufferHandle,
        pipeline: PipelineHandle,
        stages: ShaderStages,
        bytes: &[u8],
    ) {
        let Some(layout) = self.layout_of(pipeline) else { return };
        unsafe {
            self.device
                .cmd_push_constants(cmd.to_vk(), layout, stages.to_vk(), 0, bytes)
        }
    }

    fn cmd_draw(&self, cmd: CommandBufferHandle, vertex_count: u32, instance_count: u32) {
        unsafe { self.device.cmd_draw(cmd.to_vk(), vertex_count, instance_count, 0, 0) }
    }
}
