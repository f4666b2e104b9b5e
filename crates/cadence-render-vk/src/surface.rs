// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use ash::vk;
use cadence_render::{
    AcquireOutcome, ColorSpace, CommandBufferHandle, Format, ImageHandle, PresentationSurface, RenderError, RenderResult,
    RenderSize, SemaphoreHandle, SurfaceCapabilities, SurfaceFormat, SurfaceStatus, SwapchainDesc,
    SwapchainHandle,
};

use crate::convert::{map_vk, present_mode_from_vk, timeout_ns, FromVk, ToVk, VkResultExt};
use crate::VkBackend;

impl VkBackend {
    unsafe fn raw_capabilities(&self) -> RenderResult<vk::SurfaceCapabilitiesKHR> {
        self.surface_loader
            .get_physical_device_surface_capabilities(self.phys, self.surface)
            .check("get_physical_device_surface_capabilities")
    }
}

impl PresentationSurface for VkBackend {
    fn surface_capabilities(&self) -> RenderResult<SurfaceCapabilities> {
        let (caps, formats, modes) = unsafe {
            let caps = self.raw_capabilities()?;
            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(self.phys, self.surface)
                .check("get_physical_device_surface_formats")?;
            let modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(self.phys, self.surface)
                .check("get_physical_device_surface_present_modes")?;
            (caps, formats, modes)
        };

        // u32::MAX means the window follows whatever extent the chain picks.
        let current_extent = (caps.current_extent.width != u32::MAX)
            .then(|| RenderSize::from_vk(caps.current_extent));

        Ok(SurfaceCapabilities {
            min_image_count: caps.min_image_count,
            max_image_count: caps.max_image_count,
            current_extent,
            min_extent: RenderSize::from_vk(caps.min_image_extent),
            max_extent: RenderSize::from_vk(caps.max_image_extent),
            formats: formats
                .iter()
                .map(|f| SurfaceFormat {
                    format: Format::from_vk(f.format),
                    color_space: ColorSpace::from_vk(f.color_space),
                })
                .collect(),
            present_modes: modes.into_iter().filter_map(present_mode_from_vk).collect(),
        })
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        old: SwapchainHandle,
    ) -> RenderResult<(SwapchainHandle, Vec<ImageHandle>)> {
        unsafe {
            let caps = self.raw_capabilities()?;
            let pre_transform = if caps
                .supported_transforms
                .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
            {
                vk::SurfaceTransformFlagsKHR::IDENTITY
            } else {
                caps.current_transform
            };

            let info = vk::SwapchainCreateInfoKHR {
                s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
                surface: self.surface,
                min_image_count: desc.min_image_count,
                image_format: desc.format.format.to_vk(),
                image_color_space: desc.format.color_space.to_vk(),
                image_extent: desc.extent.to_vk(),
                image_array_layers: 1,
                image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
                image_sharing_mode: vk::SharingMode::EXCLUSIVE,
                pre_transform,
                composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                present_mode: desc.present_mode.to_vk(),
                clipped: vk::TRUE,
                old_swapchain: old.to_vk(),
                ..Default::default()
            };

            let swapchain = self
                .swapchain_loader
                .create_swapchain(&info, None)
                .check("create_swapchain")?;
            let images = match self.swapchain_loader.get_swapchain_images(swapchain) {
                Ok(images) => images,
                Err(e) => {
                    self.swapchain_loader.destroy_swapchain(swapchain, None);
                    return Err(map_vk("get_swapchain_images", e));
                }
            };
            Ok((
                SwapchainHandle::from_vk(swapchain),
                images.into_iter().map(ImageHandle::from_vk).collect(),
            ))
        }
    }

    fn destroy_swapchain(&self, swapchain: SwapchainHandle) {
        unsafe {
            self.swapchain_loader
                .destroy_swapchain(swapchain.to_vk(), None)
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        signal: SemaphoreHandle,
        timeout: Duration,
    ) -> RenderResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                swapchain.to_vk(),
                timeout_ns(timeout),
                signal.to_vk(),
                vk::Fence::null(),
            )
        };
        match result {
            Ok((index, false)) => Ok(AcquireOutcome::Ready(index)),
            Ok((index, true)) => Ok(AcquireOutcome::Suboptimal(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Err(RenderError::DeviceHung {
                operation: "acquire_next_image",
                timeout,
            }),
            Err(e) => Err(map_vk("acquire_next_image", e)),
        }
    }

    fn present(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        wait: &[SemaphoreHandle],
    ) -> RenderResult<SurfaceStatus> {
        let waits: Vec<vk::Semaphore> = wait.iter().map(|s| s.to_vk()).collect();
        let swapchains = [swapchain.to_vk()];
        let indices = [image_index];
        let info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: waits.len() as u32,
            p_wait_semaphores: waits.as_ptr(),
            swapchain_count: 1,
            p_swapchains: swapchains.as_ptr(),
            p_image_indices: indices.as_ptr(),
            ..Default::default()
        };
        match unsafe { self.swapchain_loader.queue_present(self.queue, &info) } {
            Ok(false) => Ok(SurfaceStatus::Optimal),
            Ok(true) => Ok(SurfaceStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::OutOfDate),
            Err(e) => Err(map_vk("queue_present", e)),
        }
    }

    fn cmd_prepare_present(&self, cmd: CommandBufferHandle, image: ImageHandle) {
        let barrier = vk::ImageMemoryBarrier {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::empty(),
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: image.to_vk(),
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        // Submissions wait on the acquire at COLOR_ATTACHMENT_OUTPUT.
        unsafe {
            self.device.cmd_pipeline_barrier(
                cmd.to_vk(),
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }
}
