// SPDX-License-Identifier: CEPL-1.0
//! Core descriptions to Vulkan values and back.

use ash::vk::{self, Handle};
use cadence_render::{
    ClearValue, ColorSpace, Filter, Format, ImageLayout, ImageUsage, LoadOp, PresentMode, RenderError,
    RenderResult, RenderSize, SampleCount, ShaderStages, StoreOp,
};

pub(crate) trait ToVk {
    type Vk;
    fn to_vk(self) -> Self::Vk;
}

pub(crate) trait FromVk<T> {
    fn from_vk(value: T) -> Self;
}

macro_rules! handle_conversions {
    ($($ours:ident => $vk:ty),* $(,)?) => {$(
        impl ToVk for cadence_render::$ours {
            type Vk = $vk;
            #[inline]
            fn to_vk(self) -> $vk {
                <$vk>::from_raw(self.as_raw())
            }
        }

        impl FromVk<$vk> for cadence_render::$ours {
            #[inline]
            fn from_vk(value: $vk) -> Self {
                cadence_render::$ours::from_raw(value.as_raw())
            }
        }
    )*};
}

handle_conversions! {
    FenceHandle => vk::Fence,
    SemaphoreHandle => vk::Semaphore,
    CommandPoolHandle => vk::CommandPool,
    CommandBufferHandle => vk::CommandBuffer,
    SwapchainHandle => vk::SwapchainKHR,
    ImageHandle => vk::Image,
    ImageViewHandle => vk::ImageView,
    SamplerHandle => vk::Sampler,
    RenderPassHandle => vk::RenderPass,
    FramebufferHandle => vk::Framebuffer,
    PipelineHandle => vk::Pipeline,
    BufferHandle => vk::Buffer,
    DescriptorPoolHandle => vk::DescriptorPool,
    DescriptorSetHandle => vk::DescriptorSet,
}

/// Maps a failed Vulkan call onto the core error kinds.
pub(crate) fn map_vk(call: &'static str, result: vk::Result) -> RenderError {
    match result {
        vk::Result::ERROR_DEVICE_LOST => RenderError::DeviceLost,
        vk::Result::ERROR_SURFACE_LOST_KHR => {
            RenderError::SurfaceUnavailable(format!("surface lost during {call}"))
        }
        other => RenderError::backend(call, other),
    }
}

pub(crate) trait VkResultExt<T> {
    fn check(self, call: &'static str) -> RenderResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    #[inline]
    fn check(self, call: &'static str) -> RenderResult<T> {
        self.map_err(|e| map_vk(call, e))
    }
}

/// Clamps to what `vkWaitForFences` and friends accept.
pub(crate) fn timeout_ns(timeout: std::time::Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

impl ToVk for Format {
    type Vk = vk::Format;
    fn to_vk(self) -> vk::Format {
        match self {
            Format::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
            Format::B8G8R8A8Srgb => vk::Format::B8G8R8A8_SRGB,
            Format::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
            Format::R8G8B8A8Srgb => vk::Format::R8G8B8A8_SRGB,
            Format::A2B10G10R10UnormPack32 => vk::Format::A2B10G10R10_UNORM_PACK32,
            Format::R16G16B16A16Sfloat => vk::Format::R16G16B16A16_SFLOAT,
            Format::D32Sfloat => vk::Format::D32_SFLOAT,
            Format::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
            Format::D32SfloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
            Format::Other(raw) => vk::Format::from_raw(raw),
        }
    }
}

impl FromVk<vk::Format> for Format {
    fn from_vk(value: vk::Format) -> Self {
        match value {
            vk::Format::B8G8R8A8_UNORM => Format::B8G8R8A8Unorm,
            vk::Format::B8G8R8A8_SRGB => Format::B8G8R8A8Srgb,
            vk::Format::R8G8B8A8_UNORM => Format::R8G8B8A8Unorm,
            vk::Format::R8G8B8A8_SRGB => Format::R8G8B8A8Srgb,
            vk::Format::A2B10G10R10_UNORM_PACK32 => Format::A2B10G10R10UnormPack32,
            vk::Format::R16G16B16A16_SFLOAT => Format::R16G16B16A16Sfloat,
            vk::Format::D32_SFLOAT => Format::D32Sfloat,
            vk::Format::D24_UNORM_S8_UINT => Format::D24UnormS8Uint,
            vk::Format::D32_SFLOAT_S8_UINT => Format::D32SfloatS8Uint,
            other => Format::Other(other.as_raw()),
        }
    }
}

impl ToVk for ColorSpace {
    type Vk = vk::ColorSpaceKHR;
    fn to_vk(self) -> vk::ColorSpaceKHR {
        match self {
            ColorSpace::SrgbNonlinear => vk::ColorSpaceKHR::SRGB_NONLINEAR,
            ColorSpace::ExtendedSrgbLinear => vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            ColorSpace::Hdr10St2084 => vk::ColorSpaceKHR::HDR10_ST2084_EXT,
            ColorSpace::Other(raw) => vk::ColorSpaceKHR::from_raw(raw),
        }
    }
}

impl FromVk<vk::ColorSpaceKHR> for ColorSpace {
    fn from_vk(value: vk::ColorSpaceKHR) -> Self {
        match value {
            vk::ColorSpaceKHR::SRGB_NONLINEAR => ColorSpace::SrgbNonlinear,
            vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT => ColorSpace::ExtendedSrgbLinear,
            vk::ColorSpaceKHR::HDR10_ST2084_EXT => ColorSpace::Hdr10St2084,
            other => ColorSpace::Other(other.as_raw()),
        }
    }
}

impl ToVk for PresentMode {
    type Vk = vk::PresentModeKHR;
    fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
            PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentMode::Fifo => vk::PresentModeKHR::FIFO,
            PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        }
    }
}

/// Shared-refresh and vendor modes have no core counterpart and are dropped.
pub(crate) fn present_mode_from_vk(mode: vk::PresentModeKHR) -> Option<PresentMode> {
    match mode {
        vk::PresentModeKHR::IMMEDIATE => Some(PresentMode::Immediate),
        vk::PresentModeKHR::MAILBOX => Some(PresentMode::Mailbox),
        vk::PresentModeKHR::FIFO => Some(PresentMode::Fifo),
        vk::PresentModeKHR::FIFO_RELAXED => Some(PresentMode::FifoRelaxed),
        _ => None,
    }
}

impl ToVk for SampleCount {
    type Vk = vk::SampleCountFlags;
    fn to_vk(self) -> vk::SampleCountFlags {
        match self {
            SampleCount::X1 => vk::SampleCountFlags::TYPE_1,
            SampleCount::X2 => vk::SampleCountFlags::TYPE_2,
            SampleCount::X4 => vk::SampleCountFlags::TYPE_4,
            SampleCount::X8 => vk::SampleCountFlags::TYPE_8,
        }
    }
}

impl ToVk for ImageLayout {
    type Vk = vk::ImageLayout;
    fn to_vk(self) -> vk::ImageLayout {
        match self {
            ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
            ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ImageLayout::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }
}

impl ToVk for LoadOp {
    type Vk = vk::AttachmentLoadOp;
    fn to_vk(self) -> vk::AttachmentLoadOp {
        match self {
            LoadOp::Load => vk::AttachmentLoadOp::LOAD,
            LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
            LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

impl ToVk for StoreOp {
    type Vk = vk::AttachmentStoreOp;
    fn to_vk(self) -> vk::AttachmentStoreOp {
        match self {
            StoreOp::Store => vk::AttachmentStoreOp::STORE,
            StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        }
    }
}

impl ToVk for ClearValue {
    type Vk = vk::ClearValue;
    fn to_vk(self) -> vk::ClearValue {
        match self {
            ClearValue::Color(rgba) => vk::ClearValue {
                color: vk::ClearColorValue { float32: rgba },
            },
            ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

impl ToVk for Filter {
    type Vk = vk::Filter;
    fn to_vk(self) -> vk::Filter {
        match self {
            Filter::Nearest => vk::Filter::NEAREST,
            Filter::Linear => vk::Filter::LINEAR,
        }
    }
}

impl ToVk for ImageUsage {
    type Vk = vk::ImageUsageFlags;
    fn to_vk(self) -> vk::ImageUsageFlags {
        let mut flags = vk::ImageUsageFlags::empty();
        if self.contains(ImageUsage::COLOR_ATTACHMENT) {
            flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
        if self.contains(ImageUsage::DEPTH_STENCIL_ATTACHMENT) {
            flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        if self.contains(ImageUsage::SAMPLED) {
            flags |= vk::ImageUsageFlags::SAMPLED;
        }
        if self.contains(ImageUsage::INPUT_ATTACHMENT) {
            flags |= vk::ImageUsageFlags::INPUT_ATTACHMENT;
        }
        if self.contains(ImageUsage::TRANSFER_SRC) {
            flags |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        flags
    }
}

impl ToVk for ShaderStages {
    type Vk = vk::ShaderStageFlags;
    fn to_vk(self) -> vk::ShaderStageFlags {
        let mut flags = vk::ShaderStageFlags::empty();
        if self.contains(ShaderStages::VERTEX) {
            flags |= vk::ShaderStageFlags::VERTEX;
        }
        if self.contains(ShaderStages::FRAGMENT) {
            flags |= vk::ShaderStageFlags::FRAGMENT;
        }
        flags
    }
}

impl ToVk for RenderSize {
    type Vk = vk::Extent2D;
    fn to_vk(self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

impl FromVk<vk::Extent2D> for RenderSize {
    fn from_vk(value: vk::Extent2D) -> Self {
        RenderSize::new(value.width, value.height)
    }
}

pub(crate) fn aspect_of(format: Format) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}
