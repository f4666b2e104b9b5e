// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use crate::device::GpuDevice;
use crate::handle::RenderPassHandle;
use crate::types::{Format, ImageLayout, ImageUsage, LoadOp, SampleCount, StoreOp};
use crate::{RenderError, RenderResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttachmentDesc {
    pub format: Format,
    pub samples: SampleCount,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub initial_layout: ImageLayout,
    pub final_layout: ImageLayout,
}

impl AttachmentDesc {
    pub fn color(format: Format, final_layout: ImageLayout) -> Self {
        AttachmentDesc {
            format,
            samples: SampleCount::X1,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
            initial_layout: ImageLayout::Undefined,
            final_layout,
        }
    }

    pub fn depth(format: Format) -> Self {
        AttachmentDesc {
            format,
            samples: SampleCount::X1,
            load_op: LoadOp::Clear,
            store_op: StoreOp::DontCare,
            initial_layout: ImageLayout::Undefined,
            final_layout: ImageLayout::DepthStencilAttachment,
        }
    }

    /// Single-sampled and handed to the presentation engine: this is the swapchain image.
    pub fn is_presented(&self) -> bool {
        self.final_layout == ImageLayout::PresentSrc && self.samples == SampleCount::X1
    }

    pub fn usage(&self) -> ImageUsage {
        let mut usage = if self.format.is_depth() {
            ImageUsage::DEPTH_STENCIL_ATTACHMENT
        } else {
            ImageUsage::COLOR_ATTACHMENT
        };
        match self.final_layout {
            ImageLayout::ShaderReadOnly => usage |= ImageUsage::SAMPLED,
            ImageLayout::TransferSrc => usage |= ImageUsage::TRANSFER_SRC,
            _ => {}
        }
        usage
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SubpassDesc {
    pub color_attachments: Vec<u32>,
    pub depth_attachment: Option<u32>,
    /// Either empty or one entry per color attachment.
    pub resolve_attachments: Vec<u32>,
    pub input_attachments: Vec<u32>,
}

/// Ordered attachments plus the subpasses that use them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RenderPassDesc {
    pub attachments: Vec<AttachmentDesc>,
    pub subpasses: Vec<SubpassDesc>,
}

impl RenderPassDesc {
    /// One subpass writing a presented color attachment and an optional depth buffer.
    pub fn presentable(color: Format, depth: Option<Format>) -> Self {
        let mut attachments = vec![AttachmentDesc::color(color, ImageLayout::PresentSrc)];
        let depth_attachment = depth.map(|format| {
            attachments.push(AttachmentDesc::depth(format));
            1
        });
        RenderPassDesc {
            attachments,
            subpasses: vec![SubpassDesc {
                color_attachments: vec![0],
                depth_attachment,
                ..Default::default()
            }],
        }
    }

    /// One subpass rendering into a color image that is sampled afterwards.
    pub fn offscreen(color: Format, depth: Option<Format>) -> Self {
        let mut desc = Self::presentable(color, depth);
        desc.attachments[0].final_layout = ImageLayout::ShaderReadOnly;
        desc
    }

    pub fn validate(&self) -> RenderResult<()> {
        if self.subpasses.is_empty() {
            return Err(RenderError::InvalidConfig(
                "render pass needs at least one subpass".into(),
            ));
        }
        let count = self.attachments.len() as u32;
        for (i, subpass) in self.subpasses.iter().enumerate() {
            let refs = subpass
                .color_attachments
                .iter()
                .chain(subpass.depth_attachment.iter())
                .chain(subpass.resolve_attachments.iter())
                .chain(subpass.input_attachments.iter());
            for &a in refs {
                if a >= count {
                    return Err(RenderError::InvalidConfig(format!(
                        "subpass {i} references attachment {a} of {count}"
                    )));
                }
            }
            if let Some(d) = subpass.depth_attachment {
                if !self.attachments[d as usize].format.is_depth() {
                    return Err(RenderError::InvalidConfig(format!(
                        "subpass {i} depth attachment {d} has a color format"
                    )));
                }
            }
            if !subpass.resolve_attachments.is_empty()
                && subpass.resolve_attachments.len() != subpass.color_attachments.len()
            {
                return Err(RenderError::InvalidConfig(format!(
                    "subpass {i} has {} resolve attachments for {} color attachments",
                    subpass.resolve_attachments.len(),
                    subpass.color_attachments.len()
                )));
            }
        }
        Ok(())
    }

    /// Sample count of the first subpass's color output, used for pipelines.
    pub fn color_samples(&self, subpass: usize) -> SampleCount {
        self.subpasses
            .get(subpass)
            .and_then(|s| s.color_attachments.first())
            .map(|&a| self.attachments[a as usize].samples)
            .unwrap_or_default()
    }

    pub fn has_depth(&self, subpass: usize) -> bool {
        self.subpasses
            .get(subpass)
            .is_some_and(|s| s.depth_attachment.is_some())
    }
}

/// A render pass created on the GPU from its description.
pub struct RenderPass<B: GpuDevice> {
    backend: Arc<B>,
    desc: RenderPassDesc,
    handle: RenderPassHandle,
}

impl<B: GpuDevice> RenderPass<B> {
    pub fn new(backend: Arc<B>, desc: RenderPassDesc) -> RenderResult<Self> {
        desc.validate()?;
        let handle = backend.create_render_pass(&desc)?;
        Ok(RenderPass {
            backend,
            desc,
            handle,
        })
    }

    #[inline]
    pub fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }

    #[inline]
    pub fn handle(&self) -> RenderPassHandle {
        self.handle
    }
}

impl<B: GpuDevice> Drop for RenderPass<B> {
    fn drop(&mut self) {
        self.backend.destroy_render_pass(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presentable_pass_marks_the_swapchain_attachment() {
        let desc = RenderPassDesc::presentable(Format::B8G8R8A8Unorm, Some(Format::D32Sfloat));
        assert!(desc.validate().is_ok());
        assert!(desc.attachments[0].is_presented());
        assert!(!desc.attachments[1].is_presented());
        assert_eq!(desc.attachments[1].usage(), ImageUsage::DEPTH_STENCIL_ATTACHMENT);
        assert!(desc.has_depth(0));
    }

    #[test]
    fn multisampled_present_layout_is_not_the_swapchain_image() {
        let mut att = AttachmentDesc::color(Format::B8G8R8A8Unorm, ImageLayout::PresentSrc);
        att.samples = SampleCount::X4;
        assert!(!att.is_presented());
    }

    #[test]
    fn offscreen_color_is_sampled() {
        let desc = RenderPassDesc::offscreen(Format::R16G16B16A16Sfloat, None);
        assert!(!desc.attachments[0].is_presented());
        assert!(desc.attachments[0].usage().contains(ImageUsage::SAMPLED));
    }

    #[test]
    fn out_of_range_references_are_rejected() {
        let mut desc = RenderPassDesc::presentable(Format::B8G8R8A8Unorm, None);
        desc.subpasses[0].depth_attachment = Some(3);
        assert!(matches!(desc.validate(), Err(RenderError::InvalidConfig(_))));

        let mut desc = RenderPassDesc::presentable(Format::B8G8R8A8Unorm, None);
        desc.subpasses.clear();
        assert!(desc.validate().is_err());
    }
}
