// SPDX-License-Identifier: CEPL-1.0
//! Framebuffers bound to a render pass, rebuilt lazily on resize.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::device::{FramebufferDesc, GpuDevice, ImageDesc, PresentationSurface, RenderPassBegin};
use crate::handle::{CommandBufferHandle, FramebufferHandle, ImageHandle, ImageViewHandle};
use crate::render_pass::RenderPass;
use crate::swapchain::SurfaceSwapchain;
use crate::types::ClearValue;
use crate::{RenderError, RenderResult, RenderSize};

#[derive(Clone, Debug, PartialEq)]
pub struct RenderTargetConfig {
    pub buffer_count: u32,
    pub extent: RenderSize,
    /// One per render pass attachment.
    pub clear_values: Vec<ClearValue>,
    /// Buffer count and extent follow the swapchain; presented attachments are borrowed.
    pub surface_driven: bool,
}

impl RenderTargetConfig {
    /// Sized from the swapchain by [`RenderTarget::sync_to_surface`].
    pub fn surface(clear_values: Vec<ClearValue>) -> Self {
        RenderTargetConfig {
            buffer_count: 0,
            extent: RenderSize::ZERO,
            clear_values,
            surface_driven: true,
        }
    }

    pub fn standalone(extent: RenderSize, buffer_count: u32, clear_values: Vec<ClearValue>) -> Self {
        RenderTargetConfig {
            buffer_count,
            extent,
            clear_values,
            surface_driven: false,
        }
    }
}

struct OwnedAttachment {
    image: ImageHandle,
}

#[derive(Clone, Copy, Debug)]
struct ActivePass {
    buffer: usize,
    command_buffer: CommandBufferHandle,
}

pub struct RenderTarget<B: GpuDevice> {
    backend: Arc<B>,
    render_pass: Arc<RenderPass<B>>,
    config: RenderTargetConfig,
    dirty: bool,

    surface_views: Vec<ImageViewHandle>,
    surface_generation: u64,

    owned: Vec<OwnedAttachment>,
    framebuffers: Vec<FramebufferHandle>,
    views: Vec<Vec<ImageViewHandle>>,

    last_used: Option<usize>,
    active: Option<ActivePass>,
    rebuilds: u64,
}

impl<B: GpuDevice> RenderTarget<B> {
    pub fn new(
        backend: Arc<B>,
        render_pass: Arc<RenderPass<B>>,
        config: RenderTargetConfig,
    ) -> RenderResult<Self> {
        let attachments = render_pass.desc().attachments.len();
        if config.clear_values.len() != attachments {
            return Err(RenderError::InvalidConfig(format!(
                "{} clear values for {} attachments",
                config.clear_values.len(),
                attachments
            )));
        }
        if !config.surface_driven && config.buffer_count == 0 {
            return Err(RenderError::InvalidConfig(
                "standalone render target needs at least one buffer".into(),
            ));
        }

        Ok(RenderTarget {
            backend,
            render_pass,
            config,
            dirty: true,
            surface_views: Vec::new(),
            surface_generation: 0,
            owned: Vec::new(),
            framebuffers: Vec::new(),
            views: Vec::new(),
            last_used: None,
            active: None,
            rebuilds: 0,
        })
    }

    /// A surface-driven target already synced to `swapchain`.
    pub fn for_surface(
        backend: Arc<B>,
        render_pass: Arc<RenderPass<B>>,
        swapchain: &SurfaceSwapchain<B>,
        clear_values: Vec<ClearValue>,
    ) -> RenderResult<Self>
    where
        B: PresentationSurface,
    {
        let mut target = Self::new(backend, render_pass, RenderTargetConfig::surface(clear_values))?;
        target.sync_to_surface(swapchain);
        Ok(target)
    }

    /// Adopts the swapchain's extent, image count and image views.
    ///
    /// Marks the target dirty only if the chain actually changed since the
    /// last sync, so a spurious rebuild request costs nothing.
    pub fn sync_to_surface(&mut self, swapchain: &SurfaceSwapchain<B>)
    where
        B: PresentationSurface,
    {
        assert!(self.config.surface_driven, "sync_to_surface on a standalone target");
        assert!(self.active.is_none(), "render target resized while began");

        let generation = swapchain.generation();
        let extent = swapchain.extent();
        let count = swapchain.image_count();
        if generation == self.surface_generation
            && extent == self.config.extent
            && count == self.config.buffer_count
        {
            return;
        }
        self.surface_views = swapchain.image_views().to_vec();
        self.surface_generation = generation;
        self.config.extent = extent;
        self.config.buffer_count = count;
        self.dirty = true;
    }

    /// Deferred: the framebuffers are rebuilt by the next `begin`.
    pub fn set_extent(&mut self, extent: RenderSize) {
        if extent != self.config.extent {
            self.config.extent = extent;
            self.dirty = true;
        }
    }

    /// Deferred like [`RenderTarget::set_extent`]. Standalone targets only.
    pub fn set_buffer_count(&mut self, count: u32) {
        assert!(
            !self.config.surface_driven,
            "a surface-driven target's buffer count follows the swapchain"
        );
        assert!(count > 0, "render target needs at least one buffer");
        if count != self.config.buffer_count {
            self.config.buffer_count = count;
            self.dirty = true;
        }
    }

    /// Begins the render pass into `cmd`.
    ///
    /// Surface-driven targets render into buffer `image_index`; standalone
    /// targets ignore it and round-robin. Returns `Ok(false)` without doing
    /// anything when the extent is zero.
    ///
    /// # Panics
    ///
    /// If the target is already began.
    pub fn begin(&mut self, cmd: CommandBufferHandle, image_index: u32) -> RenderResult<bool> {
        assert!(self.active.is_none(), "RenderTarget::begin while already began");

        if self.config.extent.is_zero() {
            warn!("begin on a {} render target skipped", self.config.extent);
            return Ok(false);
        }

        if self.dirty {
            self.rebuild()?;
            self.dirty = false;
        }

        let buffer = if self.config.surface_driven {
            image_index as usize
        } else {
            self.last_used
                .map_or(0, |last| (last + 1) % self.framebuffers.len())
        };
        assert!(
            buffer < self.framebuffers.len(),
            "buffer {buffer} out of range for {} framebuffers",
            self.framebuffers.len()
        );

        self.backend.cmd_begin_render_pass(
            cmd,
            &RenderPassBegin {
                render_pass: self.render_pass.handle(),
                framebuffer: self.framebuffers[buffer],
                extent: self.config.extent,
                clear_values: &self.config.clear_values,
            },
        );
        self.last_used = Some(buffer);
        self.active = Some(ActivePass {
            buffer,
            command_buffer: cmd,
        });
        Ok(true)
    }

    /// Ends the render pass if one is open.
    pub fn end(&mut self) {
        if let Some(pass) = self.active.take() {
            self.backend.cmd_end_render_pass(pass.command_buffer);
        }
    }

    fn rebuild(&mut self) -> RenderResult<()> {
        self.release();
        let extent = self.config.extent;
        if extent.is_zero() {
            return Ok(());
        }
        if self.config.surface_driven && self.surface_views.len() != self.config.buffer_count as usize {
            return Err(RenderError::InvalidConfig(format!(
                "surface-driven target has {} borrowed views for {} buffers",
                self.surface_views.len(),
                self.config.buffer_count
            )));
        }

        let attachments = self.render_pass.desc().attachments.clone();
        for buffer in 0..self.config.buffer_count as usize {
            let mut views = Vec::with_capacity(attachments.len());
            for attachment in &attachments {
                if self.config.surface_driven && attachment.is_presented() {
                    views.push(self.surface_views[buffer]);
                    continue;
                }
                let (image, view) = self.backend.create_image(&ImageDesc {
                    format: attachment.format,
                    extent,
                    samples: attachment.samples,
                    usage: attachment.usage(),
                })?;
                self.owned.push(OwnedAttachment { image });
                views.push(view);
            }
            let framebuffer = self.backend.create_framebuffer(&FramebufferDesc {
                render_pass: self.render_pass.handle(),
                attachments: &views,
                extent,
            })?;
            self.framebuffers.push(framebuffer);
            self.views.push(views);
        }

        self.last_used = None;
        self.rebuilds += 1;
        debug!(
            "render target rebuilt ({}, {} buffers, {} owned images)",
            extent,
            self.framebuffers.len(),
            self.owned.len()
        );
        Ok(())
    }

    /// Frees framebuffers and the images this target created; borrowed
    /// swapchain views are left alone.
    fn release(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            self.backend.destroy_framebuffer(framebuffer);
        }
        for attachment in self.owned.drain(..) {
            self.backend.destroy_image(attachment.image);
        }
        self.views.clear();
    }

    pub fn extent(&self) -> RenderSize {
        self.config.extent
    }

    pub fn buffer_count(&self) -> u32 {
        self.config.buffer_count
    }

    pub fn is_surface_driven(&self) -> bool {
        self.config.surface_driven
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_began(&self) -> bool {
        self.active.is_some()
    }

    /// Buffer of the open pass, else of the last one.
    pub fn current_buffer(&self) -> Option<usize> {
        self.active.map(|p| p.buffer).or(self.last_used)
    }

    /// Attachment views of `buffer` in render pass order.
    pub fn attachment_views(&self, buffer: usize) -> &[ImageViewHandle] {
        &self.views[buffer]
    }

    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    pub fn render_pass(&self) -> &Arc<RenderPass<B>> {
        &self.render_pass
    }

    pub fn config(&self) -> &RenderTargetConfig {
        &self.config
    }
}

impl<B: GpuDevice> Drop for RenderTarget<B> {
    fn drop(&mut self) {
        self.release();
    }
}
