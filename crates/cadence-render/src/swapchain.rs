// SPDX-License-Identifier: CEPL-1.0
//! The chain of presentable images negotiated with the display surface.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::device::{AcquireOutcome, GpuDevice, PresentationSurface, SurfaceStatus, SwapchainDesc};
use crate::handle::{ImageHandle, ImageViewHandle, SemaphoreHandle, SwapchainHandle};
use crate::types::{PresentMode, SurfaceCapabilities, SurfaceFormat};
use crate::{RenderError, RenderResult, RenderSize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VsyncMode {
    /// Locked to the display refresh.
    Fifo,
    /// Latest-image-wins, fps uncapped, no tearing.
    #[default]
    Mailbox,
}

#[derive(Clone, Copy, Debug)]
pub struct SwapchainConfig {
    pub vsync: bool,
    pub vsync_mode: VsyncMode,
    /// `None` asks for one more than the surface minimum.
    pub image_count: Option<u32>,
    pub preferred_format: SurfaceFormat,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        SwapchainConfig {
            vsync: true,
            vsync_mode: VsyncMode::Mailbox,
            image_count: None,
            preferred_format: SurfaceFormat::default(),
        }
    }
}

pub(crate) fn choose_surface_format(
    formats: &[SurfaceFormat],
    preferred: SurfaceFormat,
) -> Option<SurfaceFormat> {
    formats
        .iter()
        .copied()
        .find(|f| *f == preferred)
        .or_else(|| formats.first().copied())
}

pub(crate) fn choose_present_mode(modes: &[PresentMode], vsync: bool, mode: VsyncMode) -> PresentMode {
    let order: &[PresentMode] = if !vsync {
        &[PresentMode::Immediate, PresentMode::Mailbox, PresentMode::Fifo]
    } else {
        match mode {
            VsyncMode::Mailbox => &[PresentMode::Mailbox, PresentMode::Fifo],
            VsyncMode::Fifo => &[PresentMode::Fifo, PresentMode::Mailbox],
        }
    };
    // FIFO is the one mode every surface must support.
    order
        .iter()
        .copied()
        .find(|m| modes.contains(m))
        .unwrap_or(PresentMode::Fifo)
}

pub(crate) fn choose_image_count(caps: &SurfaceCapabilities, requested: Option<u32>) -> u32 {
    let want = requested.unwrap_or(caps.min_image_count + 1);
    let want = want.max(caps.min_image_count);
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

pub(crate) fn extent_from_caps(caps: &SurfaceCapabilities, want: RenderSize) -> RenderSize {
    match caps.current_extent {
        Some(extent) => extent,
        None => RenderSize {
            width: want.width.clamp(caps.min_extent.width, caps.max_extent.width),
            height: want.height.clamp(caps.min_extent.height, caps.max_extent.height),
        },
    }
}

/// Owns the swapchain and one view per image.
///
/// Extent and image count only change inside [`SurfaceSwapchain::rebuild`];
/// render targets borrow the views and must re-sync whenever
/// [`SurfaceSwapchain::generation`] moves.
pub struct SurfaceSwapchain<B: GpuDevice + PresentationSurface> {
    backend: Arc<B>,
    config: SwapchainConfig,
    requested: RenderSize,

    handle: SwapchainHandle,
    images: Vec<ImageHandle>,
    views: Vec<ImageViewHandle>,
    format: SurfaceFormat,
    present_mode: PresentMode,
    extent: RenderSize,
    generation: u64,
}

impl<B: GpuDevice + PresentationSurface> SurfaceSwapchain<B> {
    /// Builds the first chain. A zero-sized surface yields an empty chain
    /// that is filled by the first successful [`SurfaceSwapchain::rebuild`].
    pub fn new(backend: Arc<B>, config: SwapchainConfig, requested: RenderSize) -> RenderResult<Self> {
        let mut swapchain = SurfaceSwapchain {
            backend,
            config,
            requested,
            handle: SwapchainHandle::NULL,
            images: Vec::new(),
            views: Vec::new(),
            format: config.preferred_format,
            present_mode: PresentMode::Fifo,
            extent: RenderSize::ZERO,
            generation: 0,
        };
        swapchain.rebuild()?;
        Ok(swapchain)
    }

    /// Size the window wants; consulted only when the surface lets us choose.
    pub fn set_requested_extent(&mut self, size: RenderSize) {
        self.requested = size;
    }

    /// Returns true when the policy changed and the chain needs a rebuild.
    pub fn set_present_policy(&mut self, vsync: bool, mode: VsyncMode) -> bool {
        if self.config.vsync == vsync && self.config.vsync_mode == mode {
            return false;
        }
        self.config.vsync = vsync;
        self.config.vsync_mode = mode;
        true
    }

    /// Re-negotiates with the surface and swaps in a new chain.
    ///
    /// The caller must have drained all GPU work that touches the current
    /// chain. The old chain is retired only once the new one exists. Returns
    /// `Ok(false)` when the surface is currently zero-sized and nothing was
    /// rebuilt.
    pub fn rebuild(&mut self) -> RenderResult<bool> {
        let caps = self.backend.surface_capabilities()?;
        if caps.present_modes.is_empty() {
            return Err(RenderError::SurfaceUnavailable(
                "surface reports no present modes".into(),
            ));
        }
        let format = choose_surface_format(&caps.formats, self.config.preferred_format)
            .ok_or_else(|| RenderError::SurfaceUnavailable("surface reports no formats".into()))?;

        let extent = extent_from_caps(&caps, self.requested);
        if extent.is_zero() {
            debug!("surface is {extent}; swapchain rebuild deferred");
            return Ok(false);
        }

        let present_mode = choose_present_mode(&caps.present_modes, self.config.vsync, self.config.vsync_mode);
        let desc = SwapchainDesc {
            min_image_count: choose_image_count(&caps, self.config.image_count),
            format,
            extent,
            present_mode,
        };

        let (handle, images) = self.backend.create_swapchain(&desc, self.handle)?;
        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            match self.backend.create_image_view(image, format.format) {
                Ok(view) => views.push(view),
                Err(e) => {
                    for view in views {
                        self.backend.destroy_image_view(view);
                    }
                    self.backend.destroy_swapchain(handle);
                    return Err(e);
                }
            }
        }

        self.retire();
        self.handle = handle;
        self.images = images;
        self.views = views;
        self.format = format;
        self.present_mode = present_mode;
        self.extent = extent;
        self.generation += 1;

        info!(
            "swapchain ready ({}, {} images, {:?}, {:?}/{:?}, generation {})",
            self.extent,
            self.images.len(),
            self.present_mode,
            self.format.format,
            self.format.color_space,
            self.generation
        );
        Ok(true)
    }

    /// Requests the next image; `signal` is raised once it is safe to render into.
    pub fn acquire_image(&self, signal: SemaphoreHandle, timeout: Duration) -> RenderResult<AcquireOutcome> {
        if self.handle.is_null() {
            return Ok(AcquireOutcome::OutOfDate);
        }
        self.backend.acquire_next_image(self.handle, signal, timeout)
    }

    pub fn present(&self, image_index: u32, wait: &[SemaphoreHandle]) -> RenderResult<SurfaceStatus> {
        debug_assert!((image_index as usize) < self.images.len());
        self.backend.present(self.handle, image_index, wait)
    }

    fn retire(&mut self) {
        for view in self.views.drain(..) {
            self.backend.destroy_image_view(view);
        }
        self.images.clear();
        if !self.handle.is_null() {
            self.backend.destroy_swapchain(self.handle);
            self.handle = SwapchainHandle::NULL;
        }
    }

    pub fn handle(&self) -> SwapchainHandle {
        self.handle
    }

    pub fn extent(&self) -> RenderSize {
        self.extent
    }

    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    pub fn images(&self) -> &[ImageHandle] {
        &self.images
    }

    pub fn image_views(&self) -> &[ImageViewHandle] {
        &self.views
    }

    pub fn format(&self) -> SurfaceFormat {
        self.format
    }

    pub fn present_mode(&self) -> PresentMode {
        self.present_mode
    }

    /// Incremented by every successful rebuild; `0` means no chain yet.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &SwapchainConfig {
        &self.config
    }
}

impl<B: GpuDevice + PresentationSurface> Drop for SurfaceSwapchain<B> {
    fn drop(&mut self) {
        self.retire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColorSpace, Format};

    fn caps(min: u32, max: u32) -> SurfaceCapabilities {
        SurfaceCapabilities {
            min_image_count: min,
            max_image_count: max,
            current_extent: None,
            min_extent: RenderSize::new(1, 1),
            max_extent: RenderSize::new(4096, 4096),
            formats: vec![],
            present_modes: vec![PresentMode::Fifo],
        }
    }

    #[test]
    fn image_count_is_clamped_into_surface_range() {
        assert_eq!(choose_image_count(&caps(2, 3), None), 3);
        assert_eq!(choose_image_count(&caps(2, 3), Some(8)), 3);
        assert_eq!(choose_image_count(&caps(2, 3), Some(1)), 2);
        assert_eq!(choose_image_count(&caps(2, 0), Some(8)), 8);
        assert_eq!(choose_image_count(&caps(3, 3), None), 3);
    }

    #[test]
    fn surface_extent_wins_unless_window_decides() {
        let mut c = caps(2, 3);
        assert_eq!(
            extent_from_caps(&c, RenderSize::new(9000, 0)),
            RenderSize::new(4096, 1)
        );
        c.current_extent = Some(RenderSize::new(640, 480));
        assert_eq!(
            extent_from_caps(&c, RenderSize::new(800, 600)),
            RenderSize::new(640, 480)
        );
    }

    #[test]
    fn present_mode_follows_vsync_policy() {
        let all = [PresentMode::Immediate, PresentMode::Mailbox, PresentMode::Fifo];
        assert_eq!(choose_present_mode(&all, false, VsyncMode::Fifo), PresentMode::Immediate);
        assert_eq!(choose_present_mode(&all, true, VsyncMode::Mailbox), PresentMode::Mailbox);
        assert_eq!(choose_present_mode(&all, true, VsyncMode::Fifo), PresentMode::Fifo);
        let fifo_only = [PresentMode::Fifo];
        assert_eq!(choose_present_mode(&fifo_only, false, VsyncMode::Mailbox), PresentMode::Fifo);
        assert_eq!(choose_present_mode(&fifo_only, true, VsyncMode::Mailbox), PresentMode::Fifo);
    }

    #[test]
    fn preferred_surface_format_or_first() {
        let srgb = SurfaceFormat {
            format: Format::B8G8R8A8Srgb,
            color_space: ColorSpace::SrgbNonlinear,
        };
        assert_eq!(
            choose_surface_format(&[srgb, SurfaceFormat::default()], SurfaceFormat::default()),
            Some(SurfaceFormat::default())
        );
        assert_eq!(choose_surface_format(&[srgb], SurfaceFormat::default()), Some(srgb));
        assert_eq!(choose_surface_format(&[], SurfaceFormat::default()), None);
    }
}
