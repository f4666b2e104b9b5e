// SPDX-License-Identifier: CEPL-1.0
//! Window-system glue. Re-exports `winit` so the app depends on one version,
//! and folds window events into the few facts the renderer acts on.

pub use winit;

use tracing::info;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceEvent {
    Resized { width: u32, height: u32 },
    Occluded(bool),
    Focused(bool),
    RedrawRequested,
    CloseRequested,
}

impl SurfaceEvent {
    pub fn from_window_event(event: &WindowEvent) -> Option<Self> {
        Some(match event {
            WindowEvent::Resized(size) => SurfaceEvent::Resized {
                width: size.width,
                height: size.height,
            },
            WindowEvent::Occluded(occluded) => SurfaceEvent::Occluded(*occluded),
            WindowEvent::Focused(focused) => SurfaceEvent::Focused(*focused),
            WindowEvent::RedrawRequested => SurfaceEvent::RedrawRequested,
            WindowEvent::CloseRequested | WindowEvent::Destroyed => SurfaceEvent::CloseRequested,
            _ => return None,
        })
    }
}

/// Whether the window can be rendered to right now.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceState {
    width: u32,
    height: u32,
    occluded: bool,
    focused: bool,
    closing: bool,
}

impl SurfaceState {
    pub fn new(size: PhysicalSize<u32>) -> Self {
        SurfaceState {
            width: size.width,
            height: size.height,
            occluded: false,
            focused: true,
            closing: false,
        }
    }

    /// Folds `event` in. Returns true when the paused state flipped.
    pub fn apply(&mut self, event: SurfaceEvent) -> bool {
        let was_paused = self.is_paused();
        match event {
            SurfaceEvent::Resized { width, height } => {
                self.width = width;
                self.height = height;
            }
            SurfaceEvent::Occluded(occluded) => self.occluded = occluded,
            SurfaceEvent::Focused(focused) => self.focused = focused,
            SurfaceEvent::CloseRequested => self.closing = true,
            SurfaceEvent::RedrawRequested => {}
        }

        let paused = self.is_paused();
        if paused != was_paused {
            info!(
                "surface {}x{} occluded={} → paused={}",
                self.width, self.height, self.occluded, paused
            );
        }
        paused != was_paused
    }

    /// Minimized, occluded or closing windows are not drawn.
    pub fn is_paused(&self) -> bool {
        self.closing || self.occluded || self.width == 0 || self.height == 0
    }

    pub fn should_continue(&self) -> bool {
        !self.closing
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
