// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::Path;
use std::time::Duration;

use cadence_render::{
    DescriptorBatchConfig, SchedulerConfig, SwapchainConfig, VsyncMode, MAX_FRAMES_IN_FLIGHT,
};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RenderCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default = "default_true")]
    pub vsync: bool,
    #[serde(default)]
    pub vsync_mode: VsyncModeCfg,
    /// Swapchain images to ask for; 0 lets the surface decide.
    #[serde(default)]
    pub image_count: u32,
    /// Drop to FIFO while the window is unfocused.
    #[serde(default = "default_true")]
    pub unfocused_vsync: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VsyncModeCfg {
    Fifo,
    #[default]
    Mailbox,
}

impl From<VsyncModeCfg> for VsyncMode {
    fn from(mode: VsyncModeCfg) -> Self {
        match mode {
            VsyncModeCfg::Fifo => VsyncMode::Fifo,
            VsyncModeCfg::Mailbox => VsyncMode::Mailbox,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct FrameCfg {
    pub frames_in_flight: usize,
    pub fence_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct MaterialCfg {
    pub base_batch: u32,
    pub ceiling: u32,
    /// Materials the demo scene starts with.
    pub demo_materials: u32,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
pub struct AppCfg {
    #[serde(default)]
    pub render: RenderCfg,
    #[serde(default)]
    pub frames: FrameCfg,
    #[serde(default)]
    pub materials: MaterialCfg,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            vsync: true,
            vsync_mode: VsyncModeCfg::Mailbox,
            image_count: 0,
            unfocused_vsync: true,
        }
    }
}

impl Default for FrameCfg {
    fn default() -> Self {
        let defaults = SchedulerConfig::default();
        FrameCfg {
            frames_in_flight: defaults.frames_in_flight,
            fence_timeout_ms: defaults.fence_timeout.as_millis() as u64,
            acquire_timeout_ms: defaults.acquire_timeout.as_millis() as u64,
        }
    }
}

impl Default for MaterialCfg {
    fn default() -> Self {
        let defaults = DescriptorBatchConfig::default();
        MaterialCfg {
            base_batch: defaults.base_capacity,
            ceiling: defaults.ceiling,
            demo_materials: 8,
        }
    }
}

fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}
fn default_true() -> bool {
    true
}

impl AppCfg {
    pub fn swapchain(&self) -> SwapchainConfig {
        SwapchainConfig {
            vsync: self.render.vsync,
            vsync_mode: self.render.vsync_mode.into(),
            image_count: (self.render.image_count > 0).then_some(self.render.image_count),
            ..SwapchainConfig::default()
        }
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        let frames = self.frames.frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT);
        if frames != self.frames.frames_in_flight {
            warn!(
                "frames_in_flight {} clamped to {frames}",
                self.frames.frames_in_flight
            );
        }
        SchedulerConfig {
            frames_in_flight: frames,
            fence_timeout: Duration::from_millis(self.frames.fence_timeout_ms.max(1)),
            acquire_timeout: Duration::from_millis(self.frames.acquire_timeout_ms.max(1)),
        }
    }

    pub fn descriptors(&self) -> DescriptorBatchConfig {
        DescriptorBatchConfig {
            base_capacity: self.materials.base_batch,
            ceiling: self.materials.ceiling,
        }
    }
}

pub fn parse_cfg(text: &str) -> AppCfg {
    toml::from_str::<AppCfg>(text).unwrap_or_else(|e| {
        warn!("config ignored: {e}");
        AppCfg::default()
    })
}

pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => parse_cfg(&s),
        Err(e) => {
            debug!("{}: {e}; using defaults", path.display());
            AppCfg::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_take_defaults() {
        let cfg = parse_cfg(
            r#"
            [render]
            vsync_mode = "fifo"

            [frames]
            frames_in_flight = 3
            "#,
        );
        assert_eq!(cfg.render.vsync_mode, VsyncModeCfg::Fifo);
        assert!(cfg.render.vsync);
        assert_eq!(cfg.render.clear_color, default_clear());
        assert_eq!(cfg.frames.frames_in_flight, 3);
        assert_eq!(cfg.frames.fence_timeout_ms, 2000);
        assert_eq!(cfg.materials.base_batch, 16);
        assert_eq!(cfg.materials.ceiling, 4096);
    }

    #[test]
    fn malformed_file_falls_back() {
        let cfg = parse_cfg("[frames]\nframes_in_flight = \"lots\"");
        assert_eq!(cfg.frames.frames_in_flight, 2);
    }

    #[test]
    fn frames_in_flight_is_clamped() {
        let mut cfg = AppCfg::default();
        cfg.frames.frames_in_flight = 0;
        assert_eq!(cfg.scheduler().frames_in_flight, 1);
        cfg.frames.frames_in_flight = 99;
        assert_eq!(cfg.scheduler().frames_in_flight, MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn zero_image_count_means_auto() {
        let mut cfg = AppCfg::default();
        assert_eq!(cfg.swapchain().image_count, None);
        cfg.render.image_count = 3;
        assert_eq!(cfg.swapchain().image_count, Some(3));
        assert_eq!(cfg.swapchain().vsync_mode, VsyncMode::Mailbox);
    }
}
