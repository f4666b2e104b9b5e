// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use cadence_core::{init_tracing, FpsCounter};
use cadence_math::{Camera, Mat4, Vec3};
use cadence_render::{
    ClearValue, CommandBufferHandle, FrameScheduler, MaterialId, MaterialSystem, RenderPass, RenderPassDesc, RenderResult,
    RenderSize, RenderTarget, UnlitMaterialSystem, UnlitParams, VsyncMode,
};
use cadence_render_vk::{VkBackend, VkOptions};
use tracing::{error, info, warn};

use cadence_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};
use cadence_platform::{SurfaceEvent, SurfaceState};

use config::{load_cfg, AppCfg};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file; missing or malformed files fall back to defaults
    #[arg(long, default_value = "cadence.toml")]
    config: PathBuf,
    /// Overrides frames.frames_in_flight
    #[arg(long)]
    frames_in_flight: Option<usize>,
    /// Exit after this many rendered frames (0 = run until closed)
    #[arg(long, default_value_t = 0)]
    max_frames: u64,
    /// Overrides materials.demo_materials
    #[arg(long)]
    materials: Option<u32>,
}

/// Everything that talks to the GPU. Fields drop top to bottom, so the
/// backend goes last.
struct Renderer {
    materials: UnlitMaterialSystem<VkBackend>,
    target: RenderTarget<VkBackend>,
    scheduler: FrameScheduler<VkBackend>,
    demo: Vec<MaterialId>,
    camera: Camera,
    started: Instant,
    cfg: AppCfg,
    backend: Arc<VkBackend>,
}

impl Renderer {
    fn new(window: &Window, cfg: AppCfg) -> Result<Self> {
        let options = VkOptions {
            app_name: "cadence".into(),
            pipeline_cache_dir: Some(PathBuf::from(".")),
            ..VkOptions::default()
        };
        let backend = Arc::new(VkBackend::new(window, window, &options).context("vulkan init")?);

        let size = window.inner_size();
        let size = RenderSize::new(size.width, size.height);
        let scheduler = FrameScheduler::new(backend.clone(), cfg.swapchain(), cfg.scheduler(), size)
            .context("frame scheduler")?;

        let format = scheduler.swapchain().format().format;
        let pass = Arc::new(
            RenderPass::new(backend.clone(), RenderPassDesc::presentable(format, None))
                .context("render pass")?,
        );
        let target = RenderTarget::for_surface(
            backend.clone(),
            pass.clone(),
            scheduler.swapchain(),
            vec![ClearValue::Color(cfg.render.clear_color)],
        )
        .context("surface render target")?;

        let mut materials =
            UnlitMaterialSystem::new(backend.clone(), cfg.descriptors()).context("materials")?;
        materials.init(&pass).context("unlit pipeline")?;
        let demo = demo_scene(&mut materials, cfg.materials.demo_materials);

        let mut camera = Camera::look_at(Vec3::new(0.0, 0.0, 6.0), Vec3::ZERO);
        let extent = scheduler.swapchain().extent();
        camera.set_viewport(extent.width, extent.height);

        info!(
            "renderer ready on {} ({} materials, {} frames in flight)",
            backend.device_name(),
            demo.len(),
            scheduler.frames_in_flight()
        );

        Ok(Renderer {
            materials,
            target,
            scheduler,
            demo,
            camera,
            started: Instant::now(),
            cfg,
            backend,
        })
    }

    /// `Ok(false)` when the frame was skipped.
    fn render(&mut self) -> RenderResult<bool> {
        let Some(frame) = self.scheduler.begin_frame()? else {
            return Ok(false);
        };

        if frame.must_rebuild_targets() {
            let swapchain = self.scheduler.swapchain();
            self.target.sync_to_surface(swapchain);
            let extent = swapchain.extent();
            self.camera.set_viewport(extent.width, extent.height);
        }

        match self.record(frame.command_buffer(), frame.image_index()) {
            Ok(true) => {
                self.scheduler.end_frame(frame)?;
                Ok(true)
            }
            Ok(false) => {
                self.scheduler.abandon_frame(frame)?;
                Ok(false)
            }
            Err(e) => {
                self.scheduler.abandon_frame(frame)?;
                Err(e)
            }
        }
    }

    /// `Ok(false)` when the target had nothing to render into.
    fn record(&mut self, cmd: CommandBufferHandle, image_index: u32) -> RenderResult<bool> {
        let t = self.started.elapsed().as_secs_f32() * 0.5;
        self.camera.eye = Vec3::new(6.0 * t.sin(), 1.5, 6.0 * t.cos());

        if !self.target.begin(cmd, image_index)? {
            return Ok(false);
        }
        for (i, id) in self.demo.iter().enumerate() {
            self.materials.draw(*id, 1 + (i % 2) as u32);
        }
        let result = self.materials.render(cmd, &self.target, &self.camera);
        self.target.end();
        result.map(|()| true)
    }

    fn focus_changed(&mut self, focused: bool) {
        if !self.cfg.render.unfocused_vsync {
            return;
        }
        if focused {
            let render = self.cfg.render;
            self.scheduler
                .set_present_policy(render.vsync, render.vsync_mode.into());
        } else {
            self.scheduler.set_present_policy(true, VsyncMode::Fifo);
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.scheduler.wait_idle() {
            warn!("wait_idle during teardown: {e}");
        }
        self.materials.destroy();
        info!("renderer down: {:?}", self.scheduler.stats());
    }
}

/// A grid of flat-coloured triangles, hue spread evenly.
fn demo_scene(materials: &mut UnlitMaterialSystem<VkBackend>, count: u32) -> Vec<MaterialId> {
    let cols = (count as f32).sqrt().ceil().max(1.0) as u32;
    (0..count)
        .map(|i| {
            let (row, col) = (i / cols, i % cols);
            let offset = Vec3::new(
                (col as f32 - cols as f32 / 2.0) * 2.5,
                (row as f32 - cols as f32 / 2.0) * 1.25,
                0.0,
            );
            let model = Mat4::from_translation(offset) * Mat4::from_scale(Vec3::splat(0.8));
            materials.add_material(UnlitParams::new(hue(i as f32 / count as f32), model))
        })
        .collect()
}

fn hue(h: f32) -> [f32; 4] {
    let channel = |shift: f32| {
        let k = (h * 6.0 + shift) % 6.0;
        1.0 - (k.min(4.0 - k).clamp(0.0, 1.0))
    };
    [channel(5.0), channel(3.0), channel(1.0), 1.0]
}

struct App {
    cfg: AppCfg,
    max_frames: u64,

    // Renderer before window: the surface must go before the window it was made from.
    renderer: Option<Renderer>,
    window: Option<Window>,
    surface: Option<SurfaceState>,

    fps: FpsCounter,
    rendered: u64,
    failure: Option<anyhow::Error>,
}

impl App {
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(surface) = &mut self.surface {
            surface.apply(SurfaceEvent::CloseRequested);
        }
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.failure = Some(err);
        self.shutdown(event_loop);
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = &mut self.renderer else { return };
        match renderer.render() {
            Ok(true) => {
                self.rendered += 1;
                if let Some(fps) = self.fps.tick() {
                    info!("fps ~ {fps:.0}");
                }
                if self.max_frames > 0 && self.rendered >= self.max_frames {
                    info!("rendered {} frames; exiting", self.rendered);
                    self.shutdown(event_loop);
                }
            }
            Ok(false) => {}
            Err(e) if e.is_fatal() => self.fail(event_loop, e.into()),
            Err(e) => error!("render error: {e}"),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let window = match event_loop
                .create_window(Window::default_attributes().with_title("cadence"))
            {
                Ok(w) => w,
                Err(e) => return self.fail(event_loop, anyhow::Error::new(e).context("create_window")),
            };
            match Renderer::new(&window, self.cfg) {
                Ok(r) => self.renderer = Some(r),
                Err(e) => return self.fail(event_loop, e),
            }
            self.surface = Some(SurfaceState::new(window.inner_size()));
            self.window = Some(window);
        }

        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if self.window.as_ref().is_some_and(|w| w.id() != window_id) {
            return;
        }
        let Some(event) = SurfaceEvent::from_window_event(&event) else {
            return;
        };
        let Some(surface) = &mut self.surface else { return };
        if surface.apply(event) && !surface.is_paused() {
            self.fps.reset();
        }

        match event {
            SurfaceEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }
            SurfaceEvent::Resized { width, height } => {
                if let Some(r) = &mut self.renderer {
                    r.scheduler.notify_resize(RenderSize::new(width, height));
                }
            }
            SurfaceEvent::Focused(focused) => {
                if let Some(r) = &mut self.renderer {
                    r.focus_changed(focused);
                }
            }
            SurfaceEvent::Occluded(_) => {}
            SurfaceEvent::RedrawRequested => {
                if !surface.is_paused() {
                    self.redraw(event_loop);
                }
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.surface.as_ref().is_some_and(|s| !s.should_continue()) {
            return;
        }
        let paused = self.surface.as_ref().map_or(true, SurfaceState::is_paused);
        event_loop.set_control_flow(ControlFlow::Wait);
        if !paused {
            if let Some(w) = &self.window {
                w.request_redraw();
            }
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut cfg = load_cfg(&args.config);
    if let Some(frames) = args.frames_in_flight {
        cfg.frames.frames_in_flight = frames;
    }
    if let Some(materials) = args.materials {
        cfg.materials.demo_materials = materials;
    }

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App {
        cfg,
        max_frames: args.max_frames,
        renderer: None,
        window: None,
        surface: None,
        fps: FpsCounter::default(),
        rendered: 0,
        failure: None,
    };
    event_loop.run_app(&mut app)?;

    match app.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
