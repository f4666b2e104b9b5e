// SPDX-License-Identifier: CEPL-1.0
//! Vulkan implementation of [`cadence_render::GpuDevice`] and
//! [`cadence_render::PresentationSurface`].
//!
//! Core handles are the raw Vulkan handles. Memory behind images and
//! buffers, and the layouts behind pipelines, are tracked here so the core
//! never sees them.

mod convert;
mod debug;
mod device;
mod memory;
mod pipeline;
mod surface;

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Context, Result};
use ash::khr::{surface as khr_surface, swapchain as khr_swapchain};
use ash::{vk, Entry, Instance};
use cadence_render::DescriptorBatchLayout;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{info, warn};

use crate::debug::DebugMessenger;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Clone, Debug)]
pub struct VkOptions {
    pub app_name: String,
    /// Enables the Khronos validation layer when it is installed.
    pub validation: bool,
    /// Where the pipeline cache is persisted between runs; `None` keeps it in memory.
    pub pipeline_cache_dir: Option<PathBuf>,
}

impl Default for VkOptions {
    fn default() -> Self {
        VkOptions {
            app_name: "cadence".into(),
            validation: cfg!(debug_assertions),
            pipeline_cache_dir: None,
        }
    }
}

struct OwnedImage {
    memory: vk::DeviceMemory,
    view: vk::ImageView,
}

#[derive(Clone, Copy)]
struct SetLayouts {
    parameters: vk::DescriptorSetLayout,
    resources: Option<vk::DescriptorSetLayout>,
}

#[derive(Default)]
struct Objects {
    images: HashMap<vk::Image, OwnedImage>,
    buffers: HashMap<vk::Buffer, vk::DeviceMemory>,
    set_layouts: HashMap<DescriptorBatchLayout, SetLayouts>,
    pipeline_layouts: HashMap<(DescriptorBatchLayout, u32), vk::PipelineLayout>,
    pipelines: HashMap<vk::Pipeline, vk::PipelineLayout>,
}

pub struct VkBackend {
    _entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,
    surface_loader: khr_surface::Instance,
    surface: vk::SurfaceKHR,

    phys: vk::PhysicalDevice,
    memory_props: vk::PhysicalDeviceMemoryProperties,
    device: ash::Device,
    queue_family: u32,
    queue: vk::Queue,
    swapchain_loader: khr_swapchain::Device,

    pipeline_cache: vk::PipelineCache,
    cache_path: Option<PathBuf>,
    objects: Mutex<Objects>,
}

impl VkBackend {
    /// Creates instance, surface and device for `window`.
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        options: &VkOptions,
    ) -> Result<Self> {
        unsafe { build_backend(window, display, options) }
    }

    pub fn device_name(&self) -> String {
        let props = unsafe { self.instance.get_physical_device_properties(self.phys) };
        unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    fn objects(&self) -> MutexGuard<'_, Objects> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    options: &VkOptions,
) -> Result<(Instance, bool)> {
    let app_name = CString::new(options.app_name.as_str()).context("application name")?;

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app_name.as_ptr(),
        application_version: 0,
        p_engine_name: c"cadence".as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut extensions = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();

    let validation = options.validation
        && entry
            .enumerate_instance_layer_properties()
            .unwrap_or_default()
            .iter()
            .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == VALIDATION_LAYER);
    if options.validation && !validation {
        warn!("validation requested but {VALIDATION_LAYER:?} is not installed");
    }
    if validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    let layers = [VALIDATION_LAYER.as_ptr()];

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: if validation { layers.len() as u32 } else { 0 },
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    let instance = entry
        .create_instance(&create_info, None)
        .context("create_instance")?;
    Ok((instance, validation))
}

/// First graphics queue family that can present to `surface`, preferring discrete GPUs.
unsafe fn pick_device_and_queue(
    instance: &Instance,
    surface_loader: &khr_surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32)> {
    let mut fallback = None;
    for phys in instance.enumerate_physical_devices()? {
        let qprops = instance.get_physical_device_queue_family_properties(phys);
        let family = qprops.iter().enumerate().position(|(i, q)| {
            q.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && surface_loader
                    .get_physical_device_surface_support(phys, i as u32, surface)
                    .unwrap_or(false)
        });
        let Some(family) = family else { continue };

        let discrete = instance.get_physical_device_properties(phys).device_type
            == vk::PhysicalDeviceType::DISCRETE_GPU;
        if discrete {
            return Ok((phys, family as u32));
        }
        fallback.get_or_insert((phys, family as u32));
    }
    fallback.ok_or_else(|| anyhow!("no suitable physical device/queue family"))
}

unsafe fn create_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<(ash::Device, vk::Queue)> {
    let priorities = [1.0_f32];
    let qinfo = vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: queue_family,
        queue_count: 1,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
    };

    let device_exts = [khr_swapchain::NAME.as_ptr()];
    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: 1,
        p_queue_create_infos: &qinfo,
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        ..Default::default()
    };

    let device = instance
        .create_device(phys, &dinfo, None)
        .context("create_device")?;
    let queue = device.get_device_queue(queue_family, 0);
    Ok((device, queue))
}

unsafe fn build_backend(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    options: &VkOptions,
) -> Result<VkBackend> {
    // Instance, then a surface from it, then a device that can present to that surface.
    let entry = Entry::linked();
    let dh = display.display_handle()?.as_raw();
    let wh = window.window_handle()?.as_raw();

    let (instance, validation) = create_instance(&entry, dh, options)?;
    let debug = if validation {
        Some(DebugMessenger::new(&entry, &instance)?)
    } else {
        None
    };

    let surface_loader = khr_surface::Instance::new(&entry, &instance);
    let surface = ash_window::create_surface(&entry, &instance, dh, wh, None)
        .context("ash_window::create_surface")?;

    let (phys, queue_family) = pick_device_and_queue(&instance, &surface_loader, surface)?;
    let (device, queue) = create_device(&instance, phys, queue_family)?;
    let swapchain_loader = khr_swapchain::Device::new(&instance, &device);
    let memory_props = instance.get_physical_device_memory_properties(phys);

    let props = instance.get_physical_device_properties(phys);
    let cache_path = options
        .pipeline_cache_dir
        .as_deref()
        .map(|dir| pipeline::pipeline_cache_file(dir, &props));
    let pipeline_cache =
        pipeline::load_pipeline_cache(&device, cache_path.as_deref()).context("pipeline cache")?;

    let backend = VkBackend {
        _entry: entry,
        instance,
        debug,
        surface_loader,
        surface,
        phys,
        memory_props,
        device,
        queue_family,
        queue,
        swapchain_loader,
        pipeline_cache,
        cache_path,
        objects: Mutex::new(Objects::default()),
    };
    info!(
        "Vulkan device ready ({}, queue family {}, validation {})",
        backend.device_name(),
        queue_family,
        validation
    );
    Ok(backend)
}

// Teardown order: idle the device, then everything created from it, then
// the device, then the surface, then the instance.
impl Drop for VkBackend {
    fn drop(&mut self) {
        unsafe {
            let d = &self.device;
            d.device_wait_idle().ok();

            let objects = self.objects.get_mut().unwrap_or_else(PoisonError::into_inner);
            if !objects.images.is_empty() || !objects.buffers.is_empty() {
                warn!(
                    "{} images and {} buffers still alive at device teardown",
                    objects.images.len(),
                    objects.buffers.len()
                );
            }
            for (image, owned) in objects.images.drain() {
                d.destroy_image_view(owned.view, None);
                d.destroy_image(image, None);
                d.free_memory(owned.memory, None);
            }
            for (buffer, memory) in objects.buffers.drain() {
                d.destroy_buffer(buffer, None);
                d.free_memory(memory, None);
            }
            for (pipeline, _) in objects.pipelines.drain() {
                d.destroy_pipeline(pipeline, None);
            }
            for (_, layout) in objects.pipeline_layouts.drain() {
                d.destroy_pipeline_layout(layout, None);
            }
            for (_, sets) in objects.set_layouts.drain() {
                d.destroy_descriptor_set_layout(sets.parameters, None);
                if let Some(resources) = sets.resources {
                    d.destroy_descriptor_set_layout(resources, None);
                }
            }

            if let Some(path) = &self.cache_path {
                pipeline::save_pipeline_cache(d, self.pipeline_cache, path);
            }
            d.destroy_pipeline_cache(self.pipeline_cache, None);

            d.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some(debug) = &self.debug {
                debug.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}
