// SPDX-License-Identifier: CEPL-1.0
//! Render passes, graphics pipelines and the on-disk pipeline cache.

use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use std::{fs, ptr};

use ash::util::read_spv;
use ash::vk;
use cadence_render::{PipelineDesc, RenderPassDesc, RenderResult, ShaderProgram};
use tracing::{debug, warn};

use crate::convert::{ToVk, VkResultExt};

const ENTRY_POINT: &CStr = c"main";

fn shader_source(program: ShaderProgram) -> (&'static [u8], &'static [u8]) {
    match program {
        ShaderProgram::Unlit => (
            include_bytes!(concat!(env!("OUT_DIR"), "/unlit.vert.spv")),
            include_bytes!(concat!(env!("OUT_DIR"), "/unlit.frag.spv")),
        ),
    }
}

unsafe fn create_shader_module(device: &ash::Device, bytes: &[u8]) -> RenderResult<vk::ShaderModule> {
    let code = read_spv(&mut Cursor::new(bytes))
        .map_err(|e| cadence_render::RenderError::backend("read_spv", e))?;
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: code.len() * 4,
        ..Default::default()
    };
    device.create_shader_module(&ci, None).check("create_shader_module")
}

pub(crate) unsafe fn create_render_pass(
    device: &ash::Device,
    desc: &RenderPassDesc,
) -> RenderResult<vk::RenderPass> {
    let attachments: Vec<vk::AttachmentDescription> = desc
        .attachments
        .iter()
        .map(|a| {
            let (stencil_load_op, stencil_store_op) = if a.format.has_stencil() {
                (a.load_op.to_vk(), a.store_op.to_vk())
            } else {
                (vk::AttachmentLoadOp::DONT_CARE, vk::AttachmentStoreOp::DONT_CARE)
            };
            vk::AttachmentDescription {
                format: a.format.to_vk(),
                samples: a.samples.to_vk(),
                load_op: a.load_op.to_vk(),
                store_op: a.store_op.to_vk(),
                stencil_load_op,
                stencil_store_op,
                initial_layout: a.initial_layout.to_vk(),
                final_layout: a.final_layout.to_vk(),
                ..Default::default()
            }
        })
        .collect();

    let reference = |attachment: u32, layout: vk::ImageLayout| vk::AttachmentReference { attachment, layout };

    // Reference arrays must outlive the subpass descriptions pointing into them.
    struct Refs {
        color: Vec<vk::AttachmentReference>,
        resolve: Vec<vk::AttachmentReference>,
        input: Vec<vk::AttachmentReference>,
        depth: Option<vk::AttachmentReference>,
    }
    let refs: Vec<Refs> = desc
        .subpasses
        .iter()
        .map(|s| Refs {
            color: s
                .color_attachments
                .iter()
                .map(|&i| reference(i, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL))
                .collect(),
            resolve: s
                .resolve_attachments
                .iter()
                .map(|&i| reference(i, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL))
                .collect(),
            input: s
                .input_attachments
                .iter()
                .map(|&i| reference(i, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL))
                .collect(),
            depth: s
                .depth_attachment
                .map(|i| reference(i, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)),
        })
        .collect();

    let subpasses: Vec<vk::SubpassDescription> = refs
        .iter()
        .map(|r| vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: r.color.len() as u32,
            p_color_attachments: r.color.as_ptr(),
            p_resolve_attachments: if r.resolve.is_empty() {
                ptr::null()
            } else {
                r.resolve.as_ptr()
            },
            input_attachment_count: r.input.len() as u32,
            p_input_attachments: r.input.as_ptr(),
            p_depth_stencil_attachment: r
                .depth
                .as_ref()
                .map_or(ptr::null(), |d| d as *const _),
            ..Default::default()
        })
        .collect();

    let attachment_stages =
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let attachment_writes =
        vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    let last = subpasses.len() as u32 - 1;
    let dependencies = [
        // The acquire semaphore is waited at color output; order the layout transition after it.
        vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: attachment_stages,
            dst_stage_mask: attachment_stages,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: attachment_writes,
            ..Default::default()
        },
        // Offscreen results are sampled by later passes.
        vk::SubpassDependency {
            src_subpass: last,
            dst_subpass: vk::SUBPASS_EXTERNAL,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
            src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access_mask: vk::AccessFlags::SHADER_READ,
            ..Default::default()
        },
    ];

    let ci = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        subpass_count: subpasses.len() as u32,
        p_subpasses: subpasses.as_ptr(),
        dependency_count: dependencies.len() as u32,
        p_dependencies: dependencies.as_ptr(),
        ..Default::default()
    };
    device.create_render_pass(&ci, None).check("create_render_pass")
}

pub(crate) unsafe fn create_graphics_pipeline(
    device: &ash::Device,
    cache: vk::PipelineCache,
    layout: vk::PipelineLayout,
    desc: &PipelineDesc,
) -> RenderResult<vk::Pipeline> {
    let (vs_bytes, fs_bytes) = shader_source(desc.program);
    let vs = create_shader_module(device, vs_bytes)?;
    let fs = match create_shader_module(device, fs_bytes) {
        Ok(fs) => fs,
        Err(e) => {
            device.destroy_shader_module(vs, None);
            return Err(e);
        }
    };

    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: ENTRY_POINT.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: ENTRY_POINT.as_ptr(),
            ..Default::default()
        },
    ];

    // Geometry comes from gl_VertexIndex; no vertex buffers.
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };
    let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dyn_states.len() as u32,
        p_dynamic_states: dyn_states.as_ptr(),
        ..Default::default()
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::NONE,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: desc.samples.to_vk(),
        ..Default::default()
    };
    let depth = if desc.depth_test { vk::TRUE } else { vk::FALSE };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: depth,
        depth_write_enable: depth,
        depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
        blend_enable: vk::FALSE,
        ..Default::default()
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: &depth_stencil,
        p_color_blend_state: &color_blend,
        p_dynamic_state: &dynamic_state,
        layout,
        render_pass: desc.render_pass.to_vk(),
        subpass: desc.subpass,
        ..Default::default()
    };

    let result = device.create_graphics_pipelines(cache, std::slice::from_ref(&pipeline_info), None);
    device.destroy_shader_module(vs, None);
    device.destroy_shader_module(fs, None);

    let pipelines = result.map_err(|(_, e)| e).check("create_graphics_pipelines")?;
    debug!("{:?} pipeline created", desc.program);
    Ok(pipelines[0])
}

/// A cache seeded from `path` when it exists; stale or foreign data is
/// rejected by the driver, not by us.
pub(crate) unsafe fn load_pipeline_cache(
    device: &ash::Device,
    path: Option<&Path>,
) -> RenderResult<vk::PipelineCache> {
    let data = path.and_then(|p| fs::read(p).ok()).unwrap_or_default();
    let ci = vk::PipelineCacheCreateInfo {
        s_type: vk::StructureType::PIPELINE_CACHE_CREATE_INFO,
        initial_data_size: data.len(),
        p_initial_data: if data.is_empty() {
            ptr::null()
        } else {
            data.as_ptr().cast()
        },
        ..Default::default()
    };
    match device.create_pipeline_cache(&ci, None) {
        Ok(cache) => Ok(cache),
        Err(e) if !data.is_empty() => {
            warn!("pipeline cache rejected ({e}); starting empty");
            load_pipeline_cache(device, None)
        }
        Err(e) => Err(crate::convert::map_vk("create_pipeline_cache", e)),
    }
}

pub(crate) unsafe fn save_pipeline_cache(device: &ash::Device, cache: vk::PipelineCache, path: &Path) {
    let bytes = match device.get_pipeline_cache_data(cache) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("pipeline cache not saved: {e}");
            return;
        }
    };
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if let Err(e) = fs::write(path, &bytes) {
        warn!("writing pipeline cache {}: {e}", path.display());
    }
}

/// `<dir>/vk_pipeline_cache_<vendor>_<device>_<uuid>.bin`, so a driver or GPU
/// change starts a fresh cache.
pub(crate) fn pipeline_cache_file(dir: &Path, props: &vk::PhysicalDeviceProperties) -> std::path::PathBuf {
    use std::fmt::Write as _;
    let mut uuid = String::with_capacity(props.pipeline_cache_uuid.len() * 2);
    for b in props.pipeline_cache_uuid {
        let _ = write!(&mut uuid, "{b:02x}");
    }
    dir.join(format!(
        "vk_pipeline_cache_{:04x}_{:04x}_{:08x}_{uuid}.bin",
        props.vendor_id, props.device_id, props.driver_version
    ))
}
