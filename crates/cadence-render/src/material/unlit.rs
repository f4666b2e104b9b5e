// SPDX-License-Identifier: CEPL-1.0
//! Flat-colored geometry with no textures.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use cadence_math::{Camera, Mat4};
use tracing::debug;

use super::{MaterialId, MaterialRegistry, MaterialSystem};
use crate::descriptor::{DescriptorBatchAllocator, DescriptorBatchConfig, DescriptorBatchLayout};
use crate::device::{GpuDevice, PipelineDesc, ShaderProgram};
use crate::handle::{CommandBufferHandle, PipelineHandle};
use crate::render_pass::RenderPass;
use crate::target::RenderTarget;
use crate::types::ShaderStages;
use crate::{RenderError, RenderResult};

/// The built-in unlit shader draws one triangle from `gl_VertexIndex`.
const TRIANGLE_VERTICES: u32 = 3;

/// std140 parameter block: `vec4 color; mat4 model;`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct UnlitParams {
    pub color: [f32; 4],
    pub model: [[f32; 4]; 4],
}

impl UnlitParams {
    pub fn new(color: [f32; 4], model: Mat4) -> Self {
        UnlitParams {
            color,
            model: model.to_cols_array_2d(),
        }
    }
}

impl Default for UnlitParams {
    fn default() -> Self {
        Self::new([1.0; 4], Mat4::IDENTITY)
    }
}

#[derive(Clone, Copy, Debug)]
struct Draw {
    material: MaterialId,
    instances: u32,
}

pub struct UnlitMaterialSystem<B: GpuDevice> {
    backend: Arc<B>,
    materials: MaterialRegistry<UnlitParams>,
    batch: DescriptorBatchAllocator<B>,
    pipeline: Option<PipelineHandle>,
    draws: Vec<Draw>,
}

impl<B: GpuDevice> UnlitMaterialSystem<B> {
    pub fn layout() -> DescriptorBatchLayout {
        DescriptorBatchLayout {
            parameter_block_size: std::mem::size_of::<UnlitParams>() as u64,
            resource_binding_count: 0,
        }
    }

    pub fn new(backend: Arc<B>, config: DescriptorBatchConfig) -> RenderResult<Self> {
        let batch = DescriptorBatchAllocator::new(backend.clone(), Self::layout(), config)?;
        Ok(UnlitMaterialSystem {
            backend,
            materials: MaterialRegistry::new(),
            batch,
            pipeline: None,
            draws: Vec::new(),
        })
    }

    pub fn add_material(&mut self, params: UnlitParams) -> MaterialId {
        self.materials.insert(params)
    }

    pub fn remove_material(&mut self, id: MaterialId) -> Option<UnlitParams> {
        self.draws.retain(|d| d.material != id);
        self.materials.remove(id)
    }

    pub fn set_params(&mut self, id: MaterialId, params: UnlitParams) -> bool {
        self.materials.set(id, params)
    }

    pub fn params(&self, id: MaterialId) -> Option<&UnlitParams> {
        self.materials.get(id)
    }

    /// Queues `instances` copies of the material's geometry for the next `render`.
    pub fn draw(&mut self, material: MaterialId, instances: u32) {
        if instances > 0 {
            self.draws.push(Draw {
                material,
                instances,
            });
        }
    }

    pub fn material_count(&self) -> usize {
        self.materials.live_count()
    }

    pub fn batch(&self) -> &DescriptorBatchAllocator<B> {
        &self.batch
    }

    /// Writes every parameter block that is new, changed, or invalidated by growth.
    fn upload(&mut self) -> RenderResult<()> {
        self.batch.ensure_capacity(self.materials.required_capacity())?;

        let mut written = Vec::new();
        for (id, params, dirty) in self.materials.iter() {
            if self
                .batch
                .update(id.index(), bytemuck::bytes_of(params), &[], dirty)?
            {
                written.push(id);
            }
        }
        for id in written {
            self.materials.mark_clean(id);
        }
        Ok(())
    }
}

impl<B: GpuDevice> MaterialSystem<B> for UnlitMaterialSystem<B> {
    fn init(&mut self, render_pass: &RenderPass<B>) -> RenderResult<()> {
        if let Some(old) = self.pipeline.take() {
            self.backend.destroy_pipeline(old);
        }
        let desc = render_pass.desc();
        let pipeline = self.backend.create_pipeline(&PipelineDesc {
            program: ShaderProgram::Unlit,
            render_pass: render_pass.handle(),
            subpass: 0,
            samples: desc.color_samples(0),
            depth_test: desc.has_depth(0),
            bindings: Self::layout(),
            push_constant_size: std::mem::size_of::<[[f32; 4]; 4]>() as u32,
        })?;
        self.pipeline = Some(pipeline);
        debug!("unlit pipeline created");
        Ok(())
    }

    fn render(
        &mut self,
        cmd: CommandBufferHandle,
        target: &RenderTarget<B>,
        camera: &Camera,
    ) -> RenderResult<()> {
        // The queue belongs to this frame whether or not it records.
        let draws = std::mem::take(&mut self.draws);
        let pipeline = self
            .pipeline
            .ok_or_else(|| RenderError::InvalidConfig("unlit material system not initialised".into()))?;
        debug_assert!(target.is_began(), "unlit render outside a began target");

        self.upload()?;
        if draws.is_empty() {
            return Ok(());
        }

        let view_proj = camera.view_projection().to_cols_array_2d();
        self.backend.cmd_bind_pipeline(cmd, pipeline);
        self.backend.cmd_set_viewport(cmd, target.extent());
        self.backend.cmd_push_constants(
            cmd,
            pipeline,
            ShaderStages::VERTEX,
            bytemuck::bytes_of(&view_proj),
        );

        for draw in draws {
            if !self.materials.contains(draw.material) {
                continue;
            }
            let bindings = self.batch.get(draw.material.index());
            self.backend.cmd_bind_material(cmd, pipeline, bindings);
            self.backend.cmd_draw(cmd, TRIANGLE_VERTICES, draw.instances);
        }
        Ok(())
    }

    fn destroy(&mut self) {
        self.draws.clear();
        if let Some(pipeline) = self.pipeline.take() {
            self.backend.destroy_pipeline(pipeline);
        }
    }
}

impl<B: GpuDevice> Drop for UnlitMaterialSystem<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
