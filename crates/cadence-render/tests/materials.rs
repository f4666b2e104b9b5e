// SPDX-License-Identifier: CEPL-1.0
mod common;

use std::sync::Arc;

use cadence_math::{Camera, Mat4, Vec3};
use cadence_render::*;
use common::*;

const CMD: CommandBufferHandle = CommandBufferHandle::from_raw(42);

struct Scene {
    gpu: Arc<MockGpu>,
    pass: Arc<RenderPass<MockGpu>>,
    target: RenderTarget<MockGpu>,
    camera: Camera,
}

fn scene() -> Scene {
    let gpu = MockGpu::new(WINDOW, 3);
    let pass = Arc::new(
        RenderPass::new(gpu.clone(), RenderPassDesc::offscreen(Format::R8G8B8A8Unorm, None)).unwrap(),
    );
    let config = RenderTargetConfig::standalone(RenderSize::new(320, 240), 2, clear_values(false));
    let target = RenderTarget::new(gpu.clone(), pass.clone(), config).unwrap();
    let mut camera = Camera::default();
    camera.set_viewport(320, 240);
    Scene {
        gpu,
        pass,
        target,
        camera,
    }
}

fn tinted(i: usize) -> UnlitParams {
    UnlitParams::new(
        [i as f32 / 16.0, 0.5, 0.25, 1.0],
        Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0)),
    )
}

fn render(scene: &mut Scene, system: &mut UnlitMaterialSystem<MockGpu>) -> RenderResult<()> {
    assert!(scene.target.begin(CMD, 0)?);
    let result = system.render(CMD, &scene.target, &scene.camera);
    scene.target.end();
    result
}

#[test]
fn seventeenth_material_grows_batch_keeping_indices() {
    let mut scene = scene();
    let mut system = UnlitMaterialSystem::new(scene.gpu.clone(), DescriptorBatchConfig::default()).unwrap();
    system.init(&scene.pass).unwrap();

    let ids: Vec<_> = (0..16).map(|i| system.add_material(tinted(i))).collect();
    for &id in &ids {
        system.draw(id, 1);
    }
    render(&mut scene, &mut system).unwrap();
    assert_eq!(system.batch().capacity(), 16);
    let bindings: Vec<_> = ids.iter().map(|id| system.batch().get(id.index())).collect();

    let seventeenth = system.add_material(tinted(16));
    assert_eq!(seventeenth.index(), 16);
    system.draw(seventeenth, 2);
    render(&mut scene, &mut system).unwrap();

    assert_eq!(system.batch().capacity(), 32);
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(id.index(), i as u32);
        assert_eq!(system.batch().get(id.index()), bindings[i]);
    }

    let s = scene.gpu.state();
    // Growth forces a rewrite of every live material.
    for binding in &bindings {
        assert_eq!(s.binding_updates[binding], 2);
    }
    let buffer = system.batch().parameter_buffer(seventeenth.index());
    assert_eq!(s.buffers[&buffer.as_raw()], bytemuck::bytes_of(&tinted(16)));
    assert_eq!(
        s.recorded.last(),
        Some(&Recorded::Draw {
            vertices: 3,
            instances: 2
        })
    );
}

#[test]
fn render_records_pipeline_camera_and_draws() {
    let mut scene = scene();
    let mut system = UnlitMaterialSystem::new(scene.gpu.clone(), DescriptorBatchConfig::default()).unwrap();
    system.init(&scene.pass).unwrap();
    let red = system.add_material(tinted(1));
    let blue = system.add_material(tinted(2));
    system.draw(red, 1);
    system.draw(blue, 4);
    system.draw(red, 0);
    render(&mut scene, &mut system).unwrap();

    let s = scene.gpu.state();
    let pipeline = *s.pipelines.iter().next().unwrap();
    let recorded: Vec<_> = s
        .recorded
        .iter()
        .filter(|r| !matches!(r, Recorded::BeginRenderPass { .. } | Recorded::EndRenderPass))
        .cloned()
        .collect();
    assert_eq!(
        recorded,
        [
            Recorded::BindPipeline(PipelineHandle::from_raw(pipeline)),
            Recorded::SetViewport(RenderSize::new(320, 240)),
            Recorded::PushConstants(64),
            Recorded::BindMaterial(system.batch().get(red.index())),
            Recorded::Draw {
                vertices: 3,
                instances: 1
            },
            Recorded::BindMaterial(system.batch().get(blue.index())),
            Recorded::Draw {
                vertices: 3,
                instances: 4
            },
        ]
    );
}

#[test]
fn only_changed_materials_are_rewritten() {
    let mut scene = scene();
    let mut system = UnlitMaterialSystem::new(scene.gpu.clone(), DescriptorBatchConfig::default()).unwrap();
    system.init(&scene.pass).unwrap();
    let a = system.add_material(tinted(1));
    let b = system.add_material(tinted(2));
    render(&mut scene, &mut system).unwrap();

    assert!(system.set_params(b, tinted(7)));
    render(&mut scene, &mut system).unwrap();
    render(&mut scene, &mut system).unwrap();

    let s = scene.gpu.state();
    assert_eq!(s.binding_updates[&system.batch().get(a.index())], 1);
    assert_eq!(s.binding_updates[&system.batch().get(b.index())], 2);
    assert_eq!(system.params(b), Some(&tinted(7)));
}

#[test]
fn removed_material_index_is_reused_and_skipped() {
    let mut scene = scene();
    let mut system = UnlitMaterialSystem::new(scene.gpu.clone(), DescriptorBatchConfig::default()).unwrap();
    system.init(&scene.pass).unwrap();
    let a = system.add_material(tinted(1));
    let b = system.add_material(tinted(2));
    system.draw(a, 1);
    system.draw(b, 1);

    assert!(system.remove_material(a).is_some());
    assert_eq!(system.material_count(), 1);
    render(&mut scene, &mut system).unwrap();
    let draws = scene
        .gpu
        .state()
        .recorded
        .iter()
        .filter(|r| matches!(r, Recorded::Draw { .. }))
        .count();
    assert_eq!(draws, 1);

    let c = system.add_material(tinted(3));
    assert_eq!(c.index(), a.index());
}

#[test]
fn render_before_init_is_an_error() {
    let mut scene = scene();
    let mut system = UnlitMaterialSystem::new(scene.gpu.clone(), DescriptorBatchConfig::default()).unwrap();
    let id = system.add_material(tinted(0));
    system.draw(id, 1);
    assert!(matches!(
        render(&mut scene, &mut system),
        Err(RenderError::InvalidConfig(_))
    ));
}

#[test]
fn too_many_materials_reports_capacity() {
    let mut scene = scene();
    let config = DescriptorBatchConfig {
        base_capacity: 4,
        ceiling: 8,
    };
    let mut system = UnlitMaterialSystem::new(scene.gpu.clone(), config).unwrap();
    system.init(&scene.pass).unwrap();
    for i in 0..9 {
        system.add_material(tinted(i));
    }
    assert!(matches!(
        render(&mut scene, &mut system),
        Err(RenderError::CapacityExceeded { required: 9, ceiling: 8 })
    ));
    assert_eq!(system.batch().capacity(), 4);
}

#[test]
fn failed_render_drops_its_queued_draws() {
    let mut scene = scene();
    let config = DescriptorBatchConfig {
        base_capacity: 4,
        ..DescriptorBatchConfig::default()
    };
    let mut system = UnlitMaterialSystem::new(scene.gpu.clone(), config).unwrap();
    system.init(&scene.pass).unwrap();
    let ids: Vec<_> = (0..5).map(|i| system.add_material(tinted(i))).collect();

    scene.gpu.state().buffer_budget = Some(0);
    for &id in &ids {
        system.draw(id, 1);
    }
    assert!(render(&mut scene, &mut system).is_err());

    scene.gpu.state().buffer_budget = None;
    scene.gpu.state().recorded.clear();
    for &id in &ids {
        system.draw(id, 1);
    }
    render(&mut scene, &mut system).unwrap();

    let draws = scene
        .gpu
        .state()
        .recorded
        .iter()
        .filter(|r| matches!(r, Recorded::Draw { .. }))
        .count();
    assert_eq!(draws, 5);
}

#[test]
fn render_without_pipeline_still_clears_queue() {
    let mut scene = scene();
    let mut system = UnlitMaterialSystem::new(scene.gpu.clone(), DescriptorBatchConfig::default()).unwrap();
    let id = system.add_material(tinted(0));
    system.draw(id, 3);
    assert!(render(&mut scene, &mut system).is_err());

    system.init(&scene.pass).unwrap();
    scene.gpu.state().recorded.clear();
    render(&mut scene, &mut system).unwrap();
    assert!(!scene
        .gpu
        .state()
        .recorded
        .iter()
        .any(|r| matches!(r, Recorded::Draw { .. })));
}

#[test]
fn destroy_releases_pipeline() {
    let scene = scene();
    let mut system = UnlitMaterialSystem::new(scene.gpu.clone(), DescriptorBatchConfig::default()).unwrap();
    system.init(&scene.pass).unwrap();
    system.init(&scene.pass).unwrap();
    assert_eq!(scene.gpu.state().pipelines.len(), 1);
    drop(system);
    let s = scene.gpu.state();
    assert!(s.pipelines.is_empty());
    assert!(s.pools.is_empty());
}
