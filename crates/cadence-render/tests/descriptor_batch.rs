// SPDX-License-Identifier: CEPL-1.0
mod common;

use std::sync::Arc;

use cadence_render::*;
use common::*;

const LAYOUT: DescriptorBatchLayout = DescriptorBatchLayout {
    parameter_block_size: 80,
    resource_binding_count: 1,
};

fn batch(gpu: &Arc<MockGpu>, base_capacity: u32, ceiling: u32) -> DescriptorBatchAllocator<MockGpu> {
    DescriptorBatchAllocator::new(gpu.clone(), LAYOUT, DescriptorBatchConfig { base_capacity, ceiling }).unwrap()
}

fn resource() -> [ResourceBinding; 1] {
    [ResourceBinding {
        view: ImageViewHandle::from_raw(5),
        sampler: SamplerHandle::from_raw(6),
    }]
}

#[test]
fn starts_at_base_capacity() {
    let gpu = MockGpu::new(WINDOW, 3);
    let batch = batch(&gpu, 16, 4096);
    assert_eq!(batch.capacity(), 16);
    assert_eq!(batch.generation(), 1);
    assert_eq!(gpu.state().pools.len(), 1);
    assert_eq!(gpu.state().buffers.len(), 16);
    // The first allocation has nothing in flight to drain.
    assert_eq!(gpu.state().wait_idle_calls, 0);
}

#[test]
fn growth_doubles_and_keeps_existing_slots() {
    let gpu = MockGpu::new(WINDOW, 3);
    let mut batch = batch(&gpu, 16, 4096);
    let before: Vec<_> = (0..16).map(|i| batch.get(i)).collect();
    let buffers: Vec<_> = (0..16).map(|i| batch.parameter_buffer(i)).collect();

    assert!(batch.ensure_capacity(17).unwrap());
    assert_eq!(batch.capacity(), 32);
    for i in 0..16 {
        assert_eq!(batch.get(i), before[i as usize]);
        assert_eq!(batch.parameter_buffer(i), buffers[i as usize]);
    }
    assert_eq!(gpu.state().pools.len(), 2);
    assert_eq!(gpu.state().wait_idle_calls, 1);

    assert!(!batch.ensure_capacity(32).unwrap());
    assert_eq!(gpu.state().pools.len(), 2);
}

#[test]
fn capacity_never_decreases() {
    let gpu = MockGpu::new(WINDOW, 3);
    let mut batch = batch(&gpu, 16, 4096);
    let mut high_water = 0;
    let mut last = batch.capacity();
    for required in [5, 40, 3, 100, 17, 0, 257] {
        batch.ensure_capacity(required).unwrap();
        high_water = high_water.max(required);
        assert!(batch.capacity() >= high_water);
        assert!(batch.capacity() >= last);
        assert!(batch.capacity().is_power_of_two());
        last = batch.capacity();
    }
    assert_eq!(batch.capacity(), 512);
}

#[test]
fn ceiling_is_enforced_without_side_effects() {
    let gpu = MockGpu::new(WINDOW, 3);
    let mut batch = batch(&gpu, 16, 64);
    batch.ensure_capacity(64).unwrap();
    let (pools, buffers) = {
        let s = gpu.state();
        (s.pools.len(), s.buffers_created)
    };

    let err = batch.ensure_capacity(65).unwrap_err();
    assert!(matches!(
        err,
        RenderError::CapacityExceeded {
            required: 65,
            ceiling: 64
        }
    ));
    assert!(!err.is_fatal());
    assert_eq!(batch.capacity(), 64);
    assert_eq!(gpu.state().pools.len(), pools);
    assert_eq!(gpu.state().buffers_created, buffers);
}

#[test]
fn failed_growth_rolls_back() {
    let gpu = MockGpu::new(WINDOW, 3);
    let mut batch = batch(&gpu, 16, 4096);
    let generation = batch.generation();
    gpu.state().buffer_budget = Some(5);

    assert!(batch.ensure_capacity(20).is_err());
    assert_eq!(batch.capacity(), 16);
    assert_eq!(batch.generation(), generation);
    {
        let s = gpu.state();
        assert_eq!(s.pools.len(), 1);
        assert_eq!(s.buffers.len(), 16);
    }

    gpu.state().buffer_budget = None;
    assert!(batch.ensure_capacity(20).unwrap());
    assert_eq!(batch.capacity(), 32);
}

#[test]
fn unchanged_slots_are_written_once_per_generation() {
    let gpu = MockGpu::new(WINDOW, 3);
    let mut batch = batch(&gpu, 16, 4096);
    let params = [7u8; 80];

    assert!(batch.update(3, &params, &resource(), true).unwrap());
    assert!(!batch.update(3, &params, &resource(), false).unwrap());
    assert!(batch.update(3, &params, &resource(), true).unwrap());
    assert_eq!(gpu.state().binding_updates[&batch.get(3)], 2);
    assert_eq!(gpu.state().buffers[&batch.parameter_buffer(3).as_raw()], params.to_vec());

    // Growth invalidates every slot.
    batch.ensure_capacity(17).unwrap();
    assert!(batch.update(3, &params, &resource(), false).unwrap());
    assert!(!batch.update(3, &params, &resource(), false).unwrap());
    assert_eq!(gpu.state().binding_updates[&batch.get(3)], 3);
}

#[test]
fn update_validates_block_and_bindings() {
    let gpu = MockGpu::new(WINDOW, 3);
    let mut batch = batch(&gpu, 16, 4096);
    assert!(matches!(
        batch.update(0, &[0u8; 81], &resource(), true),
        Err(RenderError::InvalidConfig(_))
    ));
    assert!(matches!(
        batch.update(0, &[0u8; 16], &[], true),
        Err(RenderError::InvalidConfig(_))
    ));
    assert!(gpu.state().binding_updates.is_empty());
}

#[test]
fn ceiling_must_be_reachable_by_doubling() {
    let gpu = MockGpu::new(WINDOW, 3);
    let config = DescriptorBatchConfig {
        base_capacity: 16,
        ceiling: 100,
    };
    assert!(matches!(
        DescriptorBatchAllocator::new(gpu, LAYOUT, config),
        Err(RenderError::InvalidConfig(_))
    ));
}

#[test]
#[should_panic(expected = "beyond capacity")]
fn get_past_capacity_panics() {
    let gpu = MockGpu::new(WINDOW, 3);
    let batch = batch(&gpu, 16, 4096);
    batch.get(16);
}

#[test]
fn drop_frees_everything() {
    let gpu = MockGpu::new(WINDOW, 3);
    let mut batch = batch(&gpu, 16, 4096);
    batch.ensure_capacity(40).unwrap();
    drop(batch);
    let s = gpu.state();
    assert!(s.pools.is_empty());
    assert!(s.buffers.is_empty());
}
