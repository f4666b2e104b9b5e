// SPDX-License-Identifier: CEPL-1.0
//! Growable per-material parameter and resource bindings.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::device::{GpuDevice, ResourceBinding};
use crate::handle::{BufferHandle, DescriptorPoolHandle, DescriptorSetHandle};
use crate::{RenderError, RenderResult};

pub const DEFAULT_BASE_CAPACITY: u32 = 16;
pub const DEFAULT_CAPACITY_CEILING: u32 = 4096;

/// Shape of one material slot: a parameter block plus N sampled images.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DescriptorBatchLayout {
    pub parameter_block_size: u64,
    pub resource_binding_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorBatchConfig {
    pub base_capacity: u32,
    /// Must be `base_capacity` times a power of two.
    pub ceiling: u32,
}

impl Default for DescriptorBatchConfig {
    fn default() -> Self {
        DescriptorBatchConfig {
            base_capacity: DEFAULT_BASE_CAPACITY,
            ceiling: DEFAULT_CAPACITY_CEILING,
        }
    }
}

impl DescriptorBatchConfig {
    pub fn validate(&self) -> RenderResult<()> {
        let ok = self.base_capacity > 0
            && self.ceiling >= self.base_capacity
            && self.ceiling % self.base_capacity == 0
            && (self.ceiling / self.base_capacity).is_power_of_two();
        if ok {
            Ok(())
        } else {
            Err(RenderError::InvalidConfig(format!(
                "descriptor ceiling {} is not a power-of-two multiple of base {}",
                self.ceiling, self.base_capacity
            )))
        }
    }
}

/// The binding pair a draw uses for one material slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialBindings {
    pub parameters: DescriptorSetHandle,
    pub resources: DescriptorSetHandle,
}

/// Doubling from `current` (or `base` when empty) until `required` fits.
/// `None` on `u32` overflow.
pub fn grown_capacity(current: u32, required: u32, base: u32) -> Option<u32> {
    let mut capacity = if current == 0 { base } else { current };
    while capacity < required {
        capacity = capacity.checked_mul(2)?;
    }
    Some(capacity)
}

struct Chunk {
    pool: DescriptorPoolHandle,
    bindings: Vec<MaterialBindings>,
    buffers: Vec<BufferHandle>,
}

/// Index-addressed binding storage for one material subsystem.
///
/// Capacity only grows, by doubling, and never past the ceiling. Growth adds
/// a pool for the new range and leaves existing slots untouched, so a
/// material keeps its index and handles for its whole life. Every slot is
/// rewritten on its first update after a growth.
pub struct DescriptorBatchAllocator<B: GpuDevice> {
    backend: Arc<B>,
    layout: DescriptorBatchLayout,
    config: DescriptorBatchConfig,

    pools: Vec<DescriptorPoolHandle>,
    bindings: Vec<MaterialBindings>,
    buffers: Vec<BufferHandle>,

    generation: u64,
    written: Vec<Option<u64>>,
}

impl<B: GpuDevice> DescriptorBatchAllocator<B> {
    /// Creates the batch at its base capacity.
    pub fn new(backend: Arc<B>, layout: DescriptorBatchLayout, config: DescriptorBatchConfig) -> RenderResult<Self> {
        config.validate()?;
        let mut batch = DescriptorBatchAllocator {
            backend,
            layout,
            config,
            pools: Vec::new(),
            bindings: Vec::new(),
            buffers: Vec::new(),
            generation: 0,
            written: Vec::new(),
        };
        batch.ensure_capacity(config.base_capacity)?;
        Ok(batch)
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.bindings.len() as u32
    }

    /// Grows so that slots `0..required` exist. Returns true if it grew.
    ///
    /// Fails with [`RenderError::CapacityExceeded`] and changes nothing when
    /// the doubled capacity would pass the ceiling.
    pub fn ensure_capacity(&mut self, required: u32) -> RenderResult<bool> {
        let capacity = self.capacity();
        if required <= capacity {
            return Ok(false);
        }

        let new_capacity = grown_capacity(capacity, required, self.config.base_capacity)
            .filter(|&c| c <= self.config.ceiling);
        let Some(new_capacity) = new_capacity else {
            error!(
                "descriptor batch cannot hold {} materials (capacity {}, ceiling {})",
                required, capacity, self.config.ceiling
            );
            return Err(RenderError::CapacityExceeded {
                required,
                ceiling: self.config.ceiling,
            });
        };

        // Slots in use by queued frames are about to be rewritten.
        if capacity > 0 {
            self.backend.wait_idle()?;
        }

        let chunk = self.allocate_chunk(new_capacity - capacity)?;
        self.pools.push(chunk.pool);
        self.bindings.extend(chunk.bindings);
        self.buffers.extend(chunk.buffers);
        self.written.resize(new_capacity as usize, None);
        self.generation += 1;

        info!("descriptor batch grew {} → {}", capacity, new_capacity);
        Ok(true)
    }

    /// All-or-nothing: on failure everything allocated here is released.
    fn allocate_chunk(&self, count: u32) -> RenderResult<Chunk> {
        let pool = self.backend.create_descriptor_pool(&self.layout, count)?;
        let bindings = match self
            .backend
            .allocate_material_bindings(pool, &self.layout, count)
        {
            Ok(b) => b,
            Err(e) => {
                self.backend.destroy_descriptor_pool(pool);
                return Err(e);
            }
        };

        let mut buffers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            match self.backend.create_buffer(self.layout.parameter_block_size) {
                Ok(buffer) => buffers.push(buffer),
                Err(e) => {
                    for buffer in buffers {
                        self.backend.destroy_buffer(buffer);
                    }
                    self.backend.destroy_descriptor_pool(pool);
                    return Err(e);
                }
            }
        }

        Ok(Chunk {
            pool,
            bindings,
            buffers,
        })
    }

    /// # Panics
    ///
    /// If `index >= capacity`.
    pub fn get(&self, index: u32) -> MaterialBindings {
        assert!(index < self.capacity(), "material slot {index} beyond capacity {}", self.capacity());
        self.bindings[index as usize]
    }

    pub fn parameter_buffer(&self, index: u32) -> BufferHandle {
        assert!(index < self.capacity(), "material slot {index} beyond capacity {}", self.capacity());
        self.buffers[index as usize]
    }

    /// Writes a material's parameter block and resource bindings.
    ///
    /// Skipped when `changed` is false and the slot was already written
    /// since the last growth. Returns whether anything was written.
    pub fn update(
        &mut self,
        index: u32,
        parameters: &[u8],
        resources: &[ResourceBinding],
        changed: bool,
    ) -> RenderResult<bool> {
        assert!(index < self.capacity(), "material slot {index} beyond capacity {}", self.capacity());
        let slot = index as usize;
        if !changed && self.written[slot] == Some(self.generation) {
            return Ok(false);
        }

        if parameters.len() as u64 > self.layout.parameter_block_size {
            return Err(RenderError::InvalidConfig(format!(
                "{} byte parameter block for a {} byte slot",
                parameters.len(),
                self.layout.parameter_block_size
            )));
        }
        if resources.len() != self.layout.resource_binding_count as usize {
            return Err(RenderError::InvalidConfig(format!(
                "{} resource bindings for a layout with {}",
                resources.len(),
                self.layout.resource_binding_count
            )));
        }

        let buffer = self.buffers[slot];
        self.backend.write_buffer(buffer, 0, parameters)?;
        self.backend.update_material_bindings(
            self.bindings[slot],
            buffer,
            self.layout.parameter_block_size,
            resources,
        )?;
        self.written[slot] = Some(self.generation);
        debug!("material slot {index} written (generation {})", self.generation);
        Ok(true)
    }

    pub fn layout(&self) -> &DescriptorBatchLayout {
        &self.layout
    }

    pub fn config(&self) -> &DescriptorBatchConfig {
        &self.config
    }

    /// Bumped by every growth.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<B: GpuDevice> Drop for DescriptorBatchAllocator<B> {
    fn drop(&mut self) {
        for buffer in self.buffers.drain(..) {
            self.backend.destroy_buffer(buffer);
        }
        for pool in self.pools.drain(..) {
            self.backend.destroy_descriptor_pool(pool);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_doubles_from_current_or_base() {
        assert_eq!(grown_capacity(0, 1, 16), Some(16));
        assert_eq!(grown_capacity(16, 17, 16), Some(32));
        assert_eq!(grown_capacity(16, 100, 16), Some(128));
        assert_eq!(grown_capacity(32, 32, 16), Some(32));
        assert_eq!(grown_capacity(1 << 31, u32::MAX, 16), None);
    }

    #[test]
    fn ceiling_must_be_power_of_two_multiple() {
        assert!(DescriptorBatchConfig::default().validate().is_ok());
        let bad = DescriptorBatchConfig {
            base_capacity: 16,
            ceiling: 48,
        };
        assert!(bad.validate().is_err());
        let zero = DescriptorBatchConfig {
            base_capacity: 0,
            ceiling: 16,
        };
        assert!(zero.validate().is_err());
    }
}
