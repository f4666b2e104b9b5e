// SPDX-License-Identifier: CEPL-1.0
//! Opaque GPU object handles.
//!
//! Every handle is a raw 64-bit value owned by the backend. `0` is the null
//! handle, matching Vulkan's `VK_NULL_HANDLE`.

macro_rules! define_handles {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {$(
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub const NULL: Self = Self(0);

            #[inline]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn as_raw(self) -> u64 {
                self.0
            }

            #[inline]
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    )*};
}

define_handles! {
    /// CPU-visible completion marker.
    FenceHandle,
    /// GPU-side ordering primitive between queue operations.
    SemaphoreHandle,
    CommandPoolHandle,
    CommandBufferHandle,
    SwapchainHandle,
    ImageHandle,
    ImageViewHandle,
    SamplerHandle,
    RenderPassHandle,
    FramebufferHandle,
    PipelineHandle,
    BufferHandle,
    DescriptorPoolHandle,
    DescriptorSetHandle,
}
