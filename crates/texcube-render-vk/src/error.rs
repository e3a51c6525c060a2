// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// Configuration and driver failures with no degraded mode.
#[derive(Debug, Error)]
pub enum VkError {
    #[error("no Vulkan physical device available")]
    NoPhysicalDevice,
    #[error("physical device exposes no queue families")]
    NoQueueFamilies,
    #[error("no queue family supports graphics")]
    NoGraphicsQueue,
    #[error("no queue family can present to the surface")]
    NoPresentQueue,
    #[error("graphics queue family {graphics} cannot present (present family {present}); separate queues are unsupported")]
    SeparateQueues { graphics: u32, present: u32 },
    #[error("surface reports no formats")]
    NoSurfaceFormats,
    #[error("surface does not offer R8G8B8A8_UNORM")]
    UnsupportedSurfaceFormat,
    #[error("no memory type in mask {type_bits:#x} has {wanted:?}")]
    NoMemoryType {
        type_bits: u32,
        wanted: vk::MemoryPropertyFlags,
    },
    #[error("R8G8B8A8_UNORM is not sampleable with linear or optimal tiling")]
    UnsupportedTextureFormat,
    #[error("texture source holds {got} bytes, {need} needed")]
    TextureTooSmall { got: usize, need: usize },
    #[error("{call} failed: {result}")]
    Api {
        call: &'static str,
        result: vk::Result,
    },
}

impl VkError {
    pub fn api(call: &'static str) -> impl FnOnce(vk::Result) -> VkError {
        move |result| VkError::Api { call, result }
    }
}
