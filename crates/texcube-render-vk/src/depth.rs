// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;

use crate::commands::{subresource_range, InitCommands};
use crate::context::DeviceContext;
use crate::memory;

pub(crate) const DEPTH_FORMAT: vk::Format = vk::Format::D16_UNORM;

/// Depth image sized to the swapchain; rebuilt with it.
pub(crate) struct DepthResource {
    device: ash::Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    pub(crate) view: vk::ImageView,
}

impl DepthResource {
    pub(crate) unsafe fn new(
        ctx: &DeviceContext,
        init: &mut InitCommands<'_>,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        // null handles are fine to destroy if we bail halfway
        let mut depth = DepthResource {
            device: ctx.device.clone(),
            image: vk::Image::null(),
            memory: vk::DeviceMemory::null(),
            view: vk::ImageView::null(),
        };

        let image_ci = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format: DEPTH_FORMAT,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        depth.image = ctx
            .device
            .create_image(&image_ci, None)
            .context("create_image(depth)")?;
        (depth.memory, _) = memory::allocate_for_image(
            &ctx.device,
            &ctx.memory_props,
            depth.image,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        init.set_image_layout(
            depth.image,
            vk::ImageAspectFlags::DEPTH,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )?;

        let view_ci = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image: depth.image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: DEPTH_FORMAT,
            subresource_range: subresource_range(vk::ImageAspectFlags::DEPTH),
            ..Default::default()
        };
        depth.view = ctx
            .device
            .create_image_view(&view_ci, None)
            .context("create_image_view(depth)")?;
        Ok(depth)
    }
}

impl Drop for DepthResource {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}
