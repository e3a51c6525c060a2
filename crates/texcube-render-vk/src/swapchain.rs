// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::khr::swapchain;
use ash::vk;
use tracing::info;

use crate::commands::{subresource_range, CommandPool, InitCommands};
use crate::context::DeviceContext;
use crate::probe::SwapchainPlan;

/// The `VkSwapchainKHR` itself. Outlives its replacement's creation so it
/// can be handed over as `old_swapchain`.
pub(crate) struct SwapchainHandle {
    loader: swapchain::Device,
    pub(crate) handle: vk::SwapchainKHR,
    pub(crate) plan: SwapchainPlan,
}

impl SwapchainHandle {
    pub(crate) unsafe fn create(
        ctx: &DeviceContext,
        plan: SwapchainPlan,
        old: Option<&SwapchainHandle>,
    ) -> Result<Self> {
        let families = [ctx.queue_family];
        let info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: ctx.surface,
            min_image_count: plan.image_count,
            image_format: plan.surface_format.format,
            image_color_space: plan.surface_format.color_space,
            image_extent: plan.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_index_count: families.len() as u32,
            p_queue_family_indices: families.as_ptr(),
            pre_transform: plan.pre_transform,
            composite_alpha: plan.composite_alpha,
            present_mode: plan.present_mode,
            clipped: vk::TRUE,
            old_swapchain: old.map_or(vk::SwapchainKHR::null(), |o| o.handle),
            ..Default::default()
        };
        let handle = ctx
            .swapchain_loader
            .create_swapchain(&info, None)
            .context("create_swapchain")?;
        info!(
            "swapchain {}x{} {:?}/{:?} {:?}, {} images requested",
            plan.extent.width,
            plan.extent.height,
            plan.surface_format.format,
            plan.surface_format.color_space,
            plan.present_mode,
            plan.image_count
        );
        Ok(SwapchainHandle {
            loader: ctx.swapchain_loader.clone(),
            handle,
            plan,
        })
    }
}

impl Drop for SwapchainHandle {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_swapchain(self.handle, None) };
    }
}

/// Generation-checked index into the per-image arena. Handles taken before
/// a rebuild stop resolving afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageHandle {
    pub index: u32,
    pub generation: u32,
}

/// Slots tagged with the swapchain generation that produced them.
#[derive(Debug)]
pub struct ImageArena<T> {
    slots: Vec<T>,
    generation: u32,
}

impl<T> ImageArena<T> {
    pub fn new(slots: Vec<T>, generation: u32) -> Self {
        ImageArena { slots, generation }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn handle(&self, index: u32) -> Option<ImageHandle> {
        ((index as usize) < self.slots.len()).then_some(ImageHandle {
            index,
            generation: self.generation,
        })
    }

    pub fn get(&self, h: ImageHandle) -> Option<&T> {
        if h.generation != self.generation {
            return None;
        }
        self.slots.get(h.index as usize)
    }

    pub fn slots(&self) -> &[T] {
        &self.slots
    }
}

pub(crate) struct ImageSlot {
    pub(crate) image: vk::Image,
    pub(crate) view: vk::ImageView,
    pub(crate) cmd: vk::CommandBuffer,
}

/// Views and prerecorded command buffers for every swapchain image.
pub(crate) struct SwapchainImages {
    device: ash::Device,
    pool: vk::CommandPool,
    arena: ImageArena<ImageSlot>,
}

impl SwapchainImages {
    /// Creates a view and command buffer per image and queues the one-time
    /// undefined → presentable transition on `init`.
    pub(crate) unsafe fn new(
        ctx: &DeviceContext,
        pool: &CommandPool,
        init: &mut InitCommands<'_>,
        swapchain: &SwapchainHandle,
        generation: u32,
    ) -> Result<Self> {
        let images = ctx
            .swapchain_loader
            .get_swapchain_images(swapchain.handle)
            .context("get_swapchain_images")?;
        let cmds = pool.allocate(images.len() as u32)?;

        let slots = images
            .into_iter()
            .zip(cmds)
            .map(|(image, cmd)| ImageSlot {
                image,
                view: vk::ImageView::null(),
                cmd,
            })
            .collect();
        let mut out = SwapchainImages {
            device: ctx.device.clone(),
            pool: pool.pool,
            arena: ImageArena::new(slots, generation),
        };

        let format = swapchain.plan.surface_format.format;
        for slot in &mut out.arena.slots {
            let view_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image: slot.image,
                view_type: vk::ImageViewType::TYPE_2D,
                format,
                components: vk::ComponentMapping {
                    r: vk::ComponentSwizzle::R,
                    g: vk::ComponentSwizzle::G,
                    b: vk::ComponentSwizzle::B,
                    a: vk::ComponentSwizzle::A,
                },
                subresource_range: subresource_range(vk::ImageAspectFlags::COLOR),
                ..Default::default()
            };
            slot.view = ctx
                .device
                .create_image_view(&view_info, None)
                .context("create_image_view(swapchain)")?;
            init.set_image_layout(
                slot.image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::PRESENT_SRC_KHR,
            )?;
        }
        Ok(out)
    }

    pub(crate) fn len(&self) -> usize {
        self.arena.len()
    }

    pub(crate) fn handle(&self, index: u32) -> Option<ImageHandle> {
        self.arena.handle(index)
    }

    pub(crate) fn get(&self, h: ImageHandle) -> Option<&ImageSlot> {
        self.arena.get(h)
    }

    pub(crate) fn slots(&self) -> &[ImageSlot] {
        self.arena.slots()
    }
}

impl Drop for SwapchainImages {
    fn drop(&mut self) {
        unsafe {
            let slots = self.arena.slots();
            let cmds: Vec<vk::CommandBuffer> = slots.iter().map(|s| s.cmd).collect();
            for s in slots {
                self.device.destroy_image_view(s.view, None);
            }
            if !cmds.is_empty() {
                self.device.free_command_buffers(self.pool, &cmds);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_resolve_within_their_generation() {
        let arena = ImageArena::new(vec!['a', 'b', 'c'], 4);
        let h = arena.handle(2).unwrap();
        assert_eq!(h, ImageHandle { index: 2, generation: 4 });
        assert_eq!(arena.get(h), Some(&'c'));
        assert!(arena.handle(3).is_none());
    }

    #[test]
    fn handle_from_before_a_rebuild_is_rejected() {
        let before = ImageArena::new(vec![1u8, 2, 3], 1);
        let stale = before.handle(0).unwrap();
        let after = ImageArena::new(vec![1u8, 2, 3], before.generation() + 1);
        assert_eq!(after.get(stale), None);
        assert_eq!(after.get(after.handle(0).unwrap()), Some(&1));
    }

    #[test]
    fn out_of_range_handle_of_current_generation_is_none() {
        let arena = ImageArena::new(vec![0u8; 2], 7);
        let forged = ImageHandle { index: 5, generation: 7 };
        assert_eq!(arena.get(forged), None);
        assert!(!arena.is_empty());
    }
}
