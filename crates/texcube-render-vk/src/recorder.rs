// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;

use crate::commands::subresource_range;
use crate::uniform::CUBE_VERTICES;

/// Handles one per-image command buffer draws with.
pub(crate) struct DrawTarget {
    pub image: vk::Image,
    pub framebuffer: vk::Framebuffer,
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub desc_set: vk::DescriptorSet,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

pub fn clear_values(rgba: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: rgba },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

pub fn viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

fn color_barrier(
    image: vk::Image,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
        src_access_mask: src_access,
        dst_access_mask: dst_access,
        old_layout: old,
        new_layout: new,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: subresource_range(vk::ImageAspectFlags::COLOR),
        ..Default::default()
    }
}

/// Records the static draw for one swapchain image. The image arrives
/// presentable and leaves presentable.
pub(crate) unsafe fn record_draw(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    t: &DrawTarget,
) -> Result<()> {
    device
        .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        .context("reset_command_buffer")?;
    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        ..Default::default()
    };
    device
        .begin_command_buffer(cmd, &begin)
        .context("begin_command_buffer")?;

    let to_color = color_barrier(
        t.image,
        vk::ImageLayout::PRESENT_SRC_KHR,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::AccessFlags::empty(),
        vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
    );
    device.cmd_pipeline_barrier(
        cmd,
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[to_color],
    );

    let clears = clear_values(t.clear_color);
    let rp_begin = vk::RenderPassBeginInfo {
        s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
        render_pass: t.render_pass,
        framebuffer: t.framebuffer,
        render_area: scissor(t.extent),
        clear_value_count: clears.len() as u32,
        p_clear_values: clears.as_ptr(),
        ..Default::default()
    };
    device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, t.pipeline);
    device.cmd_bind_descriptor_sets(
        cmd,
        vk::PipelineBindPoint::GRAPHICS,
        t.pipeline_layout,
        0,
        &[t.desc_set],
        &[],
    );
    device.cmd_set_viewport(cmd, 0, &[viewport(t.extent)]);
    device.cmd_set_scissor(cmd, 0, &[scissor(t.extent)]);
    device.cmd_draw(cmd, CUBE_VERTICES as u32, 1, 0, 0);
    device.cmd_end_render_pass(cmd);

    let to_present = color_barrier(
        t.image,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::PRESENT_SRC_KHR,
        vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        vk::AccessFlags::MEMORY_READ,
    );
    device.cmd_pipeline_barrier(
        cmd,
        vk::PipelineStageFlags::ALL_COMMANDS,
        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[to_present],
    );

    device.end_command_buffer(cmd).context("end_command_buffer")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clears_colour_then_far_depth() {
        let c = clear_values([0.2, 0.2, 0.2, 0.2]);
        unsafe {
            assert_eq!(c[0].color.float32, [0.2, 0.2, 0.2, 0.2]);
            assert_eq!(c[1].depth_stencil.depth, 1.0);
            assert_eq!(c[1].depth_stencil.stencil, 0);
        }
    }

    #[test]
    fn viewport_and_scissor_cover_extent() {
        let e = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let v = viewport(e);
        assert_eq!((v.width, v.height, v.max_depth), (800.0, 600.0, 1.0));
        let s = scissor(e);
        assert_eq!(s.extent, e);
        assert_eq!((s.offset.x, s.offset.y), (0, 0));
    }
}
