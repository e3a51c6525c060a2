// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;

/// Command pool on the graphics queue family; every command buffer in the
/// renderer comes from here.
pub(crate) struct CommandPool {
    device: ash::Device,
    pub(crate) pool: vk::CommandPool,
}

impl CommandPool {
    pub(crate) unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: queue_family,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let pool = device
            .create_command_pool(&info, None)
            .context("create_command_pool")?;
        Ok(CommandPool {
            device: device.clone(),
            pool,
        })
    }

    pub(crate) unsafe fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        self.device
            .allocate_command_buffers(&info)
            .context("allocate_command_buffers")
    }

    pub(crate) unsafe fn free(&self, bufs: &[vk::CommandBuffer]) {
        if !bufs.is_empty() {
            self.device.free_command_buffers(self.pool, bufs);
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.pool, None) };
    }
}

/// Access masks and stages for a one-off layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct LayoutBarrier {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

pub(crate) fn layout_barrier(old: vk::ImageLayout, new: vk::ImageLayout) -> LayoutBarrier {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as P;

    let (src_access, src_stage) = match old {
        L::PREINITIALIZED => (A::HOST_WRITE, P::HOST),
        L::TRANSFER_DST_OPTIMAL => (A::TRANSFER_WRITE, P::TRANSFER),
        L::TRANSFER_SRC_OPTIMAL => (A::TRANSFER_READ, P::TRANSFER),
        L::COLOR_ATTACHMENT_OPTIMAL => (A::COLOR_ATTACHMENT_WRITE, P::COLOR_ATTACHMENT_OUTPUT),
        _ => (A::empty(), P::TOP_OF_PIPE),
    };
    let (dst_access, dst_stage) = match new {
        L::TRANSFER_DST_OPTIMAL => (A::TRANSFER_WRITE, P::TRANSFER),
        L::TRANSFER_SRC_OPTIMAL => (A::TRANSFER_READ, P::TRANSFER),
        L::COLOR_ATTACHMENT_OPTIMAL => (A::COLOR_ATTACHMENT_WRITE, P::COLOR_ATTACHMENT_OUTPUT),
        L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            P::EARLY_FRAGMENT_TESTS,
        ),
        L::SHADER_READ_ONLY_OPTIMAL => (A::SHADER_READ | A::INPUT_ATTACHMENT_READ, P::FRAGMENT_SHADER),
        L::PRESENT_SRC_KHR => (A::MEMORY_READ, P::BOTTOM_OF_PIPE),
        _ => (A::empty(), P::BOTTOM_OF_PIPE),
    };
    LayoutBarrier {
        src_access,
        dst_access,
        src_stage,
        dst_stage,
    }
}

pub(crate) fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Setup-time command buffer: allocated on first use, submitted and waited
/// on by [`InitCommands::flush`]. Never used for steady-state frames.
pub(crate) struct InitCommands<'a> {
    device: &'a ash::Device,
    pool: &'a CommandPool,
    queue: vk::Queue,
    cmd: Option<vk::CommandBuffer>,
}

impl<'a> InitCommands<'a> {
    pub(crate) fn new(device: &'a ash::Device, pool: &'a CommandPool, queue: vk::Queue) -> Self {
        InitCommands {
            device,
            pool,
            queue,
            cmd: None,
        }
    }

    pub(crate) fn device(&self) -> &'a ash::Device {
        self.device
    }

    /// The open command buffer, begun lazily.
    pub(crate) unsafe fn cmd(&mut self) -> Result<vk::CommandBuffer> {
        if let Some(cmd) = self.cmd {
            return Ok(cmd);
        }
        let cmd = self.pool.allocate(1)?[0];
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        if let Err(e) = self.device.begin_command_buffer(cmd, &begin) {
            self.pool.free(&[cmd]);
            return Err(e).context("begin_command_buffer(init)");
        }
        self.cmd = Some(cmd);
        Ok(cmd)
    }

    pub(crate) unsafe fn set_image_layout(
        &mut self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> Result<()> {
        let cmd = self.cmd()?;
        let b = layout_barrier(old, new);
        let barrier = vk::ImageMemoryBarrier {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
            src_access_mask: b.src_access,
            dst_access_mask: b.dst_access,
            old_layout: old,
            new_layout: new,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image,
            subresource_range: subresource_range(aspect),
            ..Default::default()
        };
        self.device.cmd_pipeline_barrier(
            cmd,
            b.src_stage,
            b.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
        Ok(())
    }

    /// Submit, wait for the queue to drain, free. No-op when nothing was recorded.
    pub(crate) unsafe fn flush(&mut self) -> Result<()> {
        let Some(cmd) = self.cmd.take() else {
            return Ok(());
        };
        let res = (|| -> Result<()> {
            self.device
                .end_command_buffer(cmd)
                .context("end_command_buffer(init)")?;
            let submit = vk::SubmitInfo {
                s_type: vk::StructureType::SUBMIT_INFO,
                command_buffer_count: 1,
                p_command_buffers: &cmd,
                ..Default::default()
            };
            self.device
                .queue_submit(self.queue, std::slice::from_ref(&submit), vk::Fence::null())
                .context("queue_submit(init)")?;
            self.device
                .queue_wait_idle(self.queue)
                .context("queue_wait_idle(init)")
        })();
        self.pool.free(&[cmd]);
        res
    }
}

impl Drop for InitCommands<'_> {
    fn drop(&mut self) {
        if let Some(cmd) = self.cmd.take() {
            unsafe { self.pool.free(&[cmd]) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_to_present_waits_on_nothing() {
        let b = layout_barrier(vk::ImageLayout::UNDEFINED, vk::ImageLayout::PRESENT_SRC_KHR);
        assert!(b.src_access.is_empty());
        assert_eq!(b.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(b.dst_access, vk::AccessFlags::MEMORY_READ);
    }

    #[test]
    fn host_written_texture_becomes_sampleable() {
        let b = layout_barrier(
            vk::ImageLayout::PREINITIALIZED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(b.src_access, vk::AccessFlags::HOST_WRITE);
        assert_eq!(b.src_stage, vk::PipelineStageFlags::HOST);
        assert!(b.dst_access.contains(vk::AccessFlags::SHADER_READ));
        assert_eq!(b.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn copy_target_orders_transfer_writes() {
        let b = layout_barrier(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(b.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(b.src_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn depth_attachment_masks() {
        let b = layout_barrier(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        );
        assert!(b
            .dst_access
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert_eq!(b.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
    }
}
