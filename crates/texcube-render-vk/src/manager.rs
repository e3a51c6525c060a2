// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, bail, Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use texcube_math::CubeCamera;
use texcube_render::{CubeAssets, ImageData, RenderOptions, RenderSize};
use tracing::{debug, info};

use crate::commands::{CommandPool, InitCommands};
use crate::context::DeviceContext;
use crate::depth::DepthResource;
use crate::driver::{AcquireOutcome, FrameBackend, PresentOutcome};
use crate::error::VkError;
use crate::pipeline::{PipelineInputs, PipelineSet, ShaderCode};
use crate::probe::{DeviceReport, SwapchainPlan};
use crate::recorder::{record_draw, DrawTarget};
use crate::swapchain::{ImageHandle, SwapchainHandle, SwapchainImages};
use crate::texture::{Texture, UploadPath};
use crate::uniform::UniformResource;

/// Transient acquire/render semaphores for one frame, plus the image the
/// acquire handed out. The handle stops resolving once the images are rebuilt.
pub struct FrameSemaphores {
    device: ash::Device,
    acquired: vk::Semaphore,
    rendered: vk::Semaphore,
    image: Option<ImageHandle>,
}

impl FrameSemaphores {
    unsafe fn new(device: &ash::Device) -> Result<Self> {
        let ci = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        let mut s = FrameSemaphores {
            device: device.clone(),
            acquired: vk::Semaphore::null(),
            rendered: vk::Semaphore::null(),
            image: None,
        };
        s.acquired = device.create_semaphore(&ci, None).context("create_semaphore")?;
        s.rendered = device.create_semaphore(&ci, None).context("create_semaphore")?;
        Ok(s)
    }
}

impl Drop for FrameSemaphores {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.acquired, None);
            self.device.destroy_semaphore(self.rendered, None);
        }
    }
}

/// Owns every GPU object. Field order is teardown order: Rust drops fields
/// top to bottom once `Drop::drop` has drained the device.
pub struct FrameResourceManager {
    pipeline: Option<PipelineSet>,
    texture: Option<Texture>,
    swapchain: Option<SwapchainHandle>,
    depth: Option<DepthResource>,
    uniform: Option<UniformResource>,
    images: Option<SwapchainImages>,
    pool: CommandPool,
    ctx: DeviceContext,

    shaders: ShaderCode,
    texture_source: ImageData,
    use_staging: bool,
    clear_color: [f32; 4],
    desired: RenderSize,
    camera: CubeCamera,
    generation: u32,
}

impl FrameResourceManager {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        assets: &CubeAssets,
        opts: &RenderOptions,
    ) -> Result<Self> {
        let shaders = ShaderCode::from_bytes(&assets.vertex_spv, &assets.fragment_spv)?;
        unsafe {
            let ctx = DeviceContext::new(window, display, opts.validation)?;
            let pool = CommandPool::new(&ctx.device, ctx.queue_family)?;
            Ok(FrameResourceManager {
                pipeline: None,
                texture: None,
                swapchain: None,
                depth: None,
                uniform: None,
                images: None,
                pool,
                ctx,
                shaders,
                texture_source: assets.texture.clone(),
                use_staging: opts.use_staging,
                clear_color: opts.clear_color,
                desired: size,
                camera: CubeCamera::for_extent(size.width, size.height),
                generation: 0,
            })
        }
    }

    pub fn set_desired_size(&mut self, size: RenderSize) {
        self.desired = size;
    }

    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.swapchain.as_ref().map(|s| s.plan.extent)
    }

    pub fn plan(&self) -> Option<SwapchainPlan> {
        self.swapchain.as_ref().map(|s| s.plan)
    }

    pub fn image_count(&self) -> usize {
        self.images.as_ref().map_or(0, |i| i.len())
    }

    pub fn upload_path(&self) -> Option<UploadPath> {
        self.texture.as_ref().map(|t| t.path)
    }

    pub fn device_report(&self) -> Result<DeviceReport> {
        unsafe { self.ctx.report() }
    }

    /// Changes the clear colour and re-records the per-image buffers.
    pub fn set_clear_color(&mut self, rgba: [f32; 4]) -> Result<()> {
        self.clear_color = rgba;
        if self.pipeline.is_some() {
            unsafe {
                self.ctx
                    .device
                    .queue_wait_idle(self.ctx.queue)
                    .context("queue_wait_idle")?;
                self.record_all()?;
            }
        }
        Ok(())
    }

    /// Swapchain-dependent teardown; the old swapchain handle and the
    /// texture survive.
    unsafe fn teardown_for_rebuild(&mut self) -> Result<()> {
        self.ctx
            .device
            .device_wait_idle()
            .context("device_wait_idle")?;
        self.pipeline = None;
        self.depth = None;
        self.uniform = None;
        self.images = None;
        Ok(())
    }

    unsafe fn build(&mut self) -> Result<()> {
        let ctx = &self.ctx;
        let plan = SwapchainPlan::query(&ctx.surface_loader, ctx.phys, ctx.surface, self.desired)?;
        let swapchain = SwapchainHandle::create(ctx, plan, self.swapchain.as_ref())?;
        // the old handle goes only after its replacement exists
        self.swapchain = Some(swapchain);
        self.generation = self.generation.wrapping_add(1);
        self.camera = CubeCamera::for_extent(plan.extent.width, plan.extent.height);

        let ctx = &self.ctx;
        let mut init = InitCommands::new(&ctx.device, &self.pool, ctx.queue);
        let swapchain = self
            .swapchain
            .as_ref()
            .ok_or_else(|| anyhow!("swapchain missing after create"))?;
        let images = SwapchainImages::new(ctx, &self.pool, &mut init, swapchain, self.generation)?;
        let depth = DepthResource::new(ctx, &mut init, plan.extent)?;
        if self.texture.is_none() {
            self.texture = Some(Texture::prepare(
                ctx,
                &mut init,
                &self.texture_source,
                self.use_staging,
            )?);
        }
        let uniform = UniformResource::new(ctx, self.camera.mvp_columns(0.0))?;
        let texture = self
            .texture
            .as_ref()
            .ok_or_else(|| anyhow!("texture missing after prepare"))?;
        let pipeline = PipelineSet::new(
            ctx,
            PipelineInputs {
                shaders: &self.shaders,
                color_format: plan.surface_format.format,
                extent: plan.extent,
                depth: &depth,
                images: &images,
                uniform: &uniform,
                texture,
            },
        )?;
        init.flush()?;
        drop(init);

        self.images = Some(images);
        self.depth = Some(depth);
        self.uniform = Some(uniform);
        self.pipeline = Some(pipeline);
        self.record_all()?;

        info!(
            "prepared {} images at {}x{} (generation {})",
            self.image_count(),
            plan.extent.width,
            plan.extent.height,
            self.generation
        );
        Ok(())
    }

    unsafe fn record_all(&self) -> Result<()> {
        let (Some(images), Some(pipeline), Some(swapchain)) =
            (&self.images, &self.pipeline, &self.swapchain)
        else {
            return Ok(());
        };
        for (slot, &framebuffer) in images.slots().iter().zip(&pipeline.framebuffers) {
            let target = DrawTarget {
                image: slot.image,
                framebuffer,
                render_pass: pipeline.render_pass,
                pipeline: pipeline.pipeline,
                pipeline_layout: pipeline.pipeline_layout,
                desc_set: pipeline.desc_set,
                extent: swapchain.plan.extent,
                clear_color: self.clear_color,
            };
            record_draw(&self.ctx.device, slot.cmd, &target)?;
        }
        debug!("recorded {} draw command buffers", images.len());
        Ok(())
    }

    fn images(&self) -> Result<&SwapchainImages> {
        self.images
            .as_ref()
            .ok_or_else(|| anyhow!("no swapchain images"))
    }

    /// Command buffer for the ticket's image, if it still belongs to the
    /// current swapchain.
    fn slot_for(&self, index: u32, ticket: &FrameSemaphores) -> Result<vk::CommandBuffer> {
        let handle = ticket
            .image
            .ok_or_else(|| anyhow!("frame ticket carries no image"))?;
        if handle.index != index {
            bail!("image {index} submitted with a ticket for {}", handle.index);
        }
        let slot = self
            .images()?
            .get(handle)
            .ok_or_else(|| anyhow!("stale image handle {handle:?}"))?;
        Ok(slot.cmd)
    }
}

impl FrameBackend for FrameResourceManager {
    type Ticket = FrameSemaphores;

    fn update_uniform(&mut self, spin_angle: f32) -> Result<()> {
        let uniform = self
            .uniform
            .as_ref()
            .ok_or_else(|| anyhow!("uniform buffer not prepared"))?;
        let mvp = self.camera.mvp_columns(spin_angle);
        unsafe { uniform.write_mvp(&mvp) }
    }

    fn acquire(&mut self) -> Result<AcquireOutcome<FrameSemaphores>> {
        let swapchain = self
            .swapchain
            .as_ref()
            .ok_or_else(|| anyhow!("no swapchain"))?;
        unsafe {
            let mut ticket = FrameSemaphores::new(&self.ctx.device)?;
            match self.ctx.swapchain_loader.acquire_next_image(
                swapchain.handle,
                u64::MAX,
                ticket.acquired,
                vk::Fence::null(),
            ) {
                Ok((index, suboptimal)) => {
                    ticket.image = Some(
                        self.images()?
                            .handle(index)
                            .ok_or_else(|| anyhow!("acquired image {index} out of range"))?,
                    );
                    Ok(AcquireOutcome::Ready {
                        index,
                        suboptimal,
                        ticket,
                    })
                }
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
                Err(e) => Err(VkError::api("acquire_next_image")(e).into()),
            }
        }
    }

    fn submit(&mut self, index: u32, ticket: &FrameSemaphores) -> Result<()> {
        let cmd = self.slot_for(index, ticket)?;
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &ticket.acquired,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &ticket.rendered,
            ..Default::default()
        };
        unsafe {
            self.ctx
                .device
                .queue_submit(self.ctx.queue, std::slice::from_ref(&submit), vk::Fence::null())
                .map_err(VkError::api("queue_submit"))?;
        }
        Ok(())
    }

    fn present(&mut self, index: u32, ticket: &FrameSemaphores) -> Result<PresentOutcome> {
        self.slot_for(index, ticket)?;
        let swapchain = self
            .swapchain
            .as_ref()
            .ok_or_else(|| anyhow!("no swapchain"))?;
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &ticket.rendered,
            swapchain_count: 1,
            p_swapchains: &swapchain.handle,
            p_image_indices: &index,
            ..Default::default()
        };
        unsafe {
            match self
                .ctx
                .swapchain_loader
                .queue_present(self.ctx.queue, &present)
            {
                Ok(false) => Ok(PresentOutcome::Optimal),
                Ok(true) => Ok(PresentOutcome::Suboptimal),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
                Err(e) => Err(VkError::api("queue_present")(e).into()),
            }
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .queue_wait_idle(self.ctx.queue)
                .map_err(VkError::api("queue_wait_idle"))?;
        }
        Ok(())
    }

    fn rebuild(&mut self) -> Result<()> {
        unsafe {
            self.teardown_for_rebuild()?;
            self.build()
        }
    }
}

impl Drop for FrameResourceManager {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();
        }
        // fields drop in declaration order from here
    }
}
