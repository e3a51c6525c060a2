// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend for the textured cube.
//!
//! `VkRenderer` pairs a [`FrameDriver`] (the frame state machine) with a
//! [`FrameResourceManager`] (every GPU object, torn down by `Drop` in the
//! reverse of creation order).

mod commands;
mod context;
mod debug;
mod depth;
pub mod driver;
mod error;
mod manager;
mod memory;
mod pipeline;
pub mod probe;
mod recorder;
pub mod shaders;
mod swapchain;
pub mod texture;
pub mod uniform;

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use texcube_render::{CubeAssets, RenderOptions, RenderSize, Renderer};
use tracing::{debug, warn};

pub use driver::{FrameDriver, FrameOutcome, FrameState};
pub use error::VkError;
pub use manager::FrameResourceManager;
pub use memory::find_memory_type_index;
pub use pipeline::pipeline_cache_path;
pub use probe::{DeviceReport, SwapchainPlan};
pub use swapchain::{ImageArena, ImageHandle};
pub use texture::UploadPath;

pub struct VkRenderer {
    driver: FrameDriver,
    manager: FrameResourceManager,
}

impl VkRenderer {
    pub fn state(&self) -> FrameState {
        self.driver.state()
    }

    pub fn device_report(&self) -> Result<DeviceReport> {
        self.manager.device_report()
    }

    pub fn swapchain_plan(&self) -> Option<SwapchainPlan> {
        self.manager.plan()
    }

    pub fn upload_path(&self) -> Option<UploadPath> {
        self.manager.upload_path()
    }

    /// Like [`Renderer::render`] but reports what the frame did.
    pub fn draw_frame(&mut self) -> Result<FrameOutcome> {
        self.driver.draw_frame(&mut self.manager)
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        assets: &CubeAssets,
        opts: RenderOptions,
    ) -> Result<Self> {
        let manager = FrameResourceManager::new(window, display, size, assets, &opts)?;
        let mut r = VkRenderer {
            driver: FrameDriver::new(opts.spin_increment),
            manager,
        };
        r.driver.prepare(&mut r.manager)?;
        Ok(r)
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        self.manager.set_desired_size(size);
        self.driver.request_resize(&mut self.manager)
    }

    fn render(&mut self) -> Result<()> {
        let outcome = self.draw_frame()?;
        if !matches!(outcome, FrameOutcome::Presented { suboptimal: false, .. }) {
            debug!("frame: {outcome:?}");
        }
        Ok(())
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) -> Result<()> {
        self.manager.set_clear_color(rgba)
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.driver.destroy(&mut self.manager) {
            warn!("draining the queue on shutdown: {e:#}");
        }
    }
}
