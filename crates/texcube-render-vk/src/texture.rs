// SPDX-License-Identifier: CEPL-1.0
//! Sampled RGBA8 texture, uploaded either straight into linear host-visible
//! memory or through a disposable linear staging image.

use anyhow::{Context, Result};
use ash::vk;
use texcube_render::ImageData;
use tracing::{debug, info, warn};

use crate::commands::{subresource_range, InitCommands};
use crate::context::DeviceContext;
use crate::error::VkError;
use crate::memory;

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadPath {
    /// Linear, host-visible, sampled directly.
    Linear,
    /// Linear staging image copied into an optimal device-local one.
    Staged,
}

/// Linear sampling wins unless staging is forced or linear can't sample.
/// Forcing staging on a device that can only sample linear images falls
/// back to the linear path.
pub fn choose_upload_path(
    props: vk::FormatProperties,
    force_staging: bool,
) -> std::result::Result<UploadPath, VkError> {
    let linear = props
        .linear_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE);
    let optimal = props
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE);
    match (linear, optimal) {
        (true, false) => Ok(UploadPath::Linear),
        (true, true) if !force_staging => Ok(UploadPath::Linear),
        (_, true) => Ok(UploadPath::Staged),
        (false, false) => Err(VkError::UnsupportedTextureFormat),
    }
}

fn check_source(src: &ImageData) -> std::result::Result<(), VkError> {
    let need = if src.height == 0 {
        0
    } else {
        (src.height as usize - 1) * src.row_pitch + src.row_bytes()
    };
    if src.pixels.len() < need || src.row_pitch < src.row_bytes() {
        return Err(VkError::TextureTooSmall {
            got: src.pixels.len(),
            need,
        });
    }
    Ok(())
}

/// Copies `src` rows into `dst` at `dst_pitch` stride. Returns bytes written;
/// stops at the first row missing from either side.
pub fn copy_rows(src: &ImageData, dst: &mut [u8], dst_pitch: usize) -> usize {
    let row = src.row_bytes().min(dst_pitch);
    let mut written = 0;
    for y in 0..src.height as usize {
        let from = y * src.row_pitch;
        let at = y * dst_pitch;
        let (Some(input), Some(out)) = (src.pixels.get(from..from + row), dst.get_mut(at..at + row))
        else {
            break;
        };
        out.copy_from_slice(input);
        written += row;
    }
    written
}

/// Tightly packed copy of a pitched RGBA8 region.
pub fn read_rows(src: &[u8], src_pitch: usize, width: u32, height: u32) -> Vec<u8> {
    let row = width as usize * ImageData::BYTES_PER_PIXEL;
    let mut out = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        let at = y * src_pitch;
        match src.get(at..at + row) {
            Some(r) => out.extend_from_slice(r),
            None => break,
        }
    }
    out
}

/// Image + memory (+ view and sampler once finished).
pub(crate) struct TextureImage {
    device: ash::Device,
    pub(crate) image: vk::Image,
    memory: vk::DeviceMemory,
    pub(crate) view: vk::ImageView,
    pub(crate) sampler: vk::Sampler,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl TextureImage {
    unsafe fn create(
        ctx: &DeviceContext,
        width: u32,
        height: u32,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
        wanted: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let mut tex = TextureImage {
            device: ctx.device.clone(),
            image: vk::Image::null(),
            memory: vk::DeviceMemory::null(),
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            width,
            height,
        };
        let ci = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format: TEXTURE_FORMAT,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::PREINITIALIZED,
            ..Default::default()
        };
        tex.image = ctx
            .device
            .create_image(&ci, None)
            .context("create_image(texture)")?;
        (tex.memory, _) =
            memory::allocate_for_image(&ctx.device, &ctx.memory_props, tex.image, wanted)?;
        Ok(tex)
    }

    /// Writes pixels through a mapping, honouring the driver's row pitch.
    unsafe fn upload(&self, src: &ImageData) -> Result<()> {
        let sub = vk::ImageSubresource {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            array_layer: 0,
        };
        let layout = self.device.get_image_subresource_layout(self.image, sub);
        let ptr = self
            .device
            .map_memory(self.memory, layout.offset, layout.size, vk::MemoryMapFlags::empty())
            .context("map_memory(texture)")?;
        let dst = std::slice::from_raw_parts_mut(ptr.cast::<u8>(), layout.size as usize);
        let written = copy_rows(src, dst, layout.row_pitch as usize);
        let expected = src.row_bytes() * src.height as usize;
        if written != expected {
            warn!(
                "texture upload copied {written} of {expected} bytes ({}x{})",
                src.width, src.height
            );
        }
        self.device.unmap_memory(self.memory);
        debug!(
            "uploaded {}x{} texture, row pitch {}",
            src.width, src.height, layout.row_pitch
        );
        Ok(())
    }

    unsafe fn finish(&mut self) -> Result<()> {
        let sampler_ci = vk::SamplerCreateInfo {
            s_type: vk::StructureType::SAMPLER_CREATE_INFO,
            mag_filter: vk::Filter::NEAREST,
            min_filter: vk::Filter::NEAREST,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
            address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_w: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            anisotropy_enable: vk::FALSE,
            max_anisotropy: 1.0,
            compare_op: vk::CompareOp::NEVER,
            border_color: vk::BorderColor::FLOAT_OPAQUE_WHITE,
            unnormalized_coordinates: vk::FALSE,
            ..Default::default()
        };
        self.sampler = self
            .device
            .create_sampler(&sampler_ci, None)
            .context("create_sampler")?;
        let view_ci = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image: self.image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: TEXTURE_FORMAT,
            components: vk::ComponentMapping {
                r: vk::ComponentSwizzle::R,
                g: vk::ComponentSwizzle::G,
                b: vk::ComponentSwizzle::B,
                a: vk::ComponentSwizzle::A,
            },
            subresource_range: subresource_range(vk::ImageAspectFlags::COLOR),
            ..Default::default()
        };
        self.view = self
            .device
            .create_image_view(&view_ci, None)
            .context("create_image_view(texture)")?;
        Ok(())
    }
}

impl Drop for TextureImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_sampler(self.sampler, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// The cube's sampled texture, in `SHADER_READ_ONLY_OPTIMAL` once setup
/// commands are flushed.
pub(crate) struct Texture {
    pub(crate) image: TextureImage,
    pub(crate) path: UploadPath,
}

impl Texture {
    pub(crate) fn descriptor(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.image.sampler,
            image_view: self.image.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    pub(crate) unsafe fn prepare(
        ctx: &DeviceContext,
        init: &mut InitCommands<'_>,
        src: &ImageData,
        force_staging: bool,
    ) -> Result<Self> {
        check_source(src)?;
        let path = choose_upload_path(ctx.format_properties(TEXTURE_FORMAT), force_staging)?;
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        let mut image = match path {
            UploadPath::Linear => {
                let tex = TextureImage::create(
                    ctx,
                    src.width,
                    src.height,
                    vk::ImageTiling::LINEAR,
                    vk::ImageUsageFlags::SAMPLED,
                    host,
                )?;
                tex.upload(src)?;
                init.set_image_layout(
                    tex.image,
                    vk::ImageAspectFlags::COLOR,
                    vk::ImageLayout::PREINITIALIZED,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                )?;
                tex
            }
            UploadPath::Staged => stage_upload(&mut DeviceStaging { ctx, init }, src)?,
        };
        image.finish()?;
        info!(
            "texture {}x{} ready via {:?} upload",
            image.width, image.height, path
        );
        Ok(Texture { image, path })
    }
}

/// Steps of the staged path. `stage_upload` owns the ordering: the staging
/// image is released after the flushed copy, and on every error path.
pub(crate) trait StagedUpload {
    type Image;

    /// Creates the host-visible linear image and fills it from `src`.
    fn create_staging(&mut self, src: &ImageData) -> Result<Self::Image>;
    fn create_target(&mut self, width: u32, height: u32) -> Result<Self::Image>;
    fn record_copy(&mut self, staging: &Self::Image, target: &Self::Image) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

pub(crate) fn stage_upload<U: StagedUpload>(up: &mut U, src: &ImageData) -> Result<U::Image> {
    let staging = up.create_staging(src)?;
    let target = up.create_target(src.width, src.height)?;
    up.record_copy(&staging, &target)?;
    up.flush()?;
    drop(staging);
    Ok(target)
}

struct DeviceStaging<'s, 'a> {
    ctx: &'s DeviceContext,
    init: &'s mut InitCommands<'a>,
}

impl StagedUpload for DeviceStaging<'_, '_> {
    type Image = TextureImage;

    fn create_staging(&mut self, src: &ImageData) -> Result<TextureImage> {
        unsafe {
            let staging = TextureImage::create(
                self.ctx,
                src.width,
                src.height,
                vk::ImageTiling::LINEAR,
                vk::ImageUsageFlags::TRANSFER_SRC,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            staging.upload(src)?;
            Ok(staging)
        }
    }

    fn create_target(&mut self, width: u32, height: u32) -> Result<TextureImage> {
        unsafe {
            TextureImage::create(
                self.ctx,
                width,
                height,
                vk::ImageTiling::OPTIMAL,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )
        }
    }

    fn record_copy(&mut self, staging: &TextureImage, target: &TextureImage) -> Result<()> {
        unsafe { record_staged_copy(self.init, staging, target) }
    }

    fn flush(&mut self) -> Result<()> {
        unsafe { self.init.flush() }
    }
}

unsafe fn record_staged_copy(
    init: &mut InitCommands<'_>,
    staging: &TextureImage,
    target: &TextureImage,
) -> Result<()> {
    let color = vk::ImageAspectFlags::COLOR;
    init.set_image_layout(
        staging.image,
        color,
        vk::ImageLayout::PREINITIALIZED,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    )?;
    init.set_image_layout(
        target.image,
        color,
        vk::ImageLayout::PREINITIALIZED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    )?;
    let layers = vk::ImageSubresourceLayers {
        aspect_mask: color,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };
    let region = vk::ImageCopy {
        src_subresource: layers,
        src_offset: vk::Offset3D::default(),
        dst_subresource: layers,
        dst_offset: vk::Offset3D::default(),
        extent: vk::Extent3D {
            width: staging.width,
            height: staging.height,
            depth: 1,
        },
    };
    let cmd = init.cmd()?;
    init.device().cmd_copy_image(
        cmd,
        staging.image,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        target.image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        &[region],
    );
    init.set_image_layout(
        target.image,
        color,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )
}
