// SPDX-License-Identifier: CEPL-1.0
//! Texture and shader inputs for the renderer.

use std::path::Path;

use anyhow::{Context, Result};
use texcube_render::{CubeAssets, ImageData};
use texcube_render_vk::shaders::{CUBE_FRAG_SPV, CUBE_VERT_SPV};
use tracing::{debug, info};

pub const CHECKER_SIZE: u32 = 256;
const CHECKER_CELL: u32 = 32;
const CHECKER_DARK: [u8; 4] = [0x30, 0x30, 0x38, 0xff];
const CHECKER_LIGHT: [u8; 4] = [0xd0, 0xd0, 0xc8, 0xff];

/// Decodes any format the `image` crate was built with into packed RGBA8.
pub fn load_texture(path: &Path) -> Result<ImageData> {
    let rgba = image::open(path)
        .with_context(|| format!("decoding texture {}", path.display()))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    info!("loaded texture {}x{} from {}", width, height, path.display());
    ImageData::from_rgba8(width, height, rgba.into_raw())
}

pub fn checkerboard(size: u32, cell: u32) -> ImageData {
    let cell = cell.max(1);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let light = ((x / cell) + (y / cell)) % 2 == 0;
            pixels.extend_from_slice(if light { &CHECKER_LIGHT } else { &CHECKER_DARK });
        }
    }
    ImageData {
        width: size,
        height: size,
        row_pitch: size as usize * ImageData::BYTES_PER_PIXEL,
        pixels,
    }
}

/// An explicit texture path must decode; without one the checkerboard is used.
pub fn cube_assets(texture: Option<&Path>) -> Result<CubeAssets> {
    let texture = match texture {
        Some(p) => load_texture(p)?,
        None => {
            debug!("no texture configured; using a {CHECKER_SIZE}px checkerboard");
            checkerboard(CHECKER_SIZE, CHECKER_CELL)
        }
    };
    Ok(CubeAssets {
        vertex_spv: CUBE_VERT_SPV.to_vec(),
        fragment_spv: CUBE_FRAG_SPV.to_vec(),
        texture,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(img: &ImageData, x: u32, y: u32) -> &[u8] {
        let off = y as usize * img.row_pitch + x as usize * 4;
        &img.pixels[off..off + 4]
    }

    #[test]
    fn checkerboard_alternates_cells() {
        let img = checkerboard(8, 2);
        assert_eq!(img.pixels.len(), 8 * 8 * 4);
        assert_eq!(img.row_pitch, 32);
        assert_eq!(pixel(&img, 0, 0), CHECKER_LIGHT);
        assert_eq!(pixel(&img, 2, 0), CHECKER_DARK);
        assert_eq!(pixel(&img, 2, 2), CHECKER_LIGHT);
        assert_eq!(pixel(&img, 1, 3), CHECKER_DARK);
    }

    #[test]
    fn zero_cell_does_not_divide_by_zero() {
        let img = checkerboard(4, 0);
        assert_eq!(pixel(&img, 0, 0), CHECKER_LIGHT);
        assert_eq!(pixel(&img, 1, 0), CHECKER_DARK);
    }

    #[test]
    fn default_assets_carry_shaders_and_checkerboard() {
        let a = cube_assets(None).unwrap();
        assert_eq!(a.texture.width, CHECKER_SIZE);
        assert!(!a.vertex_spv.is_empty());
        assert!(!a.fragment_spv.is_empty());
    }

    #[test]
    fn missing_texture_is_an_error() {
        let err = cube_assets(Some(Path::new("no/such/texture.png"))).unwrap_err();
        assert!(format!("{err:#}").contains("no/such/texture.png"));
    }

    #[test]
    fn decoded_png_is_packed_rgba() {
        let dir = std::env::temp_dir().join("texcube-assets-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tiny.png");
        let mut buf = image::RgbaImage::new(3, 2);
        buf.put_pixel(2, 1, image::Rgba([1, 2, 3, 4]));
        buf.save(&path).unwrap();

        let img = load_texture(&path).unwrap();
        assert_eq!((img.width, img.height, img.row_pitch), (3, 2, 12));
        assert_eq!(pixel(&img, 2, 1), [1, 2, 3, 4]);
    }
}
