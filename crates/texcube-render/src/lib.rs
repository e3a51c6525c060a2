// SPDX-License-Identifier: CEPL-1.0
use anyhow::{ensure, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

/// Decoded RGBA8 pixels. `row_pitch` is the byte stride of one source row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub row_pitch: usize,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Tightly packed rows.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let row_pitch = width as usize * Self::BYTES_PER_PIXEL;
        ensure!(
            pixels.len() == row_pitch * height as usize,
            "rgba8 buffer is {} bytes, expected {} for {}x{}",
            pixels.len(),
            row_pitch * height as usize,
            width,
            height
        );
        Ok(ImageData {
            width,
            height,
            row_pitch,
            pixels,
        })
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * Self::BYTES_PER_PIXEL
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.row_pitch;
        &self.pixels[start..start + self.row_bytes()]
    }
}

/// Everything the renderer loads from outside: SPIR-V blobs and the texture.
#[derive(Clone, Debug)]
pub struct CubeAssets {
    pub vertex_spv: Vec<u8>,
    pub fragment_spv: Vec<u8>,
    pub texture: ImageData,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderOptions {
    pub clear_color: [f32; 4],
    pub use_staging: bool,
    /// Degrees added to the spin angle every frame.
    pub spin_increment: f32,
    pub validation: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            clear_color: [0.2, 0.2, 0.2, 0.2],
            use_staging: false,
            spin_increment: 0.01,
            validation: cfg!(debug_assertions),
        }
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        assets: &CubeAssets,
        opts: RenderOptions,
    ) -> Result<Self>
    where
        Self: Sized;

    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self) -> Result<()>;
    fn set_clear_color(&mut self, rgba: [f32; 4]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_rgba_has_four_byte_pixels() {
        let img = ImageData::from_rgba8(3, 2, vec![7; 24]).unwrap();
        assert_eq!(img.row_pitch, 12);
        assert_eq!(img.row(1), &[7; 12]);
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert!(ImageData::from_rgba8(4, 4, vec![0; 10]).is_err());
    }

    #[test]
    fn padded_rows_skip_the_padding() {
        let mut pixels = vec![1, 2, 3, 4, 0xee, 0xee];
        pixels.extend_from_slice(&[5, 6, 7, 8, 0xee, 0xee]);
        let img = ImageData {
            width: 1,
            height: 2,
            row_pitch: 6,
            pixels,
        };
        assert_eq!(img.row(1), &[5, 6, 7, 8]);
    }
}
