// SPDX-License-Identifier: CEPL-1.0
use std::mem::{offset_of, size_of};

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use tracing::warn;

use crate::context::DeviceContext;
use crate::memory;

pub const CUBE_VERTICES: usize = 12 * 3;

/// Six faces, two clockwise triangles each.
#[rustfmt::skip]
pub const CUBE_POSITIONS: [[f32; 3]; CUBE_VERTICES] = [
    [-1.0, -1.0, -1.0], [-1.0, -1.0,  1.0], [-1.0,  1.0,  1.0], // -X
    [-1.0,  1.0,  1.0], [-1.0,  1.0, -1.0], [-1.0, -1.0, -1.0],
    [-1.0, -1.0, -1.0], [ 1.0,  1.0, -1.0], [ 1.0, -1.0, -1.0], // -Z
    [-1.0, -1.0, -1.0], [-1.0,  1.0, -1.0], [ 1.0,  1.0, -1.0],
    [-1.0, -1.0, -1.0], [ 1.0, -1.0, -1.0], [ 1.0, -1.0,  1.0], // -Y
    [-1.0, -1.0, -1.0], [ 1.0, -1.0,  1.0], [-1.0, -1.0,  1.0],
    [-1.0,  1.0, -1.0], [-1.0,  1.0,  1.0], [ 1.0,  1.0,  1.0], // +Y
    [-1.0,  1.0, -1.0], [ 1.0,  1.0,  1.0], [ 1.0,  1.0, -1.0],
    [ 1.0,  1.0, -1.0], [ 1.0,  1.0,  1.0], [ 1.0, -1.0,  1.0], // +X
    [ 1.0, -1.0,  1.0], [ 1.0, -1.0, -1.0], [ 1.0,  1.0, -1.0],
    [-1.0,  1.0,  1.0], [-1.0, -1.0,  1.0], [ 1.0,  1.0,  1.0], // +Z
    [-1.0, -1.0,  1.0], [ 1.0, -1.0,  1.0], [ 1.0,  1.0,  1.0],
];

#[rustfmt::skip]
pub const CUBE_UVS: [[f32; 2]; CUBE_VERTICES] = [
    [0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0], // -X
    [1.0, 0.0], [0.0, 1.0], [0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], // -Z
    [1.0, 1.0], [1.0, 0.0], [0.0, 0.0], [1.0, 1.0], [0.0, 0.0], [0.0, 1.0], // -Y
    [1.0, 1.0], [0.0, 1.0], [0.0, 0.0], [1.0, 1.0], [0.0, 0.0], [1.0, 0.0], // +Y
    [1.0, 1.0], [0.0, 1.0], [0.0, 0.0], [0.0, 0.0], [1.0, 0.0], [1.0, 1.0], // +X
    [0.0, 1.0], [0.0, 0.0], [1.0, 1.0], [0.0, 0.0], [1.0, 0.0], [1.0, 1.0], // +Z
];

/// std140 block read by the vertex shader: the MVP followed by per-vertex
/// position (w = 1) and texcoord (zw = 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CubeUniform {
    pub mvp: [[f32; 4]; 4],
    pub position: [[f32; 4]; CUBE_VERTICES],
    pub attr: [[f32; 4]; CUBE_VERTICES],
}

impl CubeUniform {
    pub const SIZE: usize = size_of::<CubeUniform>();
    pub const MVP_SIZE: usize = size_of::<[[f32; 4]; 4]>();

    pub fn new(mvp: [[f32; 4]; 4]) -> Self {
        let mut u = CubeUniform::zeroed();
        u.mvp = mvp;
        for i in 0..CUBE_VERTICES {
            let [x, y, z] = CUBE_POSITIONS[i];
            let [s, t] = CUBE_UVS[i];
            u.position[i] = [x, y, z, 1.0];
            u.attr[i] = [s, t, 0.0, 0.0];
        }
        u
    }
}

const _: () = assert!(offset_of!(CubeUniform, position) == 64);

/// Host-visible uniform buffer; geometry written once, MVP every frame.
pub(crate) struct UniformResource {
    device: ash::Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    /// Bytes mapped on every write; the whole block.
    range: vk::DeviceSize,
    pub(crate) info: vk::DescriptorBufferInfo,
}

/// Copies as much of `src` as fits at the front of `dst`.
pub fn copy_prefix(dst: &mut [u8], src: &[u8]) -> usize {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
    n
}

unsafe fn write_bytes(
    device: &ash::Device,
    memory: vk::DeviceMemory,
    range: vk::DeviceSize,
    bytes: &[u8],
    what: &str,
) -> Result<()> {
    let ptr = device
        .map_memory(memory, 0, range, vk::MemoryMapFlags::empty())
        .context("map_memory(uniform)")?;
    let dst = std::slice::from_raw_parts_mut(ptr.cast::<u8>(), range as usize);
    let n = copy_prefix(dst, bytes);
    if n != bytes.len() {
        warn!("copied {n} of {} bytes of {what}", bytes.len());
    }
    device.unmap_memory(memory);
    Ok(())
}

impl UniformResource {
    pub(crate) unsafe fn new(ctx: &DeviceContext, mvp: [[f32; 4]; 4]) -> Result<Self> {
        let data = CubeUniform::new(mvp);
        let size = CubeUniform::SIZE as vk::DeviceSize;

        let mut u = UniformResource {
            device: ctx.device.clone(),
            buffer: vk::Buffer::null(),
            memory: vk::DeviceMemory::null(),
            range: size,
            info: vk::DescriptorBufferInfo::default(),
        };
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        u.buffer = ctx
            .device
            .create_buffer(&bci, None)
            .context("create_buffer(uniform)")?;
        (u.memory, _) = memory::allocate_for_buffer(
            &ctx.device,
            &ctx.memory_props,
            u.buffer,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        write_bytes(&ctx.device, u.memory, u.range, bytemuck::bytes_of(&data), "uniform data")?;

        u.info = vk::DescriptorBufferInfo {
            buffer: u.buffer,
            offset: 0,
            range: size,
        };
        Ok(u)
    }

    /// Rewrites only the leading matrix.
    pub(crate) unsafe fn write_mvp(&self, mvp: &[[f32; 4]; 4]) -> Result<()> {
        write_bytes(&self.device, self.memory, self.range, bytemuck::bytes_of(mvp), "mvp")
    }
}

impl Drop for UniformResource {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_is_sixteen_plus_two_times_144_floats() {
        assert_eq!(CubeUniform::SIZE, (16 + 144 + 144) * 4);
        assert_eq!(CubeUniform::MVP_SIZE, 64);
        assert_eq!(offset_of!(CubeUniform, attr), 64 + 36 * 16);
    }

    #[test]
    fn geometry_is_homogeneous() {
        let u = CubeUniform::new([[0.0; 4]; 4]);
        assert!(u.position.iter().all(|p| p[3] == 1.0));
        assert!(u.attr.iter().all(|a| a[2] == 0.0 && a[3] == 0.0));
        assert_eq!(u.position[6], [-1.0, -1.0, -1.0, 1.0]);
        assert_eq!(u.attr[7], [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn mvp_leads_the_byte_image() {
        let mut m = [[0.0f32; 4]; 4];
        m[3][0] = 7.5;
        let u = CubeUniform::new(m);
        let bytes = bytemuck::bytes_of(&u);
        assert_eq!(&bytes[..CubeUniform::MVP_SIZE], bytemuck::bytes_of(&m));
    }

    #[test]
    fn every_face_spans_the_unit_cube() {
        for face in CUBE_POSITIONS.chunks(6) {
            let fixed = (0..3).find(|&a| face.iter().all(|p| p[a] == face[0][a]));
            assert!(fixed.is_some(), "face not planar: {face:?}");
        }
    }

    #[test]
    fn short_mapping_copies_only_what_fits() {
        let block = bytemuck::bytes_of(&CubeUniform::new([[1.0; 4]; 4])).to_vec();
        let mut mapped = vec![0u8; CubeUniform::MVP_SIZE];
        assert_eq!(copy_prefix(&mut mapped, &block), CubeUniform::MVP_SIZE);
        assert_eq!(mapped, block[..CubeUniform::MVP_SIZE]);
    }

    #[test]
    fn mvp_write_leaves_geometry_bytes_alone() {
        let mut mapped = bytemuck::bytes_of(&CubeUniform::new([[0.0; 4]; 4])).to_vec();
        let geometry = mapped[CubeUniform::MVP_SIZE..].to_vec();
        let mvp = [[2.0f32; 4]; 4];
        assert_eq!(copy_prefix(&mut mapped, bytemuck::bytes_of(&mvp)), 64);
        assert_eq!(&mapped[..64], bytemuck::bytes_of(&mvp));
        assert_eq!(mapped[CubeUniform::MVP_SIZE..], geometry[..]);
    }
}
