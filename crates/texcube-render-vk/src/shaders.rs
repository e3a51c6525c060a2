// SPDX-License-Identifier: CEPL-1.0
//! SPIR-V compiled by the build script.

pub const CUBE_VERT_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/cube.vert.spv"));
pub const CUBE_FRAG_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/cube.frag.spv"));
