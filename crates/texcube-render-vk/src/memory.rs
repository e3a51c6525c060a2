// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;

use crate::error::VkError;

/// First memory type allowed by `type_bits` whose flags contain `wanted`.
pub fn find_memory_type_index(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    wanted: vk::MemoryPropertyFlags,
) -> std::result::Result<u32, VkError> {
    let count = props.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);
    (0..count)
        .find(|&i| {
            type_bits & (1 << i) != 0
                && props.memory_types[i as usize]
                    .property_flags
                    .contains(wanted)
        })
        .ok_or(VkError::NoMemoryType { type_bits, wanted })
}

/// Allocation info for `req` in the first memory type that has `wanted`.
pub(crate) fn allocate_info(
    props: &vk::PhysicalDeviceMemoryProperties,
    req: vk::MemoryRequirements,
    wanted: vk::MemoryPropertyFlags,
) -> std::result::Result<vk::MemoryAllocateInfo<'static>, VkError> {
    let memory_type_index = find_memory_type_index(props, req.memory_type_bits, wanted)?;
    Ok(vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index,
        ..Default::default()
    })
}

/// Allocates and binds memory for `image`; the memory is freed if the bind fails.
pub(crate) unsafe fn allocate_for_image(
    device: &ash::Device,
    props: &vk::PhysicalDeviceMemoryProperties,
    image: vk::Image,
    wanted: vk::MemoryPropertyFlags,
) -> Result<(vk::DeviceMemory, vk::DeviceSize)> {
    let mai = allocate_info(props, device.get_image_memory_requirements(image), wanted)?;
    let mem = device.allocate_memory(&mai, None).context("allocate_memory(image)")?;
    if let Err(e) = device.bind_image_memory(image, mem, 0) {
        device.free_memory(mem, None);
        return Err(e).context("bind_image_memory");
    }
    Ok((mem, mai.allocation_size))
}

/// Allocates and binds memory for `buffer`; the memory is freed if the bind fails.
pub(crate) unsafe fn allocate_for_buffer(
    device: &ash::Device,
    props: &vk::PhysicalDeviceMemoryProperties,
    buffer: vk::Buffer,
    wanted: vk::MemoryPropertyFlags,
) -> Result<(vk::DeviceMemory, vk::DeviceSize)> {
    let mai = allocate_info(props, device.get_buffer_memory_requirements(buffer), wanted)?;
    let mem = device
        .allocate_memory(&mai, None)
        .context("allocate_memory(buffer)")?;
    if let Err(e) = device.bind_buffer_memory(buffer, mem, 0) {
        device.free_memory(mem, None);
        return Err(e).context("bind_buffer_memory");
    }
    Ok((mem, mai.allocation_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut p = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, &f) in types.iter().enumerate() {
            p.memory_types[i] = vk::MemoryType {
                property_flags: f,
                heap_index: 0,
            };
        }
        p
    }

    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_VISIBLE;
    const LOCAL: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;

    #[test]
    fn picks_first_type_matching_mask_and_flags() {
        let p = props(&[LOCAL, HOST, HOST | vk::MemoryPropertyFlags::HOST_COHERENT]);
        assert_eq!(find_memory_type_index(&p, 0b111, HOST).unwrap(), 1);
        assert_eq!(find_memory_type_index(&p, 0b100, HOST).unwrap(), 2);
        assert_eq!(find_memory_type_index(&p, 0b111, LOCAL).unwrap(), 0);
    }

    #[test]
    fn superset_flags_satisfy_request() {
        let p = props(&[LOCAL | HOST | vk::MemoryPropertyFlags::HOST_COHERENT]);
        assert_eq!(find_memory_type_index(&p, 1, HOST).unwrap(), 0);
    }

    #[test]
    fn no_match_is_an_error() {
        let p = props(&[LOCAL, LOCAL]);
        let err = find_memory_type_index(&p, 0b11, HOST).unwrap_err();
        assert!(matches!(err, VkError::NoMemoryType { type_bits: 0b11, .. }));
        // masked-out types never count
        let p = props(&[HOST]);
        assert!(find_memory_type_index(&p, 0b10, HOST).is_err());
    }

    #[test]
    fn same_inputs_same_answer() {
        let p = props(&[LOCAL, HOST, HOST]);
        let a = find_memory_type_index(&p, 0b110, HOST).unwrap();
        for _ in 0..8 {
            assert_eq!(find_memory_type_index(&p, 0b110, HOST).unwrap(), a);
        }
    }

    #[test]
    fn allocation_covers_requirements_in_the_chosen_type() {
        let p = props(&[LOCAL, HOST | vk::MemoryPropertyFlags::HOST_COHERENT]);
        let req = vk::MemoryRequirements {
            size: 4864,
            alignment: 256,
            memory_type_bits: 0b11,
        };
        let mai = allocate_info(&p, req, HOST).unwrap();
        assert_eq!(mai.allocation_size, 4864);
        assert_eq!(mai.memory_type_index, 1);
        assert!(allocate_info(&p, vk::MemoryRequirements { memory_type_bits: 0b01, ..req }, HOST)
            .is_err());
    }
}
