// SPDX-License-Identifier: CEPL-1.0
//! Capability queries. The choosing functions are pure over plain
//! property structs; the `list_*` helpers only call enumerate entry points.

use std::fmt;

use anyhow::{Context, Result};
use ash::khr::surface;
use ash::{vk, Entry, Instance};
use texcube_render::RenderSize;

use crate::error::VkError;

pub const COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// A single family that does both graphics and present, or why there is none.
pub fn find_graphics_present_queue(
    families: &[vk::QueueFamilyProperties],
    supports_present: &[bool],
) -> std::result::Result<u32, VkError> {
    if families.is_empty() {
        return Err(VkError::NoQueueFamilies);
    }
    let presents = |i: usize| supports_present.get(i).copied().unwrap_or(false);
    let graphics = |i: usize| {
        families[i].queue_count > 0 && families[i].queue_flags.contains(vk::QueueFlags::GRAPHICS)
    };

    if let Some(i) = (0..families.len()).find(|&i| graphics(i) && presents(i)) {
        return Ok(i as u32);
    }
    let g = (0..families.len())
        .find(|&i| graphics(i))
        .ok_or(VkError::NoGraphicsQueue)?;
    let p = (0..families.len())
        .find(|&i| presents(i))
        .ok_or(VkError::NoPresentQueue)?;
    Err(VkError::SeparateQueues {
        graphics: g as u32,
        present: p as u32,
    })
}

pub fn pick_format(
    formats: &[vk::SurfaceFormatKHR],
) -> std::result::Result<vk::SurfaceFormatKHR, VkError> {
    match formats {
        [] => Err(VkError::NoSurfaceFormats),
        // A lone UNDEFINED entry means the surface has no preference.
        [only] if only.format == vk::Format::UNDEFINED => Ok(vk::SurfaceFormatKHR {
            format: COLOR_FORMAT,
            color_space: only.color_space,
        }),
        _ => formats
            .iter()
            .copied()
            .find(|f| f.format == COLOR_FORMAT)
            .ok_or(VkError::UnsupportedSurfaceFormat),
    }
}

/// Mailbox, then immediate, then FIFO (always available).
pub fn pick_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// `min_image_count + 1`, clamped to `max_image_count` when that is non-zero.
pub fn negotiate_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

/// The surface's own extent wins unless it reports the undefined sentinel.
pub fn resolve_extent(caps: &vk::SurfaceCapabilitiesKHR, desired: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: desired.width.clamp(
            caps.min_image_extent.width,
            caps.max_image_extent.width.max(caps.min_image_extent.width),
        ),
        height: desired.height.clamp(
            caps.min_image_extent.height,
            caps.max_image_extent.height.max(caps.min_image_extent.height),
        ),
    }
}

fn pick_pre_transform(caps: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    }
}

fn pick_composite_alpha(caps: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|&a| caps.supported_composite_alpha.contains(a))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Everything the swapchain create-info needs, decided up front.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainPlan {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

impl SwapchainPlan {
    pub fn negotiate(
        caps: &vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        modes: &[vk::PresentModeKHR],
        desired: RenderSize,
    ) -> std::result::Result<Self, VkError> {
        Ok(SwapchainPlan {
            surface_format: pick_format(formats)?,
            present_mode: pick_present_mode(modes),
            extent: resolve_extent(caps, desired),
            image_count: negotiate_image_count(caps),
            pre_transform: pick_pre_transform(caps),
            composite_alpha: pick_composite_alpha(caps),
        })
    }

    pub(crate) unsafe fn query(
        surface_loader: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        desired: RenderSize,
    ) -> Result<Self> {
        let caps = surface_loader
            .get_physical_device_surface_capabilities(phys, surface)
            .context("get_physical_device_surface_capabilities")?;
        let formats = surface_loader
            .get_physical_device_surface_formats(phys, surface)
            .context("get_physical_device_surface_formats")?;
        let modes = surface_loader
            .get_physical_device_surface_present_modes(phys, surface)
            .context("get_physical_device_surface_present_modes")?;
        Ok(Self::negotiate(&caps, &formats, &modes, desired)?)
    }
}

pub unsafe fn list_instance_extensions(entry: &Entry) -> Result<Vec<String>> {
    let props = entry
        .enumerate_instance_extension_properties(None)
        .context("enumerate_instance_extension_properties")?;
    Ok(props
        .iter()
        .filter_map(|p| p.extension_name_as_c_str().ok())
        .map(|n| n.to_string_lossy().into_owned())
        .collect())
}

pub unsafe fn list_instance_layers(entry: &Entry) -> Result<Vec<String>> {
    let props = entry
        .enumerate_instance_layer_properties()
        .context("enumerate_instance_layer_properties")?;
    Ok(props
        .iter()
        .filter_map(|p| p.layer_name_as_c_str().ok())
        .map(|n| n.to_string_lossy().into_owned())
        .collect())
}

pub unsafe fn list_device_extensions(
    instance: &Instance,
    phys: vk::PhysicalDevice,
) -> Result<Vec<String>> {
    let props = instance
        .enumerate_device_extension_properties(phys)
        .context("enumerate_device_extension_properties")?;
    Ok(props
        .iter()
        .filter_map(|p| p.extension_name_as_c_str().ok())
        .map(|n| n.to_string_lossy().into_owned())
        .collect())
}

pub unsafe fn list_queue_families(
    instance: &Instance,
    phys: vk::PhysicalDevice,
) -> Vec<vk::QueueFamilyProperties> {
    instance.get_physical_device_queue_family_properties(phys)
}

/// Per-family present support against `surface`; query failures read as "no".
pub(crate) unsafe fn present_support(
    surface_loader: &surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    family_count: usize,
) -> Vec<bool> {
    (0..family_count as u32)
        .map(|i| {
            surface_loader
                .get_physical_device_surface_support(phys, i, surface)
                .unwrap_or(false)
        })
        .collect()
}

/// Human-readable snapshot of what the selected device and surface offer.
#[derive(Clone, Debug, Default)]
pub struct DeviceReport {
    pub device_name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub driver_version: u32,
    pub vendor_id: u32,
    pub device_id: u32,
    pub instance_extensions: Vec<String>,
    pub instance_layers: Vec<String>,
    pub device_extensions: Vec<String>,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub memory_types: Vec<vk::MemoryType>,
    pub memory_heaps: Vec<vk::MemoryHeap>,
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl DeviceReport {
    pub(crate) unsafe fn collect(
        entry: &Entry,
        instance: &Instance,
        surface_loader: &surface::Instance,
        surface: vk::SurfaceKHR,
        phys: vk::PhysicalDevice,
    ) -> Result<Self> {
        let props = instance.get_physical_device_properties(phys);
        let mem = instance.get_physical_device_memory_properties(phys);
        Ok(DeviceReport {
            device_name: props
                .device_name_as_c_str()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            device_type: props.device_type,
            api_version: props.api_version,
            driver_version: props.driver_version,
            vendor_id: props.vendor_id,
            device_id: props.device_id,
            instance_extensions: list_instance_extensions(entry)?,
            instance_layers: list_instance_layers(entry)?,
            device_extensions: list_device_extensions(instance, phys)?,
            queue_families: list_queue_families(instance, phys),
            memory_types: mem.memory_types_as_slice().to_vec(),
            memory_heaps: mem.memory_heaps_as_slice().to_vec(),
            surface_formats: surface_loader
                .get_physical_device_surface_formats(phys, surface)
                .context("get_physical_device_surface_formats")?,
            present_modes: surface_loader
                .get_physical_device_surface_present_modes(phys, surface)
                .context("get_physical_device_surface_present_modes")?,
        })
    }
}

fn version_string(v: u32) -> String {
    format!(
        "{}.{}.{}",
        vk::api_version_major(v),
        vk::api_version_minor(v),
        vk::api_version_patch(v)
    )
}

fn write_list(f: &mut fmt::Formatter<'_>, title: &str, items: &[String]) -> fmt::Result {
    writeln!(f, "{title} ({}):", items.len())?;
    for it in items {
        writeln!(f, "  {it}")?;
    }
    Ok(())
}

impl fmt::Display for DeviceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "device: {} ({:?}) vendor {:04x} id {:04x}",
            self.device_name, self.device_type, self.vendor_id, self.device_id
        )?;
        writeln!(
            f,
            "api {} driver {:#x}",
            version_string(self.api_version),
            self.driver_version
        )?;
        write_list(f, "instance extensions", &self.instance_extensions)?;
        write_list(f, "instance layers", &self.instance_layers)?;
        write_list(f, "device extensions", &self.device_extensions)?;

        writeln!(f, "queue families ({}):", self.queue_families.len())?;
        for (i, q) in self.queue_families.iter().enumerate() {
            writeln!(f, "  [{i}] {:?} x{}", q.queue_flags, q.queue_count)?;
        }
        writeln!(f, "memory types ({}):", self.memory_types.len())?;
        for (i, t) in self.memory_types.iter().enumerate() {
            writeln!(f, "  [{i}] heap {} {:?}", t.heap_index, t.property_flags)?;
        }
        writeln!(f, "memory heaps ({}):", self.memory_heaps.len())?;
        for (i, h) in self.memory_heaps.iter().enumerate() {
            writeln!(f, "  [{i}] {} MiB {:?}", h.size >> 20, h.flags)?;
        }
        writeln!(f, "surface formats ({}):", self.surface_formats.len())?;
        for s in &self.surface_formats {
            writeln!(f, "  {:?} / {:?}", s.format, s.color_space)?;
        }
        writeln!(f, "present modes ({}):", self.present_modes.len())?;
        for m in &self.present_modes {
            writeln!(f, "  {m:?}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn caps(min: u32, max: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            ..Default::default()
        }
    }

    fn rgba() -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: COLOR_FORMAT,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    const SIZE: RenderSize = RenderSize {
        width: 800,
        height: 600,
    };

    #[test]
    fn shared_family_is_preferred() {
        let fams = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER),
        ];
        assert_eq!(
            find_graphics_present_queue(&fams, &[false, true, true]).unwrap(),
            2
        );
    }

    #[test]
    fn split_graphics_and_present_is_fatal() {
        let fams = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        let err = find_graphics_present_queue(&fams, &[false, true]).unwrap_err();
        assert!(matches!(
            err,
            VkError::SeparateQueues {
                graphics: 0,
                present: 1
            }
        ));
    }

    #[test]
    fn missing_capabilities_are_named() {
        assert!(matches!(
            find_graphics_present_queue(&[], &[]),
            Err(VkError::NoQueueFamilies)
        ));
        assert!(matches!(
            find_graphics_present_queue(&[family(vk::QueueFlags::COMPUTE)], &[true]),
            Err(VkError::NoGraphicsQueue)
        ));
        assert!(matches!(
            find_graphics_present_queue(&[family(vk::QueueFlags::GRAPHICS)], &[false]),
            Err(VkError::NoPresentQueue)
        ));
    }

    #[test]
    fn format_must_be_rgba8() {
        let bgra = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(pick_format(&[bgra, rgba()]).unwrap(), rgba());
        assert!(matches!(
            pick_format(&[bgra]),
            Err(VkError::UnsupportedSurfaceFormat)
        ));
        assert!(matches!(pick_format(&[]), Err(VkError::NoSurfaceFormats)));
    }

    #[test]
    fn undefined_only_format_means_free_choice() {
        let any = vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(pick_format(&[any]).unwrap().format, COLOR_FORMAT);
    }

    #[test]
    fn present_mode_preference() {
        use vk::PresentModeKHR as M;
        assert_eq!(pick_present_mode(&[M::FIFO, M::IMMEDIATE, M::MAILBOX]), M::MAILBOX);
        assert_eq!(pick_present_mode(&[M::FIFO, M::IMMEDIATE]), M::IMMEDIATE);
        assert_eq!(pick_present_mode(&[M::FIFO_RELAXED]), M::FIFO);
        assert_eq!(pick_present_mode(&[]), M::FIFO);
    }

    #[test]
    fn image_count_is_min_plus_one_within_max() {
        assert_eq!(negotiate_image_count(&caps(2, 8, (800, 600))), 3);
        assert_eq!(negotiate_image_count(&caps(3, 3, (800, 600))), 3);
        assert_eq!(negotiate_image_count(&caps(2, 0, (800, 600))), 3);
    }

    #[test]
    fn surface_extent_overrides_request() {
        let c = caps(2, 0, (1024, 768));
        assert_eq!(
            resolve_extent(&c, SIZE),
            vk::Extent2D {
                width: 1024,
                height: 768
            }
        );
    }

    #[test]
    fn undefined_extent_takes_request() {
        let c = caps(2, 0, (u32::MAX, u32::MAX));
        assert_eq!(
            resolve_extent(&c, SIZE),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
        let huge = RenderSize {
            width: 10_000,
            height: 0,
        };
        assert_eq!(
            resolve_extent(&c, huge),
            vk::Extent2D {
                width: 4096,
                height: 1
            }
        );
    }

    #[test]
    fn mailbox_scenario_at_800x600() {
        let c = caps(2, 3, (800, 600));
        let plan = SwapchainPlan::negotiate(
            &c,
            &[rgba()],
            &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            SIZE,
        )
        .unwrap();
        assert_eq!(plan.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(plan.image_count, 3);
        assert_eq!(plan.extent.width, 800);
        assert_eq!(plan.extent.height, 600);
        assert_eq!(plan.composite_alpha, vk::CompositeAlphaFlagsKHR::OPAQUE);
    }

    #[test]
    fn negotiation_is_idempotent() {
        let c = caps(2, 0, (640, 480));
        let fmts = [rgba()];
        let modes = [vk::PresentModeKHR::FIFO];
        let a = SwapchainPlan::negotiate(&c, &fmts, &modes, SIZE).unwrap();
        let b = SwapchainPlan::negotiate(&c, &fmts, &modes, SIZE).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn report_lists_sections() {
        let r = DeviceReport {
            device_name: "Mock GPU".into(),
            instance_extensions: vec!["VK_KHR_surface".into()],
            queue_families: vec![family(vk::QueueFlags::GRAPHICS)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
            ..Default::default()
        };
        let text = r.to_string();
        assert!(text.contains("Mock GPU"));
        assert!(text.contains("instance extensions (1):\n  VK_KHR_surface"));
        assert!(text.contains("queue families (1)"));
        assert!(text.contains("FIFO"));
    }
}
