// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, CStr};

use anyhow::{anyhow, Context, Result};
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, info, warn};

use crate::debug::{DebugMessenger, VALIDATION_LAYER};
use crate::error::VkError;
use crate::probe::{self, DeviceReport};

/// Instance, surface and the single graphics+present queue. Outlives every
/// other GPU object; dropped last.
pub struct DeviceContext {
    pub(crate) entry: Entry,
    pub(crate) instance: Instance,
    debug: Option<DebugMessenger>,
    pub(crate) surface_loader: surface::Instance,
    pub(crate) surface: vk::SurfaceKHR,
    pub(crate) phys: vk::PhysicalDevice,
    pub(crate) props: vk::PhysicalDeviceProperties,
    pub(crate) memory_props: vk::PhysicalDeviceMemoryProperties,
    pub(crate) device: ash::Device,
    pub(crate) queue_family: u32,
    pub(crate) queue: vk::Queue,
    pub(crate) swapchain_loader: swapchain::Device,
}

fn has_name(list: &[String], name: &CStr) -> bool {
    let name = name.to_string_lossy();
    list.iter().any(|n| *n == name)
}

unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    validation: bool,
) -> Result<(Instance, bool)> {
    let available_exts = probe::list_instance_extensions(entry)?;
    let available_layers = probe::list_instance_layers(entry)?;
    debug!("instance extensions: {available_exts:?}");
    debug!("instance layers: {available_layers:?}");

    let mut exts: Vec<*const c_char> = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();

    let with_layer = validation && has_name(&available_layers, VALIDATION_LAYER);
    let with_debug = validation && has_name(&available_exts, ash::ext::debug_utils::NAME);
    if validation && !with_layer {
        warn!("validation requested but {VALIDATION_LAYER:?} is not installed");
    }
    if with_debug {
        exts.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    let layers: Vec<*const c_char> = if with_layer {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let app_name = c"texcube";
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app_name.as_ptr(),
        application_version: 0,
        p_engine_name: app_name.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };
    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };
    let instance = entry
        .create_instance(&create_info, None)
        .context("create_instance")?;
    Ok((instance, with_debug))
}

/// First device with a shared graphics+present family and `VK_KHR_swapchain`.
unsafe fn pick_device_and_queue(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32)> {
    let devices = instance
        .enumerate_physical_devices()
        .context("enumerate_physical_devices")?;
    let mut last_err = VkError::NoPhysicalDevice;
    for phys in devices {
        let exts = probe::list_device_extensions(instance, phys)?;
        if !has_name(&exts, swapchain::NAME) {
            continue;
        }
        let families = probe::list_queue_families(instance, phys);
        let present = probe::present_support(surface_loader, phys, surface, families.len());
        match probe::find_graphics_present_queue(&families, &present) {
            Ok(family) => return Ok((phys, family)),
            Err(e) => last_err = e,
        }
    }
    Err(last_err.into())
}

unsafe fn create_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<ash::Device> {
    let priorities = [1.0_f32];
    let qinfo = vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: queue_family,
        queue_count: 1,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
    };
    let device_exts = [swapchain::NAME.as_ptr()];
    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: 1,
        p_queue_create_infos: &qinfo,
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        ..Default::default()
    };
    instance
        .create_device(phys, &dinfo, None)
        .context("create_device")
}

impl DeviceContext {
    pub(crate) unsafe fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        validation: bool,
    ) -> Result<Self> {
        let dh = display.display_handle().map_err(|e| anyhow!("{e}"))?.as_raw();
        let wh = window.window_handle().map_err(|e| anyhow!("{e}"))?.as_raw();

        let entry = Entry::load().context("loading the Vulkan library")?;
        let (instance, with_debug) = create_instance(&entry, dh, validation)?;

        let debug = if with_debug {
            match DebugMessenger::new(&entry, &instance) {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!("debug messenger unavailable: {e:#}");
                    None
                }
            }
        } else {
            None
        };

        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = match ash_window::create_surface(&entry, &instance, dh, wh, None) {
            Ok(s) => s,
            Err(e) => {
                if let Some(d) = debug {
                    d.destroy();
                }
                instance.destroy_instance(None);
                return Err(e).context("ash_window::create_surface");
            }
        };

        let picked = pick_device_and_queue(&instance, &surface_loader, surface).and_then(
            |(phys, family)| Ok((phys, family, create_device(&instance, phys, family)?)),
        );
        let (phys, queue_family, device) = match picked {
            Ok(v) => v,
            Err(e) => {
                surface_loader.destroy_surface(surface, None);
                if let Some(d) = debug {
                    d.destroy();
                }
                instance.destroy_instance(None);
                return Err(e);
            }
        };

        let props = instance.get_physical_device_properties(phys);
        let memory_props = instance.get_physical_device_memory_properties(phys);
        let queue = device.get_device_queue(queue_family, 0);
        let swapchain_loader = swapchain::Device::new(&instance, &device);

        info!(
            "using {:?} (queue family {queue_family}, {} memory types)",
            props.device_name_as_c_str().unwrap_or(c"?"),
            memory_props.memory_type_count
        );

        Ok(DeviceContext {
            entry,
            instance,
            debug,
            surface_loader,
            surface,
            phys,
            props,
            memory_props,
            device,
            queue_family,
            queue,
            swapchain_loader,
        })
    }

    pub(crate) unsafe fn report(&self) -> Result<DeviceReport> {
        DeviceReport::collect(
            &self.entry,
            &self.instance,
            &self.surface_loader,
            self.surface,
            self.phys,
        )
    }

    pub(crate) unsafe fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        self.instance
            .get_physical_device_format_properties(self.phys, format)
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);
            if let Some(d) = self.debug.take() {
                d.destroy();
            }
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}
