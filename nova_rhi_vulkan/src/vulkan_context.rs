/// VulkanContext - Instance, device and everything shared by the backend
///
/// Contains everything needed for GPU operations:
/// - Instance, surface and (optionally) the validation debug messenger
/// - Physical device chosen by `select_adapter`, logical device, one queue per role
/// - GPU memory allocator
///
/// Native objects created by the backend (buffers, images, pipelines...) are
/// destroyed by `VulkanBackend::drop` before this context tears down the
/// allocator, the device and the instance.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use nova_rhi::nova::device::{
    select_adapter, select_queue_families, AdapterInfo, BackendInit, QueueFamilies,
    QueueFamilyInfo, QueueRole,
};
use nova_rhi::nova::{Error, Result};
use nova_rhi::engine_error;
use nova_rhi::engine_info;
use nova_rhi::engine_warn;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;

use crate::vulkan_convert::{adapter_type_from_vk, queue_family_info};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Physical device that can drive the window, described for selection
struct Candidate {
    physical_device: vk::PhysicalDevice,
    info: AdapterInfo,
    families: Vec<QueueFamilyInfo>,
}

/// Shared Vulkan state of one backend
pub struct VulkanContext {
    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop so it is dropped BEFORE the device is destroyed
    pub allocator: ManuallyDrop<Allocator>,

    pub physical_device: vk::PhysicalDevice,

    pub adapter: AdapterInfo,

    pub families: QueueFamilies,

    /// Queue used by each role, indexed by `QueueRole::index`
    pub queues: [vk::Queue; 4],

    pub surface: vk::SurfaceKHR,

    pub surface_loader: ash::khr::surface::Instance,

    pub swapchain_loader: ash::khr::swapchain::Device,

    /// Largest anisotropy samplers may request (None = feature unavailable)
    pub max_anisotropy: Option<f32>,

    instance: ash::Instance,

    /// Kept alive for the lifetime of the instance
    _entry: ash::Entry,

    /// Debug utils loader (for validation layers)
    debug_utils_loader: Option<ash::ext::debug_utils::Instance>,

    /// Debug messenger handle
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanContext {
    /// Create instance, surface, device, queues and allocator for `init.window`
    ///
    /// # Arguments
    ///
    /// * `init` - Backend init parameters (a window is required)
    pub fn new(init: &BackendInit<'_>) -> Result<Self> {
        let config = init.config;
        let window = init.window.ok_or_else(|| {
            engine_error!("nova::vulkan", "Vulkan backend requires a window");
            Error::InitializationFailed("Vulkan backend requires a window".to_string())
        })?;

        unsafe {
            // Create Vulkan Entry
            let entry = ash::Entry::load()
                .map_err(|e| {
                    engine_error!("nova::vulkan", "Failed to load Vulkan library: {:?}", e);
                    Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
                })?;

            // Application Info
            let app_name = CString::new(config.app_name.clone())
                .map_err(|e| {
                    engine_error!("nova::vulkan", "Invalid application name: {}", e);
                    Error::InitializationFailed(format!("Invalid application name: {}", e))
                })?;
            let (major, minor, patch) = config.app_version;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, major, minor, patch))
                .engine_name(c"Nova RHI")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_2);

            // Get required extensions
            let display_handle = window.display_handle()
                .map_err(|e| {
                    engine_error!("nova::vulkan", "Failed to get display handle: {}", e);
                    Error::InitializationFailed(format!("Failed to get display handle: {}", e))
                })?;
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| {
                    engine_error!("nova::vulkan", "Failed to get required extensions: {}", e);
                    Error::InitializationFailed(format!("Failed to get required extensions: {}", e))
                })?
                .to_vec();

            let validation = cfg!(feature = "vulkan-validation")
                && config.enable_validation
                && Self::validation_layer_available(&entry);

            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }
            let layer_names = if validation {
                vec![VALIDATION_LAYER.as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| {
                    engine_error!("nova::vulkan", "Failed to create Vulkan instance: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
                })?;

            // Setup debug messenger if validation is enabled
            let (debug_utils_loader, debug_messenger) = if validation {
                let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);

                crate::debug::init_debug_config(crate::debug::Config {
                    severity: config.debug_severity,
                    message_filter: config.debug_message_filter,
                    enable_stats: config.enable_validation_stats,
                });

                let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(crate::debug::severity_flags(config.debug_severity))
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                    )
                    .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

                let messenger = debug_utils
                    .create_debug_utils_messenger(&debug_info, None)
                    .map_err(|e| {
                        engine_error!("nova::vulkan", "Failed to create debug messenger: {:?}", e);
                        Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
                    })?;

                (Some(debug_utils), Some(messenger))
            } else {
                (None, None)
            };

            // Create Surface
            let window_handle = window.window_handle()
                .map_err(|e| {
                    engine_error!("nova::vulkan", "Failed to get window handle: {}", e);
                    Error::InitializationFailed(format!("Failed to get window handle: {}", e))
                })?;
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| {
                engine_error!("nova::vulkan", "Failed to create surface: {:?}", e);
                Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
            })?;

            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            // Pick Physical Device
            let candidates = Self::enumerate_candidates(&instance, &surface_loader, surface)?;
            let adapters: Vec<AdapterInfo> = candidates.iter().map(|c| c.info.clone()).collect();
            let chosen = &candidates[select_adapter(&adapters)?];
            let physical_device = chosen.physical_device;
            let families = select_queue_families(&chosen.families)?;

            // Create Logical Device
            let queue_priorities = [1.0];
            let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
                .unique_families()
                .into_iter()
                .map(|family| {
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(family)
                        .queue_priorities(&queue_priorities)
                })
                .collect();

            let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];

            let supported = instance.get_physical_device_features(physical_device);
            let device_features = vk::PhysicalDeviceFeatures::default()
                .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE)
                .image_cube_array(supported.image_cube_array == vk::TRUE)
                .fill_mode_non_solid(supported.fill_mode_non_solid == vk::TRUE);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&device_features);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| {
                    engine_error!("nova::vulkan", "Failed to create logical device: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                })?;

            let mut queues = [vk::Queue::null(); 4];
            for role in QueueRole::ALL {
                queues[role.index()] = device.get_device_queue(families.family(role), 0);
            }

            let properties = instance.get_physical_device_properties(physical_device);
            let max_anisotropy = (supported.sampler_anisotropy == vk::TRUE)
                .then_some(properties.limits.max_sampler_anisotropy);

            // Create GPU allocator
            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!("nova::vulkan", "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);

            engine_info!(
                "nova::vulkan",
                "Vulkan device ready on '{}' (validation {})",
                chosen.info.name,
                if validation { "on" } else { "off" }
            );

            Ok(Self {
                device,
                allocator: ManuallyDrop::new(allocator),
                physical_device,
                adapter: chosen.info.clone(),
                families,
                queues,
                surface,
                surface_loader,
                swapchain_loader,
                max_anisotropy,
                instance,
                _entry: entry,
                debug_utils_loader,
                debug_messenger,
            })
        }
    }

    pub fn queue(&self, role: QueueRole) -> vk::Queue {
        self.queues[role.index()]
    }

    fn validation_layer_available(entry: &ash::Entry) -> bool {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        let available = layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str().map_or(false, |name| name == VALIDATION_LAYER));
        if !available {
            engine_warn!("nova::vulkan", "Validation requested but VK_LAYER_KHRONOS_validation is not installed");
        }
        available
    }

    /// Devices with the swapchain extension, a graphics family and a family
    /// that can present to `surface`
    unsafe fn enumerate_candidates(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<Candidate>> {
        let physical_devices = instance
            .enumerate_physical_devices()
            .map_err(|e| {
                engine_error!("nova::vulkan", "Failed to enumerate physical devices: {:?}", e);
                Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
            })?;

        let mut candidates = Vec::with_capacity(physical_devices.len());
        for physical_device in physical_devices {
            let properties = instance.get_physical_device_properties(physical_device);
            let name = properties
                .device_name_as_c_str()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "Unknown device".to_string());

            let has_swapchain = instance
                .enumerate_device_extension_properties(physical_device)
                .unwrap_or_default()
                .iter()
                .any(|ext| ext.extension_name_as_c_str().map_or(false, |n| n == ash::khr::swapchain::NAME));

            let families: Vec<QueueFamilyInfo> = instance
                .get_physical_device_queue_family_properties(physical_device)
                .iter()
                .enumerate()
                .map(|(index, props)| {
                    let present = surface_loader
                        .get_physical_device_surface_support(physical_device, index as u32, surface)
                        .unwrap_or(false);
                    queue_family_info(index as u32, props, present)
                })
                .collect();

            let usable = has_swapchain
                && families.iter().any(|f| f.graphics && f.queue_count > 0)
                && families.iter().any(|f| f.present && f.queue_count > 0);
            if !usable {
                engine_info!("nova::vulkan", "Skipping '{}': cannot render to the window", name);
                continue;
            }

            candidates.push(Candidate {
                physical_device,
                info: AdapterInfo {
                    name,
                    adapter_type: adapter_type_from_vk(properties.device_type),
                    vendor_id: properties.vendor_id,
                    device_id: properties.device_id,
                },
                families,
            });
        }

        if candidates.is_empty() {
            engine_error!("nova::vulkan", "No Vulkan-capable GPU can present to the window");
            return Err(Error::InitializationFailed(
                "No Vulkan-capable GPU can present to the window".to_string(),
            ));
        }
        Ok(candidates)
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            // 1. Drop allocator: free VkDeviceMemory pages BEFORE destroying device
            ManuallyDrop::drop(&mut self.allocator);

            // 2. Destroy device, then the surface
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);

            // 3. Stop routing callbacks, destroy debug messenger BEFORE instance
            crate::debug::cleanup_debug_config();
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            // 4. Destroy instance
            self.instance.destroy_instance(None);
        }
    }
}
