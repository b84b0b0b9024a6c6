// Instance - backend entry point and adapter discovery

use std::fmt;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::adapter::Adapter;
use crate::backend::software::SoftwareInstance;
use crate::backend::vulkan::VulkanInstance;
use crate::device::Device;
use crate::error::{GpuError, Result};
use crate::surface::Surface;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Implicit immediate-context backend running on the CPU.
    Software,
    /// Explicit queue/command-buffer backend.
    Vulkan,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Backend::Software => "Software",
            Backend::Vulkan => "Vulkan",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendPreference {
    /// Vulkan when it is usable and has at least one adapter, else Software.
    #[default]
    Auto,
    Software,
    Vulkan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDescription {
    pub app_name: String,
    pub backend: BackendPreference,
    /// Enables validation layers (Vulkan) or per-command tracing (Software).
    pub debug: bool,
}

impl InstanceDescription {
    pub fn new(app_name: &str, backend: BackendPreference) -> Self {
        Self { app_name: app_name.to_string(), backend, debug: false }
    }
}

pub enum Instance {
    Vulkan(VulkanInstance),
    Software(SoftwareInstance),
}

impl Instance {
    pub fn new(desc: &InstanceDescription) -> Result<Self> {
        log::info!("Creating instance for {:?} (backend preference {:?})", desc.app_name, desc.backend);
        match desc.backend {
            BackendPreference::Software => Ok(Instance::Software(SoftwareInstance::new(desc))),
            BackendPreference::Vulkan => VulkanInstance::new(desc).map(Instance::Vulkan),
            BackendPreference::Auto => match VulkanInstance::new(desc) {
                Ok(vulkan) => match vulkan.enumerate_adapters() {
                    Ok(adapters) if !adapters.is_empty() => Ok(Instance::Vulkan(vulkan)),
                    Ok(_) => {
                        log::warn!("Vulkan reports no adapters, falling back to the software backend");
                        Ok(Instance::Software(SoftwareInstance::new(desc)))
                    }
                    Err(e) => {
                        log::warn!("Vulkan adapter enumeration failed ({e}), falling back to the software backend");
                        Ok(Instance::Software(SoftwareInstance::new(desc)))
                    }
                },
                Err(e) => {
                    log::warn!("Vulkan unavailable ({e}), falling back to the software backend");
                    Ok(Instance::Software(SoftwareInstance::new(desc)))
                }
            },
        }
    }

    /// Whether an instance for `backend` can be created and enumerate
    /// adapters. Creates and destroys a whole instance, so cache the answer.
    pub fn is_backend_supported(backend: Backend) -> bool {
        let preference = match backend {
            Backend::Software => BackendPreference::Software,
            Backend::Vulkan => BackendPreference::Vulkan,
        };
        let desc = InstanceDescription::new("gpu-bridge.backend-check", preference);
        Instance::new(&desc).and_then(|i| i.enumerate_adapters()).is_ok()
    }

    pub fn backend(&self) -> Backend {
        match self {
            Instance::Vulkan(_) => Backend::Vulkan,
            Instance::Software(_) => Backend::Software,
        }
    }

    /// Query the adapters present right now. Each call enumerates afresh.
    pub fn enumerate_adapters(&self) -> Result<Vec<Adapter>> {
        match self {
            Instance::Vulkan(i) => i.enumerate_adapters(),
            Instance::Software(i) => i.enumerate_adapters(),
        }
    }

    /// Create a device on the adapter at `adapter_index`, able to present to
    /// `surface` when one is given.
    pub fn create_device(&self, surface: Option<&Surface>, adapter_index: usize) -> Result<Device> {
        if let Some(surface) = surface {
            if surface.backend() != self.backend() {
                return Err(GpuError::IncompatibleSurface {
                    expected: self.backend().name(),
                    surface: surface.backend().name(),
                });
            }
        }

        match self {
            Instance::Vulkan(i) => {
                let surface = match surface {
                    Some(Surface::Vulkan(s)) => Some(s),
                    _ => None,
                };
                i.create_device(surface, adapter_index).map(Device::Vulkan)
            }
            Instance::Software(i) => i.create_device(adapter_index).map(Device::Software),
        }
    }

    /// Create a surface for a platform window.
    ///
    /// The software backend cannot draw into arbitrary windows; it returns a
    /// headless surface. Use `Surface::software` to route its frames.
    pub fn create_surface<W>(&self, window: &W) -> Result<Surface>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        match self {
            Instance::Vulkan(i) => i.create_surface(window).map(Surface::Vulkan),
            Instance::Software(_) => Ok(Surface::headless()),
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance").field("backend", &self.backend()).finish()
    }
}
