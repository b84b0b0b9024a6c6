// Vulkan instance smoke tests. Machines without a Vulkan loader or driver
// must report BackendUnavailable rather than fail in any other way.

use gpu_bridge::*;

fn vulkan_instance() -> Option<Instance> {
    match Instance::new(&InstanceDescription::new("gpu-bridge-tests", BackendPreference::Vulkan)) {
        Ok(instance) => Some(instance),
        Err(GpuError::BackendUnavailable(reason)) => {
            eprintln!("skipping, Vulkan unavailable: {reason}");
            None
        }
        Err(e) => panic!("unexpected instance error: {e}"),
    }
}

#[test]
fn vulkan_adapters_are_indexed_in_order() {
    let Some(instance) = vulkan_instance() else { return };
    assert_eq!(instance.backend(), Backend::Vulkan);

    let adapters = instance.enumerate_adapters().unwrap();
    for (i, adapter) in adapters.iter().enumerate() {
        assert_eq!(adapter.index, i);
        assert!(!adapter.name.is_empty());
    }

    let err = instance.create_device(None, adapters.len()).unwrap_err();
    assert_eq!(err, GpuError::InvalidAdapterIndex { index: adapters.len(), count: adapters.len() });
}

#[test]
fn software_surface_is_rejected_by_a_vulkan_instance() {
    let Some(instance) = vulkan_instance() else { return };
    let surface = Surface::headless();
    let err = instance.create_device(Some(&surface), 0).unwrap_err();
    assert_eq!(err, GpuError::IncompatibleSurface { expected: "Vulkan", surface: "Software" });
}

#[test]
fn auto_always_yields_an_instance() {
    let instance = Instance::new(&InstanceDescription::new("gpu-bridge-tests", BackendPreference::Auto)).unwrap();
    assert!(!instance.enumerate_adapters().unwrap().is_empty());
    if instance.backend() == Backend::Vulkan {
        assert!(Instance::is_backend_supported(Backend::Vulkan));
    }
}
