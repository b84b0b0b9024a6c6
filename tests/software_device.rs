// Instance, device and resource creation on the software backend.

mod common;

use common::*;
use gpu_bridge::backend::software::{ObjectKind, ADAPTER_NAME, MAX_BUFFER_SIZE};
use gpu_bridge::*;

#[test]
fn software_instance_has_one_cpu_adapter() {
    let instance = software_instance();
    assert_eq!(instance.backend(), Backend::Software);

    let adapters = instance.enumerate_adapters().unwrap();
    assert_eq!(adapters.len(), 1);
    assert_eq!(adapters[0].index, 0);
    assert_eq!(adapters[0].name, ADAPTER_NAME);
    assert_eq!(adapters[0].kind, AdapterKind::Cpu);

    // Enumeration is repeatable and does not depend on earlier calls.
    assert_eq!(instance.enumerate_adapters().unwrap(), adapters);
}

#[test]
fn every_valid_adapter_index_yields_a_device() {
    let instance = software_instance();
    let surface = Surface::headless();
    for adapter in instance.enumerate_adapters().unwrap() {
        let device = instance.create_device(Some(&surface), adapter.index).unwrap();
        assert_eq!(device.adapter().name, adapter.name);
        assert_eq!(device.backend(), Backend::Software);
    }
    assert!(instance.create_device(None, 0).is_ok());
}

#[test]
fn adapter_index_out_of_range_is_rejected() {
    let instance = software_instance();
    let err = instance.create_device(None, 1).unwrap_err();
    assert_eq!(err, GpuError::InvalidAdapterIndex { index: 1, count: 1 });
}

#[test]
fn software_backend_is_always_supported() {
    assert!(Instance::is_backend_supported(Backend::Software));
}

#[test]
fn buffer_round_trip_at_boundary_sizes() {
    let instance = software_instance();
    let device = instance.create_device(None, 0).unwrap();

    for size in [0u64, 1, 4096, MAX_BUFFER_SIZE] {
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let desc = BufferDescription::new(size, BufferUsage::STORAGE).with_cpu_access(CpuAccess::ReadWrite);
        let buffer = device.create_buffer(&desc, Some(&data)).unwrap();
        assert_eq!(buffer.size(), size);
        assert!(buffer.read().unwrap() == data, "round trip of {size} bytes");
    }

    let report = device.as_software().unwrap().report();
    assert_eq!(report.live_count(ObjectKind::Buffer), 0);
}

#[test]
fn short_initial_data_is_zero_padded() {
    let instance = software_instance();
    let device = instance.create_device(None, 0).unwrap();
    let desc = BufferDescription::new(8, BufferUsage::VERTEX).with_cpu_access(CpuAccess::ReadWrite);
    let buffer = device.create_buffer(&desc, Some(&[7, 7])).unwrap();
    assert_eq!(buffer.read().unwrap(), vec![7, 7, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn buffer_limits_are_enforced() {
    let instance = software_instance();
    let device = instance.create_device(None, 0).unwrap();

    let too_big = BufferDescription::new(MAX_BUFFER_SIZE + 1, BufferUsage::VERTEX);
    assert!(matches!(device.create_buffer(&too_big, None), Err(GpuError::InvalidDescription(_))));

    let overflow = BufferDescription::new(2, BufferUsage::VERTEX);
    assert!(matches!(
        device.create_buffer(&overflow, Some(&[1, 2, 3])),
        Err(GpuError::InvalidDescription(_))
    ));
}

#[test]
fn cpu_access_gates_write_and_read() {
    let instance = software_instance();
    let device = instance.create_device(None, 0).unwrap();

    let mut gpu_only = device.create_buffer(&BufferDescription::new(4, BufferUsage::VERTEX), None).unwrap();
    assert!(matches!(gpu_only.write(0, &[1]), Err(GpuError::InvalidState(_))));
    assert!(matches!(gpu_only.read(), Err(GpuError::InvalidState(_))));

    let desc = BufferDescription::new(4, BufferUsage::UNIFORM).with_cpu_access(CpuAccess::ReadWrite);
    let mut mapped = device.create_buffer(&desc, None).unwrap();
    mapped.write(2, &[9, 9]).unwrap();
    assert_eq!(mapped.read().unwrap(), vec![0, 0, 9, 9]);
    assert!(mapped.write(3, &[1, 1]).is_err());
}

#[test]
fn malformed_shader_bytecode_fails_to_compile() {
    let instance = software_instance();
    let device = instance.create_device(None, 0).unwrap();

    let cases: Vec<Vec<u8>> = vec![Vec::new(), vec![1, 2, 3], vec![0; 20], minimal_spirv()[..12].to_vec()];
    for bytecode in cases {
        let desc = ShaderModuleDescription::new(ShaderStage::Vertex, bytecode, "main");
        assert!(matches!(device.create_shader_module(&desc), Err(GpuError::ShaderCompilationError(_))));
    }

    let desc = ShaderModuleDescription::new(ShaderStage::Vertex, minimal_spirv(), "");
    assert!(matches!(device.create_shader_module(&desc), Err(GpuError::ShaderCompilationError(_))));
    assert_eq!(device.as_software().unwrap().report().live_count(ObjectKind::Shader), 0);
}

#[test]
fn pipeline_checks_shader_stages_and_layouts() {
    let instance = software_instance();
    let device = instance.create_device(None, 0).unwrap();
    let vs = shader(&device, ShaderStage::Vertex);
    let fs = shader(&device, ShaderStage::Fragment);

    let swapped = PipelineDescription::new(&fs, &vs, Format::B8G8R8A8Unorm);
    assert!(matches!(device.create_pipeline(&swapped), Err(GpuError::InvalidDescription(_))));

    let not_a_target = PipelineDescription::new(&vs, &fs, Format::R32Float);
    assert!(device.create_pipeline(&not_a_target).is_err());

    let mut overrun = position_layout();
    overrun.stride = 4;
    let desc = PipelineDescription::new(&vs, &fs, Format::B8G8R8A8Unorm).with_vertex_buffer(overrun);
    assert!(device.create_pipeline(&desc).is_err());

    let mut far_offset = position_layout();
    far_offset.attributes[0].offset = u32::MAX;
    let desc = PipelineDescription::new(&vs, &fs, Format::B8G8R8A8Unorm).with_vertex_buffer(far_offset);
    assert!(matches!(device.create_pipeline(&desc), Err(GpuError::InvalidDescription(_))));

    let desc = PipelineDescription::new(&vs, &fs, Format::B8G8R8A8Unorm).with_vertex_buffer(position_layout());
    let pipeline = device.create_pipeline(&desc).unwrap();
    assert_eq!(pipeline.color_formats(), &[Format::B8G8R8A8Unorm]);

    // Shader modules may go away once the pipeline exists.
    drop(vs);
    drop(fs);
    let report = device.as_software().unwrap().report();
    assert_eq!(report.live_count(ObjectKind::Shader), 0);
    assert_eq!(report.live_count(ObjectKind::Pipeline), 1);
}

#[test]
fn everything_is_released_when_dropped() {
    let instance = software_instance();
    let surface = Surface::headless();
    let device = software_device(&instance, &surface);
    {
        let mut swapchain = device.create_swapchain(&swapchain_description(3), &surface).unwrap();
        let pipeline = triangle_pipeline(&device, Format::B8G8R8A8Unorm);
        let vertices = device
            .create_buffer(&BufferDescription::new(24, BufferUsage::VERTEX), Some(&[0; 24]))
            .unwrap();
        let mut list = device.create_command_list().unwrap();

        let texture = swapchain.get_next_texture().unwrap();
        list.begin().unwrap();
        list.begin_render_pass(&RenderPassDescription::clear(&texture, ColorF::BLACK)).unwrap();
        list.set_pipeline(&pipeline).unwrap();
        list.set_vertex_buffer(0, &vertices, 0).unwrap();
        list.draw(3, 0).unwrap();
        list.end_render_pass().unwrap();
        list.end().unwrap();
        device.submit_command_list(&mut list).unwrap();
        swapchain.present().unwrap();

        assert!(!device.as_software().unwrap().report().live.is_empty());
    }

    let report = device.as_software().unwrap().report();
    assert!(report.live.is_empty(), "leaked: {:?}", report.live);
    assert_eq!(report.stats.draws, 1);
    assert_eq!(report.stats.vertices, 3);
}
