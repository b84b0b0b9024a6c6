// Swapchains, command lists and the frame protocol on the software backend.

mod common;

use std::sync::Arc;

use common::*;
use gpu_bridge::backend::software::{
    ObjectKind, MAX_SWAP_CHAIN_BUFFERS, MAX_TEXTURE_DIMENSION, MIN_SWAP_CHAIN_BUFFERS,
};
use gpu_bridge::*;
use parking_lot::Mutex;

/// Records the size and first texel of every frame it is handed.
#[derive(Clone, Default)]
struct FrameRecorder {
    frames: Arc<Mutex<Vec<(Size2D, [u8; 4])>>>,
}

impl PresentTarget for FrameRecorder {
    fn present(&mut self, frame: Frame<'_>) -> Result<()> {
        let texel = [frame.pixels[0], frame.pixels[1], frame.pixels[2], frame.pixels[3]];
        self.frames.lock().push((frame.size, texel));
        Ok(())
    }
}

fn record_clear(list: &mut CommandList, texture: &Texture, color: ColorF) {
    list.begin().unwrap();
    list.begin_render_pass(&RenderPassDescription::clear(texture, color)).unwrap();
    list.end_render_pass().unwrap();
    list.end().unwrap();
}

#[test]
fn image_count_is_clamped_and_matches_views() {
    let instance = software_instance();
    let surface = Surface::headless();
    let device = software_device(&instance, &surface);

    for requested in 0..=MAX_SWAP_CHAIN_BUFFERS + 2 {
        let swapchain = device.create_swapchain(&swapchain_description(requested), &surface).unwrap();
        let expected = requested.clamp(MIN_SWAP_CHAIN_BUFFERS, MAX_SWAP_CHAIN_BUFFERS);
        assert_eq!(swapchain.image_count(), expected, "requested {requested}");

        let report = device.as_software().unwrap().report();
        assert_eq!(report.live_count(ObjectKind::RenderTargetView), expected as usize);
        assert_eq!(report.live_count(ObjectKind::Texture), expected as usize);
    }
}

#[test]
fn unsupported_present_mode_is_negotiated_down() {
    let instance = software_instance();
    let surface = Surface::headless();
    let device = software_device(&instance, &surface);

    let mut desc = swapchain_description(2);
    desc.present_mode = PresentMode::Mailbox;
    let swapchain = device.create_swapchain(&desc, &surface).unwrap();
    assert_eq!(swapchain.present_mode(), PresentMode::Fifo);

    desc.present_mode = PresentMode::Immediate;
    let swapchain = device.create_swapchain(&desc, &surface).unwrap();
    assert_eq!(swapchain.present_mode(), PresentMode::Immediate);
}

#[test]
fn invalid_swapchain_descriptions_are_rejected() {
    let instance = software_instance();
    let surface = Surface::headless();
    let device = software_device(&instance, &surface);

    let mut desc = swapchain_description(2);
    desc.size = Size2D::new(0, 4);
    assert!(matches!(device.create_swapchain(&desc, &surface), Err(GpuError::InvalidDescription(_))));

    let mut desc = swapchain_description(2);
    desc.format = Format::R32Float;
    assert!(matches!(device.create_swapchain(&desc, &surface), Err(GpuError::InvalidDescription(_))));

    for size in [Size2D::new(u32::MAX, u32::MAX), Size2D::new(MAX_TEXTURE_DIMENSION + 1, 1)] {
        let mut desc = swapchain_description(2);
        desc.size = size;
        assert!(
            matches!(device.create_swapchain(&desc, &surface), Err(GpuError::InvalidDescription(_))),
            "{size}"
        );
    }

    // Within the extent limit, but 16 images of 1 GiB each.
    let mut desc = swapchain_description(MAX_SWAP_CHAIN_BUFFERS);
    desc.size = Size2D::new(MAX_TEXTURE_DIMENSION, MAX_TEXTURE_DIMENSION);
    assert!(matches!(device.create_swapchain(&desc, &surface), Err(GpuError::OutOfMemory(_))));
    assert!(device.as_software().unwrap().report().live.is_empty());
}

#[test]
fn swapchain_drop_releases_views_before_the_swap_object() {
    let instance = software_instance();
    let surface = Surface::headless();
    let device = software_device(&instance, &surface);

    for count in MIN_SWAP_CHAIN_BUFFERS..=MAX_SWAP_CHAIN_BUFFERS {
        let before = device.as_software().unwrap().report().released.len();
        let swapchain = device.create_swapchain(&swapchain_description(count), &surface).unwrap();
        let live = device.as_software().unwrap().report().live;
        drop(swapchain);

        let report = device.as_software().unwrap().report();
        let released = &report.released[before..];
        assert_eq!(released.len(), 2 * count as usize + 1);

        let kinds: Vec<ObjectKind> = released.iter().map(|(_, k)| *k).collect();
        let views = count as usize;
        assert!(kinds[..views].iter().all(|k| *k == ObjectKind::RenderTargetView));
        assert_eq!(kinds[views], ObjectKind::SwapChain);
        assert!(kinds[views + 1..].iter().all(|k| *k == ObjectKind::Texture));

        // Views go newest first.
        let created_views: Vec<_> = live
            .iter()
            .filter(|(_, k)| *k == ObjectKind::RenderTargetView)
            .map(|(h, _)| *h)
            .collect();
        let released_views: Vec<_> = released[..views].iter().map(|(h, _)| *h).collect();
        assert_eq!(released_views, created_views.into_iter().rev().collect::<Vec<_>>());

        assert!(report.live.is_empty());
    }
}

#[test]
fn hundred_frames_round_robin_through_the_images() {
    let instance = software_instance();
    let recorder = FrameRecorder::default();
    let surface = Surface::software(recorder.clone());
    let device = software_device(&instance, &surface);
    let mut swapchain = device.create_swapchain(&swapchain_description(3), &surface).unwrap();
    let mut list = device.create_command_list().unwrap();

    for frame in 0..100u32 {
        let texture = swapchain.get_next_texture().unwrap();
        assert_eq!(texture.index(), frame % 3);
        assert_eq!(texture.size(), Size2D::new(8, 4));

        let shade = (frame % 2) as f32;
        record_clear(&mut list, &texture, ColorF::new(shade, 0.0, 0.0, 1.0));
        device.submit_command_list(&mut list).unwrap();
        swapchain.present().unwrap();
    }

    let frames = recorder.frames.lock();
    assert_eq!(frames.len(), 100);
    // B8G8R8A8: red lands in the third byte.
    assert_eq!(frames[0], (Size2D::new(8, 4), [0, 0, 0, 255]));
    assert_eq!(frames[1], (Size2D::new(8, 4), [0, 0, 255, 255]));

    let report = device.as_software().unwrap().report();
    assert_eq!(report.stats.presents, 100);
    assert_eq!(report.stats.clears, 100);
    assert_eq!(report.stats.command_lists_executed, 100);
    assert_eq!(surface.as_software().unwrap().presented_frames(), 100);
}

#[test]
fn acquire_and_present_must_alternate() {
    let instance = software_instance();
    let surface = Surface::headless();
    let device = software_device(&instance, &surface);
    let mut swapchain = device.create_swapchain(&swapchain_description(2), &surface).unwrap();

    assert!(matches!(swapchain.present(), Err(GpuError::InvalidState(_))));
    swapchain.get_next_texture().unwrap();
    assert!(matches!(swapchain.get_next_texture(), Err(GpuError::InvalidState(_))));
    swapchain.present().unwrap();
    assert!(swapchain.get_next_texture().is_ok());
}

#[test]
fn rejected_submissions_have_no_side_effects() {
    let instance = software_instance();
    let surface = Surface::headless();
    let device = software_device(&instance, &surface);
    let mut swapchain = device.create_swapchain(&swapchain_description(2), &surface).unwrap();
    let mut list = device.create_command_list().unwrap();

    let before = device.as_software().unwrap().report();

    // Never recorded.
    assert!(matches!(device.submit_command_list(&mut list), Err(GpuError::NullArgument(_))));

    // Still recording.
    let texture = swapchain.get_next_texture().unwrap();
    list.begin().unwrap();
    list.begin_render_pass(&RenderPassDescription::clear(&texture, ColorF::BLACK)).unwrap();
    assert!(matches!(device.submit_command_list(&mut list), Err(GpuError::InvalidState(_))));
    assert_eq!(list.state(), CommandListState::Recording);

    assert_eq!(device.as_software().unwrap().report().stats, before.stats);

    list.end_render_pass().unwrap();
    list.end().unwrap();
    device.submit_command_list(&mut list).unwrap();
    assert_eq!(list.state(), CommandListState::Submitted);

    // Already submitted.
    let stats = device.as_software().unwrap().report().stats;
    assert!(matches!(device.submit_command_list(&mut list), Err(GpuError::InvalidState(_))));
    assert_eq!(device.as_software().unwrap().report().stats, stats);
}

#[test]
fn list_referencing_a_dropped_buffer_runs_nothing() {
    let instance = software_instance();
    let device = instance.create_device(None, 0).unwrap();
    let desc = BufferDescription::new(4, BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST)
        .with_cpu_access(CpuAccess::ReadWrite);
    let a = device.create_buffer(&desc, Some(&[1, 2, 3, 4])).unwrap();
    let b = device.create_buffer(&desc, None).unwrap();
    let c = device.create_buffer(&desc, None).unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.copy_buffer(&a, &b, 0, 0, 4).unwrap();
    list.copy_buffer(&c, &b, 0, 0, 4).unwrap();
    list.end().unwrap();
    drop(c);

    let before = device.as_software().unwrap().report().stats;
    assert!(matches!(device.submit_command_list(&mut list), Err(GpuError::InvalidState(_))));
    assert_eq!(b.read().unwrap(), vec![0; 4]);
    assert_eq!(device.as_software().unwrap().report().stats, before);
}

#[test]
fn copies_execute_in_recording_order() {
    let instance = software_instance();
    let device = instance.create_device(None, 0).unwrap();
    let desc = BufferDescription::new(8, BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST)
        .with_cpu_access(CpuAccess::ReadWrite);
    let a = device.create_buffer(&desc, Some(&[1, 2, 3, 4, 5, 6, 7, 8])).unwrap();
    let b = device.create_buffer(&desc, None).unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.copy_buffer(&a, &b, 0, 0, 8).unwrap();
    // Reads what the first copy wrote.
    list.copy_buffer(&b, &b, 0, 4, 4).unwrap();
    list.end().unwrap();
    device.submit_command_list(&mut list).unwrap();

    assert_eq!(b.read().unwrap(), vec![1, 2, 3, 4, 1, 2, 3, 4]);
    assert!(list.copy_buffer(&a, &b, 4, 0, 8).is_err());
}

#[test]
fn draws_are_validated_while_recording() {
    let instance = software_instance();
    let surface = Surface::headless();
    let device = software_device(&instance, &surface);
    let mut swapchain = device.create_swapchain(&swapchain_description(2), &surface).unwrap();
    let pipeline = triangle_pipeline(&device, Format::B8G8R8A8Unorm);
    let rgba_pipeline = triangle_pipeline(&device, Format::R8G8B8A8Unorm);
    let vertices = device
        .create_buffer(&BufferDescription::new(24, BufferUsage::VERTEX), Some(&[0; 24]))
        .unwrap();
    let empty = device.create_buffer(&BufferDescription::new(0, BufferUsage::VERTEX), None).unwrap();

    let texture = swapchain.get_next_texture().unwrap();
    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    assert!(list.draw(3, 0).is_err(), "draw outside a render pass");

    list.begin_render_pass(&RenderPassDescription::clear(&texture, ColorF::BLACK)).unwrap();
    assert!(list.draw(3, 0).is_err(), "draw without a pipeline");

    list.set_pipeline(&rgba_pipeline).unwrap();
    list.set_vertex_buffer(0, &vertices, 0).unwrap();
    assert!(list.draw(3, 0).is_err(), "target format mismatch");

    list.set_pipeline(&pipeline).unwrap();
    assert!(list.draw(4, 0).is_err(), "vertex range past the buffer");
    assert!(matches!(list.set_vertex_buffer(0, &empty, 0), Err(GpuError::InvalidState(_))));
    assert!(list.draw_indexed(3, 0, 0).is_err(), "no index buffer");
    list.draw(3, 0).unwrap();
    assert!(list.copy_buffer(&vertices, &vertices, 0, 8, 8).is_err(), "copy inside a render pass");
    assert!(list.end().is_err(), "end inside a render pass");

    list.end_render_pass().unwrap();
    list.end().unwrap();
    device.submit_command_list(&mut list).unwrap();
    swapchain.present().unwrap();

    let stats = device.as_software().unwrap().report().stats;
    assert_eq!(stats.draws, 1);
}

#[test]
fn lost_surface_fails_swapchain_work() {
    let instance = software_instance();
    let surface = Surface::headless();
    let device = software_device(&instance, &surface);
    let mut swapchain = device.create_swapchain(&swapchain_description(2), &surface).unwrap();

    surface.as_software().unwrap().invalidate();
    assert!(matches!(swapchain.get_next_texture(), Err(GpuError::SurfaceLost(_))));
    assert!(matches!(
        device.create_swapchain(&swapchain_description(2), &surface),
        Err(GpuError::SurfaceLost(_))
    ));

    // The old swapchain still tears down cleanly.
    drop(swapchain);
    assert!(device.as_software().unwrap().report().live.is_empty());
}

#[test]
fn presented_frame_is_kept_by_a_headless_surface() {
    let instance = software_instance();
    let surface = Surface::headless();
    let device = software_device(&instance, &surface);
    let mut desc = swapchain_description(1);
    desc.format = Format::R8G8B8A8Unorm;
    desc.size = Size2D::new(2, 2);
    let mut swapchain = device.create_swapchain(&desc, &surface).unwrap();
    let mut list = device.create_command_list().unwrap();

    let texture = swapchain.get_next_texture().unwrap();
    record_clear(&mut list, &texture, ColorF::new(0.0, 0.0, 1.0, 1.0));
    device.submit_command_list(&mut list).unwrap();
    swapchain.present().unwrap();

    let frame = surface.as_software().unwrap().last_frame().unwrap();
    assert_eq!(frame.size, Size2D::new(2, 2));
    assert_eq!(frame.pixels, [0u8, 0, 255, 255].repeat(4));
}

#[test]
fn devices_only_run_their_own_command_lists() {
    let instance = software_instance();
    let a = instance.create_device(None, 0).unwrap();
    let b = instance.create_device(None, 0).unwrap();
    let desc = BufferDescription::new(4, BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST)
        .with_cpu_access(CpuAccess::ReadWrite);

    let a_src = a.create_buffer(&desc, Some(&[1, 2, 3, 4])).unwrap();
    let a_dst = a.create_buffer(&desc, None).unwrap();
    let mut list_a = a.create_command_list().unwrap();
    list_a.begin().unwrap();
    list_a.copy_buffer(&a_src, &a_dst, 0, 0, 4).unwrap();
    list_a.end().unwrap();

    // Both drivers number their objects the same way, so b holds a live list
    // under the same handle as list_a.
    let b_src = b.create_buffer(&desc, Some(&[9; 4])).unwrap();
    let b_dst = b.create_buffer(&desc, None).unwrap();
    let mut list_b = b.create_command_list().unwrap();
    list_b.begin().unwrap();
    list_b.copy_buffer(&b_src, &b_dst, 0, 0, 4).unwrap();
    list_b.end().unwrap();

    let before = b.as_software().unwrap().report().stats;
    assert!(matches!(b.submit_command_list(&mut list_a), Err(GpuError::InvalidState(_))));
    assert_eq!(list_a.state(), CommandListState::Recorded);
    assert_eq!(b.as_software().unwrap().report().stats, before);
    assert_eq!(b_dst.read().unwrap(), vec![0; 4]);

    a.submit_command_list(&mut list_a).unwrap();
    assert_eq!(a_dst.read().unwrap(), vec![1, 2, 3, 4]);
    b.submit_command_list(&mut list_b).unwrap();
    assert_eq!(b_dst.read().unwrap(), vec![9; 4]);
}

#[test]
fn recording_rejects_objects_from_another_device() {
    let instance = software_instance();
    let surface_a = Surface::headless();
    let surface_b = Surface::headless();
    let a = software_device(&instance, &surface_a);
    let b = software_device(&instance, &surface_b);

    let mut swapchain_a = a.create_swapchain(&swapchain_description(2), &surface_a).unwrap();
    let mut swapchain_b = b.create_swapchain(&swapchain_description(2), &surface_b).unwrap();
    let copy_desc = BufferDescription::new(24, BufferUsage::VERTEX | BufferUsage::INDEX | BufferUsage::TRANSFER_DST);
    let a_buffer = a.create_buffer(&copy_desc, Some(&[0; 24])).unwrap();
    let b_buffer = b.create_buffer(&copy_desc, Some(&[0; 24])).unwrap();
    let b_pipeline = triangle_pipeline(&b, Format::B8G8R8A8Unorm);

    let mut list = a.create_command_list().unwrap();
    list.begin().unwrap();
    assert!(matches!(list.copy_buffer(&b_buffer, &a_buffer, 0, 0, 4), Err(GpuError::InvalidState(_))));
    assert!(matches!(list.copy_buffer(&a_buffer, &b_buffer, 0, 0, 4), Err(GpuError::InvalidState(_))));

    let b_texture = swapchain_b.get_next_texture().unwrap();
    let clear_b = RenderPassDescription::clear(&b_texture, ColorF::BLACK);
    assert!(matches!(list.begin_render_pass(&clear_b), Err(GpuError::InvalidState(_))));

    let a_texture = swapchain_a.get_next_texture().unwrap();
    list.begin_render_pass(&RenderPassDescription::clear(&a_texture, ColorF::BLACK)).unwrap();
    assert!(matches!(list.set_pipeline(&b_pipeline), Err(GpuError::InvalidState(_))));
    assert!(matches!(list.set_vertex_buffer(0, &b_buffer, 0), Err(GpuError::InvalidState(_))));
    assert!(matches!(
        list.set_index_buffer(&b_buffer, IndexFormat::U16, 0),
        Err(GpuError::InvalidState(_))
    ));
    list.end_render_pass().unwrap();
    list.end().unwrap();
    a.submit_command_list(&mut list).unwrap();

    let stats = a.as_software().unwrap().report().stats;
    assert_eq!(stats.copies, 0);
    assert_eq!(stats.clears, 1);

    // Pipelines cannot mix shader modules across devices either.
    let vs = shader(&b, ShaderStage::Vertex);
    let fs = shader(&a, ShaderStage::Fragment);
    let mixed = PipelineDescription::new(&vs, &fs, Format::B8G8R8A8Unorm);
    assert!(matches!(a.create_pipeline(&mixed), Err(GpuError::InvalidState(_))));
}

#[test]
fn huge_draw_ranges_are_rejected_without_overflow() {
    let instance = software_instance();
    let surface = Surface::headless();
    let device = software_device(&instance, &surface);
    let mut swapchain = device.create_swapchain(&swapchain_description(2), &surface).unwrap();

    let vs = shader(&device, ShaderStage::Vertex);
    let fs = shader(&device, ShaderStage::Fragment);
    let mut layout = position_layout();
    layout.stride = u32::MAX;
    let desc = PipelineDescription::new(&vs, &fs, Format::B8G8R8A8Unorm).with_vertex_buffer(layout);
    let pipeline = device.create_pipeline(&desc).unwrap();

    let vertices = device.create_buffer(&BufferDescription::new(64, BufferUsage::VERTEX), None).unwrap();
    let indices = device.create_buffer(&BufferDescription::new(64, BufferUsage::INDEX), None).unwrap();

    let texture = swapchain.get_next_texture().unwrap();
    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.begin_render_pass(&RenderPassDescription::clear(&texture, ColorF::BLACK)).unwrap();
    list.set_pipeline(&pipeline).unwrap();
    list.set_vertex_buffer(0, &vertices, 0).unwrap();
    list.set_index_buffer(&indices, IndexFormat::U32, 60).unwrap();

    assert!(matches!(list.draw(u32::MAX, u32::MAX), Err(GpuError::InvalidState(_))));
    assert!(matches!(list.draw(2, u32::MAX), Err(GpuError::InvalidState(_))));
    assert!(matches!(list.draw_indexed(u32::MAX, u32::MAX, 0), Err(GpuError::InvalidState(_))));
    assert!(matches!(list.draw_indexed(1, u32::MAX, 0), Err(GpuError::InvalidState(_))));
    list.draw(1, 0).unwrap();
    list.draw_indexed(1, 0, 0).unwrap();
}
