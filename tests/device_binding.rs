// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Device-level binding: the enter/exit lock, per-stage bindings surviving
//! frames, draw accounting and the transfer of bytes across the driver
//! boundary.

use std::sync::Arc;

use stages_and_states::GraphicsDevice;
use stages_and_states::common::{
    BufferUsage, Colour, CpuAccess, GraphicsLocality, MapOptions, Topology, Usage,
};
use stages_and_states::device::StateKind;
use stages_and_states::driver::headless::HeadlessDevice;
use stages_and_states::formats::{PixelFormat, VertexFormat};
use stages_and_states::resources::{Geometry, TypelessBuffer, TypelessTexture2D};
use stages_and_states::states::{InternPool, SamplerState};

fn device() -> (Arc<GraphicsDevice>, HeadlessDevice, Arc<InternPool>) {
    let driver = HeadlessDevice::new();
    let pool = Arc::new(InternPool::new());
    let device = GraphicsDevice::new(Arc::new(driver.clone()), pool.clone()).unwrap();
    (device, driver, pool)
}

fn triangle_geometry(device: &Arc<GraphicsDevice>) -> Arc<Geometry> {
    let format = VertexFormat::parse("P.Fx3 N.Fx3").unwrap();
    let buffer = TypelessBuffer::new(
        Usage::Static,
        BufferUsage::VERTEX_BUFFER,
        CpuAccess::WRITE,
        GraphicsLocality::DeviceOrSystemMemory,
        format.byte_size() as u64 * 30,
    );
    let view = buffer.create_vertex_buffer(format).unwrap();
    view.bind_to_device(device).unwrap();
    let geometry = Geometry::new(Topology::Triangle);
    geometry.set_associate_buffers(true);
    geometry.set_vertex_buffer(0, view).unwrap();
    geometry
}

#[test]
fn static_buffer_seeds_driver_allocation() {
    // The concrete scenario: 48 bytes, filled through a write map, must
    // arrive verbatim as the driver allocation's initial data.
    let (device, driver, _) = device();
    let buffer = TypelessBuffer::new(
        Usage::Static,
        BufferUsage::VERTEX_BUFFER,
        CpuAccess::WRITE,
        GraphicsLocality::DeviceOrSystemMemory,
        48,
    );
    let pattern: Vec<u8> = (0..48).map(|i| i * 3).collect();
    buffer.map_all(MapOptions::Write).unwrap();
    buffer.write_mapped(0, &pattern).unwrap();
    buffer.unmap().unwrap();

    buffer.bind_to_device(&device).unwrap();

    let creations = driver.buffer_creations();
    assert_eq!(creations.len(), 1);
    assert_eq!(creations[0].byte_size, 48);
    assert_eq!(creations[0].usage, Usage::Static);
    assert_eq!(creations[0].initial_data.as_deref(), Some(&pattern[..]));
}

#[test]
fn vertex_stage_binds_geometry_and_draws() {
    let (device, driver, _) = device();
    let geometry = triangle_geometry(&device);

    device.enter().unwrap();
    device
        .set_vertex_shader(None, Some(geometry.clone()), None, None, None)
        .unwrap();
    device.draw(0, 30).unwrap();
    device.draw(0, 9).unwrap();
    device.exit().unwrap();

    assert!(driver.vertex_stage_binds() >= 1);
    assert_eq!(driver.draw_calls(), 2);

    let perf = device.performance();
    assert_eq!(perf.total_triangles_rendered(), 13);
    assert_eq!(perf.total_draw_calls(), 2);
    assert_eq!(perf.frame_count(), 1);
}

#[test]
fn topology_counting_follows_the_strip_rules() {
    let (device, _, _) = device();
    let geometry = triangle_geometry(&device);

    device.enter().unwrap();
    device
        .set_vertex_shader(None, Some(geometry.clone()), None, None, None)
        .unwrap();

    geometry.set_topology(Topology::TriangleStrip);
    device.draw(0, 10).unwrap();
    // A strip of two vertices draws nothing but still counts the call.
    device.draw(0, 2).unwrap();
    geometry.set_topology(Topology::LineStrip);
    device.draw(0, 10).unwrap();
    device.exit().unwrap();

    let perf = device.performance();
    assert_eq!(perf.total_triangles_rendered(), 8);
    assert_eq!(perf.total_lines_rendered(), 9);
    assert_eq!(perf.total_draw_calls(), 2);
}

#[test]
fn bindings_survive_unlock_and_are_resubmitted() {
    let (device, driver, _) = device();
    let geometry = triangle_geometry(&device);

    device.enter().unwrap();
    device
        .set_vertex_shader(None, Some(geometry.clone()), None, None, None)
        .unwrap();
    device.exit().unwrap();

    let binds_after_first_frame = driver.vertex_stage_binds();

    // The geometry slot survives exit; the next enter resubmits it.
    device.enter().unwrap();
    assert!(device.input_geometry().is_some());
    device.draw(0, 3).unwrap();
    device.exit().unwrap();

    assert!(driver.vertex_stage_binds() > binds_after_first_frame);
}

#[test]
fn clear_states_resets_bindings() {
    let (device, driver, _) = device();
    let geometry = triangle_geometry(&device);

    device.enter().unwrap();
    device
        .set_vertex_shader(None, Some(geometry.clone()), None, None, None)
        .unwrap();
    device.clear_states().unwrap();
    assert!(device.input_geometry().is_none());
    // Drawing without geometry is rejected before reaching the driver.
    let draws_before = driver.draw_calls();
    assert!(device.draw(0, 3).is_err());
    assert_eq!(driver.draw_calls(), draws_before);
    device.exit().unwrap();

    // The geometry's locks were fully unwound, so it can be disposed.
    geometry.dispose().unwrap();
}

#[test]
fn sampler_slots_swap_without_leaking_locks() {
    let (device, _, pool) = device();
    let linear = pool.intern_sampler(Arc::new(SamplerState::new()));
    let aniso = {
        let state = SamplerState::new();
        state.set_max_anisotropy(8).unwrap();
        pool.intern_sampler(Arc::new(state))
    };

    device.enter().unwrap();
    device
        .set_pixel_shader(
            None,
            Some(&[linear.clone(), aniso.clone()][..]),
            None,
            None,
            None,
            None,
        )
        .unwrap();
    // Shrinking to one slot must release the extra old sampler.
    device
        .set_pixel_shader(None, Some(&[linear.clone()][..]), None, None, None, None)
        .unwrap();

    // From another thread, the dropped sampler's monitor is free while the
    // still-bound one is held.
    let (aniso2, linear2) = (aniso.clone(), linear.clone());
    let probe = std::thread::spawn(move || {
        let aniso_free = aniso2.monitor().try_enter();
        if aniso_free {
            aniso2.monitor().exit();
        }
        let linear_free = linear2.monitor().try_enter();
        if linear_free {
            linear2.monitor().exit();
        }
        (aniso_free, linear_free)
    });
    let (aniso_free, linear_free) = probe.join().unwrap();
    assert!(aniso_free);
    assert!(!linear_free);

    device.exit().unwrap();
}

#[test]
fn render_target_mismatch_rejected_atomically() {
    let (device, _, _) = device();
    let format = PixelFormat::parse("R.UN8 G.UN8 B.UN8 A.UN8").unwrap();
    let big = TypelessTexture2D::new(
        Usage::Default,
        stages_and_states::common::TextureUsage::RENDER_TARGET,
        CpuAccess::NONE,
        format.clone(),
        64,
        64,
        1,
        GraphicsLocality::DeviceOrSystemMemory,
        None,
    )
    .unwrap();
    let small = TypelessTexture2D::new(
        Usage::Default,
        stages_and_states::common::TextureUsage::RENDER_TARGET,
        CpuAccess::NONE,
        format,
        32,
        32,
        1,
        GraphicsLocality::DeviceOrSystemMemory,
        None,
    )
    .unwrap();
    let big_target = big.create_render_target().unwrap();
    let small_target = small.create_render_target().unwrap();

    device.enter().unwrap();
    let result = device.set_pixel_shader(
        None,
        None,
        None,
        None,
        Some(&[big_target.clone(), small_target.clone()][..]),
        None,
    );
    assert!(result.is_err());
    // The rejection happened before any slot changed.
    assert!(device.render_targets().is_empty());
    device.exit().unwrap();
}

#[test]
fn transient_clear_reaches_the_driver() {
    let (device, driver, _) = device();
    let format = PixelFormat::parse("R.UN8 G.UN8 B.UN8 A.UN8").unwrap();
    let texture = TypelessTexture2D::new(
        Usage::Default,
        stages_and_states::common::TextureUsage::RENDER_TARGET,
        CpuAccess::NONE,
        format,
        16,
        16,
        1,
        GraphicsLocality::DeviceOrSystemMemory,
        None,
    )
    .unwrap();
    let target = texture.create_render_target().unwrap();

    device.enter().unwrap();
    device.clear(&target, Colour::BLACK).unwrap();
    device.exit().unwrap();

    assert_eq!(driver.render_target_clears(), 1);
}

#[test]
fn stage_statistics_track_changes() {
    let (device, _, _) = device();
    let geometry = triangle_geometry(&device);

    device.enter().unwrap();
    device
        .set_vertex_shader(None, Some(geometry), None, None, None)
        .unwrap();
    device.set_blend_state(None, Colour::BLACK, 0).unwrap();
    device.set_blend_state(None, Colour::BLACK, 0).unwrap();
    device.exit().unwrap();

    let stats = device.statistics();
    // The frame-begin resubmission counts too.
    assert!(stats.changes(StateKind::VertexStage).total >= 2);
    assert!(stats.changes(StateKind::Blend).total >= 3);
    assert_eq!(stats.frame_count(), 1);
}
