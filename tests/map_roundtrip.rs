// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Map/unmap round-trips across every residency mode, and the locking that
//! guards them.

use std::sync::Arc;

use stages_and_states::GraphicsDevice;
use stages_and_states::common::{
    BufferUsage, CpuAccess, GraphicsLocality, MapOptions, Usage,
};
use stages_and_states::driver::headless::HeadlessDevice;
use stages_and_states::resources::TypelessBuffer;
use stages_and_states::states::InternPool;

fn buffer(locality: GraphicsLocality, size: u64) -> Arc<TypelessBuffer> {
    TypelessBuffer::new(
        Usage::Dynamic,
        BufferUsage::VERTEX_BUFFER,
        CpuAccess::READ_WRITE,
        locality,
        size,
    )
}

fn device() -> (Arc<GraphicsDevice>, HeadlessDevice) {
    let driver = HeadlessDevice::new();
    let device = GraphicsDevice::new(Arc::new(driver.clone()), Arc::new(InternPool::new())).unwrap();
    (device, driver)
}

fn write_pattern(buffer: &TypelessBuffer, pattern: &[u8]) {
    buffer.map_all(MapOptions::Write).unwrap();
    buffer.write_mapped(0, pattern).unwrap();
    buffer.unmap().unwrap();
}

fn read_all(buffer: &TypelessBuffer) -> Vec<u8> {
    buffer.map_all(MapOptions::Read).unwrap();
    let data = buffer.mapped_to_vec().unwrap();
    buffer.unmap().unwrap();
    data
}

#[test]
fn roundtrip_system_memory_only() {
    let buffer = buffer(GraphicsLocality::SystemMemoryOnly, 32);
    let pattern: Vec<u8> = (0..32).collect();
    write_pattern(&buffer, &pattern);
    assert_eq!(read_all(&buffer), pattern);
}

#[test]
fn roundtrip_device_memory_only() {
    // Bytes live behind the driver handle; reads go through a driver
    // readback, writes through a driver update.
    let (device, _) = device();
    let buffer = buffer(GraphicsLocality::DeviceMemoryOnly, 32);
    buffer.bind_to_device(&device).unwrap();
    let pattern: Vec<u8> = (0..32).rev().collect();
    write_pattern(&buffer, &pattern);
    assert_eq!(read_all(&buffer), pattern);
}

#[test]
fn roundtrip_device_and_system_memory() {
    // Both copies stay alive; commits land in both.
    let (device, _) = device();
    let buffer = buffer(GraphicsLocality::DeviceAndSystemMemory, 16);
    buffer.bind_to_device(&device).unwrap();
    write_pattern(&buffer, &[0xAB; 16]);
    assert_eq!(read_all(&buffer), vec![0xAB; 16]);
}

#[test]
fn roundtrip_device_or_system_memory_migrates() {
    // The system copy seeds the device allocation and is released on bind;
    // unbinding fills it back.
    let (device, driver) = device();
    let buffer = buffer(GraphicsLocality::DeviceOrSystemMemory, 16);
    write_pattern(&buffer, &[7; 16]);

    buffer.bind_to_device(&device).unwrap();
    let creations = driver.buffer_creations();
    assert_eq!(creations.len(), 1);
    assert_eq!(creations[0].initial_data.as_deref(), Some(&[7u8; 16][..]));

    // Reads while device-resident go through the driver.
    assert_eq!(read_all(&buffer), vec![7; 16]);

    buffer.unbind_from_device().unwrap();
    assert!(!buffer.is_bound_to_device());
    assert_eq!(read_all(&buffer), vec![7; 16]);
}

#[test]
fn locality_rules_enforced() {
    let (device, _) = device();

    let system_only = buffer(GraphicsLocality::SystemMemoryOnly, 8);
    assert!(system_only.bind_to_device(&device).is_err());

    let device_only = buffer(GraphicsLocality::DeviceMemoryOnly, 8);
    device_only.bind_to_device(&device).unwrap();
    assert!(device_only.unbind_from_device().is_err());
}

#[test]
fn map_blocks_cross_thread_until_unmap() {
    use std::sync::atomic::{AtomicBool, Ordering};

    let buffer = buffer(GraphicsLocality::SystemMemoryOnly, 8);
    buffer.map_all(MapOptions::Write).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let (buffer2, done2) = (buffer.clone(), done.clone());
    let waiter = std::thread::spawn(move || {
        // Blocks until the main thread unmaps.
        buffer2.map_all(MapOptions::Read).unwrap();
        done2.store(true, Ordering::SeqCst);
        buffer2.unmap().unwrap();
    });

    std::thread::sleep(std::time::Duration::from_millis(50));
    assert!(!done.load(Ordering::SeqCst));

    buffer.write_mapped(0, &[1; 8]).unwrap();
    buffer.unmap().unwrap();
    waiter.join().unwrap();
    assert!(done.load(Ordering::SeqCst));
}

#[test]
fn failed_map_releases_the_monitor() {
    let buffer = buffer(GraphicsLocality::SystemMemoryOnly, 8);
    assert!(buffer.map(MapOptions::Write, 4, 8).is_err());
    // Another thread can map immediately; a leaked monitor would hang here.
    let buffer2 = buffer.clone();
    let handle = std::thread::spawn(move || {
        buffer2.map_all(MapOptions::Write).unwrap();
        buffer2.unmap().unwrap();
    });
    handle.join().unwrap();
}

#[test]
fn view_refcount_lifecycle() {
    use stages_and_states::formats::VertexFormat;

    let format = VertexFormat::parse("P.Fx3").unwrap();
    let buffer = buffer(GraphicsLocality::SystemMemoryOnly, 12 * 8);
    assert!(buffer.dispose_on_view_dispose());

    let views: Vec<_> = (0..4)
        .map(|_| buffer.create_vertex_buffer(format.clone()).unwrap())
        .collect();
    assert_eq!(buffer.view_count(), 4);

    for view in &views[..3] {
        view.dispose();
    }
    assert!(!buffer.is_disposed());

    views[3].dispose();
    assert!(buffer.is_disposed());
}
