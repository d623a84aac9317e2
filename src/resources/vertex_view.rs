// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Vertex buffer views.

use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::Mutex;

use crate::common::{MapOptions, UpdateFrequency};
use crate::device::GraphicsDevice;
use crate::driver::DriverVertexBufferView;
use crate::error::GraphicsError;
use crate::formats::vertex::VertexFormat;
use crate::sync::Monitor;

use super::typeless_buffer::TypelessBuffer;

struct ViewInner {
    handle: Option<Arc<dyn DriverVertexBufferView>>,
    device_uses: u32,
    disposed: bool,
}

/// A typed window over a [`TypelessBuffer`] holding vertex data.
///
/// The view pins the buffer alive through its view counter and owns a
/// driver-side view handle of its own, created lazily on first bind.
pub struct VertexBufferView {
    buffer: Arc<TypelessBuffer>,
    format: VertexFormat,
    offset: u64,
    stride: u32,
    update_frequency: UpdateFrequency,
    update_frequency_count: u32,
    monitor: Monitor,
    inner: Mutex<ViewInner>,
}

impl VertexBufferView {
    pub(crate) fn new(
        buffer: Arc<TypelessBuffer>,
        format: VertexFormat,
        offset: u64,
        stride: u32,
        update_frequency: UpdateFrequency,
        update_frequency_count: u32,
    ) -> Arc<VertexBufferView> {
        buffer.add_ref();
        Arc::new(VertexBufferView {
            buffer,
            format,
            offset,
            stride,
            update_frequency,
            update_frequency_count,
            monitor: Monitor::new(),
            inner: Mutex::new(ViewInner {
                handle: None,
                device_uses: 0,
                disposed: false,
            }),
        })
    }

    // Properties.

    pub fn format(&self) -> &VertexFormat {
        &self.format
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn update_frequency(&self) -> UpdateFrequency {
        self.update_frequency
    }

    pub fn update_frequency_count(&self) -> u32 {
        self.update_frequency_count
    }

    /// Number of whole vertices addressable through this view.
    pub fn vertex_count(&self) -> u64 {
        (self.buffer.byte_size() - self.offset) / self.stride as u64
    }

    /// The raw buffer underneath; its lifetime is governed by the view
    /// counter, not by this handle.
    pub fn typeless_buffer(&self) -> &Arc<TypelessBuffer> {
        &self.buffer
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    pub fn is_bound_to_device(&self) -> bool {
        self.inner.lock().handle.is_some()
    }

    // Device binding.

    /// Ensures the buffer and this view both have driver parts. Idempotent.
    pub fn bind_to_device(&self, device: &GraphicsDevice) -> Result<(), GraphicsError> {
        self.assert_not_disposed()?;
        self.buffer.bind_to_device(device)?;
        let mut inner = self.inner.lock();
        if inner.handle.is_none() {
            let handle = self
                .buffer
                .with_driver_part(|part| {
                    device
                        .driver()
                        .create_vbuffer_view(part, self.stride, self.offset)
                })
                .ok_or(GraphicsError::Locality(
                    "the buffer has no device part to view",
                ))?;
            inner.handle = Some(Arc::from(handle));
        }
        Ok(())
    }

    /// Drops the view's driver handle; the buffer keeps its own.
    pub fn unbind_from_device(&self) -> Result<(), GraphicsError> {
        self.assert_not_disposed()?;
        self.inner.lock().handle = None;
        Ok(())
    }

    pub(crate) fn device_data(&self) -> Option<Arc<dyn DriverVertexBufferView>> {
        self.inner.lock().handle.clone()
    }

    pub(crate) fn used_by_device(&self) {
        self.buffer.used_by_device();
        let first = {
            let mut inner = self.inner.lock();
            inner.device_uses += 1;
            inner.device_uses == 1
        };
        if first {
            self.monitor.enter();
        }
    }

    pub(crate) fn unused_by_device(&self) {
        let last = {
            let mut inner = self.inner.lock();
            inner.device_uses -= 1;
            inner.device_uses == 0
        };
        if last {
            self.monitor.exit();
        }
        self.buffer.unused_by_device();
    }

    // Typed access.

    /// Writes `data` starting at vertex `element_offset`.
    ///
    /// `T` must have exactly the format's byte size; the write is a single
    /// map/copy/unmap transaction over the covered byte range.
    pub fn set_data<T: Pod>(&self, element_offset: u64, data: &[T]) -> Result<(), GraphicsError> {
        self.assert_not_disposed()?;
        self.assert_layout_matches::<T>()?;
        if data.is_empty() {
            return Ok(());
        }
        let size = self.format.byte_size() as u64;
        let stride = self.stride as u64;
        let start = self.offset + element_offset * stride;
        let count = (data.len() as u64 - 1) * stride + size;
        // A strided write must not clobber the gap bytes between vertices.
        let options = if stride == size {
            MapOptions::Write
        } else {
            MapOptions::ReadWrite
        };
        self.buffer.map(options, start, count)?;
        let result = (|| {
            for (i, vertex) in data.iter().enumerate() {
                self.buffer
                    .write_mapped(i as u64 * stride, bytemuck::bytes_of(vertex))?;
            }
            Ok(())
        })();
        self.buffer.unmap()?;
        result
    }

    /// Reads `count` vertices starting at vertex `element_offset`.
    pub fn get_data<T: Pod>(&self, element_offset: u64, count: u64) -> Result<Vec<T>, GraphicsError> {
        self.assert_not_disposed()?;
        self.assert_layout_matches::<T>()?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let size = self.format.byte_size() as u64;
        let stride = self.stride as u64;
        let start = self.offset + element_offset * stride;
        let byte_count = (count - 1) * stride + size;
        self.buffer.map(MapOptions::Read, start, byte_count)?;
        let result = (|| {
            let mut out = Vec::with_capacity(count as usize);
            for i in 0..count {
                let mut vertex = T::zeroed();
                self.buffer
                    .read_mapped(i * stride, bytemuck::bytes_of_mut(&mut vertex))?;
                out.push(vertex);
            }
            Ok(out)
        })();
        self.buffer.unmap()?;
        result
    }

    fn assert_layout_matches<T>(&self) -> Result<(), GraphicsError> {
        if std::mem::size_of::<T>() as u32 != self.format.byte_size() {
            return Err(GraphicsError::incompatible(format!(
                "the vertex struct is {} bytes but the format {} is {}",
                std::mem::size_of::<T>(),
                self.format,
                self.format.byte_size()
            )));
        }
        Ok(())
    }

    fn assert_not_disposed(&self) -> Result<(), GraphicsError> {
        if self.inner.lock().disposed {
            return Err(GraphicsError::Disposed("vertex buffer view"));
        }
        Ok(())
    }

    /// Releases the view's handle and its count on the buffer. Idempotent.
    pub fn dispose(&self) {
        let release = {
            let mut inner = self.inner.lock();
            if inner.disposed {
                false
            } else {
                inner.disposed = true;
                inner.handle = None;
                true
            }
        };
        if release {
            self.buffer.release();
        }
    }
}

impl std::fmt::Debug for VertexBufferView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexBufferView")
            .field("format", &self.format.to_string())
            .field("offset", &self.offset)
            .field("stride", &self.stride)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{BufferUsage, CpuAccess, GraphicsLocality, Usage};

    #[derive(Clone, Copy, PartialEq, Debug, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Vertex {
        position: [f32; 3],
        normal: [f32; 3],
    }

    fn vertex_buffer(vertices: u64) -> Arc<VertexBufferView> {
        let format = VertexFormat::parse("P.Fx3 N.Fx3").unwrap();
        let buffer = TypelessBuffer::new(
            Usage::Dynamic,
            BufferUsage::VERTEX_BUFFER,
            CpuAccess::READ_WRITE,
            GraphicsLocality::SystemMemoryOnly,
            format.byte_size() as u64 * vertices,
        );
        buffer.create_vertex_buffer(format).unwrap()
    }

    #[test]
    fn set_get_roundtrip() {
        let view = vertex_buffer(4);
        let data = [
            Vertex {
                position: [0.0, 1.0, 2.0],
                normal: [0.0, 0.0, 1.0],
            },
            Vertex {
                position: [3.0, 4.0, 5.0],
                normal: [0.0, 1.0, 0.0],
            },
        ];
        view.set_data(1, &data).unwrap();
        assert_eq!(view.get_data::<Vertex>(1, 2).unwrap(), data);
    }

    #[test]
    fn wrong_struct_size_rejected() {
        let view = vertex_buffer(4);
        assert!(matches!(
            view.set_data(0, &[0u32]),
            Err(GraphicsError::Incompatible(_))
        ));
    }

    #[test]
    fn view_refcount_disposes_buffer() {
        let view = vertex_buffer(1);
        let buffer = view.typeless_buffer().clone();
        assert_eq!(buffer.view_count(), 1);
        view.dispose();
        assert!(buffer.is_disposed());
        // A second dispose must not underflow the counter.
        view.dispose();
    }
}
