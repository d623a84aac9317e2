// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Geometry: vertex buffer views plus an optional index view, with the
//! information needed to bind them as a pipeline input.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{BufferUsage, CpuAccess, GraphicsLocality, Topology, Usage};
use crate::device::GraphicsDevice;
use crate::driver::{DriverVertexLayout, VertexBindingElement};
use crate::error::GraphicsError;
use crate::formats::vertex::VertexFormat;
use crate::sync::Monitor;

use super::geometry_batch::GeometryBatch;
use super::index_view::{IndexBufferView, IndexFormat};
use super::typeless_buffer::TypelessBuffer;
use super::vertex_view::VertexBufferView;

struct GeometryInner {
    topology: Topology,
    vertex_buffers: Vec<Arc<VertexBufferView>>,
    index_buffer: Option<Arc<IndexBufferView>>,
    layout: Option<Arc<dyn DriverVertexLayout>>,
    associate_buffers: bool,
    device_uses: u32,
    disposed: bool,
}

/// Vertex streams and an optional index stream bound as one input.
///
/// Range checking is a property of concrete geometry, not the device: the
/// base type's `is_in_range` overloads are permissive, and the device
/// trusts whatever the bound geometry answers.
pub struct Geometry {
    monitor: Monitor,
    inner: Mutex<GeometryInner>,
}

impl Geometry {
    pub fn new(topology: Topology) -> Arc<Geometry> {
        Arc::new(Geometry {
            monitor: Monitor::new(),
            inner: Mutex::new(GeometryInner {
                topology,
                vertex_buffers: Vec::new(),
                index_buffer: None,
                layout: None,
                associate_buffers: false,
                device_uses: 0,
                disposed: false,
            }),
        })
    }

    /// Builds a [`GeometryBatch`]: a ring of `cyclic_buffers` dynamic
    /// vertex (and optionally index) buffers for per-frame rewriting.
    pub fn create_batch(
        vertex_format: VertexFormat,
        index_format: Option<IndexFormat>,
        max_vertices: u64,
        max_indices: u64,
        cyclic_buffers: u32,
    ) -> Result<Arc<GeometryBatch>, GraphicsError> {
        let cyclic_buffers = cyclic_buffers.max(1);
        let mut vertex_views = Vec::with_capacity(cyclic_buffers as usize);
        let mut index_views = Vec::with_capacity(cyclic_buffers as usize);
        for _ in 0..cyclic_buffers {
            let vbuffer = TypelessBuffer::new(
                Usage::Dynamic,
                BufferUsage::VERTEX_BUFFER,
                CpuAccess::WRITE,
                GraphicsLocality::DeviceOrSystemMemory,
                vertex_format.byte_size() as u64 * max_vertices,
            );
            vertex_views.push(vbuffer.create_vertex_buffer(vertex_format.clone())?);

            match index_format {
                Some(format) if max_indices > 0 => {
                    let ibuffer = TypelessBuffer::new(
                        Usage::Dynamic,
                        BufferUsage::INDEX_BUFFER,
                        CpuAccess::WRITE,
                        GraphicsLocality::DeviceOrSystemMemory,
                        format.byte_size() as u64 * max_indices,
                    );
                    index_views.push(Some(ibuffer.create_index_buffer(format)?));
                }
                _ => index_views.push(None),
            }
        }
        Ok(GeometryBatch::new(vertex_views, index_views))
    }

    // Properties.

    pub fn topology(&self) -> Topology {
        self.inner.lock().topology
    }

    pub fn set_topology(&self, value: Topology) {
        self.inner.lock().topology = value;
    }

    /// On dispose, buffer views are also disposed.
    pub fn associate_buffers(&self) -> bool {
        self.inner.lock().associate_buffers
    }

    pub fn set_associate_buffers(&self, value: bool) {
        self.inner.lock().associate_buffers = value;
    }

    pub fn vertex_buffer_count(&self) -> u32 {
        self.inner.lock().vertex_buffers.len() as u32
    }

    pub fn vertex_buffer(&self, index: u32) -> Option<Arc<VertexBufferView>> {
        self.inner.lock().vertex_buffers.get(index as usize).cloned()
    }

    pub fn index_buffer(&self) -> Option<Arc<IndexBufferView>> {
        self.inner.lock().index_buffer.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    /// Whether this geometry can be bound as a geometry-stage output.
    ///
    /// Output binding needs an output layout, a deferred feature, so base
    /// geometry always answers no.
    pub fn is_output_compatible(&self) -> bool {
        false
    }

    /// Assigns a vertex stream. Streams are filled sequentially: `index`
    /// may replace an existing stream or append directly after the last.
    pub fn set_vertex_buffer(
        &self,
        index: u32,
        view: Arc<VertexBufferView>,
    ) -> Result<(), GraphicsError> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(GraphicsError::Disposed("geometry"));
        }
        let index = index as usize;
        if index == inner.vertex_buffers.len() {
            inner.vertex_buffers.push(view);
            // A new stream invalidates the cached input layout.
            inner.layout = None;
        } else if index < inner.vertex_buffers.len() {
            inner.vertex_buffers[index] = view;
        } else {
            return Err(GraphicsError::incompatible(
                "vertex buffers must be added sequentially",
            ));
        }
        Ok(())
    }

    pub fn set_index_buffer(&self, view: Option<Arc<IndexBufferView>>) -> Result<(), GraphicsError> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(GraphicsError::Disposed("geometry"));
        }
        inner.index_buffer = view;
        Ok(())
    }

    // Device locking. The cascade keeps every underlying buffer's monitor
    // held for as long as the geometry occupies a device slot.

    pub(crate) fn used_by_device(&self) {
        let (first, vertex_buffers, index_buffer) = {
            let mut inner = self.inner.lock();
            inner.device_uses += 1;
            (
                inner.device_uses == 1,
                inner.vertex_buffers.clone(),
                inner.index_buffer.clone(),
            )
        };
        if first {
            self.monitor.enter();
        }
        if let Some(index) = index_buffer {
            index.used_by_device();
        }
        for view in vertex_buffers {
            view.used_by_device();
        }
    }

    pub(crate) fn unused_by_device(&self) {
        let (last, vertex_buffers, index_buffer) = {
            let mut inner = self.inner.lock();
            inner.device_uses -= 1;
            (
                inner.device_uses == 0,
                inner.vertex_buffers.clone(),
                inner.index_buffer.clone(),
            )
        };
        if last {
            self.monitor.exit();
        }
        if let Some(index) = index_buffer {
            index.unused_by_device();
        }
        for view in vertex_buffers {
            view.unused_by_device();
        }
    }

    // Device binding.

    /// Binds every stream's buffer and view to the device. Idempotent.
    pub fn bind_to_device(&self, device: &GraphicsDevice) -> Result<(), GraphicsError> {
        let (vertex_buffers, index_buffer) = {
            let inner = self.inner.lock();
            if inner.disposed {
                return Err(GraphicsError::Disposed("geometry"));
            }
            (inner.vertex_buffers.clone(), inner.index_buffer.clone())
        };
        for view in &vertex_buffers {
            view.bind_to_device(device)?;
        }
        if let Some(index) = &index_buffer {
            index.bind_to_device(device)?;
        }
        Ok(())
    }

    /// Creates the driver input layout if the cached one was invalidated.
    pub fn bind_input_layout(&self, device: &GraphicsDevice) -> Result<(), GraphicsError> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(GraphicsError::Disposed("geometry"));
        }
        if inner.layout.is_none() {
            let elements: Vec<VertexBindingElement> = inner
                .vertex_buffers
                .iter()
                .map(|view| VertexBindingElement {
                    format: view.format().clone(),
                    update_frequency: view.update_frequency(),
                    update_frequency_count: view.update_frequency_count(),
                })
                .collect();
            inner.layout = Some(Arc::from(device.driver().create_vertex_binding(&elements)));
        }
        Ok(())
    }

    /// Output layouts are a deferred feature.
    pub fn bind_output_layout(&self, _device: &GraphicsDevice) -> Result<(), GraphicsError> {
        Err(GraphicsError::Unsupported("geometry output layouts"))
    }

    /// Drops the cached input layout; recreated on next bind.
    pub fn unbind_from_device(&self) -> Result<(), GraphicsError> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(GraphicsError::Disposed("geometry"));
        }
        inner.layout = None;
        Ok(())
    }

    pub fn is_bound_to_device(&self) -> bool {
        self.inner.lock().layout.is_some()
    }

    pub(crate) fn layout_handle(&self) -> Option<Arc<dyn DriverVertexLayout>> {
        self.inner.lock().layout.clone()
    }

    // Range checking: permissive at this level.

    pub fn is_in_range(&self, _offset: u64, _count: u64) -> bool {
        true
    }

    pub fn is_in_range_indexed(&self, _offset: u64, _count: u64, _base_index: i64) -> bool {
        true
    }

    pub fn is_in_range_instanced(
        &self,
        _offset: u64,
        _count: u64,
        _instance_offset: u32,
        _instance_count: u32,
    ) -> bool {
        true
    }

    /// Disposes the geometry; with `associate_buffers`, its views go too.
    /// Idempotent. Refused while bound in a device slot.
    pub fn dispose(&self) -> Result<(), GraphicsError> {
        let mut inner = self.inner.lock();
        if inner.device_uses > 0 {
            return Err(GraphicsError::Locked);
        }
        if !inner.disposed {
            inner.layout = None;
            if inner.associate_buffers {
                for view in &inner.vertex_buffers {
                    view.dispose();
                }
                if let Some(index) = &inner.index_buffer {
                    index.dispose();
                }
            }
            inner.vertex_buffers.clear();
            inner.index_buffer = None;
            inner.disposed = true;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Geometry")
            .field("topology", &inner.topology)
            .field("vertex_buffers", &inner.vertex_buffers.len())
            .field("indexed", &inner.index_buffer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex_view() -> Arc<VertexBufferView> {
        let format = VertexFormat::parse("P.Fx3").unwrap();
        let buffer = TypelessBuffer::new(
            Usage::Dynamic,
            BufferUsage::VERTEX_BUFFER,
            CpuAccess::WRITE,
            GraphicsLocality::SystemMemoryOnly,
            format.byte_size() as u64 * 8,
        );
        buffer.create_vertex_buffer(format).unwrap()
    }

    #[test]
    fn streams_fill_sequentially() {
        let geometry = Geometry::new(Topology::Triangle);
        geometry.set_vertex_buffer(0, vertex_view()).unwrap();
        geometry.set_vertex_buffer(1, vertex_view()).unwrap();
        // Replacing stream 0 is fine; skipping to 3 is not.
        geometry.set_vertex_buffer(0, vertex_view()).unwrap();
        assert!(matches!(
            geometry.set_vertex_buffer(3, vertex_view()),
            Err(GraphicsError::Incompatible(_))
        ));
        assert_eq!(geometry.vertex_buffer_count(), 2);
    }

    #[test]
    fn associated_buffers_dispose_with_geometry() {
        let geometry = Geometry::new(Topology::Triangle);
        let view = vertex_view();
        let buffer = view.typeless_buffer().clone();
        geometry.set_vertex_buffer(0, view).unwrap();
        geometry.set_associate_buffers(true);
        geometry.dispose().unwrap();
        assert!(buffer.is_disposed());
        // Idempotent.
        geometry.dispose().unwrap();
    }

    #[test]
    fn base_range_check_is_permissive() {
        let geometry = Geometry::new(Topology::LineStrip);
        assert!(geometry.is_in_range(0, u64::MAX));
        assert!(geometry.is_in_range_indexed(5, 100, -3));
    }
}
