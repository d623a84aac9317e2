// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Dynamic geometry batching over a cyclic buffer ring.
//!
//! A batch owns `N` vertex/index buffer pairs and rotates through them:
//! each `begin_batch` advances the ring, swaps the fresh pair into the
//! batch geometry's primary stream and opens write mappings. Rotating
//! keeps the GPU drawing from last frame's pair while the CPU fills the
//! next one.

use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::Mutex;

use crate::common::{MapOptions, Topology};
use crate::error::GraphicsError;

use super::geometry::Geometry;
use super::index_view::IndexBufferView;
use super::vertex_view::VertexBufferView;

struct BatchState {
    buffer_index: usize,
    vertex_index: u64,
    index_index: u64,
    batching: bool,
}

/// A geometry whose primary buffers are refilled each frame.
///
/// Built by [`Geometry::create_batch`]; bind [`geometry`] to the device
/// for drawing.
///
/// [`geometry`]: GeometryBatch::geometry
pub struct GeometryBatch {
    geometry: Arc<Geometry>,
    vertex_buffers: Vec<Arc<VertexBufferView>>,
    index_buffers: Vec<Option<Arc<IndexBufferView>>>,
    state: Mutex<BatchState>,
}

impl GeometryBatch {
    pub(crate) fn new(
        vertex_buffers: Vec<Arc<VertexBufferView>>,
        index_buffers: Vec<Option<Arc<IndexBufferView>>>,
    ) -> Arc<GeometryBatch> {
        let geometry = Geometry::new(Topology::Triangle);
        geometry.set_associate_buffers(true);
        let ring_size = vertex_buffers.len();
        Arc::new(GeometryBatch {
            geometry,
            vertex_buffers,
            index_buffers,
            state: Mutex::new(BatchState {
                // Starts past the end so the first rotation lands on 0.
                buffer_index: ring_size,
                vertex_index: 0,
                index_index: 0,
                batching: false,
            }),
        })
    }

    /// The geometry to bind for drawing. Its primary stream changes on
    /// every [`begin_batch`].
    ///
    /// [`begin_batch`]: GeometryBatch::begin_batch
    pub fn geometry(&self) -> &Arc<Geometry> {
        &self.geometry
    }

    /// Vertices written since the last `begin_batch`.
    pub fn vertex_count(&self) -> u64 {
        self.state.lock().vertex_index
    }

    /// Indices written since the last `begin_batch`.
    pub fn index_count(&self) -> u64 {
        self.state.lock().index_index
    }

    /// Whether the batch is in indexed mode.
    pub fn is_indexed(&self) -> bool {
        self.index_buffers.iter().any(|view| view.is_some())
    }

    /// Rotates the ring and opens write mappings on the fresh pair.
    pub fn begin_batch(&self) -> Result<(), GraphicsError> {
        let next = {
            let state = self.state.lock();
            if state.batching {
                return Err(GraphicsError::AlreadyMapped);
            }
            if state.buffer_index + 1 >= self.vertex_buffers.len() {
                0
            } else {
                state.buffer_index + 1
            }
        };

        let vertex = &self.vertex_buffers[next];
        let index = &self.index_buffers[next];
        self.geometry.set_vertex_buffer(0, vertex.clone())?;
        self.geometry.set_index_buffer(index.clone())?;

        vertex.typeless_buffer().map_all(MapOptions::Write)?;
        if let Some(index) = index {
            if let Err(error) = index.typeless_buffer().map_all(MapOptions::Write) {
                vertex.typeless_buffer().unmap()?;
                return Err(error);
            }
        }

        let mut state = self.state.lock();
        state.buffer_index = next;
        state.vertex_index = 0;
        state.index_index = 0;
        state.batching = true;
        Ok(())
    }

    /// Commits the open mappings.
    pub fn end_batch(&self) -> Result<(), GraphicsError> {
        {
            let mut state = self.state.lock();
            if !state.batching {
                return Err(GraphicsError::NotMapped);
            }
            state.batching = false;
        }
        let current = self.state.lock().buffer_index;
        self.vertex_buffers[current].typeless_buffer().unmap()?;
        if let Some(index) = &self.index_buffers[current] {
            index.typeless_buffer().unmap()?;
        }
        Ok(())
    }

    /// Appends vertices to the primary stream, copying until the buffer is
    /// full. Returns how many were actually added.
    ///
    /// `T` must have exactly the vertex format's byte size.
    pub fn add_vertices<T: Pod>(&self, data: &[T]) -> Result<u64, GraphicsError> {
        let mut state = self.state.lock();
        if !state.batching {
            return Err(GraphicsError::NotMapped);
        }
        let current = &self.vertex_buffers[state.buffer_index];
        let size = current.format().byte_size() as u64;
        if std::mem::size_of::<T>() as u64 != size {
            return Err(GraphicsError::incompatible(format!(
                "the vertex struct is {} bytes but the batch format is {}",
                std::mem::size_of::<T>(),
                size
            )));
        }

        let buffer = current.typeless_buffer();
        let capacity = buffer.mapped_len()? / size;
        let to_add = (capacity - state.vertex_index).min(data.len() as u64);
        let bytes: &[u8] = bytemuck::cast_slice(&data[..to_add as usize]);
        buffer.write_mapped(state.vertex_index * size, bytes)?;
        state.vertex_index += to_add;
        Ok(to_add)
    }

    /// Appends 16-bit indices, copying until the index buffer is full.
    pub fn add_indices_u16(&self, data: &[u16]) -> Result<u64, GraphicsError> {
        self.add_index_bytes(bytemuck::cast_slice(data), 2, |format| format.is_short())
    }

    /// Appends 32-bit indices, copying until the index buffer is full.
    pub fn add_indices_u32(&self, data: &[u32]) -> Result<u64, GraphicsError> {
        self.add_index_bytes(bytemuck::cast_slice(data), 4, |format| format.is_wide())
    }

    fn add_index_bytes(
        &self,
        bytes: &[u8],
        width: u64,
        accepts: impl FnOnce(super::index_view::IndexFormat) -> bool,
    ) -> Result<u64, GraphicsError> {
        let mut state = self.state.lock();
        if !state.batching {
            return Err(GraphicsError::NotMapped);
        }
        let index = self.index_buffers[state.buffer_index]
            .as_ref()
            .ok_or(GraphicsError::incompatible(
                "cannot add indices to non-indexed geometry",
            ))?;
        if !accepts(index.format()) {
            return Err(GraphicsError::incompatible("invalid index width"));
        }

        let buffer = index.typeless_buffer();
        let capacity = buffer.mapped_len()? / width;
        let to_add = (capacity - state.index_index).min(bytes.len() as u64 / width);
        buffer.write_mapped(
            state.index_index * width,
            &bytes[..(to_add * width) as usize],
        )?;
        state.index_index += to_add;
        Ok(to_add)
    }
}

impl std::fmt::Debug for GeometryBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("GeometryBatch")
            .field("ring_size", &self.vertex_buffers.len())
            .field("batching", &state.batching)
            .field("vertices", &state.vertex_index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::vertex::VertexFormat;
    use crate::resources::index_view::IndexFormat;

    #[derive(Clone, Copy, PartialEq, Debug, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Point {
        position: [f32; 3],
    }

    fn point(x: f32) -> Point {
        Point {
            position: [x, 0.0, 0.0],
        }
    }

    fn batch(max_vertices: u64, rings: u32) -> Arc<GeometryBatch> {
        Geometry::create_batch(
            VertexFormat::parse("P.Fx3").unwrap(),
            Some(IndexFormat::Short),
            max_vertices,
            max_vertices * 3,
            rings,
        )
        .unwrap()
    }

    #[test]
    fn writes_require_an_open_batch() {
        let batch = batch(8, 2);
        assert!(matches!(
            batch.add_vertices(&[point(0.0)]),
            Err(GraphicsError::NotMapped)
        ));
        assert!(matches!(batch.end_batch(), Err(GraphicsError::NotMapped)));
    }

    #[test]
    fn capacity_truncates() {
        let batch = batch(4, 1);
        batch.begin_batch().unwrap();
        let added = batch
            .add_vertices(&[point(0.0), point(1.0), point(2.0)])
            .unwrap();
        assert_eq!(added, 3);
        // Only one slot left; the rest is dropped.
        let added = batch
            .add_vertices(&[point(3.0), point(4.0), point(5.0)])
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(batch.vertex_count(), 4);
        batch.end_batch().unwrap();
    }

    #[test]
    fn ring_rotates_and_resets_counts() {
        let batch = batch(8, 2);
        batch.begin_batch().unwrap();
        batch.add_vertices(&[point(0.0)]).unwrap();
        batch.add_indices_u16(&[0, 0, 0]).unwrap();
        batch.end_batch().unwrap();

        let first = batch.geometry().vertex_buffer(0).unwrap();
        batch.begin_batch().unwrap();
        assert_eq!(batch.vertex_count(), 0);
        assert_eq!(batch.index_count(), 0);
        let second = batch.geometry().vertex_buffer(0).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        batch.end_batch().unwrap();
    }

    #[test]
    fn index_width_validated() {
        let batch = batch(8, 1);
        batch.begin_batch().unwrap();
        assert!(matches!(
            batch.add_indices_u32(&[1, 2]),
            Err(GraphicsError::Incompatible(_))
        ));
        batch.end_batch().unwrap();
    }

    #[test]
    fn double_begin_rejected() {
        let batch = batch(8, 2);
        batch.begin_batch().unwrap();
        assert!(matches!(
            batch.begin_batch(),
            Err(GraphicsError::AlreadyMapped)
        ));
        batch.end_batch().unwrap();
    }
}
