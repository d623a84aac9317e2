// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Index buffer views.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::MapOptions;
use crate::device::GraphicsDevice;
use crate::driver::DriverIndexBufferView;
use crate::error::GraphicsError;
use crate::sync::Monitor;

use super::typeless_buffer::TypelessBuffer;

/// Width of one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit indices.
    Short,
    /// 32-bit indices.
    Wide,
}

impl IndexFormat {
    pub fn byte_size(self) -> u32 {
        match self {
            IndexFormat::Short => 2,
            IndexFormat::Wide => 4,
        }
    }

    pub fn is_short(self) -> bool {
        self == IndexFormat::Short
    }

    pub fn is_wide(self) -> bool {
        self == IndexFormat::Wide
    }
}

struct ViewInner {
    handle: Option<Arc<dyn DriverIndexBufferView>>,
    device_uses: u32,
    disposed: bool,
}

/// A typed window over a [`TypelessBuffer`] holding indices.
pub struct IndexBufferView {
    buffer: Arc<TypelessBuffer>,
    format: IndexFormat,
    offset: u64,
    monitor: Monitor,
    inner: Mutex<ViewInner>,
}

impl IndexBufferView {
    pub(crate) fn new(
        buffer: Arc<TypelessBuffer>,
        format: IndexFormat,
        offset: u64,
    ) -> Arc<IndexBufferView> {
        buffer.add_ref();
        Arc::new(IndexBufferView {
            buffer,
            format,
            offset,
            monitor: Monitor::new(),
            inner: Mutex::new(ViewInner {
                handle: None,
                device_uses: 0,
                disposed: false,
            }),
        })
    }

    pub fn format(&self) -> IndexFormat {
        self.format
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of whole indices addressable through this view.
    pub fn index_count(&self) -> u64 {
        (self.buffer.byte_size() - self.offset) / self.format.byte_size() as u64
    }

    pub fn typeless_buffer(&self) -> &Arc<TypelessBuffer> {
        &self.buffer
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    pub fn is_bound_to_device(&self) -> bool {
        self.inner.lock().handle.is_some()
    }

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
                        .create_ibuffer_view(part, self.format.is_wide(), self.offset)
                })
                .ok_or(GraphicsError::Locality(
                    "the buffer has no device part to view",
                ))?;
            inner.handle = Some(Arc::from(handle));
        }
        Ok(())
    }

    pub fn unbind_from_device(&self) -> Result<(), GraphicsError> {
        self.assert_not_disposed()?;
        self.inner.lock().handle = None;
        Ok(())
    }

    pub(crate) fn device_data(&self) -> Option<Arc<dyn DriverIndexBufferView>> {
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

    /// Writes 16-bit indices starting at index `element_offset`.
    pub fn set_data_u16(&self, element_offset: u64, data: &[u16]) -> Result<(), GraphicsError> {
        if !self.format.is_short() {
            return Err(GraphicsError::incompatible(
                "the view holds wide indices, not u16",
            ));
        }
        self.write_bytes(element_offset, bytemuck::cast_slice(data))
    }

    /// Writes 32-bit indices starting at index `element_offset`.
    pub fn set_data_u32(&self, element_offset: u64, data: &[u32]) -> Result<(), GraphicsError> {
        if !self.format.is_wide() {
            return Err(GraphicsError::incompatible(
                "the view holds short indices, not u32",
            ));
        }
        self.write_bytes(element_offset, bytemuck::cast_slice(data))
    }

    pub fn get_data_u16(&self, element_offset: u64, count: u64) -> Result<Vec<u16>, GraphicsError> {
        if !self.format.is_short() {
            return Err(GraphicsError::incompatible(
                "the view holds wide indices, not u16",
            ));
        }
        let bytes = self.read_bytes(element_offset, count * 2)?;
        Ok(bytemuck::cast_slice(&bytes).to_vec())
    }

    pub fn get_data_u32(&self, element_offset: u64, count: u64) -> Result<Vec<u32>, GraphicsError> {
        if !self.format.is_wide() {
            return Err(GraphicsError::incompatible(
                "the view holds short indices, not u32",
            ));
        }
        let bytes = self.read_bytes(element_offset, count * 4)?;
        Ok(bytemuck::cast_slice(&bytes).to_vec())
    }

    fn write_bytes(&self, element_offset: u64, bytes: &[u8]) -> Result<(), GraphicsError> {
        self.assert_not_disposed()?;
        if bytes.is_empty() {
            return Ok(());
        }
        let start = self.offset + element_offset * self.format.byte_size() as u64;
        self.buffer
            .map(MapOptions::Write, start, bytes.len() as u64)?;
        let result = self.buffer.write_mapped(0, bytes);
        self.buffer.unmap()?;
        result
    }

    fn read_bytes(&self, element_offset: u64, byte_count: u64) -> Result<Vec<u8>, GraphicsError> {
        self.assert_not_disposed()?;
        let start = self.offset + element_offset * self.format.byte_size() as u64;
        self.buffer.map(MapOptions::Read, start, byte_count)?;
        let result = self.buffer.mapped_to_vec();
        self.buffer.unmap()?;
        result
    }

    fn assert_not_disposed(&self) -> Result<(), GraphicsError> {
        if self.inner.lock().disposed {
            return Err(GraphicsError::Disposed("index buffer view"));
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

impl std::fmt::Debug for IndexBufferView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBufferView")
            .field("format", &self.format)
            .field("offset", &self.offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{BufferUsage, CpuAccess, GraphicsLocality, Usage};

    fn index_buffer(format: IndexFormat, count: u64) -> Arc<IndexBufferView> {
        let buffer = TypelessBuffer::new(
            Usage::Dynamic,
            BufferUsage::INDEX_BUFFER,
            CpuAccess::READ_WRITE,
            GraphicsLocality::SystemMemoryOnly,
            format.byte_size() as u64 * count,
        );
        buffer.create_index_buffer(format).unwrap()
    }

    #[test]
    fn short_roundtrip() {
        let view = index_buffer(IndexFormat::Short, 6);
        view.set_data_u16(2, &[10, 11, 12]).unwrap();
        assert_eq!(view.get_data_u16(2, 3).unwrap(), vec![10, 11, 12]);
    }

    #[test]
    fn width_mismatch_rejected() {
        let view = index_buffer(IndexFormat::Short, 4);
        assert!(matches!(
            view.set_data_u32(0, &[1]),
            Err(GraphicsError::Incompatible(_))
        ));
        assert!(matches!(
            view.get_data_u32(0, 1),
            Err(GraphicsError::Incompatible(_))
        ));
    }
}
