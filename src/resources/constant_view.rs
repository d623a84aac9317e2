// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Constant buffer views.
//!
//! A constant buffer view couples a [`TypelessBuffer`] with a
//! [`ConstantBufferLayout`] so shader parameters can be written by name.
//! Values travel as the closed [`ConstantValue`] enum; the layout decides
//! where each parameter lands and rejects shape mismatches before any byte
//! is written.

use std::sync::Arc;

use glam::{IVec2, IVec3, IVec4, Mat4, Vec2, Vec3, Vec4};
use parking_lot::Mutex;

use crate::common::{BufferUsage, CpuAccess, GraphicsLocality, MapOptions, Usage};
use crate::device::GraphicsDevice;
use crate::driver::DriverConstantBufferView;
use crate::error::GraphicsError;
use crate::formats::layout::ConstantBufferLayout;
use crate::formats::pin::{DYNAMIC_ARRAY, NOT_ARRAY, PinFormat};
use crate::sync::Monitor;

use super::typeless_buffer::TypelessBuffer;

/// A shader constant value with its shape.
///
/// Matrices are written row-major (sixteen floats for a 4×4); vectors and
/// scalars use their natural component order; arrays pack their elements
/// contiguously.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Float(f32),
    Float2(Vec2),
    Float3(Vec3),
    Float4(Vec4),
    Int(i32),
    Int2(IVec2),
    Int3(IVec3),
    Int4(IVec4),
    UInt(u32),
    Matrix(Mat4),
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
}

impl ConstantValue {
    /// The pin shape this value fills.
    pub fn pin_format(&self) -> PinFormat {
        match self {
            ConstantValue::Float(_) | ConstantValue::FloatArray(_) => PinFormat::Float,
            ConstantValue::Float2(_) => PinFormat::Floatx2,
            ConstantValue::Float3(_) => PinFormat::Floatx3,
            ConstantValue::Float4(_) => PinFormat::Floatx4,
            ConstantValue::Int(_) | ConstantValue::IntArray(_) => PinFormat::Integer,
            ConstantValue::Int2(_) => PinFormat::Integerx2,
            ConstantValue::Int3(_) => PinFormat::Integerx3,
            ConstantValue::Int4(_) => PinFormat::Integerx4,
            ConstantValue::UInt(_) => PinFormat::UInteger,
            ConstantValue::Matrix(_) => PinFormat::Float4x4,
        }
    }

    /// Element count for array values, `None` for single values.
    pub fn array_len(&self) -> Option<u32> {
        match self {
            ConstantValue::FloatArray(values) => Some(values.len() as u32),
            ConstantValue::IntArray(values) => Some(values.len() as u32),
            _ => None,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        match self {
            ConstantValue::Float(v) => v.to_le_bytes().to_vec(),
            ConstantValue::Float2(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            ConstantValue::Float3(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            ConstantValue::Float4(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            ConstantValue::Int(v) => v.to_le_bytes().to_vec(),
            ConstantValue::Int2(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            ConstantValue::Int3(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            ConstantValue::Int4(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            ConstantValue::UInt(v) => v.to_le_bytes().to_vec(),
            // Row-major: transposing a column-major matrix lays the rows
            // out sequentially.
            ConstantValue::Matrix(m) => {
                bytemuck::cast_slice(&m.transpose().to_cols_array()).to_vec()
            }
            ConstantValue::FloatArray(values) => bytemuck::cast_slice(values).to_vec(),
            ConstantValue::IntArray(values) => bytemuck::cast_slice(values).to_vec(),
        }
    }
}

/// A batch of named constant writes, applied in one map/unmap transaction
/// through [`ConstantBufferView::write`].
#[derive(Debug, Clone, Default)]
pub struct ConstantWrites {
    entries: Vec<(String, ConstantValue)>,
}

impl ConstantWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: ConstantValue) -> Self {
        self.entries.push((name.into(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ConstantValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }
}

struct ViewInner {
    handle: Option<Arc<dyn DriverConstantBufferView>>,
    device_uses: u32,
    disposed: bool,
}

/// A window over a [`TypelessBuffer`] holding shader constants.
pub struct ConstantBufferView {
    buffer: Arc<TypelessBuffer>,
    layout: ConstantBufferLayout,
    monitor: Monitor,
    inner: Mutex<ViewInner>,
}

impl ConstantBufferView {
    pub(crate) fn new(
        buffer: Arc<TypelessBuffer>,
        layout: ConstantBufferLayout,
    ) -> Arc<ConstantBufferView> {
        buffer.add_ref();
        Arc::new(ConstantBufferView {
            buffer,
            layout,
            monitor: Monitor::new(),
            inner: Mutex::new(ViewInner {
                handle: None,
                device_uses: 0,
                disposed: false,
            }),
        })
    }

    /// Builds a buffer sized for `layout` and returns its constant view.
    pub fn create(
        usage: Usage,
        access: CpuAccess,
        locality: GraphicsLocality,
        layout: ConstantBufferLayout,
    ) -> Result<Arc<ConstantBufferView>, GraphicsError> {
        let buffer = TypelessBuffer::new(
            usage,
            BufferUsage::CONSTANT_BUFFER,
            access,
            locality,
            layout.minimum_buffer_size_in_bytes() as u64,
        );
        buffer.create_constant_buffer(layout)
    }

    /// The layout bound to this view.
    pub fn layout(&self) -> &ConstantBufferLayout {
        &self.layout
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

    // Mapping. Delegates to the buffer, which holds its monitor for the
    // whole transaction.

    pub fn map(&self, options: MapOptions) -> Result<(), GraphicsError> {
        self.assert_not_disposed()?;
        self.buffer.map_all(options)
    }

    pub fn unmap(&self) -> Result<(), GraphicsError> {
        self.buffer.unmap()
    }

    /// Writes one named constant into the currently mapped range.
    ///
    /// The buffer must be mapped for writing; unknown names and shape
    /// mismatches are rejected before anything is written.
    pub fn set_constant(&self, name: &str, value: &ConstantValue) -> Result<(), GraphicsError> {
        self.assert_not_disposed()?;
        if !self.buffer.is_mapped() {
            return Err(GraphicsError::NotMapped);
        }
        let location = self.layout.try_get(name).ok_or_else(|| {
            GraphicsError::incompatible(format!(
                "parameter {name} does not exist in the layout bound to this view"
            ))
        })?;

        if location.array_size == NOT_ARRAY {
            if value.array_len().is_some() || value.pin_format() != location.format {
                return Err(GraphicsError::incompatible(format!(
                    "parameter {name} expects a single {:?}",
                    location.format
                )));
            }
        } else {
            let len = value.array_len().ok_or_else(|| {
                GraphicsError::incompatible(format!("parameter {name} expects an array"))
            })?;
            if value.pin_format() != location.format.to_scalar() {
                return Err(GraphicsError::incompatible(format!(
                    "parameter {name} expects elements of {:?}",
                    location.format
                )));
            }
            if location.array_size != DYNAMIC_ARRAY && len != location.array_size {
                return Err(GraphicsError::incompatible(format!(
                    "parameter {name} expects {} elements, got {len}",
                    location.array_size
                )));
            }
        }

        self.buffer
            .write_mapped(location.offset as u64, &value.to_bytes())
    }

    /// Applies a batch of writes in one write-mapping transaction.
    pub fn write(&self, writes: &ConstantWrites) -> Result<(), GraphicsError> {
        self.map(MapOptions::ReadWrite)?;
        let result = (|| {
            for (name, value) in writes.entries() {
                self.set_constant(name, value)?;
            }
            Ok(())
        })();
        self.unmap()?;
        result
    }

    // Device binding.

    pub fn bind_to_device(&self, device: &GraphicsDevice) -> Result<(), GraphicsError> {
        self.assert_not_disposed()?;
        self.buffer.bind_to_device(device)?;
        let mut inner = self.inner.lock();
        if inner.handle.is_none() {
            let handle = self
                .buffer
                .with_driver_part(|part| device.driver().create_cbuffer_view(part))
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

    pub(crate) fn device_data(&self) -> Option<Arc<dyn DriverConstantBufferView>> {
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

    fn assert_not_disposed(&self) -> Result<(), GraphicsError> {
        if self.inner.lock().disposed {
            return Err(GraphicsError::Disposed("constant buffer view"));
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

impl std::fmt::Debug for ConstantBufferView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantBufferView")
            .field("parameters", &self.layout.parameter_count())
            .field("byte_size", &self.buffer.byte_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::layout::ConstantBufferLayoutBuilder;

    fn transform_layout() -> ConstantBufferLayout {
        let mut builder = ConstantBufferLayoutBuilder::new();
        builder.append_element("transform", PinFormat::Float4x4).unwrap();
        builder.append_element("tint", PinFormat::Floatx4).unwrap();
        builder.append_element("level", PinFormat::Integer).unwrap();
        builder
            .append_element_array("weights", PinFormat::Float, 4)
            .unwrap();
        builder.create_layout()
    }

    fn view() -> Arc<ConstantBufferView> {
        ConstantBufferView::create(
            Usage::Dynamic,
            CpuAccess::READ_WRITE,
            GraphicsLocality::SystemMemoryOnly,
            transform_layout(),
        )
        .unwrap()
    }

    #[test]
    fn buffer_is_sized_by_layout() {
        let view = view();
        assert_eq!(
            view.typeless_buffer().byte_size(),
            view.layout().minimum_buffer_size_in_bytes() as u64
        );
    }

    #[test]
    fn set_constant_requires_mapping() {
        let view = view();
        assert!(matches!(
            view.set_constant("level", &ConstantValue::Int(3)),
            Err(GraphicsError::NotMapped)
        ));
    }

    #[test]
    fn matrix_written_row_major() {
        let view = view();
        // Columns are (1,0,0,0), (0,1,0,0), ... with translation in the
        // last column; row-major layout puts the translation at elements
        // 3, 7, 11 of the written floats.
        let matrix = Mat4::from_translation(Vec3::new(5.0, 6.0, 7.0));
        view.map(MapOptions::Write).unwrap();
        view.set_constant("transform", &ConstantValue::Matrix(matrix))
            .unwrap();
        view.unmap().unwrap();

        view.map(MapOptions::Read).unwrap();
        let bytes = view.typeless_buffer().mapped_to_vec().unwrap();
        view.unmap().unwrap();
        let floats: &[f32] = bytemuck::cast_slice(&bytes[0..64]);
        assert_eq!(floats[3], 5.0);
        assert_eq!(floats[7], 6.0);
        assert_eq!(floats[11], 7.0);
        assert_eq!(floats[15], 1.0);
    }

    #[test]
    fn shape_mismatches_rejected() {
        let view = view();
        view.map(MapOptions::Write).unwrap();
        // Wrong shape for a single parameter.
        assert!(view
            .set_constant("level", &ConstantValue::Float(1.0))
            .is_err());
        // Single value for an array parameter.
        assert!(view
            .set_constant("weights", &ConstantValue::Float(1.0))
            .is_err());
        // Wrong array length.
        assert!(view
            .set_constant("weights", &ConstantValue::FloatArray(vec![1.0; 3]))
            .is_err());
        // Unknown name.
        assert!(view
            .set_constant("missing", &ConstantValue::Float(1.0))
            .is_err());
        view.unmap().unwrap();
    }

    #[test]
    fn batched_writes_roundtrip() {
        let view = view();
        let writes = ConstantWrites::new()
            .set("tint", ConstantValue::Float4(Vec4::new(1.0, 0.5, 0.25, 1.0)))
            .set("level", ConstantValue::Int(9))
            .set("weights", ConstantValue::FloatArray(vec![0.1, 0.2, 0.3, 0.4]));
        view.write(&writes).unwrap();

        view.map(MapOptions::Read).unwrap();
        let bytes = view.typeless_buffer().mapped_to_vec().unwrap();
        view.unmap().unwrap();

        let tint_offset = view.layout().try_get_offset("tint").unwrap() as usize;
        let tint: &[f32] = bytemuck::cast_slice(&bytes[tint_offset..tint_offset + 16]);
        assert_eq!(tint, &[1.0, 0.5, 0.25, 1.0]);

        let level_offset = view.layout().try_get_offset("level").unwrap() as usize;
        let level = i32::from_le_bytes(bytes[level_offset..level_offset + 4].try_into().unwrap());
        assert_eq!(level, 9);
    }
}
