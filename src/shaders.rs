// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Shader stage objects.
//!
//! Shader compilation is an external collaborator; the device only ingests
//! finished bytecode and hands back one of the three thin owners below.
//! Each owns its driver handle and a device-use counter. Unlike resource
//! locks, shader use counts survive unlock/lock cycles of the device: a
//! bound shader stays held until it is replaced or states are cleared.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::driver::{DriverGeometryShader, DriverPixelShader, DriverVertexShader};
use crate::error::GraphicsError;

struct ShaderInner<H: ?Sized> {
    handle: Option<Arc<H>>,
    device_uses: u32,
    disposed: bool,
}

macro_rules! shader_stage {
    ($(#[$doc:meta])* $name:ident, $handle:ty, $label:literal) => {
        $(#[$doc])*
        pub struct $name {
            inner: Mutex<ShaderInner<$handle>>,
        }

        impl $name {
            pub(crate) fn new(handle: Box<$handle>) -> Arc<$name> {
                Arc::new($name {
                    inner: Mutex::new(ShaderInner {
                        handle: Some(Arc::from(handle)),
                        device_uses: 0,
                        disposed: false,
                    }),
                })
            }

            pub fn is_disposed(&self) -> bool {
                self.inner.lock().disposed
            }

            /// How many device slots currently hold this shader.
            pub fn device_use_count(&self) -> u32 {
                self.inner.lock().device_uses
            }

            pub(crate) fn device_data(&self) -> Option<Arc<$handle>> {
                self.inner.lock().handle.clone()
            }

            pub(crate) fn used_by_device(&self) {
                self.inner.lock().device_uses += 1;
            }

            pub(crate) fn unused_by_device(&self) {
                self.inner.lock().device_uses -= 1;
            }

            /// Releases the driver handle. Idempotent; a shader still bound
            /// to a device cannot be disposed.
            pub fn dispose(&self) -> Result<(), GraphicsError> {
                let mut inner = self.inner.lock();
                if inner.device_uses > 0 {
                    return Err(GraphicsError::Locked);
                }
                inner.handle = None;
                inner.disposed = true;
                Ok(())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let inner = self.inner.lock();
                f.debug_struct($label)
                    .field("device_uses", &inner.device_uses)
                    .field("disposed", &inner.disposed)
                    .finish()
            }
        }
    };
}

shader_stage!(
    /// A vertex stage program.
    VertexShader,
    dyn DriverVertexShader,
    "VertexShader"
);
shader_stage!(
    /// A geometry stage program.
    GeometryShader,
    dyn DriverGeometryShader,
    "GeometryShader"
);
shader_stage!(
    /// A pixel stage program.
    PixelShader,
    dyn DriverPixelShader,
    "PixelShader"
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverDevice;
    use crate::driver::headless::HeadlessDevice;

    #[test]
    fn dispose_refused_while_bound() {
        let driver = HeadlessDevice::new();
        let shader = VertexShader::new(driver.create_vertex_shader(&[0, 1, 2]));
        shader.used_by_device();
        assert!(matches!(shader.dispose(), Err(GraphicsError::Locked)));
        shader.unused_by_device();
        shader.dispose().unwrap();
        assert!(shader.is_disposed());
        // Idempotent.
        shader.dispose().unwrap();
    }
}
