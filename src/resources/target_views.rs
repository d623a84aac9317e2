// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Texture, render-target and depth-stencil views.
//!
//! These views project a pixel format over either a texture's mipmap range
//! or a buffer reinterpreted as pixel rows. Render and depth-stencil
//! targets are written by the GPU, so binding one marks the source
//! resource's system copy stale; the next CPU map resynchronizes.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::GraphicsDevice;
use crate::driver::{DriverDepthStencilView, DriverRenderTargetView, DriverTextureView};
use crate::error::GraphicsError;
use crate::formats::pixel::PixelFormat;
use crate::sync::Monitor;

use super::texture::{TypelessTexture2D, mipmap_dimensions};
use super::typeless_buffer::TypelessBuffer;

/// The resource a target view projects over.
enum TargetSource {
    Buffer {
        buffer: Arc<TypelessBuffer>,
        offset: u64,
        stride: u32,
    },
    Texture {
        texture: Arc<TypelessTexture2D>,
        /// Most detailed level for shader-input views, the one rendered
        /// level for render targets.
        mipmap: u32,
        mipmap_count: u32,
    },
}

impl TargetSource {
    fn add_ref(&self) {
        match self {
            TargetSource::Buffer { buffer, .. } => buffer.add_ref(),
            TargetSource::Texture { texture, .. } => texture.add_ref(),
        }
    }

    fn release(&self) {
        match self {
            TargetSource::Buffer { buffer, .. } => buffer.release(),
            TargetSource::Texture { texture, .. } => texture.release(),
        }
    }

    fn used_by_device(&self) {
        match self {
            TargetSource::Buffer { buffer, .. } => buffer.used_by_device(),
            TargetSource::Texture { texture, .. } => texture.used_by_device(),
        }
    }

    fn unused_by_device(&self) {
        match self {
            TargetSource::Buffer { buffer, .. } => buffer.unused_by_device(),
            TargetSource::Texture { texture, .. } => texture.unused_by_device(),
        }
    }

    fn signal_changed(&self) {
        match self {
            TargetSource::Buffer { buffer, .. } => buffer.signal_changed(),
            TargetSource::Texture { texture, .. } => texture.signal_changed(),
        }
    }

    fn bind_resource(&self, device: &GraphicsDevice) -> Result<(), GraphicsError> {
        match self {
            TargetSource::Buffer { buffer, .. } => buffer.bind_to_device(device),
            TargetSource::Texture { texture, .. } => texture.bind_to_device(device),
        }
    }

    /// (width, height) of the projected image. A buffer reads as one row
    /// of elements.
    fn dimensions(&self) -> (u32, u32) {
        match self {
            TargetSource::Buffer {
                buffer,
                offset,
                stride,
            } => (((buffer.byte_size() - offset) / *stride as u64) as u32, 1),
            TargetSource::Texture {
                texture, mipmap, ..
            } => mipmap_dimensions(texture.width(), texture.height(), *mipmap),
        }
    }

    fn assert_source_live(&self, label: &'static str) -> Result<(), GraphicsError> {
        let disposed = match self {
            TargetSource::Buffer { buffer, .. } => buffer.is_disposed(),
            TargetSource::Texture { texture, .. } => texture.is_disposed(),
        };
        if disposed {
            return Err(GraphicsError::Disposed(label));
        }
        Ok(())
    }
}

macro_rules! view_common {
    ($label:literal) => {
        pub fn format(&self) -> &PixelFormat {
            &self.format
        }

        pub fn width(&self) -> u32 {
            self.source.dimensions().0
        }

        pub fn height(&self) -> u32 {
            self.source.dimensions().1
        }

        pub fn is_disposed(&self) -> bool {
            self.inner.lock().disposed
        }

        pub fn is_bound_to_device(&self) -> bool {
            self.inner.lock().handle.is_some()
        }

        pub(crate) fn used_by_device(&self) {
            self.source.used_by_device();
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
            self.source.unused_by_device();
        }

        fn assert_not_disposed(&self) -> Result<(), GraphicsError> {
            if self.inner.lock().disposed {
                return Err(GraphicsError::Disposed($label));
            }
            Ok(())
        }

        /// Releases the view's handle and its count on the resource.
        /// Idempotent.
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
                self.source.release();
            }
        }

        pub fn unbind_from_device(&self) -> Result<(), GraphicsError> {
            self.assert_not_disposed()?;
            self.inner.lock().handle = None;
            Ok(())
        }
    };
}

struct ViewInner<H: ?Sized> {
    handle: Option<Arc<H>>,
    device_uses: u32,
    disposed: bool,
}

impl<H: ?Sized> ViewInner<H> {
    fn new() -> Self {
        ViewInner {
            handle: None,
            device_uses: 0,
            disposed: false,
        }
    }
}

/// A shader-input projection over a texture's mipmap range or a buffer.
pub struct TextureView {
    format: PixelFormat,
    source: TargetSource,
    monitor: Monitor,
    inner: Mutex<ViewInner<dyn DriverTextureView>>,
}

impl TextureView {
    pub(crate) fn over_texture(
        texture: Arc<TypelessTexture2D>,
        format: PixelFormat,
        most_detailed: u32,
        mipmap_count: u32,
    ) -> Arc<TextureView> {
        let source = TargetSource::Texture {
            texture,
            mipmap: most_detailed,
            mipmap_count,
        };
        source.add_ref();
        Arc::new(TextureView {
            format,
            source,
            monitor: Monitor::new(),
            inner: Mutex::new(ViewInner::new()),
        })
    }

    pub(crate) fn over_buffer(
        buffer: Arc<TypelessBuffer>,
        format: PixelFormat,
        offset: u64,
        stride: u32,
    ) -> Arc<TextureView> {
        let source = TargetSource::Buffer {
            buffer,
            offset,
            stride,
        };
        source.add_ref();
        Arc::new(TextureView {
            format,
            source,
            monitor: Monitor::new(),
            inner: Mutex::new(ViewInner::new()),
        })
    }

    view_common!("texture view");

    /// Ensures the resource and this view both have driver parts.
    /// Idempotent.
    pub fn bind_to_device(&self, device: &GraphicsDevice) -> Result<(), GraphicsError> {
        self.assert_not_disposed()?;
        self.source.assert_source_live("texture view source")?;
        self.source.bind_resource(device)?;
        let mut inner = self.inner.lock();
        if inner.handle.is_none() {
            let layout = self.format.common_layout();
            let handle = match &self.source {
                TargetSource::Buffer {
                    buffer,
                    offset,
                    stride,
                } => buffer.with_driver_part(|part| {
                    device
                        .driver()
                        .create_texture_view_over_buffer(part, layout, *offset, *stride)
                }),
                TargetSource::Texture {
                    texture,
                    mipmap,
                    mipmap_count,
                } => texture.with_driver_part(|part| {
                    device
                        .driver()
                        .create_texture_view(part, layout, *mipmap, *mipmap_count)
                }),
            }
            .ok_or(GraphicsError::Locality(
                "the resource has no device part to view",
            ))?;
            inner.handle = Some(Arc::from(handle));
        }
        Ok(())
    }

    pub(crate) fn device_data(&self) -> Option<Arc<dyn DriverTextureView>> {
        self.inner.lock().handle.clone()
    }
}

impl std::fmt::Debug for TextureView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureView")
            .field("format", &self.format.to_string())
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// A GPU-writable colour target over a texture level or a buffer.
pub struct RenderTargetView {
    format: PixelFormat,
    source: TargetSource,
    monitor: Monitor,
    inner: Mutex<ViewInner<dyn DriverRenderTargetView>>,
}

impl RenderTargetView {
    pub(crate) fn over_texture(
        texture: Arc<TypelessTexture2D>,
        format: PixelFormat,
        mipmap: u32,
    ) -> Arc<RenderTargetView> {
        let source = TargetSource::Texture {
            texture,
            mipmap,
            mipmap_count: 1,
        };
        source.add_ref();
        Arc::new(RenderTargetView {
            format,
            source,
            monitor: Monitor::new(),
            inner: Mutex::new(ViewInner::new()),
        })
    }

    pub(crate) fn over_buffer(
        buffer: Arc<TypelessBuffer>,
        format: PixelFormat,
        offset: u64,
        stride: u32,
    ) -> Arc<RenderTargetView> {
        let source = TargetSource::Buffer {
            buffer,
            offset,
            stride,
        };
        source.add_ref();
        Arc::new(RenderTargetView {
            format,
            source,
            monitor: Monitor::new(),
            inner: Mutex::new(ViewInner::new()),
        })
    }

    view_common!("render target view");

    pub fn bind_to_device(&self, device: &GraphicsDevice) -> Result<(), GraphicsError> {
        self.assert_not_disposed()?;
        self.source.assert_source_live("render target source")?;
        self.source.bind_resource(device)?;
        let mut inner = self.inner.lock();
        if inner.handle.is_none() {
            let layout = self.format.common_layout();
            let handle = match &self.source {
                TargetSource::Buffer {
                    buffer,
                    offset,
                    stride,
                } => buffer.with_driver_part(|part| {
                    device
                        .driver()
                        .create_render_target_view_over_buffer(part, layout, *offset, *stride)
                }),
                TargetSource::Texture {
                    texture, mipmap, ..
                } => texture.with_driver_part(|part| {
                    device.driver().create_render_target_view(part, layout, *mipmap)
                }),
            }
            .ok_or(GraphicsError::Locality(
                "the resource has no device part to view",
            ))?;
            inner.handle = Some(Arc::from(handle));
        }
        Ok(())
    }

    pub(crate) fn device_data(&self) -> Option<Arc<dyn DriverRenderTargetView>> {
        self.inner.lock().handle.clone()
    }

    /// The GPU is about to write through this target.
    pub(crate) fn signal_changed(&self) {
        self.source.signal_changed();
    }
}

impl std::fmt::Debug for RenderTargetView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTargetView")
            .field("format", &self.format.to_string())
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// A GPU-writable depth-stencil target over a texture level.
pub struct DepthStencilTargetView {
    format: PixelFormat,
    source: TargetSource,
    monitor: Monitor,
    inner: Mutex<ViewInner<dyn DriverDepthStencilView>>,
}

impl DepthStencilTargetView {
    pub(crate) fn new(
        texture: Arc<TypelessTexture2D>,
        format: PixelFormat,
        mipmap: u32,
    ) -> Arc<DepthStencilTargetView> {
        let source = TargetSource::Texture {
            texture,
            mipmap,
            mipmap_count: 1,
        };
        source.add_ref();
        Arc::new(DepthStencilTargetView {
            format,
            source,
            monitor: Monitor::new(),
            inner: Mutex::new(ViewInner::new()),
        })
    }

    view_common!("depth-stencil target view");

    pub fn bind_to_device(&self, device: &GraphicsDevice) -> Result<(), GraphicsError> {
        self.assert_not_disposed()?;
        self.source.assert_source_live("depth-stencil source")?;
        self.source.bind_resource(device)?;
        let mut inner = self.inner.lock();
        if inner.handle.is_none() {
            let layout = self.format.common_layout();
            let handle = match &self.source {
                TargetSource::Texture {
                    texture, mipmap, ..
                } => texture.with_driver_part(|part| {
                    device.driver().create_depth_stencil_view(part, layout, *mipmap)
                }),
                TargetSource::Buffer { .. } => None,
            }
            .ok_or(GraphicsError::Locality(
                "the resource has no device part to view",
            ))?;
            inner.handle = Some(Arc::from(handle));
        }
        Ok(())
    }

    pub(crate) fn device_data(&self) -> Option<Arc<dyn DriverDepthStencilView>> {
        self.inner.lock().handle.clone()
    }

    pub(crate) fn signal_changed(&self) {
        self.source.signal_changed();
    }
}

impl std::fmt::Debug for DepthStencilTargetView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepthStencilTargetView")
            .field("format", &self.format.to_string())
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{
        BufferUsage, CpuAccess, GraphicsLocality, TextureUsage, Usage,
    };

    fn rgba() -> PixelFormat {
        PixelFormat::parse("R.UN8 G.UN8 B.UN8 A.UN8").unwrap()
    }

    #[test]
    fn buffer_target_reads_as_one_row() {
        let buffer = TypelessBuffer::new(
            Usage::Default,
            BufferUsage::RENDER_TARGET,
            CpuAccess::NONE,
            GraphicsLocality::SystemMemoryOnly,
            64,
        );
        let target = buffer.create_render_target(rgba()).unwrap();
        assert_eq!(target.width(), 16);
        assert_eq!(target.height(), 1);
    }

    #[test]
    fn texture_target_tracks_mipmap_dimensions() {
        let texture = TypelessTexture2D::new(
            Usage::Default,
            TextureUsage::RENDER_TARGET,
            CpuAccess::NONE,
            rgba(),
            64,
            32,
            0,
            GraphicsLocality::SystemMemoryOnly,
            None,
        )
        .unwrap();
        let target = texture.create_render_target_mipmap(2).unwrap();
        assert_eq!(target.width(), 16);
        assert_eq!(target.height(), 8);
    }

    #[test]
    fn texture_refcount_disposes_with_last_view() {
        let texture = TypelessTexture2D::new(
            Usage::Default,
            TextureUsage::TEXTURE | TextureUsage::RENDER_TARGET,
            CpuAccess::NONE,
            rgba(),
            8,
            8,
            1,
            GraphicsLocality::SystemMemoryOnly,
            None,
        )
        .unwrap();
        let a = texture.create_texture_view().unwrap();
        let b = texture.create_render_target().unwrap();
        assert_eq!(texture.view_count(), 2);
        a.dispose();
        assert!(!texture.is_disposed());
        b.dispose();
        assert!(texture.is_disposed());
    }
}
