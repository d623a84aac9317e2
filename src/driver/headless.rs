// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! A pure-software driver device.
//!
//! Buffers and textures are byte vectors in system RAM, stage bindings and
//! draws are counted, and every creation call is recorded so callers can
//! inspect exactly what reached the driver boundary. This is the device
//! the test suite runs against; it also documents, in the simplest possible
//! form, the contract a real backend has to meet.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::common::{
    BufferUsage, ClearOptions, Colour, CpuAccess, FormatUsage, Region2i, TextureUsage, Topology,
    Usage,
};
use crate::formats::pixel::CommonFormatLayout;
use crate::states::blend::BlendState;
use crate::states::depth_stencil::DepthStencilState;
use crate::states::rasterization::RasterizationState;
use crate::states::sampler::SamplerState;

use super::{
    DeviceListener, DriverBlendState, DriverBuffer, DriverConstantBufferView,
    DriverDepthStencilState, DriverDepthStencilView, DriverDevice, DriverGeometryShader,
    DriverIndexBufferView, DriverPixelShader, DriverRasterizationState, DriverRenderTargetView,
    DriverSamplerState, DriverTexture, DriverTextureView, DriverVertexBufferView,
    DriverVertexLayout, DriverVertexShader, VertexBindingElement,
};

/// Record of one `create_buffer` call.
#[derive(Debug, Clone)]
pub struct BufferCreation {
    pub buffer_usage: BufferUsage,
    pub usage: Usage,
    pub access: CpuAccess,
    pub byte_size: u64,
    pub initial_data: Option<Vec<u8>>,
}

/// Record of one `create_texture_2d` call.
#[derive(Debug, Clone)]
pub struct TextureCreation {
    pub layout: CommonFormatLayout,
    pub width: u32,
    pub height: u32,
    pub mipmap_levels: u32,
    pub texture_usage: TextureUsage,
}

#[derive(Default)]
struct Counters {
    draw_calls: AtomicU64,
    vertex_stage_binds: AtomicU64,
    geometry_stage_binds: AtomicU64,
    pixel_stage_binds: AtomicU64,
    render_target_clears: AtomicU64,
    depth_stencil_clears: AtomicU64,
    state_clears: AtomicU64,
    enters: AtomicU64,
    exits: AtomicU64,
}

#[derive(Default)]
struct Inner {
    buffer_creations: Mutex<Vec<BufferCreation>>,
    texture_creations: Mutex<Vec<TextureCreation>>,
    listener: Mutex<Option<Arc<dyn DeviceListener>>>,
    counters: Counters,
}

/// The software device. Cheap to clone; clones share all recorded state, so
/// a test can keep one handle while the [`crate::device::GraphicsDevice`]
/// owns another.
#[derive(Clone, Default)]
pub struct HeadlessDevice {
    inner: Arc<Inner>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `create_buffer` call seen so far.
    pub fn buffer_creations(&self) -> Vec<BufferCreation> {
        self.inner.buffer_creations.lock().clone()
    }

    /// Every `create_texture_2d` call seen so far.
    pub fn texture_creations(&self) -> Vec<TextureCreation> {
        self.inner.texture_creations.lock().clone()
    }

    pub fn draw_calls(&self) -> u64 {
        self.inner.counters.draw_calls.load(Ordering::Relaxed)
    }

    pub fn vertex_stage_binds(&self) -> u64 {
        self.inner.counters.vertex_stage_binds.load(Ordering::Relaxed)
    }

    pub fn geometry_stage_binds(&self) -> u64 {
        self.inner
            .counters
            .geometry_stage_binds
            .load(Ordering::Relaxed)
    }

    pub fn pixel_stage_binds(&self) -> u64 {
        self.inner.counters.pixel_stage_binds.load(Ordering::Relaxed)
    }

    pub fn render_target_clears(&self) -> u64 {
        self.inner
            .counters
            .render_target_clears
            .load(Ordering::Relaxed)
    }

    pub fn state_clears(&self) -> u64 {
        self.inner.counters.state_clears.load(Ordering::Relaxed)
    }

    /// Fires the lost notification at the registered listener, as a real
    /// driver would on adapter removal.
    pub fn simulate_device_lost(&self) {
        let listener = self.inner.listener.lock().clone();
        if let Some(listener) = listener {
            listener.device_lost();
        }
    }
}

impl std::fmt::Debug for HeadlessDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessDevice")
            .field("draw_calls", &self.draw_calls())
            .finish()
    }
}

/// Byte storage behind a buffer handle.
#[derive(Debug)]
pub struct HeadlessBuffer {
    data: Arc<Mutex<Vec<u8>>>,
}

impl DriverBuffer for HeadlessBuffer {
    fn read(&self, offset: u64, count: u64) -> Vec<u8> {
        let data = self.data.lock();
        data[offset as usize..(offset + count) as usize].to_vec()
    }

    fn update(&self, bytes: &[u8], offset: u64) {
        let mut data = self.data.lock();
        data[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Byte storage behind a texture handle, one payload per mipmap level.
#[derive(Debug)]
pub struct HeadlessTexture {
    levels: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl DriverTexture for HeadlessTexture {
    fn read(&self, mipmap: u32) -> Vec<u8> {
        self.levels.lock()[mipmap as usize].clone()
    }

    fn update(&self, data: &[u8], mipmap: u32) {
        let mut levels = self.levels.lock();
        let level = &mut levels[mipmap as usize];
        level.clear();
        level.extend_from_slice(data);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn buffer_storage(buffer: &dyn DriverBuffer) -> Arc<Mutex<Vec<u8>>> {
    buffer
        .as_any()
        .downcast_ref::<HeadlessBuffer>()
        .expect("headless device was handed a foreign buffer handle")
        .data
        .clone()
}

fn texture_storage(texture: &dyn DriverTexture) -> Arc<Mutex<Vec<Vec<u8>>>> {
    texture
        .as_any()
        .downcast_ref::<HeadlessTexture>()
        .expect("headless device was handed a foreign texture handle")
        .levels
        .clone()
}

macro_rules! headless_handle {
    ($name:ident: $trait_name:ident { $($field:ident: $ty:ty),* $(,)? }) => {
        #[derive(Debug)]
        #[allow(dead_code)]
        pub struct $name {
            $($field: $ty,)*
        }

        impl $trait_name for $name {
            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

headless_handle!(HeadlessVertexBufferView: DriverVertexBufferView {
    storage: Arc<Mutex<Vec<u8>>>,
    stride: u32,
    offset: u64,
});
headless_handle!(HeadlessIndexBufferView: DriverIndexBufferView {
    storage: Arc<Mutex<Vec<u8>>>,
    wide: bool,
    offset: u64,
});
headless_handle!(HeadlessConstantBufferView: DriverConstantBufferView {
    storage: Arc<Mutex<Vec<u8>>>,
});
headless_handle!(HeadlessTextureView: DriverTextureView {
    layout: CommonFormatLayout,
});
headless_handle!(HeadlessRenderTargetView: DriverRenderTargetView {
    layout: CommonFormatLayout,
});
headless_handle!(HeadlessDepthStencilView: DriverDepthStencilView {
    layout: CommonFormatLayout,
});
headless_handle!(HeadlessBlendState: DriverBlendState {});
headless_handle!(HeadlessRasterizationState: DriverRasterizationState {});
headless_handle!(HeadlessDepthStencilState: DriverDepthStencilState {});
headless_handle!(HeadlessSamplerState: DriverSamplerState {});
headless_handle!(HeadlessVertexShader: DriverVertexShader {
    bytecode_len: usize,
});
headless_handle!(HeadlessGeometryShader: DriverGeometryShader {
    bytecode_len: usize,
});
headless_handle!(HeadlessPixelShader: DriverPixelShader {
    bytecode_len: usize,
});
headless_handle!(HeadlessVertexLayout: DriverVertexLayout {
    stream_count: usize,
});

impl DriverDevice for HeadlessDevice {
    fn name(&self) -> &str {
        "headless"
    }

    fn register_listener(&self, listener: Arc<dyn DeviceListener>) {
        *self.inner.listener.lock() = Some(listener);
    }

    fn unregister_listener(&self) {
        *self.inner.listener.lock() = None;
    }

    fn format_support(&self, layout: CommonFormatLayout) -> FormatUsage {
        if layout == CommonFormatLayout::NotCommonLayout {
            return FormatUsage::empty();
        }
        FormatUsage::all()
    }

    fn multi_sampling_quality(&self, _layout: CommonFormatLayout, _sample_count: u32) -> u32 {
        1
    }

    fn device_memory(&self) -> u64 {
        256 << 20
    }

    fn clear_states(&self) {
        self.inner.counters.state_clears.fetch_add(1, Ordering::Relaxed);
    }

    fn create_blend_state(&self, _desc: &BlendState) -> Box<dyn DriverBlendState> {
        Box::new(HeadlessBlendState {})
    }

    fn create_rasterization_state(
        &self,
        _desc: &RasterizationState,
    ) -> Box<dyn DriverRasterizationState> {
        Box::new(HeadlessRasterizationState {})
    }

    fn create_depth_stencil_state(
        &self,
        _desc: &DepthStencilState,
    ) -> Box<dyn DriverDepthStencilState> {
        Box::new(HeadlessDepthStencilState {})
    }

    fn create_sampler_state(&self, _desc: &SamplerState) -> Box<dyn DriverSamplerState> {
        Box::new(HeadlessSamplerState {})
    }

    fn create_vertex_binding(
        &self,
        elements: &[VertexBindingElement],
    ) -> Box<dyn DriverVertexLayout> {
        Box::new(HeadlessVertexLayout {
            stream_count: elements.len(),
        })
    }

    fn create_buffer(
        &self,
        buffer_usage: BufferUsage,
        usage: Usage,
        access: CpuAccess,
        byte_size: u64,
        initial_data: Option<&[u8]>,
    ) -> Box<dyn DriverBuffer> {
        self.inner.buffer_creations.lock().push(BufferCreation {
            buffer_usage,
            usage,
            access,
            byte_size,
            initial_data: initial_data.map(|d| d.to_vec()),
        });
        let data = match initial_data {
            Some(bytes) => {
                let mut data = bytes.to_vec();
                data.resize(byte_size as usize, 0);
                data
            }
            None => vec![0; byte_size as usize],
        };
        Box::new(HeadlessBuffer {
            data: Arc::new(Mutex::new(data)),
        })
    }

    fn create_texture_2d(
        &self,
        _usage: Usage,
        layout: CommonFormatLayout,
        _access: CpuAccess,
        width: u32,
        height: u32,
        mipmap_levels: u32,
        texture_usage: TextureUsage,
        _sample_count: u32,
        _sample_quality: u32,
        initial_data: Option<&[Vec<u8>]>,
    ) -> Box<dyn DriverTexture> {
        self.inner.texture_creations.lock().push(TextureCreation {
            layout,
            width,
            height,
            mipmap_levels,
            texture_usage,
        });
        let levels = match initial_data {
            Some(levels) => levels.to_vec(),
            None => vec![Vec::new(); mipmap_levels as usize],
        };
        Box::new(HeadlessTexture {
            levels: Arc::new(Mutex::new(levels)),
        })
    }

    fn create_vertex_shader(&self, bytecode: &[u8]) -> Box<dyn DriverVertexShader> {
        Box::new(HeadlessVertexShader {
            bytecode_len: bytecode.len(),
        })
    }

    fn create_geometry_shader(&self, bytecode: &[u8]) -> Box<dyn DriverGeometryShader> {
        Box::new(HeadlessGeometryShader {
            bytecode_len: bytecode.len(),
        })
    }

    fn create_pixel_shader(&self, bytecode: &[u8]) -> Box<dyn DriverPixelShader> {
        Box::new(HeadlessPixelShader {
            bytecode_len: bytecode.len(),
        })
    }

    fn create_cbuffer_view(&self, buffer: &dyn DriverBuffer) -> Box<dyn DriverConstantBufferView> {
        Box::new(HeadlessConstantBufferView {
            storage: buffer_storage(buffer),
        })
    }

    fn create_vbuffer_view(
        &self,
        buffer: &dyn DriverBuffer,
        stride: u32,
        offset: u64,
    ) -> Box<dyn DriverVertexBufferView> {
        Box::new(HeadlessVertexBufferView {
            storage: buffer_storage(buffer),
            stride,
            offset,
        })
    }

    fn create_ibuffer_view(
        &self,
        buffer: &dyn DriverBuffer,
        wide: bool,
        offset: u64,
    ) -> Box<dyn DriverIndexBufferView> {
        Box::new(HeadlessIndexBufferView {
            storage: buffer_storage(buffer),
            wide,
            offset,
        })
    }

    fn create_texture_view_over_buffer(
        &self,
        buffer: &dyn DriverBuffer,
        layout: CommonFormatLayout,
        _offset: u64,
        _stride: u32,
    ) -> Box<dyn DriverTextureView> {
        let _ = buffer_storage(buffer);
        Box::new(HeadlessTextureView { layout })
    }

    fn create_texture_view(
        &self,
        texture: &dyn DriverTexture,
        layout: CommonFormatLayout,
        _most_detailed_mipmap: u32,
        _mipmap_count: u32,
    ) -> Box<dyn DriverTextureView> {
        let _ = texture_storage(texture);
        Box::new(HeadlessTextureView { layout })
    }

    fn create_render_target_view_over_buffer(
        &self,
        buffer: &dyn DriverBuffer,
        layout: CommonFormatLayout,
        _offset: u64,
        _stride: u32,
    ) -> Box<dyn DriverRenderTargetView> {
        let _ = buffer_storage(buffer);
        Box::new(HeadlessRenderTargetView { layout })
    }

    fn create_render_target_view(
        &self,
        texture: &dyn DriverTexture,
        layout: CommonFormatLayout,
        _mipmap: u32,
    ) -> Box<dyn DriverRenderTargetView> {
        let _ = texture_storage(texture);
        Box::new(HeadlessRenderTargetView { layout })
    }

    fn create_depth_stencil_view(
        &self,
        texture: &dyn DriverTexture,
        layout: CommonFormatLayout,
        _mipmap: u32,
    ) -> Box<dyn DriverDepthStencilView> {
        let _ = texture_storage(texture);
        Box::new(HeadlessDepthStencilView { layout })
    }

    fn enter(&self) {
        self.inner.counters.enters.fetch_add(1, Ordering::Relaxed);
    }

    fn exit(&self) {
        self.inner.counters.exits.fetch_add(1, Ordering::Relaxed);
    }

    fn bind_vertex_stage(
        &self,
        _topology: Topology,
        _layout: Option<&dyn DriverVertexLayout>,
        _vertex_buffers: &[&dyn DriverVertexBufferView],
        _index_buffer: Option<&dyn DriverIndexBufferView>,
        _shader: Option<&dyn DriverVertexShader>,
        _samplers: &[&dyn DriverSamplerState],
        _textures: &[&dyn DriverTextureView],
        _constants: &[&dyn DriverConstantBufferView],
    ) {
        self.inner
            .counters
            .vertex_stage_binds
            .fetch_add(1, Ordering::Relaxed);
    }

    fn bind_geometry_stage(
        &self,
        _shader: Option<&dyn DriverGeometryShader>,
        _samplers: &[&dyn DriverSamplerState],
        _textures: &[&dyn DriverTextureView],
        _constants: &[&dyn DriverConstantBufferView],
        _output_buffers: &[&dyn DriverVertexBufferView],
    ) {
        self.inner
            .counters
            .geometry_stage_binds
            .fetch_add(1, Ordering::Relaxed);
    }

    fn bind_pixel_stage(
        &self,
        _shader: Option<&dyn DriverPixelShader>,
        _samplers: &[&dyn DriverSamplerState],
        _textures: &[&dyn DriverTextureView],
        _constants: &[&dyn DriverConstantBufferView],
        _render_targets: &[&dyn DriverRenderTargetView],
        _depth_stencil: Option<&dyn DriverDepthStencilView>,
    ) {
        self.inner
            .counters
            .pixel_stage_binds
            .fetch_add(1, Ordering::Relaxed);
    }

    fn set_viewports(&self, _viewports: &[Region2i]) {}

    fn set_scissor_rects(&self, _rects: &[Region2i]) {}

    fn set_blend_state(&self, _state: &dyn DriverBlendState, _colour: Colour, _mask: u32) {}

    fn set_depth_stencil_state(&self, _state: &dyn DriverDepthStencilState, _stencil_ref: u32) {}

    fn set_rasterization_state(&self, _state: &dyn DriverRasterizationState) {}

    fn clear_render_target(&self, _view: &dyn DriverRenderTargetView, _colour: Colour) {
        self.inner
            .counters
            .render_target_clears
            .fetch_add(1, Ordering::Relaxed);
    }

    fn clear_depth_stencil(
        &self,
        _view: &dyn DriverDepthStencilView,
        _options: ClearOptions,
        _depth: f32,
        _stencil: u32,
    ) {
        self.inner
            .counters
            .depth_stencil_clears
            .fetch_add(1, Ordering::Relaxed);
    }

    fn draw_auto(&self) {
        self.inner.counters.draw_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn draw(&self, _offset: u64, _count: u64) {
        self.inner.counters.draw_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn draw_indexed(&self, _offset: u64, _count: u64, _base_index: i64) {
        self.inner.counters.draw_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn draw_instanced(
        &self,
        _offset: u64,
        _count: u64,
        _instance_offset: u32,
        _instance_count: u32,
    ) {
        self.inner.counters.draw_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn draw_indexed_instanced(
        &self,
        _offset: u64,
        _count: u64,
        _base_index: i64,
        _instance_offset: u32,
        _instance_count: u32,
    ) {
        self.inner.counters.draw_calls.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_storage_roundtrip() {
        let device = HeadlessDevice::new();
        let buffer = device.create_buffer(
            BufferUsage::VERTEX_BUFFER,
            Usage::Dynamic,
            CpuAccess::WRITE,
            8,
            Some(&[1, 2, 3, 4, 5, 6, 7, 8]),
        );
        assert_eq!(buffer.read(2, 3), vec![3, 4, 5]);
        buffer.update(&[9, 9], 0);
        assert_eq!(buffer.read(0, 3), vec![9, 9, 3]);
    }

    #[test]
    fn creations_are_recorded() {
        let device = HeadlessDevice::new();
        let _ = device.create_buffer(
            BufferUsage::INDEX_BUFFER,
            Usage::Static,
            CpuAccess::NONE,
            16,
            None,
        );
        let creations = device.buffer_creations();
        assert_eq!(creations.len(), 1);
        assert_eq!(creations[0].byte_size, 16);
        assert!(creations[0].initial_data.is_none());
    }

    #[test]
    fn short_initial_data_zero_extends() {
        let device = HeadlessDevice::new();
        let buffer = device.create_buffer(
            BufferUsage::VERTEX_BUFFER,
            Usage::Default,
            CpuAccess::NONE,
            4,
            Some(&[7]),
        );
        assert_eq!(buffer.read(0, 4), vec![7, 0, 0, 0]);
    }
}
