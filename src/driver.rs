// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The native driver boundary.
//!
//! Everything below this module is an external collaborator: the
//! coordination layer consumes a [`DriverDevice`] purely through the opaque
//! handle objects its creation calls return, and never interprets handle
//! internals. Handles are dropped to dispose the driver-side object.
//!
//! The one implementation shipped in-tree is [`headless::HeadlessDevice`],
//! a pure-software device that stores resource bytes in memory. It is what
//! every test runs against and doubles as a reference for real backends.

pub mod headless;

use std::any::Any;
use std::sync::Arc;

use crate::common::{
    BufferUsage, ClearOptions, Colour, CpuAccess, FormatUsage, Region2i, TextureUsage, Topology,
    Usage,
};
use crate::formats::pixel::CommonFormatLayout;
use crate::formats::vertex::VertexFormat;
use crate::states::blend::BlendState;
use crate::states::depth_stencil::DepthStencilState;
use crate::states::rasterization::RasterizationState;
use crate::states::sampler::SamplerState;

/// Raw device-side buffer storage.
pub trait DriverBuffer: Send + Sync {
    /// Reads `count` bytes starting at `offset`.
    fn read(&self, offset: u64, count: u64) -> Vec<u8>;
    /// Overwrites `data.len()` bytes starting at `offset`.
    fn update(&self, data: &[u8], offset: u64);
    /// Backend-side downcast hook; the core never calls through it.
    fn as_any(&self) -> &dyn Any;
}

/// Raw device-side texture storage, one byte payload per mipmap level.
pub trait DriverTexture: Send + Sync {
    fn read(&self, mipmap: u32) -> Vec<u8>;
    fn update(&self, data: &[u8], mipmap: u32);
    fn as_any(&self) -> &dyn Any;
}

macro_rules! opaque_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub trait $name: Send + Sync {
            /// Backend-side downcast hook; the core never calls through it.
            fn as_any(&self) -> &dyn Any;
        }
    };
}

opaque_handle!(
    /// Vertex buffer view handle.
    DriverVertexBufferView
);
opaque_handle!(
    /// Index buffer view handle.
    DriverIndexBufferView
);
opaque_handle!(
    /// Constant buffer view handle.
    DriverConstantBufferView
);
opaque_handle!(
    /// Shader-input texture view handle.
    DriverTextureView
);
opaque_handle!(
    /// Render target view handle.
    DriverRenderTargetView
);
opaque_handle!(
    /// Depth-stencil target view handle.
    DriverDepthStencilView
);
opaque_handle!(
    /// Immutable blend state handle.
    DriverBlendState
);
opaque_handle!(
    /// Immutable rasterization state handle.
    DriverRasterizationState
);
opaque_handle!(
    /// Immutable depth-stencil state handle.
    DriverDepthStencilState
);
opaque_handle!(
    /// Immutable sampler state handle.
    DriverSamplerState
);
opaque_handle!(
    /// Vertex shader handle.
    DriverVertexShader
);
opaque_handle!(
    /// Geometry shader handle.
    DriverGeometryShader
);
opaque_handle!(
    /// Pixel shader handle.
    DriverPixelShader
);
opaque_handle!(
    /// Cached vertex input binding layout.
    DriverVertexLayout
);

/// One vertex stream in an input binding layout.
#[derive(Debug, Clone)]
pub struct VertexBindingElement {
    pub format: VertexFormat,
    pub update_frequency: crate::common::UpdateFrequency,
    pub update_frequency_count: u32,
}

/// Receives device lifecycle notifications.
pub trait DeviceListener: Send + Sync {
    /// The master device was disposed.
    fn disposed(&self);
    /// A device reset was issued.
    fn reset(&self);
    /// The device was lost.
    fn device_lost(&self);
}

/// The actual rendering device.
///
/// Creation calls return opaque handles; binding calls take the handles
/// back, already resolved by the coordination layer.
pub trait DriverDevice: Send + Sync {
    /// Symbolic name of the device.
    fn name(&self) -> &str;

    // Messaging.
    fn register_listener(&self, listener: Arc<dyn DeviceListener>);
    fn unregister_listener(&self);

    // Capabilities.
    fn format_support(&self, layout: CommonFormatLayout) -> FormatUsage;
    fn multi_sampling_quality(&self, layout: CommonFormatLayout, sample_count: u32) -> u32;
    fn device_memory(&self) -> u64;

    // State creation.
    fn clear_states(&self);
    fn create_blend_state(&self, desc: &BlendState) -> Box<dyn DriverBlendState>;
    fn create_rasterization_state(&self, desc: &RasterizationState)
    -> Box<dyn DriverRasterizationState>;
    fn create_depth_stencil_state(&self, desc: &DepthStencilState)
    -> Box<dyn DriverDepthStencilState>;
    fn create_sampler_state(&self, desc: &SamplerState) -> Box<dyn DriverSamplerState>;

    // Resource creation.
    fn create_vertex_binding(&self, elements: &[VertexBindingElement])
    -> Box<dyn DriverVertexLayout>;
    fn create_buffer(
        &self,
        buffer_usage: BufferUsage,
        usage: Usage,
        access: CpuAccess,
        byte_size: u64,
        initial_data: Option<&[u8]>,
    ) -> Box<dyn DriverBuffer>;
    #[allow(clippy::too_many_arguments)]
    fn create_texture_2d(
        &self,
        usage: Usage,
        layout: CommonFormatLayout,
        access: CpuAccess,
        width: u32,
        height: u32,
        mipmap_levels: u32,
        texture_usage: TextureUsage,
        sample_count: u32,
        sample_quality: u32,
        initial_data: Option<&[Vec<u8>]>,
    ) -> Box<dyn DriverTexture>;

    // Shader creation. Compilation happens elsewhere; the device only
    // ingests finished bytecode.
    fn create_vertex_shader(&self, bytecode: &[u8]) -> Box<dyn DriverVertexShader>;
    fn create_geometry_shader(&self, bytecode: &[u8]) -> Box<dyn DriverGeometryShader>;
    fn create_pixel_shader(&self, bytecode: &[u8]) -> Box<dyn DriverPixelShader>;

    // View creation.
    fn create_cbuffer_view(&self, buffer: &dyn DriverBuffer) -> Box<dyn DriverConstantBufferView>;
    fn create_vbuffer_view(
        &self,
        buffer: &dyn DriverBuffer,
        stride: u32,
        offset: u64,
    ) -> Box<dyn DriverVertexBufferView>;
    fn create_ibuffer_view(
        &self,
        buffer: &dyn DriverBuffer,
        wide: bool,
        offset: u64,
    ) -> Box<dyn DriverIndexBufferView>;
    fn create_texture_view_over_buffer(
        &self,
        buffer: &dyn DriverBuffer,
        layout: CommonFormatLayout,
        offset: u64,
        stride: u32,
    ) -> Box<dyn DriverTextureView>;
    fn create_texture_view(
        &self,
        texture: &dyn DriverTexture,
        layout: CommonFormatLayout,
        most_detailed_mipmap: u32,
        mipmap_count: u32,
    ) -> Box<dyn DriverTextureView>;
    fn create_render_target_view_over_buffer(
        &self,
        buffer: &dyn DriverBuffer,
        layout: CommonFormatLayout,
        offset: u64,
        stride: u32,
    ) -> Box<dyn DriverRenderTargetView>;
    fn create_render_target_view(
        &self,
        texture: &dyn DriverTexture,
        layout: CommonFormatLayout,
        mipmap: u32,
    ) -> Box<dyn DriverRenderTargetView>;
    fn create_depth_stencil_view(
        &self,
        texture: &dyn DriverTexture,
        layout: CommonFormatLayout,
        mipmap: u32,
    ) -> Box<dyn DriverDepthStencilView>;

    // Thread safety.
    fn enter(&self);
    fn exit(&self);

    // Stage bindings.
    #[allow(clippy::too_many_arguments)]
    fn bind_vertex_stage(
        &self,
        topology: Topology,
        layout: Option<&dyn DriverVertexLayout>,
        vertex_buffers: &[&dyn DriverVertexBufferView],
        index_buffer: Option<&dyn DriverIndexBufferView>,
        shader: Option<&dyn DriverVertexShader>,
        samplers: &[&dyn DriverSamplerState],
        textures: &[&dyn DriverTextureView],
        constants: &[&dyn DriverConstantBufferView],
    );
    fn bind_geometry_stage(
        &self,
        shader: Option<&dyn DriverGeometryShader>,
        samplers: &[&dyn DriverSamplerState],
        textures: &[&dyn DriverTextureView],
        constants: &[&dyn DriverConstantBufferView],
        output_buffers: &[&dyn DriverVertexBufferView],
    );
    #[allow(clippy::too_many_arguments)]
    fn bind_pixel_stage(
        &self,
        shader: Option<&dyn DriverPixelShader>,
        samplers: &[&dyn DriverSamplerState],
        textures: &[&dyn DriverTextureView],
        constants: &[&dyn DriverConstantBufferView],
        render_targets: &[&dyn DriverRenderTargetView],
        depth_stencil: Option<&dyn DriverDepthStencilView>,
    );

    fn set_viewports(&self, viewports: &[Region2i]);
    fn set_scissor_rects(&self, rects: &[Region2i]);
    fn set_blend_state(&self, state: &dyn DriverBlendState, colour: Colour, mask: u32);
    fn set_depth_stencil_state(&self, state: &dyn DriverDepthStencilState, stencil_ref: u32);
    fn set_rasterization_state(&self, state: &dyn DriverRasterizationState);

    // Rendering.
    fn clear_render_target(&self, view: &dyn DriverRenderTargetView, colour: Colour);
    fn clear_depth_stencil(
        &self,
        view: &dyn DriverDepthStencilView,
        options: ClearOptions,
        depth: f32,
        stencil: u32,
    );
    fn draw_auto(&self);
    fn draw(&self, offset: u64, count: u64);
    fn draw_indexed(&self, offset: u64, count: u64, base_index: i64);
    fn draw_instanced(&self, offset: u64, count: u64, instance_offset: u32, instance_count: u32);
    fn draw_indexed_instanced(
        &self,
        offset: u64,
        count: u64,
        base_index: i64,
        instance_offset: u32,
        instance_count: u32,
    );
}
