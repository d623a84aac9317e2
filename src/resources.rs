// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! GPU-backed resources and the typed views layered over them.
//!
//! A typeless resource is raw byte storage that may live in system memory,
//! device memory, or both, with a dirty flag tracking which copy is
//! authoritative. Views are typed, range-scoped projections over exactly
//! one resource; they hold a strong reference (the resource's view counter)
//! and a lazily created driver-side handle of their own.

pub mod constant_view;
pub mod geometry;
pub mod geometry_batch;
pub mod index_view;
pub mod target_views;
pub mod texture;
pub mod typeless_buffer;
pub mod vertex_view;

pub use constant_view::{ConstantBufferView, ConstantValue, ConstantWrites};
pub use geometry::Geometry;
pub use geometry_batch::GeometryBatch;
pub use index_view::{IndexBufferView, IndexFormat};
pub use target_views::{DepthStencilTargetView, RenderTargetView, TextureView};
pub use texture::{Mipmap, TextureSnapshot, TypelessTexture2D};
pub use typeless_buffer::{BufferSnapshot, TypelessBuffer};
pub use vertex_view::VertexBufferView;
