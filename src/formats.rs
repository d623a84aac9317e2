// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Byte-layout algebra for pixels, vertices and shader pins.
//!
//! Formats are immutable value types built by parsing compact textual
//! descriptors (`"R.UN8 G.UN8 B.UN8 A.UN8"`, `"P.Fx3 N.Fx3"`). They are
//! compared structurally, never by identity, and are consulted whenever a
//! resource crosses from "description" to "allocation": element offsets
//! drive buffer layout, and the common-layout classification drives
//! hardware format negotiation without per-driver special cases.

pub mod layout;
pub mod pin;
pub mod pixel;
pub mod vertex;

pub use layout::{ConstantBufferLayout, ConstantBufferLayoutBuilder};
pub use pin::{DYNAMIC_ARRAY, NOT_ARRAY, PinComponent, PinFormat};
pub use pixel::{CommonFormatLayout, PixelComponent, PixelComponentFormat, PixelFormat};
pub use vertex::VertexFormat;
