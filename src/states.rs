// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Pipeline state objects and their interning pool.
//!
//! State objects have two lifecycle phases. Freshly constructed they are
//! mutable descriptors; once registered with an [`InternPool`] they are
//! immutable, globally shared, and identified by structural equality —
//! interning is canonicalization, not just "freeze". Only interned states
//! can be bound to a device, and while bound the device holds the state's
//! monitor so nothing can concurrently collect its device data.

pub mod blend;
pub mod depth_stencil;
pub mod intern_pool;
pub mod rasterization;
pub mod sampler;

pub use blend::{BlendOperand, BlendOperation, BlendState, WriteMask};
pub use depth_stencil::{CompareFunction, DepthStencilState, StencilOperation};
pub use intern_pool::InternPool;
pub use rasterization::{CullMode, Facing, FillMode, RasterizationState};
pub use sampler::{AddressMode, Filter, SamplerState};
