// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Resource usage, residency and drawing declarations.
//!
//! When creating GPU resources it's important to declare how they will be
//! used, so the layer (and the driver underneath) can make placement and
//! synchronization decisions up front. The enums here travel with every
//! buffer and texture from construction to disposal.
//!
//! # Examples
//!
//! ```
//! use stages_and_states::common::{BufferUsage, CpuAccess, GraphicsLocality, Usage};
//!
//! // A vertex buffer the CPU writes once and the device reads every frame,
//! // resident wherever the layer decides is best.
//! let usage = Usage::Static;
//! let buffer_usage = BufferUsage::VERTEX_BUFFER;
//! let access = CpuAccess::WRITE;
//! let locality = GraphicsLocality::DeviceOrSystemMemory;
//! ```

use bitflags::bitflags;

/// Who reads and writes a resource over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Usage {
    /// Readable and writable by the device.
    Default,
    /// Readable by the device, writable by the CPU.
    Dynamic,
    /// Readable and writable by the CPU, readable by the device.
    Staging,
    /// Specified once by the CPU and never updated again.
    Static,
}

/// Which memory domain(s) hold authoritative resource bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphicsLocality {
    /// The resource lives in system RAM only and can never be bound.
    SystemMemoryOnly,
    /// The resource lives in device memory only; there is no readback
    /// mirror and the resource cannot be unbound.
    DeviceMemoryOnly,
    /// Both copies are kept alive; the system copy mirrors device writes.
    DeviceAndSystemMemory,
    /// The resource migrates: system memory before binding, device memory
    /// after (the system copy is released on bind).
    DeviceOrSystemMemory,
}

/// Transactional access requested by a `map` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapOptions {
    /// Only reading is allowed; `unmap` commits nothing.
    Read,
    /// Only writing is allowed; mapped bytes start undefined (zeroed) and
    /// the caller is expected to overwrite the whole range.
    Write,
    /// Both directions.
    ReadWrite,
}

bitflags! {
    /// CPU access declared at resource creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CpuAccess: u32 {
        const READ = 1;
        const WRITE = 2;
    }
}

impl CpuAccess {
    pub const NONE: CpuAccess = CpuAccess::empty();
    pub const READ_WRITE: CpuAccess = CpuAccess::READ.union(CpuAccess::WRITE);
}

bitflags! {
    /// Pipeline positions a buffer may be bound to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX_BUFFER = 1;
        const INDEX_BUFFER = 2;
        const CONSTANT_BUFFER = 4;
        const GEOMETRY_OUTPUT = 8;
        const RENDER_TARGET = 16;
    }
}

bitflags! {
    /// Pipeline positions a texture may be bound to.
    ///
    /// Use the most restrictive combination: the same texture cannot be
    /// bound as shader input and output at the same time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Can be bound to shaders as an input source.
        const TEXTURE = 1;
        /// Can be bound to shaders as an output (through MRT).
        const RENDER_TARGET = 2;
        /// Depth-stencil target.
        const DEPTH_STENCIL_TARGET = 8;
        /// Can be bound as a cubemap (array of six 2D faces).
        const CUBE_MAP = 16;
    }
}

bitflags! {
    /// What a driver supports a pixel format for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FormatUsage: u32 {
        const SHADER_TEXTURE = 1;
        const RENDER_TARGET = 2;
        const BLEND_RENDER_TARGET = 4;
        const MULTISAMPLE_RENDER_TARGET = 8;
    }
}

bitflags! {
    /// Which aspects a depth-stencil clear touches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearOptions: u32 {
        const DEPTH = 1;
        const STENCIL = 2;
    }
}

bitflags! {
    /// Shader stages an element binds to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BindingStage: u32 {
        const VERTEX_SHADER = 1;
        const PIXEL_SHADER = 2;
        const GEOMETRY_SHADER = 4;
    }
}

/// Primitive topology of bound geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    /// Independent points.
    Point,
    /// Vertex pairs form segments.
    Line,
    /// Each additional vertex extends the line.
    LineStrip,
    /// Vertex triples form triangles.
    Triangle,
    /// Each additional vertex forms a triangle with the previous two.
    TriangleStrip,
}

/// How often a vertex element advances during drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateFrequency {
    /// Once per vertex.
    PerVertex,
    /// Once per instance.
    PerInstance,
}

/// An RGBA colour with f32 channels.
///
/// The full colour constants table lives outside this layer; only the
/// values the device itself needs as defaults are provided here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Colour {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Colour {
    pub const BLACK: Colour = Colour::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Colour = Colour::new(1.0, 1.0, 1.0, 1.0);
    pub const TRANSPARENT: Colour = Colour::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Colour { r, g, b, a }
    }
}

/// A viewport or scissor region in integer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region2i {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region2i {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Region2i {
            x,
            y,
            width,
            height,
        }
    }
}
