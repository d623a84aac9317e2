// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Depth-stencil state.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::driver::{DriverDepthStencilState, DriverDevice};
use crate::error::GraphicsError;
use crate::sync::Monitor;

/// Comparison applied to depth or stencil values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// What happens to a stencil value on pass/fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    #[default]
    Keep,
    Zero,
    Replace,
    IncreaseSaturate,
    DecreaseSaturate,
    Invert,
    Increase,
    Decrease,
}

/// Stencil behaviour for one facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFace {
    pub stencil_fail: StencilOperation,
    pub depth_fail: StencilOperation,
    pub depth_pass: StencilOperation,
    pub compare: CompareFunction,
}

impl Default for StencilFace {
    fn default() -> Self {
        StencilFace {
            stencil_fail: StencilOperation::Keep,
            depth_fail: StencilOperation::Keep,
            depth_pass: StencilOperation::Keep,
            compare: CompareFunction::Always,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DepthStencilDesc {
    depth_test: bool,
    depth_write: bool,
    depth_compare: CompareFunction,
    stencil_test: bool,
    stencil_read_mask: u32,
    stencil_write_mask: u32,
    front: StencilFace,
    back: StencilFace,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        DepthStencilDesc {
            depth_test: true,
            depth_write: true,
            depth_compare: CompareFunction::Less,
            stencil_test: false,
            stencil_read_mask: u32::MAX,
            stencil_write_mask: u32::MAX,
            front: StencilFace::default(),
            back: StencilFace::default(),
        }
    }
}

/// A depth-stencil state descriptor; mutable until interned.
#[derive(Default)]
pub struct DepthStencilState {
    desc: RwLock<DepthStencilDesc>,
    interned: AtomicBool,
    monitor: Monitor,
    device_data: Mutex<Option<Arc<dyn DriverDepthStencilState>>>,
}

impl DepthStencilState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A state with depth testing and writing switched off.
    pub fn disabled() -> Self {
        let state = Self::new();
        {
            let mut desc = state.desc.write();
            desc.depth_test = false;
            desc.depth_write = false;
        }
        state
    }

    fn changed(&self) -> Result<(), GraphicsError> {
        if self.is_interned() {
            return Err(GraphicsError::Interned);
        }
        Ok(())
    }

    pub fn is_interned(&self) -> bool {
        self.interned.load(Ordering::Acquire)
    }

    pub(crate) fn mark_interned(&self) {
        self.interned.store(true, Ordering::Release);
    }

    /// The monitor a device holds while this state is bound.
    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub(crate) fn structural_eq(&self, other: &Self) -> bool {
        *self.desc.read() == *other.desc.read()
    }

    pub(crate) fn structural_hash(&self) -> u64 {
        let mut hasher = rustc_hash::FxHasher::default();
        self.desc.read().hash(&mut hasher);
        hasher.finish()
    }

    pub fn prepare(&self, driver: &dyn DriverDevice) -> Result<(), GraphicsError> {
        if !self.is_interned() {
            return Err(GraphicsError::NotInterned);
        }
        let mut data = self.device_data.lock();
        if data.is_none() {
            *data = Some(Arc::from(driver.create_depth_stencil_state(self)));
        }
        Ok(())
    }

    pub(crate) fn evict_device_data(&self) {
        *self.device_data.lock() = None;
    }

    /// Whether the driver-side state currently exists.
    pub fn has_device_data(&self) -> bool {
        self.device_data.lock().is_some()
    }

    pub(crate) fn device_data(&self) -> Option<Arc<dyn DriverDepthStencilState>> {
        self.device_data.lock().clone()
    }

    pub(crate) fn with_device_data<R>(
        &self,
        f: impl FnOnce(&dyn DriverDepthStencilState) -> R,
    ) -> Option<R> {
        self.device_data.lock().as_deref().map(f)
    }

    pub fn depth_test_enabled(&self) -> bool {
        self.desc.read().depth_test
    }

    pub fn set_depth_test_enabled(&self, value: bool) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().depth_test = value;
        Ok(())
    }

    pub fn depth_write_enabled(&self) -> bool {
        self.desc.read().depth_write
    }

    pub fn set_depth_write_enabled(&self, value: bool) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().depth_write = value;
        Ok(())
    }

    pub fn depth_compare(&self) -> CompareFunction {
        self.desc.read().depth_compare
    }

    pub fn set_depth_compare(&self, value: CompareFunction) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().depth_compare = value;
        Ok(())
    }

    pub fn stencil_test_enabled(&self) -> bool {
        self.desc.read().stencil_test
    }

    pub fn set_stencil_test_enabled(&self, value: bool) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().stencil_test = value;
        Ok(())
    }

    pub fn stencil_read_mask(&self) -> u32 {
        self.desc.read().stencil_read_mask
    }

    pub fn set_stencil_read_mask(&self, value: u32) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().stencil_read_mask = value;
        Ok(())
    }

    pub fn stencil_write_mask(&self) -> u32 {
        self.desc.read().stencil_write_mask
    }

    pub fn set_stencil_write_mask(&self, value: u32) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().stencil_write_mask = value;
        Ok(())
    }

    pub fn front_face(&self) -> StencilFace {
        self.desc.read().front
    }

    pub fn set_front_face(&self, value: StencilFace) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().front = value;
        Ok(())
    }

    pub fn back_face(&self) -> StencilFace {
        self.desc.read().back
    }

    pub fn set_back_face(&self, value: StencilFace) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().back = value;
        Ok(())
    }

    /// Sets both faces at once, the common case.
    pub fn set_both_faces(&self, value: StencilFace) -> Result<(), GraphicsError> {
        self.changed()?;
        let mut desc = self.desc.write();
        desc.front = value;
        desc.back = value;
        Ok(())
    }

    pub fn copy_from(&self, other: &DepthStencilState) -> Result<(), GraphicsError> {
        self.changed()?;
        *self.desc.write() = other.desc.read().clone();
        Ok(())
    }
}

impl std::fmt::Debug for DepthStencilState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepthStencilState")
            .field("desc", &*self.desc.read())
            .field("interned", &self.is_interned())
            .finish()
    }
}
