// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Rasterization state.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::driver::{DriverDevice, DriverRasterizationState};
use crate::error::GraphicsError;
use crate::sync::Monitor;

/// How primitives are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

/// Which facing is culled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

/// Winding order that counts as front-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Facing {
    #[default]
    Clockwise,
    CounterClockwise,
}

#[derive(Debug, Clone, Default)]
struct RasterizationDesc {
    fill_mode: FillMode,
    cull_mode: CullMode,
    facing: Facing,
    depth_bias: f32,
    depth_bias_clamp: f32,
    slope_scaled_depth_bias: f32,
    depth_clip: bool,
    scissor_test: bool,
    multi_sample: bool,
    line_antialiasing: bool,
}

impl PartialEq for RasterizationDesc {
    fn eq(&self, other: &Self) -> bool {
        self.fill_mode == other.fill_mode
            && self.cull_mode == other.cull_mode
            && self.facing == other.facing
            && self.depth_bias.to_bits() == other.depth_bias.to_bits()
            && self.depth_bias_clamp.to_bits() == other.depth_bias_clamp.to_bits()
            && self.slope_scaled_depth_bias.to_bits() == other.slope_scaled_depth_bias.to_bits()
            && self.depth_clip == other.depth_clip
            && self.scissor_test == other.scissor_test
            && self.multi_sample == other.multi_sample
            && self.line_antialiasing == other.line_antialiasing
    }
}

impl Eq for RasterizationDesc {}

impl Hash for RasterizationDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fill_mode.hash(state);
        self.cull_mode.hash(state);
        self.facing.hash(state);
        self.depth_bias.to_bits().hash(state);
        self.depth_bias_clamp.to_bits().hash(state);
        self.slope_scaled_depth_bias.to_bits().hash(state);
        self.depth_clip.hash(state);
        self.scissor_test.hash(state);
        self.multi_sample.hash(state);
        self.line_antialiasing.hash(state);
    }
}

/// A rasterization state descriptor; mutable until interned.
#[derive(Default)]
pub struct RasterizationState {
    desc: RwLock<RasterizationDesc>,
    interned: AtomicBool,
    monitor: Monitor,
    device_data: Mutex<Option<Arc<dyn DriverRasterizationState>>>,
}

impl RasterizationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for the fields that change most.
    pub fn with_culling(cull_mode: CullMode, facing: Facing, multi_sample: bool) -> Self {
        let state = Self::new();
        {
            let mut desc = state.desc.write();
            desc.cull_mode = cull_mode;
            desc.facing = facing;
            desc.multi_sample = multi_sample;
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
            *data = Some(Arc::from(driver.create_rasterization_state(self)));
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

    pub(crate) fn device_data(&self) -> Option<Arc<dyn DriverRasterizationState>> {
        self.device_data.lock().clone()
    }

    pub(crate) fn with_device_data<R>(
        &self,
        f: impl FnOnce(&dyn DriverRasterizationState) -> R,
    ) -> Option<R> {
        self.device_data.lock().as_deref().map(f)
    }

    pub fn fill_mode(&self) -> FillMode {
        self.desc.read().fill_mode
    }

    pub fn set_fill_mode(&self, value: FillMode) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().fill_mode = value;
        Ok(())
    }

    pub fn cull_mode(&self) -> CullMode {
        self.desc.read().cull_mode
    }

    pub fn set_cull_mode(&self, value: CullMode) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().cull_mode = value;
        Ok(())
    }

    pub fn facing(&self) -> Facing {
        self.desc.read().facing
    }

    pub fn set_facing(&self, value: Facing) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().facing = value;
        Ok(())
    }

    pub fn depth_bias(&self) -> f32 {
        self.desc.read().depth_bias
    }

    pub fn set_depth_bias(&self, value: f32) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().depth_bias = value;
        Ok(())
    }

    pub fn depth_bias_clamp(&self) -> f32 {
        self.desc.read().depth_bias_clamp
    }

    pub fn set_depth_bias_clamp(&self, value: f32) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().depth_bias_clamp = value;
        Ok(())
    }

    pub fn slope_scaled_depth_bias(&self) -> f32 {
        self.desc.read().slope_scaled_depth_bias
    }

    pub fn set_slope_scaled_depth_bias(&self, value: f32) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().slope_scaled_depth_bias = value;
        Ok(())
    }

    pub fn depth_clip_enabled(&self) -> bool {
        self.desc.read().depth_clip
    }

    pub fn set_depth_clip_enabled(&self, value: bool) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().depth_clip = value;
        Ok(())
    }

    pub fn scissor_test_enabled(&self) -> bool {
        self.desc.read().scissor_test
    }

    pub fn set_scissor_test_enabled(&self, value: bool) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().scissor_test = value;
        Ok(())
    }

    pub fn multi_sampling_enabled(&self) -> bool {
        self.desc.read().multi_sample
    }

    pub fn set_multi_sampling_enabled(&self, value: bool) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().multi_sample = value;
        Ok(())
    }

    pub fn line_antialiasing_enabled(&self) -> bool {
        self.desc.read().line_antialiasing
    }

    pub fn set_line_antialiasing_enabled(&self, value: bool) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().line_antialiasing = value;
        Ok(())
    }

    pub fn copy_from(&self, other: &RasterizationState) -> Result<(), GraphicsError> {
        self.changed()?;
        *self.desc.write() = other.desc.read().clone();
        Ok(())
    }
}

impl std::fmt::Debug for RasterizationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterizationState")
            .field("desc", &*self.desc.read())
            .field("interned", &self.is_interned())
            .finish()
    }
}
