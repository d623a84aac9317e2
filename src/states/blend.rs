// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Blend state: all control for blending on render targets.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;
use parking_lot::{Mutex, RwLock};

use crate::device::MAX_RENDER_TARGETS;
use crate::driver::{DriverBlendState, DriverDevice};
use crate::error::GraphicsError;
use crate::sync::Monitor;

/// Blend operand sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperand {
    /// A zero (0,0,0) source.
    #[default]
    Zero,
    /// A one (1,1,1) source.
    One,
    SrcColour,
    SrcColourInverse,
    SrcAlpha,
    SrcAlphaInverse,
    DstAlpha,
    DstAlphaInverse,
    DstColour,
    DstColourInverse,
    BlendFactor,
    BlendFactorInverse,
}

/// The blending operation applied to the two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags! {
    /// Per-target channel write mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WriteMask: u32 {
        const RED = 1;
        const GREEN = 2;
        const BLUE = 4;
        const ALPHA = 8;
    }
}

impl WriteMask {
    pub const ALL: WriteMask = WriteMask::all();
}

const TARGETS: usize = MAX_RENDER_TARGETS as usize;

#[derive(Debug, Clone)]
struct BlendDesc {
    alpha_to_coverage: bool,
    blend_enable: [bool; TARGETS],
    write_masks: [WriteMask; TARGETS],
    src_blend: BlendOperand,
    dst_blend: BlendOperand,
    op_blend: BlendOperation,
    src_alpha_blend: BlendOperand,
    dst_alpha_blend: BlendOperand,
    op_alpha_blend: BlendOperation,
    sample_mask: u32,
}

impl Default for BlendDesc {
    fn default() -> Self {
        BlendDesc {
            alpha_to_coverage: false,
            blend_enable: [false; TARGETS],
            write_masks: [WriteMask::ALL; TARGETS],
            src_blend: BlendOperand::One,
            dst_blend: BlendOperand::Zero,
            op_blend: BlendOperation::Add,
            src_alpha_blend: BlendOperand::One,
            dst_alpha_blend: BlendOperand::Zero,
            op_alpha_blend: BlendOperation::Add,
            sample_mask: 1,
        }
    }
}

impl PartialEq for BlendDesc {
    fn eq(&self, other: &Self) -> bool {
        if self.alpha_to_coverage != other.alpha_to_coverage {
            return false;
        }
        for i in 0..TARGETS {
            if self.blend_enable[i] != other.blend_enable[i] {
                return false;
            }
            // Write masks only matter for enabled targets.
            if self.blend_enable[i] && self.write_masks[i] != other.write_masks[i] {
                return false;
            }
        }
        self.src_blend == other.src_blend
            && self.dst_blend == other.dst_blend
            && self.op_blend == other.op_blend
            && self.src_alpha_blend == other.src_alpha_blend
            && self.dst_alpha_blend == other.dst_alpha_blend
            && self.op_alpha_blend == other.op_alpha_blend
            && self.sample_mask == other.sample_mask
    }
}

impl Eq for BlendDesc {}

impl Hash for BlendDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.alpha_to_coverage.hash(state);
        for i in 0..TARGETS {
            self.blend_enable[i].hash(state);
            if self.blend_enable[i] {
                self.write_masks[i].hash(state);
            }
        }
        self.src_blend.hash(state);
        self.dst_blend.hash(state);
        self.op_blend.hash(state);
        self.src_alpha_blend.hash(state);
        self.dst_alpha_blend.hash(state);
        self.op_alpha_blend.hash(state);
        self.sample_mask.hash(state);
    }
}

/// A blend state descriptor; mutable until interned.
///
/// The device data handle is valid until a state collection pass disposes
/// it; reuse the same state for as much drawing as possible.
#[derive(Default)]
pub struct BlendState {
    desc: RwLock<BlendDesc>,
    interned: AtomicBool,
    monitor: Monitor,
    device_data: Mutex<Option<Arc<dyn DriverBlendState>>>,
}

impl BlendState {
    /// Default state: blending disabled on every target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blending enabled on target 0 with the given colour pipeline.
    pub fn with_blend(src: BlendOperand, dst: BlendOperand, op: BlendOperation) -> Self {
        let state = Self::new();
        {
            let mut desc = state.desc.write();
            desc.blend_enable[0] = true;
            desc.src_blend = src;
            desc.dst_blend = dst;
            desc.op_blend = op;
        }
        state
    }

    /// Blending on target 0 with separate colour and alpha pipelines.
    pub fn with_blend_and_alpha(
        src: BlendOperand,
        dst: BlendOperand,
        op: BlendOperation,
        src_alpha: BlendOperand,
        dst_alpha: BlendOperand,
        op_alpha: BlendOperation,
    ) -> Self {
        let state = Self::with_blend(src, dst, op);
        {
            let mut desc = state.desc.write();
            desc.src_alpha_blend = src_alpha;
            desc.dst_alpha_blend = dst_alpha;
            desc.op_alpha_blend = op_alpha;
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

    /// Creates the driver-side state if it does not exist yet.
    ///
    /// Only interned states can be prepared.
    pub fn prepare(&self, driver: &dyn DriverDevice) -> Result<(), GraphicsError> {
        if !self.is_interned() {
            return Err(GraphicsError::NotInterned);
        }
        let mut data = self.device_data.lock();
        if data.is_none() {
            *data = Some(Arc::from(driver.create_blend_state(self)));
        }
        Ok(())
    }

    /// Drops the driver-side state; recreated lazily on next bind.
    pub(crate) fn evict_device_data(&self) {
        *self.device_data.lock() = None;
    }

    /// Whether the driver-side state currently exists.
    pub fn has_device_data(&self) -> bool {
        self.device_data.lock().is_some()
    }

    pub(crate) fn device_data(&self) -> Option<Arc<dyn DriverBlendState>> {
        self.device_data.lock().clone()
    }

    pub(crate) fn with_device_data<R>(
        &self,
        f: impl FnOnce(&dyn DriverBlendState) -> R,
    ) -> Option<R> {
        self.device_data.lock().as_deref().map(f)
    }

    // Accessors.

    pub fn alpha_to_coverage(&self) -> bool {
        self.desc.read().alpha_to_coverage
    }

    pub fn set_alpha_to_coverage(&self, value: bool) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().alpha_to_coverage = value;
        Ok(())
    }

    /// Whether blending is enabled for render target `index`.
    pub fn blend_enabled(&self, index: u32) -> bool {
        self.desc.read().blend_enable[index as usize]
    }

    pub fn set_blend_enabled(&self, index: u32, value: bool) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().blend_enable[index as usize] = value;
        Ok(())
    }

    pub fn write_mask(&self, index: u32) -> WriteMask {
        self.desc.read().write_masks[index as usize]
    }

    pub fn set_write_mask(&self, index: u32, mask: WriteMask) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().write_masks[index as usize] = mask;
        Ok(())
    }

    pub fn blend_source(&self) -> BlendOperand {
        self.desc.read().src_blend
    }

    pub fn set_blend_source(&self, value: BlendOperand) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().src_blend = value;
        Ok(())
    }

    pub fn blend_destination(&self) -> BlendOperand {
        self.desc.read().dst_blend
    }

    pub fn set_blend_destination(&self, value: BlendOperand) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().dst_blend = value;
        Ok(())
    }

    pub fn blend_operation(&self) -> BlendOperation {
        self.desc.read().op_blend
    }

    pub fn set_blend_operation(&self, value: BlendOperation) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().op_blend = value;
        Ok(())
    }

    pub fn alpha_blend_source(&self) -> BlendOperand {
        self.desc.read().src_alpha_blend
    }

    pub fn set_alpha_blend_source(&self, value: BlendOperand) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().src_alpha_blend = value;
        Ok(())
    }

    pub fn alpha_blend_destination(&self) -> BlendOperand {
        self.desc.read().dst_alpha_blend
    }

    pub fn set_alpha_blend_destination(&self, value: BlendOperand) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().dst_alpha_blend = value;
        Ok(())
    }

    pub fn alpha_blend_operation(&self) -> BlendOperation {
        self.desc.read().op_alpha_blend
    }

    pub fn set_alpha_blend_operation(&self, value: BlendOperation) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().op_alpha_blend = value;
        Ok(())
    }

    pub fn sample_mask(&self) -> u32 {
        self.desc.read().sample_mask
    }

    pub fn set_sample_mask(&self, value: u32) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().sample_mask = value;
        Ok(())
    }

    /// Copies every field from `other`. Device data is not copied; it is
    /// recreated when this state is interned and prepared.
    pub fn copy_from(&self, other: &BlendState) -> Result<(), GraphicsError> {
        self.changed()?;
        *self.desc.write() = other.desc.read().clone();
        Ok(())
    }
}

impl std::fmt::Debug for BlendState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlendState")
            .field("desc", &*self.desc.read())
            .field("interned", &self.is_interned())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_mask_ignored_while_disabled() {
        let a = BlendState::new();
        let b = BlendState::new();
        b.set_write_mask(0, WriteMask::RED).unwrap();
        // Target 0 is disabled on both, so the mask difference is moot.
        assert!(a.structural_eq(&b));
        assert_eq!(a.structural_hash(), b.structural_hash());

        a.set_blend_enabled(0, true).unwrap();
        b.set_blend_enabled(0, true).unwrap();
        assert!(!a.structural_eq(&b));
    }

    #[test]
    fn mutation_after_intern_rejected() {
        let state = BlendState::new();
        state.mark_interned();
        assert!(matches!(
            state.set_sample_mask(3),
            Err(GraphicsError::Interned)
        ));
    }
}
