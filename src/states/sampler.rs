// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Sampler state.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::driver::{DriverDevice, DriverSamplerState};
use crate::error::GraphicsError;
use crate::sync::Monitor;

/// Texture filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    Point,
    #[default]
    Linear,
    Anisotropic,
}

/// What happens to coordinates outside [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    Wrap,
    Mirror,
    #[default]
    Clamp,
    Border,
    MirrorOnce,
}

#[derive(Debug, Clone)]
struct SamplerDesc {
    filter: Filter,
    mipmap_filter: Filter,
    address_u: AddressMode,
    address_v: AddressMode,
    address_w: AddressMode,
    mip_lod_bias: f32,
    max_anisotropy: u32,
    min_mipmap: u32,
    max_mipmap: u32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        SamplerDesc {
            filter: Filter::Linear,
            mipmap_filter: Filter::Linear,
            address_u: AddressMode::Clamp,
            address_v: AddressMode::Clamp,
            address_w: AddressMode::Clamp,
            mip_lod_bias: 0.0,
            max_anisotropy: 1,
            min_mipmap: 0,
            max_mipmap: u32::MAX,
        }
    }
}

impl PartialEq for SamplerDesc {
    fn eq(&self, other: &Self) -> bool {
        self.filter == other.filter
            && self.mipmap_filter == other.mipmap_filter
            && self.address_u == other.address_u
            && self.address_v == other.address_v
            && self.address_w == other.address_w
            && self.mip_lod_bias.to_bits() == other.mip_lod_bias.to_bits()
            && self.max_anisotropy == other.max_anisotropy
            && self.min_mipmap == other.min_mipmap
            && self.max_mipmap == other.max_mipmap
    }
}

impl Eq for SamplerDesc {}

impl Hash for SamplerDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.filter.hash(state);
        self.mipmap_filter.hash(state);
        self.address_u.hash(state);
        self.address_v.hash(state);
        self.address_w.hash(state);
        self.mip_lod_bias.to_bits().hash(state);
        self.max_anisotropy.hash(state);
        self.min_mipmap.hash(state);
        self.max_mipmap.hash(state);
    }
}

/// A sampler state descriptor; mutable until interned.
#[derive(Default)]
pub struct SamplerState {
    desc: RwLock<SamplerDesc>,
    interned: AtomicBool,
    monitor: Monitor,
    device_data: Mutex<Option<Arc<dyn DriverSamplerState>>>,
}

impl SamplerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filters(filter: Filter, mipmap_filter: Filter) -> Self {
        let state = Self::new();
        {
            let mut desc = state.desc.write();
            desc.filter = filter;
            desc.mipmap_filter = mipmap_filter;
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
            *data = Some(Arc::from(driver.create_sampler_state(self)));
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

    pub(crate) fn device_data(&self) -> Option<Arc<dyn DriverSamplerState>> {
        self.device_data.lock().clone()
    }

    pub(crate) fn with_device_data<R>(
        &self,
        f: impl FnOnce(&dyn DriverSamplerState) -> R,
    ) -> Option<R> {
        self.device_data.lock().as_deref().map(f)
    }

    pub fn filter(&self) -> Filter {
        self.desc.read().filter
    }

    pub fn set_filter(&self, value: Filter) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().filter = value;
        Ok(())
    }

    pub fn mipmap_filter(&self) -> Filter {
        self.desc.read().mipmap_filter
    }

    pub fn set_mipmap_filter(&self, value: Filter) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().mipmap_filter = value;
        Ok(())
    }

    pub fn address_u(&self) -> AddressMode {
        self.desc.read().address_u
    }

    pub fn set_address_u(&self, value: AddressMode) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().address_u = value;
        Ok(())
    }

    pub fn address_v(&self) -> AddressMode {
        self.desc.read().address_v
    }

    pub fn set_address_v(&self, value: AddressMode) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().address_v = value;
        Ok(())
    }

    pub fn address_w(&self) -> AddressMode {
        self.desc.read().address_w
    }

    pub fn set_address_w(&self, value: AddressMode) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().address_w = value;
        Ok(())
    }

    pub fn mipmap_lod_bias(&self) -> f32 {
        self.desc.read().mip_lod_bias
    }

    pub fn set_mipmap_lod_bias(&self, value: f32) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().mip_lod_bias = value;
        Ok(())
    }

    pub fn max_anisotropy(&self) -> u32 {
        self.desc.read().max_anisotropy
    }

    pub fn set_max_anisotropy(&self, value: u32) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().max_anisotropy = value;
        Ok(())
    }

    pub fn min_mipmap(&self) -> u32 {
        self.desc.read().min_mipmap
    }

    pub fn set_min_mipmap(&self, value: u32) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().min_mipmap = value;
        Ok(())
    }

    pub fn max_mipmap(&self) -> u32 {
        self.desc.read().max_mipmap
    }

    pub fn set_max_mipmap(&self, value: u32) -> Result<(), GraphicsError> {
        self.changed()?;
        self.desc.write().max_mipmap = value;
        Ok(())
    }

    pub fn copy_from(&self, other: &SamplerState) -> Result<(), GraphicsError> {
        self.changed()?;
        *self.desc.write() = other.desc.read().clone();
        Ok(())
    }
}

impl std::fmt::Debug for SamplerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplerState")
            .field("desc", &*self.desc.read())
            .field("interned", &self.is_interned())
            .finish()
    }
}
