// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The 2D texture resource.
//!
//! Like [`TypelessBuffer`], a texture keeps its bytes in system memory,
//! device memory or both, governed by [`GraphicsLocality`]. Map
//! transactions are per mipmap level: independent levels can be mapped
//! concurrently by different threads, each under its own monitor, while
//! residency and device-use locking stay resource-wide.
//!
//! [`TypelessBuffer`]: super::typeless_buffer::TypelessBuffer

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::common::{CpuAccess, GraphicsLocality, MapOptions, TextureUsage, Usage};
use crate::device::GraphicsDevice;
use crate::driver::DriverTexture;
use crate::error::GraphicsError;
use crate::formats::pixel::PixelFormat;
use crate::sync::Monitor;

use super::target_views::{DepthStencilTargetView, RenderTargetView, TextureView};

/// Number of levels in a full mipmap chain for the given dimensions.
pub fn mipmap_count(width: u32, height: u32) -> u32 {
    let max = width.max(height).max(1);
    32 - max.leading_zeros()
}

/// Dimensions of one level; each level halves, clamped at one pixel.
pub fn mipmap_dimensions(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

/// One mapped mipmap level: its dimensions and staged byte count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mipmap {
    pub level: u32,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
}

/// Serializable carrier for a texture's description and raw level bytes.
///
/// Round-trips the payload only; device state is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureSnapshot {
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub levels: Vec<Vec<u8>>,
}

struct LevelMap {
    options: MapOptions,
    data: Vec<u8>,
}

struct TextureInner {
    locality: GraphicsLocality,
    sw_levels: Option<Vec<Vec<u8>>>,
    sw_out_of_date: bool,
    driver_part: Option<Arc<dyn DriverTexture>>,
    maps: Vec<Option<LevelMap>>,
    view_count: u32,
    device_uses: u32,
    dispose_on_view_dispose: bool,
    disposed: bool,
}

/// Raw 2D texture storage with dual residency and a mipmap chain.
pub struct TypelessTexture2D {
    usage: Usage,
    texture_usage: TextureUsage,
    cpu_access: CpuAccess,
    format: PixelFormat,
    width: u32,
    height: u32,
    mipmaps: u32,
    monitor: Monitor,
    level_monitors: Vec<Monitor>,
    inner: Mutex<TextureInner>,
}

impl TypelessTexture2D {
    /// Creates a texture in system memory.
    ///
    /// `mipmaps == 0` requests the full chain. `initial_data`, when given,
    /// must carry one byte payload per level.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        usage: Usage,
        texture_usage: TextureUsage,
        cpu_access: CpuAccess,
        format: PixelFormat,
        width: u32,
        height: u32,
        mipmaps: u32,
        locality: GraphicsLocality,
        initial_data: Option<&[Vec<u8>]>,
    ) -> Result<Arc<TypelessTexture2D>, GraphicsError> {
        let max = mipmap_count(width, height);
        if mipmaps > max {
            return Err(GraphicsError::OutOfRange {
                offset: mipmaps as u64,
                count: 0,
                size: max as u64,
            });
        }
        let mipmaps = if mipmaps == 0 { max } else { mipmaps };
        let pixel_size = format.size() as u64;

        let mut levels = Vec::with_capacity(mipmaps as usize);
        for level in 0..mipmaps {
            let (w, h) = mipmap_dimensions(width, height, level);
            let byte_size = (w as u64 * h as u64 * pixel_size) as usize;
            match initial_data.and_then(|data| data.get(level as usize)) {
                Some(bytes) => {
                    if bytes.len() != byte_size {
                        return Err(GraphicsError::incompatible(format!(
                            "initial data for level {level} is {} bytes, expected {byte_size}",
                            bytes.len()
                        )));
                    }
                    levels.push(bytes.clone());
                }
                None => levels.push(vec![0; byte_size]),
            }
        }

        Ok(Arc::new(TypelessTexture2D {
            usage,
            texture_usage,
            cpu_access,
            format,
            width,
            height,
            mipmaps,
            monitor: Monitor::new(),
            level_monitors: (0..mipmaps).map(|_| Monitor::new()).collect(),
            inner: Mutex::new(TextureInner {
                locality,
                sw_levels: Some(levels),
                sw_out_of_date: false,
                driver_part: None,
                maps: (0..mipmaps).map(|_| None).collect(),
                view_count: 0,
                device_uses: 0,
                dispose_on_view_dispose: true,
                disposed: false,
            }),
        }))
    }

    /// Creates a texture and establishes device residency immediately,
    /// the normal path for textures that will be rendered with.
    #[allow(clippy::too_many_arguments)]
    pub fn on_device(
        device: &GraphicsDevice,
        usage: Usage,
        texture_usage: TextureUsage,
        cpu_access: CpuAccess,
        format: PixelFormat,
        width: u32,
        height: u32,
        mipmaps: u32,
        locality: GraphicsLocality,
        initial_data: Option<&[Vec<u8>]>,
    ) -> Result<Arc<TypelessTexture2D>, GraphicsError> {
        let texture = Self::new(
            usage,
            texture_usage,
            cpu_access,
            format,
            width,
            height,
            mipmaps,
            locality,
            initial_data,
        )?;
        texture.bind_to_device(device)?;
        Ok(texture)
    }

    // Properties.

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn texture_usage(&self) -> TextureUsage {
        self.texture_usage
    }

    pub fn cpu_access(&self) -> CpuAccess {
        self.cpu_access
    }

    pub fn format(&self) -> &PixelFormat {
        &self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mipmap_count(&self) -> u32 {
        self.mipmaps
    }

    pub fn locality(&self) -> GraphicsLocality {
        self.inner.lock().locality
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    pub fn is_bound_to_device(&self) -> bool {
        self.inner.lock().driver_part.is_some()
    }

    /// Whether this texture self-disposes when its last view is released.
    /// Defaults to true.
    pub fn dispose_on_view_dispose(&self) -> bool {
        self.inner.lock().dispose_on_view_dispose
    }

    pub fn set_dispose_on_view_dispose(&self, value: bool) {
        self.inner.lock().dispose_on_view_dispose = value;
    }

    /// Number of live views over this texture.
    pub fn view_count(&self) -> u32 {
        self.inner.lock().view_count
    }

    fn level_byte_size(&self, level: u32) -> u64 {
        let (w, h) = mipmap_dimensions(self.width, self.height, level);
        w as u64 * h as u64 * self.format.size() as u64
    }

    // Reference counting.

    pub(crate) fn add_ref(&self) {
        self.inner.lock().view_count += 1;
    }

    pub(crate) fn release(&self) {
        let dispose = {
            let mut inner = self.inner.lock();
            inner.view_count -= 1;
            inner.view_count == 0 && inner.dispose_on_view_dispose && !inner.disposed
        };
        if dispose {
            self.dispose();
        }
    }

    pub(crate) fn used_by_device(&self) {
        let first = {
            let mut inner = self.inner.lock();
            inner.device_uses += 1;
            inner.device_uses == 1
        };
        if first {
            self.monitor.enter();
        }
    }

    pub(crate) fn unused_by_device(&self) {
        let last = {
            let mut inner = self.inner.lock();
            inner.device_uses -= 1;
            inner.device_uses == 0
        };
        if last {
            self.monitor.exit();
        }
    }

    /// GPU wrote through a view of this texture; the system copy is stale.
    pub(crate) fn signal_changed(&self) {
        let mut inner = self.inner.lock();
        if inner.sw_levels.is_some() && inner.driver_part.is_some() {
            inner.sw_out_of_date = true;
        }
    }

    pub(crate) fn with_driver_part<R>(&self, f: impl FnOnce(&dyn DriverTexture) -> R) -> Option<R> {
        self.inner.lock().driver_part.as_deref().map(f)
    }

    // Residency.

    /// Creates the driver-side allocation, seeded with the system levels.
    ///
    /// Idempotent. `DeviceOrSystemMemory` and `DeviceMemoryOnly` textures
    /// release their system copy once the device copy exists.
    pub fn bind_to_device(&self, device: &GraphicsDevice) -> Result<(), GraphicsError> {
        self.monitor.enter();
        let result = self.bind_locked(device);
        self.monitor.exit();
        result
    }

    fn bind_locked(&self, device: &GraphicsDevice) -> Result<(), GraphicsError> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(GraphicsError::Disposed("typeless texture"));
        }
        if inner.maps.iter().any(|m| m.is_some()) {
            return Err(GraphicsError::AlreadyMapped);
        }
        if inner.locality == GraphicsLocality::SystemMemoryOnly {
            return Err(GraphicsError::Locality(
                "a system-memory-only texture cannot be bound to a device",
            ));
        }
        if inner.driver_part.is_none() {
            let part = device.driver().create_texture_2d(
                self.usage,
                self.format.common_layout(),
                self.cpu_access,
                self.width,
                self.height,
                self.mipmaps,
                self.texture_usage,
                1,
                0,
                inner.sw_levels.as_deref(),
            );
            inner.driver_part = Some(Arc::from(part));
            if matches!(
                inner.locality,
                GraphicsLocality::DeviceOrSystemMemory | GraphicsLocality::DeviceMemoryOnly
            ) {
                inner.sw_levels = None;
            }
        }
        Ok(())
    }

    /// Fills the system levels back from the device and releases the
    /// driver allocation. `DeviceMemoryOnly` textures refuse.
    pub fn unbind_from_device(&self) -> Result<(), GraphicsError> {
        self.monitor.enter();
        let result = self.unbind_locked();
        self.monitor.exit();
        result
    }

    fn unbind_locked(&self) -> Result<(), GraphicsError> {
        let mut inner = self.inner.lock();
        if inner.locality == GraphicsLocality::DeviceMemoryOnly {
            return Err(GraphicsError::Locality(
                "cannot unbind a device-memory-only texture from the device",
            ));
        }
        if inner.disposed {
            return Err(GraphicsError::Disposed("typeless texture"));
        }
        if inner.maps.iter().any(|m| m.is_some()) {
            return Err(GraphicsError::AlreadyMapped);
        }
        if inner.sw_levels.is_none() || inner.sw_out_of_date {
            if let Some(driver) = inner.driver_part.as_ref() {
                let levels = (0..self.mipmaps).map(|level| driver.read(level)).collect();
                inner.sw_levels = Some(levels);
                inner.sw_out_of_date = false;
            }
        }
        inner.driver_part = None;
        Ok(())
    }

    // Mapping.

    /// Opens a mapping transaction over one mipmap level.
    ///
    /// The level's monitor is held until [`unmap`]; independent levels can
    /// be mapped concurrently. Re-mapping a mapped level is an error.
    ///
    /// [`unmap`]: TypelessTexture2D::unmap
    pub fn map(&self, options: MapOptions, level: u32) -> Result<Mipmap, GraphicsError> {
        if level >= self.mipmaps {
            return Err(GraphicsError::OutOfRange {
                offset: level as u64,
                count: 0,
                size: self.mipmaps as u64,
            });
        }
        self.level_monitors[level as usize].enter();
        match self.map_locked(options, level) {
            Ok(mipmap) => Ok(mipmap),
            Err(error) => {
                self.level_monitors[level as usize].exit();
                Err(error)
            }
        }
    }

    fn map_locked(&self, options: MapOptions, level: u32) -> Result<Mipmap, GraphicsError> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(GraphicsError::Disposed("typeless texture"));
        }
        if inner.maps[level as usize].is_some() {
            return Err(GraphicsError::AlreadyMapped);
        }

        // Resynchronize stale system levels before handing data out.
        if inner.sw_levels.is_some() && inner.sw_out_of_date {
            let fresh: Vec<Vec<u8>> = {
                let driver = inner
                    .driver_part
                    .as_ref()
                    .expect("only device writes make the system copy stale");
                (0..self.mipmaps).map(|l| driver.read(l)).collect()
            };
            inner.sw_levels = Some(fresh);
            inner.sw_out_of_date = false;
        }

        let byte_size = self.level_byte_size(level);
        let data = if let Some(levels) = inner.sw_levels.as_ref() {
            levels[level as usize].clone()
        } else if options == MapOptions::Write {
            // Device copy only: a write-only map needs no readback.
            vec![0; byte_size as usize]
        } else {
            let driver = inner
                .driver_part
                .as_ref()
                .expect("an undisposed texture holds a system or a device copy");
            driver.read(level)
        };

        inner.maps[level as usize] = Some(LevelMap { options, data });
        let (w, h) = mipmap_dimensions(self.width, self.height, level);
        Ok(Mipmap {
            level,
            width: w,
            height: h,
            byte_size,
        })
    }

    /// Writes into the staged level; `offset` is relative to the level.
    pub fn write_mapped(&self, level: u32, offset: u64, bytes: &[u8]) -> Result<(), GraphicsError> {
        let mut inner = self.inner.lock();
        let map = inner
            .maps
            .get_mut(level as usize)
            .and_then(|m| m.as_mut())
            .ok_or(GraphicsError::NotMapped)?;
        if map.options == MapOptions::Read {
            return Err(GraphicsError::incompatible("the open mapping is read-only"));
        }
        let end = offset + bytes.len() as u64;
        if end > map.data.len() as u64 {
            return Err(GraphicsError::OutOfRange {
                offset,
                count: bytes.len() as u64,
                size: map.data.len() as u64,
            });
        }
        map.data[offset as usize..end as usize].copy_from_slice(bytes);
        Ok(())
    }

    /// Copy of the staged level bytes.
    pub fn mapped_to_vec(&self, level: u32) -> Result<Vec<u8>, GraphicsError> {
        let inner = self.inner.lock();
        let map = inner
            .maps
            .get(level as usize)
            .and_then(|m| m.as_ref())
            .ok_or(GraphicsError::NotMapped)?;
        Ok(map.data.clone())
    }

    /// Commits the level's mapping and releases its monitor.
    pub fn unmap(&self, level: u32) -> Result<(), GraphicsError> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(GraphicsError::Disposed("typeless texture"));
        }
        let map = inner
            .maps
            .get_mut(level as usize)
            .and_then(|m| m.take())
            .ok_or(GraphicsError::NotMapped)?;

        if map.options != MapOptions::Read {
            if let Some(driver) = inner.driver_part.as_ref() {
                driver.update(&map.data, level);
            }
            if let Some(levels) = inner.sw_levels.as_mut() {
                levels[level as usize] = map.data;
            }
        }

        drop(inner);
        self.level_monitors[level as usize].exit();
        Ok(())
    }

    /// Mipmap generation filters are a deferred feature.
    pub fn generate_mipmaps(&self) -> Result<(), GraphicsError> {
        Err(GraphicsError::Unsupported("mipmap generation"))
    }

    // View creation.

    /// Shader-input view over the full mipmap chain.
    pub fn create_texture_view(self: &Arc<Self>) -> Result<Arc<TextureView>, GraphicsError> {
        self.create_texture_view_range(0, self.mipmaps)
    }

    /// Shader-input view over `count` levels starting at `most_detailed`.
    pub fn create_texture_view_range(
        self: &Arc<Self>,
        most_detailed: u32,
        count: u32,
    ) -> Result<Arc<TextureView>, GraphicsError> {
        self.assert_viewable()?;
        if !self.texture_usage.contains(TextureUsage::TEXTURE) {
            return Err(GraphicsError::incompatible(
                "the texture was not created with shader-input usage",
            ));
        }
        if most_detailed + count > self.mipmaps {
            return Err(GraphicsError::OutOfRange {
                offset: most_detailed as u64,
                count: count as u64,
                size: self.mipmaps as u64,
            });
        }
        Ok(TextureView::over_texture(
            self.clone(),
            self.format.clone(),
            most_detailed,
            count,
        ))
    }

    /// Render target over the most detailed level.
    pub fn create_render_target(self: &Arc<Self>) -> Result<Arc<RenderTargetView>, GraphicsError> {
        self.create_render_target_mipmap(0)
    }

    pub fn create_render_target_mipmap(
        self: &Arc<Self>,
        mipmap: u32,
    ) -> Result<Arc<RenderTargetView>, GraphicsError> {
        self.assert_viewable()?;
        if !self.texture_usage.contains(TextureUsage::RENDER_TARGET) {
            return Err(GraphicsError::incompatible(
                "the texture was not created with render-target usage",
            ));
        }
        if mipmap >= self.mipmaps {
            return Err(GraphicsError::OutOfRange {
                offset: mipmap as u64,
                count: 0,
                size: self.mipmaps as u64,
            });
        }
        Ok(RenderTargetView::over_texture(
            self.clone(),
            self.format.clone(),
            mipmap,
        ))
    }

    /// Depth-stencil target over the most detailed level.
    pub fn create_depth_stencil(
        self: &Arc<Self>,
    ) -> Result<Arc<DepthStencilTargetView>, GraphicsError> {
        self.assert_viewable()?;
        if !self
            .texture_usage
            .contains(TextureUsage::DEPTH_STENCIL_TARGET)
        {
            return Err(GraphicsError::incompatible(
                "the texture was not created with depth-stencil usage",
            ));
        }
        Ok(DepthStencilTargetView::new(
            self.clone(),
            self.format.clone(),
            0,
        ))
    }

    fn assert_viewable(&self) -> Result<(), GraphicsError> {
        if self.inner.lock().disposed {
            return Err(GraphicsError::Disposed("typeless texture"));
        }
        Ok(())
    }

    // Teardown and serialization.

    /// Disposes the texture, releasing both copies. Idempotent.
    pub fn dispose(&self) {
        self.monitor.enter();
        {
            let mut inner = self.inner.lock();
            if !inner.disposed {
                inner.disposed = true;
                inner.driver_part = None;
                inner.sw_levels = None;
                for map in inner.maps.iter_mut() {
                    *map = None;
                }
            }
        }
        self.monitor.exit();
    }

    /// Captures the format, dimensions and raw bytes of every level.
    pub fn snapshot(&self) -> Result<TextureSnapshot, GraphicsError> {
        let mut levels = Vec::with_capacity(self.mipmaps as usize);
        for level in 0..self.mipmaps {
            self.map(MapOptions::Read, level)?;
            let bytes = self.mapped_to_vec(level)?;
            self.unmap(level)?;
            levels.push(bytes);
        }
        Ok(TextureSnapshot {
            format: self.format.to_string(),
            width: self.width,
            height: self.height,
            levels,
        })
    }

    /// Rebuilds a system-memory texture from a snapshot.
    pub fn from_snapshot(
        snapshot: &TextureSnapshot,
        usage: Usage,
        texture_usage: TextureUsage,
        cpu_access: CpuAccess,
        locality: GraphicsLocality,
    ) -> Result<Arc<TypelessTexture2D>, GraphicsError> {
        let format = PixelFormat::parse(&snapshot.format)
            .map_err(|e| GraphicsError::incompatible(e.to_string()))?;
        Self::new(
            usage,
            texture_usage,
            cpu_access,
            format,
            snapshot.width,
            snapshot.height,
            snapshot.levels.len() as u32,
            locality,
            Some(&snapshot.levels),
        )
    }
}

impl std::fmt::Debug for TypelessTexture2D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TypelessTexture2D")
            .field("format", &self.format.to_string())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("mipmaps", &self.mipmaps)
            .field("locality", &inner.locality)
            .field("bound", &inner.driver_part.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba() -> PixelFormat {
        PixelFormat::parse("R.UN8 G.UN8 B.UN8 A.UN8").unwrap()
    }

    fn system_texture(width: u32, height: u32, mipmaps: u32) -> Arc<TypelessTexture2D> {
        TypelessTexture2D::new(
            Usage::Dynamic,
            TextureUsage::TEXTURE,
            CpuAccess::READ_WRITE,
            rgba(),
            width,
            height,
            mipmaps,
            GraphicsLocality::SystemMemoryOnly,
            None,
        )
        .unwrap()
    }

    #[test]
    fn chain_math() {
        assert_eq!(mipmap_count(256, 256), 9);
        assert_eq!(mipmap_count(256, 64), 9);
        assert_eq!(mipmap_count(1, 1), 1);
        assert_eq!(mipmap_dimensions(256, 64, 0), (256, 64));
        assert_eq!(mipmap_dimensions(256, 64, 3), (32, 8));
        assert_eq!(mipmap_dimensions(256, 64, 8), (1, 1));
    }

    #[test]
    fn zero_mipmaps_means_full_chain() {
        let texture = system_texture(16, 16, 0);
        assert_eq!(texture.mipmap_count(), 5);
    }

    #[test]
    fn per_level_map_roundtrip() {
        let texture = system_texture(4, 4, 2);
        let mip = texture.map(MapOptions::Write, 1).unwrap();
        assert_eq!((mip.width, mip.height), (2, 2));
        assert_eq!(mip.byte_size, 2 * 2 * 4);
        texture.write_mapped(1, 0, &[9; 16]).unwrap();
        texture.unmap(1).unwrap();

        texture.map(MapOptions::Read, 1).unwrap();
        assert_eq!(texture.mapped_to_vec(1).unwrap(), vec![9; 16]);
        texture.unmap(1).unwrap();
    }

    #[test]
    fn independent_levels_map_concurrently() {
        let texture = system_texture(4, 4, 2);
        texture.map(MapOptions::Write, 0).unwrap();
        // A different level maps fine while level 0 is open.
        texture.map(MapOptions::Write, 1).unwrap();
        // The same level does not.
        assert!(matches!(
            texture.map(MapOptions::Write, 0),
            Err(GraphicsError::AlreadyMapped)
        ));
        texture.unmap(0).unwrap();
        texture.unmap(1).unwrap();
    }

    #[test]
    fn level_out_of_range_rejected() {
        let texture = system_texture(4, 4, 1);
        assert!(matches!(
            texture.map(MapOptions::Read, 1),
            Err(GraphicsError::OutOfRange { .. })
        ));
    }

    #[test]
    fn snapshot_roundtrip() {
        let texture = system_texture(2, 2, 2);
        texture.map(MapOptions::Write, 0).unwrap();
        texture.write_mapped(0, 0, &[7; 16]).unwrap();
        texture.unmap(0).unwrap();

        let snapshot = texture.snapshot().unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: TextureSnapshot = serde_json::from_str(&json).unwrap();
        let rebuilt = TypelessTexture2D::from_snapshot(
            &restored,
            Usage::Dynamic,
            TextureUsage::TEXTURE,
            CpuAccess::READ_WRITE,
            GraphicsLocality::SystemMemoryOnly,
        )
        .unwrap();
        assert_eq!(rebuilt.width(), 2);
        assert_eq!(rebuilt.mipmap_count(), 2);
        rebuilt.map(MapOptions::Read, 0).unwrap();
        assert_eq!(rebuilt.mapped_to_vec(0).unwrap(), vec![7; 16]);
        rebuilt.unmap(0).unwrap();
    }

    #[test]
    fn view_usage_validated() {
        let texture = system_texture(4, 4, 1);
        // Created with TEXTURE usage only.
        assert!(texture.create_texture_view().is_ok());
        assert!(matches!(
            texture.create_render_target(),
            Err(GraphicsError::Incompatible(_))
        ));
        assert!(matches!(
            texture.create_depth_stencil(),
            Err(GraphicsError::Incompatible(_))
        ));
    }
}
