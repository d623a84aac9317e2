// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The graphics device: the stateful context everything binds through.
//!
//! A device is a re-entrant critical section around one GPU command
//! timeline. `enter`/`exit` bracket a frame; inside it the application
//! binds state objects, shader stages and geometry, then issues draws.
//! The device keeps its held lock set exactly equal to the currently
//! bound set at all times: every slot swap releases the outgoing lock and
//! acquires the incoming one before the slot is updated, so `clear_states`
//! and device-lost recovery can always fully unwind.
//!
//! Bindings survive unlock/lock cycles. The outermost `exit` releases
//! every resource and state lock but keeps the references; the next
//! outermost `enter` re-locks them and resubmits the surviving bindings
//! to the driver. Only [`GraphicsDevice::clear_states`] resets them.
//!
//! The documented hazard applies: two threads swapping two states in
//! opposite order can deadlock, since no global lock order is enforced
//! across independent `set_*` calls.

pub mod performance;
pub mod statistics;

pub use performance::DevicePerformance;
pub use statistics::{ChangeStats, StateKind, StateStatistics};

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::common::{ClearOptions, Colour, FormatUsage, Region2i, Topology};
use crate::driver::{
    DeviceListener, DriverConstantBufferView, DriverDevice, DriverRenderTargetView,
    DriverSamplerState, DriverTextureView, DriverVertexBufferView,
};
use crate::error::GraphicsError;
use crate::formats::pixel::{CommonFormatLayout, PixelFormat};
use crate::resources::constant_view::ConstantBufferView;
use crate::resources::geometry::Geometry;
use crate::resources::target_views::{DepthStencilTargetView, RenderTargetView, TextureView};
use crate::shaders::{GeometryShader, PixelShader, VertexShader};
use crate::states::blend::BlendState;
use crate::states::depth_stencil::DepthStencilState;
use crate::states::intern_pool::InternPool;
use crate::states::rasterization::RasterizationState;
use crate::states::sampler::SamplerState;
use crate::sync::Monitor;

/// Maximum number of render targets bound at the same time.
pub const MAX_RENDER_TARGETS: u32 = 8;

/// Maximum number of viewports.
pub const MAX_VIEWPORTS: u32 = 8;

/// Maximum number of scissor rectangles.
pub const MAX_SCISSOR_RECTS: u32 = 8;

/// One shader stage's bound resource arrays.
#[derive(Clone, Default)]
struct StageSet {
    samplers: Vec<Arc<SamplerState>>,
    textures: Vec<Arc<TextureView>>,
    constants: Vec<Arc<ConstantBufferView>>,
}

#[derive(Clone)]
struct Bindings {
    lock_count: u32,
    disposed: bool,

    viewports: Vec<Region2i>,
    scissor_rects: Vec<Region2i>,

    blend: Option<Arc<BlendState>>,
    blend_colour: Colour,
    blend_mask: u32,
    depth_stencil: Option<Arc<DepthStencilState>>,
    stencil_ref: u32,
    rasterization: Option<Arc<RasterizationState>>,

    input_geometry: Option<Arc<Geometry>>,
    output_geometry: Option<Arc<Geometry>>,
    vertex: StageSet,
    geometry: StageSet,
    pixel: StageSet,
    render_targets: Vec<Arc<RenderTargetView>>,
    depth_stencil_target: Option<Arc<DepthStencilTargetView>>,

    vertex_shader: Option<Arc<VertexShader>>,
    geometry_shader: Option<Arc<GeometryShader>>,
    pixel_shader: Option<Arc<PixelShader>>,

    default_render_target: Option<Arc<RenderTargetView>>,
    default_depth_stencil: Option<Arc<DepthStencilTargetView>>,
}

impl Bindings {
    fn new() -> Self {
        Bindings {
            lock_count: 0,
            disposed: false,
            viewports: Vec::new(),
            scissor_rects: Vec::new(),
            blend: None,
            blend_colour: Colour::BLACK,
            blend_mask: 0,
            depth_stencil: None,
            stencil_ref: 0,
            rasterization: None,
            input_geometry: None,
            output_geometry: None,
            vertex: StageSet::default(),
            geometry: StageSet::default(),
            pixel: StageSet::default(),
            render_targets: Vec::new(),
            depth_stencil_target: None,
            vertex_shader: None,
            geometry_shader: None,
            pixel_shader: None,
            default_render_target: None,
            default_depth_stencil: None,
        }
    }
}

/// Per-slot compare-and-swap over a bound array: only differing slots
/// release the old lock and acquire + bind the new one, so rebinding the
/// same set across frames costs nothing. Old slots past the new length
/// are released.
fn swap_slots<T>(
    old: &[Arc<T>],
    new: &[Arc<T>],
    acquire: impl Fn(&Arc<T>),
    release: impl Fn(&Arc<T>),
    mut bind: impl FnMut(&Arc<T>) -> Result<(), GraphicsError>,
) -> Result<(), GraphicsError> {
    for (i, item) in new.iter().enumerate() {
        match old.get(i) {
            Some(prev) if Arc::ptr_eq(prev, item) => {}
            Some(prev) => {
                release(prev);
                acquire(item);
                bind(item)?;
            }
            None => {
                acquire(item);
                bind(item)?;
            }
        }
    }
    for prev in old.iter().skip(new.len()) {
        release(prev);
    }
    Ok(())
}

/// Same protocol for a single optional slot.
fn swap_slot<T>(
    old: &Option<Arc<T>>,
    new: &Option<Arc<T>>,
    acquire: impl Fn(&Arc<T>),
    release: impl Fn(&Arc<T>),
) {
    match (old, new) {
        (Some(prev), Some(next)) if Arc::ptr_eq(prev, next) => {}
        _ => {
            if let Some(prev) = old {
                release(prev);
            }
            if let Some(next) = new {
                acquire(next);
            }
        }
    }
}

struct LifecycleListener {
    device: Weak<GraphicsDevice>,
}

impl DeviceListener for LifecycleListener {
    fn disposed(&self) {
        if let Some(device) = self.device.upgrade() {
            let _ = device.dispose();
        }
    }

    fn reset(&self) {
        // Bindings are resubmitted on the next outermost enter; nothing to
        // do here besides noting it.
        logwise::info_sync!("graphics device reset");
    }

    fn device_lost(&self) {
        if let Some(device) = self.device.upgrade() {
            device.raise_lost();
        }
    }
}

type DeviceCallback = Box<dyn Fn(&GraphicsDevice) + Send + Sync>;

/// RAII wrapper around [`GraphicsDevice::enter`]; dropping it exits.
pub struct DeviceLock<'a> {
    device: &'a GraphicsDevice,
}

impl Drop for DeviceLock<'_> {
    fn drop(&mut self) {
        let _ = self.device.exit();
    }
}

/// The stateful rendering context over a [`DriverDevice`].
pub struct GraphicsDevice {
    driver: Arc<dyn DriverDevice>,
    pool: Arc<InternPool>,
    monitor: Monitor,
    performance: Mutex<DevicePerformance>,
    statistics: Mutex<StateStatistics>,
    bindings: Mutex<Bindings>,
    lost_callbacks: Mutex<Vec<DeviceCallback>>,
    disposing_callbacks: Mutex<Vec<DeviceCallback>>,
}

impl GraphicsDevice {
    /// Wraps a driver device, sharing `pool` for state interning.
    ///
    /// The fresh device starts with default blend, depth-stencil and
    /// rasterization states interned and prepared.
    pub fn new(
        driver: Arc<dyn DriverDevice>,
        pool: Arc<InternPool>,
    ) -> Result<Arc<GraphicsDevice>, GraphicsError> {
        let device = Arc::new(GraphicsDevice {
            driver,
            pool,
            monitor: Monitor::new(),
            performance: Mutex::new(DevicePerformance::new()),
            statistics: Mutex::new(StateStatistics::new()),
            bindings: Mutex::new(Bindings::new()),
            lost_callbacks: Mutex::new(Vec::new()),
            disposing_callbacks: Mutex::new(Vec::new()),
        });
        device.clear_states_internal()?;
        Ok(device)
    }

    /// Installs the default targets and registers for driver lifecycle
    /// notifications.
    pub fn initialize(
        self: &Arc<Self>,
        render_target: Arc<RenderTargetView>,
        depth_stencil: Option<Arc<DepthStencilTargetView>>,
    ) -> Result<(), GraphicsError> {
        self.assert_not_disposed()?;
        {
            let mut bindings = self.bindings.lock();
            bindings.default_render_target = Some(render_target);
            bindings.default_depth_stencil = depth_stencil;
        }
        self.driver.register_listener(Arc::new(LifecycleListener {
            device: Arc::downgrade(self),
        }));
        Ok(())
    }

    // Properties.

    /// Symbolic name of the device.
    pub fn name(&self) -> &str {
        self.driver.name()
    }

    pub fn is_locked(&self) -> bool {
        self.bindings.lock().lock_count > 0
    }

    pub fn is_disposed(&self) -> bool {
        self.bindings.lock().disposed
    }

    pub fn intern_pool(&self) -> &Arc<InternPool> {
        &self.pool
    }

    pub(crate) fn driver(&self) -> &dyn DriverDevice {
        &*self.driver
    }

    /// Snapshot of the frame/primitive counters.
    pub fn performance(&self) -> DevicePerformance {
        self.performance.lock().clone()
    }

    pub fn reset_performance(&self) {
        self.performance.lock().reset();
    }

    /// Snapshot of the state-change statistics.
    pub fn statistics(&self) -> StateStatistics {
        self.statistics.lock().clone()
    }

    pub fn reset_statistics(&self) {
        self.statistics.lock().reset();
    }

    pub fn default_render_target(&self) -> Option<Arc<RenderTargetView>> {
        self.bindings.lock().default_render_target.clone()
    }

    pub fn default_depth_stencil_target(&self) -> Option<Arc<DepthStencilTargetView>> {
        self.bindings.lock().default_depth_stencil.clone()
    }

    /// Runs `callback` when the driver reports the device lost. Must not
    /// be registered from inside `enter`/`exit`.
    pub fn on_device_lost(&self, callback: impl Fn(&GraphicsDevice) + Send + Sync + 'static) {
        self.lost_callbacks.lock().push(Box::new(callback));
    }

    /// Runs `callback` once, right before the device is torn down, so
    /// dependents can unbind their resources first.
    pub fn on_disposing(&self, callback: impl Fn(&GraphicsDevice) + Send + Sync + 'static) {
        self.disposing_callbacks.lock().push(Box::new(callback));
    }

    // Capabilities.

    /// What the driver supports `format` for; formats outside the common
    /// layouts are unsupported everywhere.
    pub fn format_support(&self, format: &PixelFormat) -> FormatUsage {
        if format.common_layout() == CommonFormatLayout::NotCommonLayout {
            return FormatUsage::empty();
        }
        self.driver.format_support(format.common_layout())
    }

    pub fn multi_sampling_quality(&self, format: &PixelFormat, sample_count: u32) -> u32 {
        self.driver
            .multi_sampling_quality(format.common_layout(), sample_count)
    }

    pub fn device_memory(&self) -> u64 {
        self.driver.device_memory()
    }

    // Shader creation. Compilation is an external collaborator; the
    // device only ingests bytecode.

    pub fn create_vertex_shader(&self, bytecode: &[u8]) -> Result<Arc<VertexShader>, GraphicsError> {
        self.assert_not_disposed()?;
        Ok(VertexShader::new(self.driver.create_vertex_shader(bytecode)))
    }

    pub fn create_geometry_shader(
        &self,
        bytecode: &[u8],
    ) -> Result<Arc<GeometryShader>, GraphicsError> {
        self.assert_not_disposed()?;
        Ok(GeometryShader::new(
            self.driver.create_geometry_shader(bytecode),
        ))
    }

    pub fn create_pixel_shader(&self, bytecode: &[u8]) -> Result<Arc<PixelShader>, GraphicsError> {
        self.assert_not_disposed()?;
        Ok(PixelShader::new(self.driver.create_pixel_shader(bytecode)))
    }

    // Thread safety.

    /// Enters the device's critical section. Re-entrant; only the
    /// outermost enter acquires the device monitor, begins the frame and
    /// re-locks the surviving bindings.
    pub fn enter(&self) -> Result<(), GraphicsError> {
        self.assert_not_disposed()?;
        self.monitor.enter();
        let outermost = {
            let mut bindings = self.bindings.lock();
            bindings.lock_count += 1;
            bindings.lock_count == 1
        };
        if outermost {
            logwise::trace_sync!("GraphicsDevice::enter, frame begins");
            self.driver.enter();
            self.performance.lock().begin_frame();
            self.statistics.lock().begin_frame();
            self.reclaim_locks()?;
        }
        Ok(())
    }

    /// Enters and returns a guard whose drop exits.
    pub fn lock(&self) -> Result<DeviceLock<'_>, GraphicsError> {
        self.enter()?;
        Ok(DeviceLock { device: self })
    }

    /// Leaves the critical section. Only the outermost exit releases the
    /// held locks, ends the frame and releases the device monitor.
    pub fn exit(&self) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        let outermost = self.bindings.lock().lock_count == 1;
        if outermost {
            self.release_locks();
            self.statistics.lock().end_frame();
            self.performance.lock().end_frame();
            self.driver.exit();
            logwise::trace_sync!("GraphicsDevice::exit, frame ends");
        }
        self.bindings.lock().lock_count -= 1;
        self.monitor.exit();
        Ok(())
    }

    fn assert_locked(&self) -> Result<(), GraphicsError> {
        if !self.monitor.is_held_by_current_thread() || self.bindings.lock().lock_count == 0 {
            return Err(GraphicsError::NotLocked);
        }
        Ok(())
    }

    fn assert_not_locked(&self) -> Result<(), GraphicsError> {
        if self.bindings.lock().lock_count != 0 {
            return Err(GraphicsError::Locked);
        }
        Ok(())
    }

    fn assert_not_disposed(&self) -> Result<(), GraphicsError> {
        if self.bindings.lock().disposed {
            return Err(GraphicsError::Disposed("graphics device"));
        }
        Ok(())
    }

    /// Re-acquires every lock for the bindings that survived the last
    /// unlock, then resubmits them so the driver state matches.
    fn reclaim_locks(&self) -> Result<(), GraphicsError> {
        let snapshot = self.bindings.lock().clone();

        if let Some(geometry) = &snapshot.input_geometry {
            geometry.used_by_device();
        }
        if let Some(geometry) = &snapshot.output_geometry {
            geometry.used_by_device();
        }
        if let Some(state) = &snapshot.blend {
            state.monitor().enter();
        }
        if let Some(state) = &snapshot.depth_stencil {
            state.monitor().enter();
        }
        if let Some(state) = &snapshot.rasterization {
            state.monitor().enter();
        }

        // Shader locks are intentionally not reclaimed; they were never
        // released.

        for stage in [&snapshot.vertex, &snapshot.geometry, &snapshot.pixel] {
            for sampler in &stage.samplers {
                sampler.monitor().enter();
            }
            for texture in &stage.textures {
                texture.used_by_device();
            }
            for constants in &stage.constants {
                constants.used_by_device();
            }
        }
        for target in &snapshot.render_targets {
            target.used_by_device();
        }
        if let Some(target) = &snapshot.depth_stencil_target {
            target.used_by_device();
        }

        // Resubmit. Equal slots skip the unlock/relock churn, so this only
        // rebuilds driver-side bindings.
        self.set_blend_state(
            snapshot.blend.clone(),
            snapshot.blend_colour,
            snapshot.blend_mask,
        )?;
        self.set_depth_stencil_state(snapshot.depth_stencil.clone(), snapshot.stencil_ref)?;
        self.set_rasterization_state(snapshot.rasterization.clone())?;
        self.set_viewports(&snapshot.viewports)?;
        self.set_scissor_rects(&snapshot.scissor_rects)?;
        self.set_pixel_shader(
            snapshot.pixel_shader.clone(),
            Some(snapshot.pixel.samplers.as_slice()),
            Some(snapshot.pixel.textures.as_slice()),
            Some(snapshot.pixel.constants.as_slice()),
            Some(snapshot.render_targets.as_slice()),
            snapshot.depth_stencil_target.clone(),
        )?;
        self.set_geometry_shader(
            snapshot.geometry_shader.clone(),
            snapshot.output_geometry.clone(),
            Some(snapshot.geometry.samplers.as_slice()),
            Some(snapshot.geometry.textures.as_slice()),
            Some(snapshot.geometry.constants.as_slice()),
        )?;
        self.set_vertex_shader(
            snapshot.vertex_shader.clone(),
            snapshot.input_geometry.clone(),
            Some(snapshot.vertex.samplers.as_slice()),
            Some(snapshot.vertex.textures.as_slice()),
            Some(snapshot.vertex.constants.as_slice()),
        )?;
        Ok(())
    }

    /// Releases every held lock while keeping the binding references, so
    /// the next outermost enter can reclaim them.
    fn release_locks(&self) {
        let snapshot = self.bindings.lock().clone();

        if let Some(geometry) = &snapshot.input_geometry {
            geometry.unused_by_device();
        }
        if let Some(geometry) = &snapshot.output_geometry {
            geometry.unused_by_device();
        }
        if let Some(state) = &snapshot.blend {
            state.monitor().exit();
        }
        if let Some(state) = &snapshot.depth_stencil {
            state.monitor().exit();
        }
        if let Some(state) = &snapshot.rasterization {
            state.monitor().exit();
        }

        // Shader locks are intentionally not released; a bound shader
        // stays held across frames.

        for stage in [&snapshot.vertex, &snapshot.geometry, &snapshot.pixel] {
            for sampler in &stage.samplers {
                sampler.monitor().exit();
            }
            for texture in &stage.textures {
                texture.unused_by_device();
            }
            for constants in &stage.constants {
                constants.unused_by_device();
            }
        }
        for target in &snapshot.render_targets {
            target.unused_by_device();
        }
        if let Some(target) = &snapshot.depth_stencil_target {
            target.unused_by_device();
        }

        self.driver.clear_states();
    }

    // State objects.

    /// Binds a blend state, or the interned default for `None`.
    pub fn set_blend_state(
        &self,
        state: Option<Arc<BlendState>>,
        blend_colour: Colour,
        mask: u32,
    ) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        let state = match state {
            Some(state) => state,
            None => self.pool.intern_blend(Arc::new(BlendState::new())),
        };
        if !state.is_interned() {
            return Err(GraphicsError::NotInterned);
        }

        let current = self
            .bindings
            .lock()
            .blend
            .clone()
            .expect("a default blend state is installed at construction");
        if !Arc::ptr_eq(&current, &state) {
            current.monitor().exit();
            state.monitor().enter();
            state.prepare(self.driver())?;
            self.bindings.lock().blend = Some(state.clone());
        }

        self.statistics.lock().changed(StateKind::Blend);
        {
            let mut bindings = self.bindings.lock();
            bindings.blend_colour = blend_colour;
            bindings.blend_mask = mask;
        }
        state.with_device_data(|data| self.driver.set_blend_state(data, blend_colour, mask));
        Ok(())
    }

    pub fn blend_state(&self) -> Option<Arc<BlendState>> {
        self.bindings.lock().blend.clone()
    }

    pub fn blend_colour(&self) -> Colour {
        self.bindings.lock().blend_colour
    }

    pub fn blend_mask(&self) -> u32 {
        self.bindings.lock().blend_mask
    }

    /// Binds a depth-stencil state, or the interned default for `None`.
    pub fn set_depth_stencil_state(
        &self,
        state: Option<Arc<DepthStencilState>>,
        stencil_ref: u32,
    ) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        let state = match state {
            Some(state) => state,
            None => self
                .pool
                .intern_depth_stencil(Arc::new(DepthStencilState::new())),
        };
        if !state.is_interned() {
            return Err(GraphicsError::NotInterned);
        }

        let current = self
            .bindings
            .lock()
            .depth_stencil
            .clone()
            .expect("a default depth-stencil state is installed at construction");
        if !Arc::ptr_eq(&current, &state) {
            current.monitor().exit();
            state.monitor().enter();
            state.prepare(self.driver())?;
            self.bindings.lock().depth_stencil = Some(state.clone());
        }

        self.statistics.lock().changed(StateKind::DepthStencil);
        self.bindings.lock().stencil_ref = stencil_ref;
        state.with_device_data(|data| self.driver.set_depth_stencil_state(data, stencil_ref));
        Ok(())
    }

    pub fn depth_stencil_state(&self) -> Option<Arc<DepthStencilState>> {
        self.bindings.lock().depth_stencil.clone()
    }

    pub fn stencil_reference(&self) -> u32 {
        self.bindings.lock().stencil_ref
    }

    /// Binds a rasterization state, or the interned default for `None`.
    pub fn set_rasterization_state(
        &self,
        state: Option<Arc<RasterizationState>>,
    ) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        let state = match state {
            Some(state) => state,
            None => self
                .pool
                .intern_rasterization(Arc::new(RasterizationState::new())),
        };
        if !state.is_interned() {
            return Err(GraphicsError::NotInterned);
        }

        let current = self
            .bindings
            .lock()
            .rasterization
            .clone()
            .expect("a default rasterization state is installed at construction");
        if !Arc::ptr_eq(&current, &state) {
            current.monitor().exit();
            state.monitor().enter();
            state.prepare(self.driver())?;
            self.bindings.lock().rasterization = Some(state.clone());
        }

        self.statistics.lock().changed(StateKind::Rasterization);
        state.with_device_data(|data| self.driver.set_rasterization_state(data));
        Ok(())
    }

    pub fn rasterization_state(&self) -> Option<Arc<RasterizationState>> {
        self.bindings.lock().rasterization.clone()
    }

    /// Sets the viewports; one viewport applies to all render targets.
    pub fn set_viewports(&self, viewports: &[Region2i]) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        if viewports.len() as u32 > MAX_VIEWPORTS {
            return Err(GraphicsError::incompatible(format!(
                "at most {MAX_VIEWPORTS} viewports can be set"
            )));
        }
        self.statistics.lock().changed(StateKind::Viewport);
        self.driver.set_viewports(viewports);
        self.bindings.lock().viewports = viewports.to_vec();
        Ok(())
    }

    pub fn viewports(&self) -> Vec<Region2i> {
        self.bindings.lock().viewports.clone()
    }

    pub fn set_scissor_rects(&self, rects: &[Region2i]) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        if rects.len() as u32 > MAX_SCISSOR_RECTS {
            return Err(GraphicsError::incompatible(format!(
                "at most {MAX_SCISSOR_RECTS} scissor rectangles can be set"
            )));
        }
        self.statistics.lock().changed(StateKind::Scissor);
        self.driver.set_scissor_rects(rects);
        self.bindings.lock().scissor_rects = rects.to_vec();
        Ok(())
    }

    pub fn scissor_rects(&self) -> Vec<Region2i> {
        self.bindings.lock().scissor_rects.clone()
    }

    // Shader stages. One protocol, replicated per stage: decorate
    // missing arrays, validate, per-slot compare-and-swap the locks, swap
    // the references in, resolve driver handles and bind.

    fn validate_stage_arrays(samplers: &[Arc<SamplerState>]) -> Result<(), GraphicsError> {
        for sampler in samplers {
            if !sampler.is_interned() {
                return Err(GraphicsError::NotInterned);
            }
        }
        Ok(())
    }

    fn swap_stage_locks(
        &self,
        old: &StageSet,
        samplers: &[Arc<SamplerState>],
        textures: &[Arc<TextureView>],
        constants: &[Arc<ConstantBufferView>],
    ) -> Result<(), GraphicsError> {
        swap_slots(
            &old.samplers,
            samplers,
            |s| s.monitor().enter(),
            |s| s.monitor().exit(),
            |s| s.prepare(self.driver()),
        )?;
        swap_slots(
            &old.textures,
            textures,
            |t| t.used_by_device(),
            |t| t.unused_by_device(),
            |t| t.bind_to_device(self),
        )?;
        swap_slots(
            &old.constants,
            constants,
            |c| c.used_by_device(),
            |c| c.unused_by_device(),
            |c| c.bind_to_device(self),
        )
    }

    fn resolve_stage_handles(
        samplers: &[Arc<SamplerState>],
        textures: &[Arc<TextureView>],
        constants: &[Arc<ConstantBufferView>],
    ) -> (
        Vec<Arc<dyn DriverSamplerState>>,
        Vec<Arc<dyn DriverTextureView>>,
        Vec<Arc<dyn DriverConstantBufferView>>,
    ) {
        (
            samplers.iter().filter_map(|s| s.device_data()).collect(),
            textures.iter().filter_map(|t| t.device_data()).collect(),
            constants.iter().filter_map(|c| c.device_data()).collect(),
        )
    }

    /// Sets the vertex stage: shader, input geometry and resources.
    pub fn set_vertex_shader(
        &self,
        shader: Option<Arc<VertexShader>>,
        input: Option<Arc<Geometry>>,
        samplers: Option<&[Arc<SamplerState>]>,
        textures: Option<&[Arc<TextureView>]>,
        constant_buffers: Option<&[Arc<ConstantBufferView>]>,
    ) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        let samplers = samplers.unwrap_or(&[]);
        let textures = textures.unwrap_or(&[]);
        let constants = constant_buffers.unwrap_or(&[]);
        Self::validate_stage_arrays(samplers)?;

        let (old_stage, old_shader, old_geometry) = {
            let bindings = self.bindings.lock();
            (
                bindings.vertex.clone(),
                bindings.vertex_shader.clone(),
                bindings.input_geometry.clone(),
            )
        };

        if let Some(previous) = &old_shader {
            previous.unused_by_device();
        }
        if let Some(next) = &shader {
            next.used_by_device();
        }

        self.swap_stage_locks(&old_stage, samplers, textures, constants)?;

        swap_slot(
            &old_geometry,
            &input,
            |g| g.used_by_device(),
            |g| g.unused_by_device(),
        );
        // Binding may have to pick up internal changes even when the slot
        // did not move.
        if let Some(geometry) = &input {
            geometry.bind_to_device(self)?;
            geometry.bind_input_layout(self)?;
        }

        {
            let mut bindings = self.bindings.lock();
            bindings.vertex = StageSet {
                samplers: samplers.to_vec(),
                textures: textures.to_vec(),
                constants: constants.to_vec(),
            };
            bindings.input_geometry = input.clone();
            bindings.vertex_shader = shader.clone();
        }

        let (sampler_handles, texture_handles, constant_handles) =
            Self::resolve_stage_handles(samplers, textures, constants);
        let sampler_refs: Vec<&dyn DriverSamplerState> =
            sampler_handles.iter().map(|h| h.as_ref()).collect();
        let texture_refs: Vec<&dyn DriverTextureView> =
            texture_handles.iter().map(|h| h.as_ref()).collect();
        let constant_refs: Vec<&dyn DriverConstantBufferView> =
            constant_handles.iter().map(|h| h.as_ref()).collect();
        let shader_handle = shader.as_ref().and_then(|s| s.device_data());

        match &input {
            Some(geometry) => {
                let vertex_handles: Vec<Arc<dyn DriverVertexBufferView>> = (0..geometry
                    .vertex_buffer_count())
                    .filter_map(|i| geometry.vertex_buffer(i))
                    .filter_map(|view| view.device_data())
                    .collect();
                let vertex_refs: Vec<&dyn DriverVertexBufferView> =
                    vertex_handles.iter().map(|h| h.as_ref()).collect();
                let index_handle = geometry.index_buffer().and_then(|view| view.device_data());
                let layout = geometry.layout_handle();
                self.driver.bind_vertex_stage(
                    geometry.topology(),
                    layout.as_deref(),
                    &vertex_refs,
                    index_handle.as_deref(),
                    shader_handle.as_deref(),
                    &sampler_refs,
                    &texture_refs,
                    &constant_refs,
                );
            }
            None => {
                self.driver.bind_vertex_stage(
                    Topology::Triangle,
                    None,
                    &[],
                    None,
                    shader_handle.as_deref(),
                    &sampler_refs,
                    &texture_refs,
                    &constant_refs,
                );
            }
        }

        self.statistics.lock().changed(StateKind::VertexStage);
        Ok(())
    }

    /// Sets the geometry stage: shader, output geometry and resources.
    pub fn set_geometry_shader(
        &self,
        shader: Option<Arc<GeometryShader>>,
        output: Option<Arc<Geometry>>,
        samplers: Option<&[Arc<SamplerState>]>,
        textures: Option<&[Arc<TextureView>]>,
        constant_buffers: Option<&[Arc<ConstantBufferView>]>,
    ) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        let samplers = samplers.unwrap_or(&[]);
        let textures = textures.unwrap_or(&[]);
        let constants = constant_buffers.unwrap_or(&[]);
        Self::validate_stage_arrays(samplers)?;
        if let Some(geometry) = &output {
            if !geometry.is_output_compatible() {
                return Err(GraphicsError::incompatible(
                    "the geometry is not output compatible",
                ));
            }
        }

        let (old_stage, old_shader, old_geometry) = {
            let bindings = self.bindings.lock();
            (
                bindings.geometry.clone(),
                bindings.geometry_shader.clone(),
                bindings.output_geometry.clone(),
            )
        };

        if let Some(previous) = &old_shader {
            previous.unused_by_device();
        }
        if let Some(next) = &shader {
            next.used_by_device();
        }

        self.swap_stage_locks(&old_stage, samplers, textures, constants)?;

        swap_slot(
            &old_geometry,
            &output,
            |g| g.used_by_device(),
            |g| g.unused_by_device(),
        );
        if let Some(geometry) = &output {
            geometry.bind_to_device(self)?;
        }

        {
            let mut bindings = self.bindings.lock();
            bindings.geometry = StageSet {
                samplers: samplers.to_vec(),
                textures: textures.to_vec(),
                constants: constants.to_vec(),
            };
            bindings.output_geometry = output.clone();
            bindings.geometry_shader = shader.clone();
        }

        let (sampler_handles, texture_handles, constant_handles) =
            Self::resolve_stage_handles(samplers, textures, constants);
        let sampler_refs: Vec<&dyn DriverSamplerState> =
            sampler_handles.iter().map(|h| h.as_ref()).collect();
        let texture_refs: Vec<&dyn DriverTextureView> =
            texture_handles.iter().map(|h| h.as_ref()).collect();
        let constant_refs: Vec<&dyn DriverConstantBufferView> =
            constant_handles.iter().map(|h| h.as_ref()).collect();
        let shader_handle = shader.as_ref().and_then(|s| s.device_data());

        let output_handles: Vec<Arc<dyn DriverVertexBufferView>> = match &output {
            Some(geometry) => (0..geometry.vertex_buffer_count())
                .filter_map(|i| geometry.vertex_buffer(i))
                .filter_map(|view| view.device_data())
                .collect(),
            None => Vec::new(),
        };
        let output_refs: Vec<&dyn DriverVertexBufferView> =
            output_handles.iter().map(|h| h.as_ref()).collect();

        self.driver.bind_geometry_stage(
            shader_handle.as_deref(),
            &sampler_refs,
            &texture_refs,
            &constant_refs,
            &output_refs,
        );

        self.statistics.lock().changed(StateKind::GeometryStage);
        Ok(())
    }

    /// Sets the pixel stage: shader, resources and output targets.
    pub fn set_pixel_shader(
        &self,
        shader: Option<Arc<PixelShader>>,
        samplers: Option<&[Arc<SamplerState>]>,
        textures: Option<&[Arc<TextureView>]>,
        constant_buffers: Option<&[Arc<ConstantBufferView>]>,
        render_targets: Option<&[Arc<RenderTargetView>]>,
        depth_stencil_target: Option<Arc<DepthStencilTargetView>>,
    ) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        let samplers = samplers.unwrap_or(&[]);
        let textures = textures.unwrap_or(&[]);
        let constants = constant_buffers.unwrap_or(&[]);
        let render_targets = render_targets.unwrap_or(&[]);
        Self::validate_stage_arrays(samplers)?;
        if render_targets.len() as u32 > MAX_RENDER_TARGETS {
            return Err(GraphicsError::incompatible(format!(
                "at most {MAX_RENDER_TARGETS} render targets can be bound"
            )));
        }
        for pair in render_targets.windows(2) {
            if pair[0].width() != pair[1].width()
                || pair[0].height() != pair[1].height()
                || !pair[0].format().is_compatible(pair[1].format())
            {
                return Err(GraphicsError::incompatible(
                    "render targets do not match in width, height or format layout",
                ));
            }
        }

        let (old_stage, old_shader, old_targets, old_depth_target) = {
            let bindings = self.bindings.lock();
            (
                bindings.pixel.clone(),
                bindings.pixel_shader.clone(),
                bindings.render_targets.clone(),
                bindings.depth_stencil_target.clone(),
            )
        };

        if let Some(previous) = &old_shader {
            previous.unused_by_device();
        }
        if let Some(next) = &shader {
            next.used_by_device();
        }

        self.swap_stage_locks(&old_stage, samplers, textures, constants)?;

        swap_slots(
            &old_targets,
            render_targets,
            |t| t.used_by_device(),
            |t| t.unused_by_device(),
            |t| t.bind_to_device(self),
        )?;
        swap_slot(
            &old_depth_target,
            &depth_stencil_target,
            |t| t.used_by_device(),
            |t| t.unused_by_device(),
        );
        if let Some(target) = &depth_stencil_target {
            target.bind_to_device(self)?;
        }

        // The GPU writes through output targets; their system copies are
        // stale from here on.
        for target in render_targets {
            target.signal_changed();
        }
        if let Some(target) = &depth_stencil_target {
            target.signal_changed();
        }

        {
            let mut bindings = self.bindings.lock();
            bindings.pixel = StageSet {
                samplers: samplers.to_vec(),
                textures: textures.to_vec(),
                constants: constants.to_vec(),
            };
            bindings.render_targets = render_targets.to_vec();
            bindings.depth_stencil_target = depth_stencil_target.clone();
            bindings.pixel_shader = shader.clone();
        }

        let (sampler_handles, texture_handles, constant_handles) =
            Self::resolve_stage_handles(samplers, textures, constants);
        let sampler_refs: Vec<&dyn DriverSamplerState> =
            sampler_handles.iter().map(|h| h.as_ref()).collect();
        let texture_refs: Vec<&dyn DriverTextureView> =
            texture_handles.iter().map(|h| h.as_ref()).collect();
        let constant_refs: Vec<&dyn DriverConstantBufferView> =
            constant_handles.iter().map(|h| h.as_ref()).collect();
        let target_handles: Vec<Arc<dyn DriverRenderTargetView>> = render_targets
            .iter()
            .filter_map(|t| t.device_data())
            .collect();
        let target_refs: Vec<&dyn DriverRenderTargetView> =
            target_handles.iter().map(|h| h.as_ref()).collect();
        let shader_handle = shader.as_ref().and_then(|s| s.device_data());
        let depth_handle = depth_stencil_target
            .as_ref()
            .and_then(|t| t.device_data());

        self.driver.bind_pixel_stage(
            shader_handle.as_deref(),
            &sampler_refs,
            &texture_refs,
            &constant_refs,
            &target_refs,
            depth_handle.as_deref(),
        );

        self.statistics.lock().changed(StateKind::PixelStage);
        Ok(())
    }

    pub fn input_geometry(&self) -> Option<Arc<Geometry>> {
        self.bindings.lock().input_geometry.clone()
    }

    pub fn render_targets(&self) -> Vec<Arc<RenderTargetView>> {
        self.bindings.lock().render_targets.clone()
    }

    /// Clears all states, unbinding every resource and re-interning the
    /// default state objects.
    pub fn clear_states(&self) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        self.clear_states_internal()
    }

    fn clear_states_internal(&self) -> Result<(), GraphicsError> {
        let (locked, old) = {
            let mut bindings = self.bindings.lock();
            let locked = bindings.lock_count > 0;
            let old = bindings.clone();
            bindings.input_geometry = None;
            bindings.output_geometry = None;
            bindings.viewports.clear();
            bindings.scissor_rects.clear();
            bindings.vertex = StageSet::default();
            bindings.geometry = StageSet::default();
            bindings.pixel = StageSet::default();
            bindings.render_targets = Vec::new();
            bindings.depth_stencil_target = None;
            bindings.vertex_shader = None;
            bindings.geometry_shader = None;
            bindings.pixel_shader = None;
            (locked, old)
        };

        // Unwind the old bindings. Lock state exists only while the device
        // is locked; reference counts are unconditional.
        if let Some(geometry) = &old.input_geometry {
            geometry.unused_by_device();
        }
        if let Some(geometry) = &old.output_geometry {
            geometry.unused_by_device();
        }
        if locked {
            if let Some(state) = &old.blend {
                state.monitor().exit();
            }
            if let Some(state) = &old.depth_stencil {
                state.monitor().exit();
            }
            if let Some(state) = &old.rasterization {
                state.monitor().exit();
            }
            for stage in [&old.vertex, &old.geometry, &old.pixel] {
                for sampler in &stage.samplers {
                    sampler.monitor().exit();
                }
            }
        }
        for stage in [&old.vertex, &old.geometry, &old.pixel] {
            for texture in &stage.textures {
                texture.unused_by_device();
            }
            for constants in &stage.constants {
                constants.unused_by_device();
            }
        }
        for target in &old.render_targets {
            target.unused_by_device();
        }
        if let Some(target) = &old.depth_stencil_target {
            target.unused_by_device();
        }
        if let Some(shader) = &old.vertex_shader {
            shader.unused_by_device();
        }
        if let Some(shader) = &old.geometry_shader {
            shader.unused_by_device();
        }
        if let Some(shader) = &old.pixel_shader {
            shader.unused_by_device();
        }

        // Install prepared defaults, locked exactly when the device is.
        let blend = self.pool.intern_blend(Arc::new(BlendState::new()));
        let depth_stencil = self
            .pool
            .intern_depth_stencil(Arc::new(DepthStencilState::new()));
        let rasterization = self
            .pool
            .intern_rasterization(Arc::new(RasterizationState::new()));
        if locked {
            blend.monitor().enter();
            depth_stencil.monitor().enter();
            rasterization.monitor().enter();
        }
        blend.prepare(self.driver())?;
        depth_stencil.prepare(self.driver())?;
        rasterization.prepare(self.driver())?;
        {
            let mut bindings = self.bindings.lock();
            bindings.blend = Some(blend);
            bindings.blend_colour = Colour::BLACK;
            bindings.blend_mask = 0;
            bindings.depth_stencil = Some(depth_stencil);
            bindings.stencil_ref = 0;
            bindings.rasterization = Some(rasterization);
        }

        self.driver.clear_states();
        Ok(())
    }

    // Rendering.

    /// Clears a render target to `colour` through a transient bind.
    pub fn clear(&self, view: &RenderTargetView, colour: Colour) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        view.used_by_device();
        let result = (|| {
            view.bind_to_device(self)?;
            view.signal_changed();
            view.device_data()
                .map(|handle| self.driver.clear_render_target(handle.as_ref(), colour));
            Ok(())
        })();
        view.unused_by_device();
        result
    }

    /// Clears a depth-stencil target through a transient bind.
    pub fn clear_depth_stencil(
        &self,
        view: &DepthStencilTargetView,
        options: ClearOptions,
        depth: f32,
        stencil: u32,
    ) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        view.used_by_device();
        let result = (|| {
            view.bind_to_device(self)?;
            view.signal_changed();
            view.device_data().map(|handle| {
                self.driver
                    .clear_depth_stencil(handle.as_ref(), options, depth, stencil)
            });
            Ok(())
        })();
        view.unused_by_device();
        result
    }

    fn bound_input_geometry(&self) -> Result<Arc<Geometry>, GraphicsError> {
        self.bindings
            .lock()
            .input_geometry
            .clone()
            .ok_or_else(|| GraphicsError::incompatible("no input geometry is bound"))
    }

    /// Draws whatever the geometry-output stage produced.
    pub fn draw_auto(&self) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        self.driver.draw_auto();
        Ok(())
    }

    /// Draws `count` vertices starting at `offset`.
    pub fn draw(&self, offset: u64, count: u64) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        let geometry = self.bound_input_geometry()?;
        if !geometry.is_in_range(offset, count) {
            return Err(GraphicsError::DrawOutOfRange { offset, count });
        }
        self.driver.draw(offset, count);
        self.performance
            .lock()
            .render_data(geometry.topology(), count);
        Ok(())
    }

    /// Draws `count` indices starting at `offset`, rebased by
    /// `base_index`.
    pub fn draw_indexed(
        &self,
        offset: u64,
        count: u64,
        base_index: i64,
    ) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        let geometry = self.bound_input_geometry()?;
        if !geometry.is_in_range_indexed(offset, count, base_index) {
            return Err(GraphicsError::DrawOutOfRange { offset, count });
        }
        self.driver.draw_indexed(offset, count, base_index);
        self.performance
            .lock()
            .render_data(geometry.topology(), count);
        Ok(())
    }

    /// Draws `instance_count` instances of the vertex range.
    pub fn draw_instanced(
        &self,
        offset: u64,
        count: u64,
        instance_offset: u32,
        instance_count: u32,
    ) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        let geometry = self.bound_input_geometry()?;
        if !geometry.is_in_range_instanced(offset, count, instance_offset, instance_count) {
            return Err(GraphicsError::DrawOutOfRange { offset, count });
        }
        self.driver
            .draw_instanced(offset, count, instance_offset, instance_count);
        self.performance
            .lock()
            .render_data(geometry.topology(), count * instance_count as u64);
        Ok(())
    }

    /// Draws `instance_count` instances of the index range.
    pub fn draw_indexed_instanced(
        &self,
        offset: u64,
        count: u64,
        base_index: i64,
        instance_offset: u32,
        instance_count: u32,
    ) -> Result<(), GraphicsError> {
        self.assert_locked()?;
        let geometry = self.bound_input_geometry()?;
        if !geometry.is_in_range_instanced(offset, count, instance_offset, instance_count) {
            return Err(GraphicsError::DrawOutOfRange { offset, count });
        }
        self.driver
            .draw_indexed_instanced(offset, count, base_index, instance_offset, instance_count);
        self.performance
            .lock()
            .render_data(geometry.topology(), count * instance_count as u64);
        Ok(())
    }

    /// Tears the device down: unregisters the driver listener, disposes
    /// the default targets and fires the one-time disposing callbacks.
    ///
    /// Idempotent; refused while the device is locked mid-frame.
    pub fn dispose(&self) -> Result<(), GraphicsError> {
        self.assert_not_locked()?;
        let first = {
            let mut bindings = self.bindings.lock();
            if bindings.disposed {
                false
            } else {
                bindings.disposed = true;
                true
            }
        };
        if first {
            self.driver.unregister_listener();
            let (render_target, depth_stencil) = {
                let mut bindings = self.bindings.lock();
                (
                    bindings.default_render_target.take(),
                    bindings.default_depth_stencil.take(),
                )
            };
            if let Some(target) = render_target {
                target.dispose();
            }
            if let Some(target) = depth_stencil {
                target.dispose();
            }
            let callbacks = std::mem::take(&mut *self.disposing_callbacks.lock());
            for callback in callbacks {
                callback(self);
            }
            logwise::info_sync!("GraphicsDevice disposed");
        }
        Ok(())
    }

    fn raise_lost(&self) {
        logwise::warn_sync!("graphics device lost");
        let callbacks = self.lost_callbacks.lock();
        for callback in callbacks.iter() {
            callback(self);
        }
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bindings = self.bindings.lock();
        f.debug_struct("GraphicsDevice")
            .field("name", &self.driver.name())
            .field("lock_count", &bindings.lock_count)
            .field("disposed", &bindings.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::headless::HeadlessDevice;

    fn device() -> Arc<GraphicsDevice> {
        GraphicsDevice::new(
            Arc::new(HeadlessDevice::new()),
            Arc::new(InternPool::new()),
        )
        .unwrap()
    }

    #[test]
    fn mutating_calls_require_the_lock() {
        let device = device();
        assert!(matches!(
            device.set_blend_state(None, Colour::BLACK, 0),
            Err(GraphicsError::NotLocked)
        ));
        assert!(matches!(device.draw(0, 3), Err(GraphicsError::NotLocked)));
        assert!(matches!(device.exit(), Err(GraphicsError::NotLocked)));
    }

    #[test]
    fn enter_is_reentrant() {
        let device = device();
        device.enter().unwrap();
        device.enter().unwrap();
        assert!(device.is_locked());
        device.exit().unwrap();
        assert!(device.is_locked());
        device.exit().unwrap();
        assert!(!device.is_locked());
    }

    #[test]
    fn lock_guard_exits_on_drop() {
        let device = device();
        {
            let _lock = device.lock().unwrap();
            assert!(device.is_locked());
        }
        assert!(!device.is_locked());
    }

    #[test]
    fn dispose_refused_mid_frame() {
        let device = device();
        device.enter().unwrap();
        assert!(matches!(device.dispose(), Err(GraphicsError::Locked)));
        device.exit().unwrap();
        device.dispose().unwrap();
        assert!(device.is_disposed());
        // Idempotent.
        device.dispose().unwrap();
    }

    #[test]
    fn non_interned_state_rejected() {
        let device = device();
        let _lock = device.lock().unwrap();
        let state = Arc::new(BlendState::new());
        assert!(matches!(
            device.set_blend_state(Some(state), Colour::BLACK, 0),
            Err(GraphicsError::NotInterned)
        ));
    }

    #[test]
    fn viewport_count_capped() {
        let device = device();
        let _lock = device.lock().unwrap();
        let region = Region2i::new(0, 0, 1, 1);
        assert!(device.set_viewports(&[region; 8]).is_ok());
        assert!(device.set_viewports(&[region; 9]).is_err());
    }

    #[test]
    fn disposing_callback_fires_once() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let device = device();
        let fired = Arc::new(AtomicU32::new(0));
        let fired2 = fired.clone();
        device.on_disposing(move |_| {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        device.dispose().unwrap();
        device.dispose().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
