// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Interning: canonicalization, immutability after interning, and the
//! collect pass interacting with bound devices.

use std::sync::Arc;

use stages_and_states::GraphicsDevice;
use stages_and_states::common::Colour;
use stages_and_states::driver::headless::HeadlessDevice;
use stages_and_states::states::{
    BlendOperand, BlendOperation, BlendState, InternPool, RasterizationState, SamplerState,
};

fn alpha_blend() -> BlendState {
    BlendState::with_blend(
        BlendOperand::SrcAlpha,
        BlendOperand::SrcAlphaInverse,
        BlendOperation::Add,
    )
}

#[test]
fn intern_is_idempotent() {
    let pool = InternPool::new();
    let state = pool.intern_blend(Arc::new(alpha_blend()));
    assert!(state.is_interned());
    let again = pool.intern_blend(state.clone());
    assert!(Arc::ptr_eq(&state, &again));
}

#[test]
fn structurally_equal_states_share_one_instance() {
    let pool = InternPool::new();
    let a = pool.intern_blend(Arc::new(alpha_blend()));
    let b = pool.intern_blend(Arc::new(alpha_blend()));
    assert!(Arc::ptr_eq(&a, &b));

    // A different descriptor stays distinct.
    let c = pool.intern_blend(Arc::new(BlendState::new()));
    assert!(!Arc::ptr_eq(&a, &c));
}

#[test]
fn interned_states_reject_mutation() {
    let pool = InternPool::new();
    let state = pool.intern_blend(Arc::new(alpha_blend()));
    assert!(state.set_sample_mask(0xFF).is_err());

    let sampler = pool.intern_sampler(Arc::new(SamplerState::new()));
    assert!(sampler.set_max_anisotropy(16).is_err());

    let raster = pool.intern_rasterization(Arc::new(RasterizationState::new()));
    assert!(raster.set_depth_bias(0.5).is_err());
}

#[test]
fn interning_is_global_across_devices() {
    // Two devices sharing one pool canonicalize to the same instances;
    // state objects are the only resources designed for cross-device
    // sharing.
    let pool = Arc::new(InternPool::new());
    let device_a =
        GraphicsDevice::new(Arc::new(HeadlessDevice::new()), pool.clone()).unwrap();
    let device_b =
        GraphicsDevice::new(Arc::new(HeadlessDevice::new()), pool.clone()).unwrap();

    let state = pool.intern_blend(Arc::new(alpha_blend()));

    device_a.enter().unwrap();
    device_a
        .set_blend_state(Some(state.clone()), Colour::BLACK, 0)
        .unwrap();
    device_a.exit().unwrap();

    device_b.enter().unwrap();
    device_b
        .set_blend_state(Some(state.clone()), Colour::BLACK, 0)
        .unwrap();
    assert!(Arc::ptr_eq(&device_b.blend_state().unwrap(), &state));
    device_b.exit().unwrap();
}

#[test]
fn collect_spares_bound_states() {
    let pool = Arc::new(InternPool::new());
    let device = GraphicsDevice::new(Arc::new(HeadlessDevice::new()), pool.clone()).unwrap();

    let bound = pool.intern_blend(Arc::new(alpha_blend()));

    device.enter().unwrap();
    device
        .set_blend_state(Some(bound.clone()), Colour::BLACK, 0)
        .unwrap();
    assert!(bound.has_device_data());

    // Collect from another thread, as a memory-pressure pass would run:
    // the bound state's monitor is held by the device, so its device data
    // survives.
    let pool2 = pool.clone();
    std::thread::spawn(move || pool2.collect()).join().unwrap();
    assert!(bound.has_device_data());
    device.exit().unwrap();

    // Unbound now; the next collect evicts its device data.
    device.enter().unwrap();
    device.set_blend_state(None, Colour::BLACK, 0).unwrap();
    device.exit().unwrap();
    let pool2 = pool.clone();
    std::thread::spawn(move || pool2.collect()).join().unwrap();
    assert!(!bound.has_device_data());
}

#[test]
fn collected_state_is_lazily_recreated_on_bind() {
    let pool = Arc::new(InternPool::new());
    let device = GraphicsDevice::new(Arc::new(HeadlessDevice::new()), pool.clone()).unwrap();
    let state = pool.intern_blend(Arc::new(alpha_blend()));

    let pool2 = pool.clone();
    std::thread::spawn(move || pool2.collect()).join().unwrap();
    assert!(!state.has_device_data());

    device.enter().unwrap();
    device
        .set_blend_state(Some(state.clone()), Colour::BLACK, 0)
        .unwrap();
    assert!(state.has_device_data());
    device.exit().unwrap();
}
