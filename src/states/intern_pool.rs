// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Global canonicalization of state objects.
//!
//! The pool is an explicit object rather than hidden static state: share
//! one `Arc<InternPool>` between every device that should deduplicate
//! against the same tables, and hand tests their own private pool.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::blend::BlendState;
use super::depth_stencil::DepthStencilState;
use super::rasterization::RasterizationState;
use super::sampler::SamplerState;

/// Deduplicating registry for the four state kinds.
///
/// Two structurally-equal-but-distinct state objects never both live as
/// "interned": the second intern call discards its candidate and returns
/// the canonical shared instance.
#[derive(Default)]
pub struct InternPool {
    blend: Mutex<FxHashMap<u64, Vec<Arc<BlendState>>>>,
    rasterization: Mutex<FxHashMap<u64, Vec<Arc<RasterizationState>>>>,
    depth_stencil: Mutex<FxHashMap<u64, Vec<Arc<DepthStencilState>>>>,
    sampler: Mutex<FxHashMap<u64, Vec<Arc<SamplerState>>>>,
}

macro_rules! intern_impl {
    ($fn_name:ident, $collect_name:ident, $table:ident, $ty:ty) => {
        /// Interns the state, returning the canonical shared instance.
        ///
        /// Idempotent: an already-interned state is returned unchanged.
        pub fn $fn_name(&self, state: Arc<$ty>) -> Arc<$ty> {
            if state.is_interned() {
                return state;
            }
            let mut table = self.$table.lock();
            let bucket = table.entry(state.structural_hash()).or_default();
            if let Some(existing) = bucket.iter().find(|s| s.structural_eq(&state)) {
                return existing.clone();
            }
            state.mark_interned();
            bucket.push(state.clone());
            state
        }

        fn $collect_name(&self) {
            let table = self.$table.lock();
            for state in table.values().flatten() {
                // Only unbound states; a bound state's monitor is held by
                // its device.
                if state.monitor().try_enter() {
                    state.evict_device_data();
                    state.monitor().exit();
                }
            }
        }
    };
}

impl InternPool {
    pub fn new() -> Self {
        Self::default()
    }

    intern_impl!(intern_blend, collect_blend, blend, BlendState);
    intern_impl!(
        intern_rasterization,
        collect_rasterization,
        rasterization,
        RasterizationState
    );
    intern_impl!(
        intern_depth_stencil,
        collect_depth_stencil,
        depth_stencil,
        DepthStencilState
    );
    intern_impl!(intern_sampler, collect_sampler, sampler, SamplerState);

    /// Opportunistic device-data eviction pass.
    ///
    /// States stay interned; only their device parts are dropped, to be
    /// recreated by the device on the next bind. States whose monitor is
    /// currently held (i.e. bound to some device) are skipped without
    /// blocking. Memory-pressure relief, not a correctness requirement.
    pub fn collect(&self) {
        logwise::trace_sync!("InternPool::collect");
        self.collect_blend();
        self.collect_rasterization();
        self.collect_depth_stencil();
        self.collect_sampler();
    }
}

impl std::fmt::Debug for InternPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternPool")
            .field("blend", &self.blend.lock().len())
            .field("rasterization", &self.rasterization.lock().len())
            .field("depth_stencil", &self.depth_stencil.lock().len())
            .field("sampler", &self.sampler.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::blend::{BlendOperand, BlendOperation};

    #[test]
    fn intern_is_idempotent() {
        let pool = InternPool::new();
        let state = pool.intern_blend(Arc::new(BlendState::new()));
        let again = pool.intern_blend(state.clone());
        assert!(Arc::ptr_eq(&state, &again));
    }

    #[test]
    fn equal_states_canonicalize() {
        let pool = InternPool::new();
        let a = Arc::new(BlendState::with_blend(
            BlendOperand::SrcAlpha,
            BlendOperand::SrcAlphaInverse,
            BlendOperation::Add,
        ));
        let b = Arc::new(BlendState::with_blend(
            BlendOperand::SrcAlpha,
            BlendOperand::SrcAlphaInverse,
            BlendOperation::Add,
        ));
        let ia = pool.intern_blend(a);
        let ib = pool.intern_blend(b);
        assert!(Arc::ptr_eq(&ia, &ib));
    }

    #[test]
    fn distinct_states_stay_distinct() {
        let pool = InternPool::new();
        let a = pool.intern_blend(Arc::new(BlendState::new()));
        let b = pool.intern_blend(Arc::new(BlendState::with_blend(
            BlendOperand::One,
            BlendOperand::One,
            BlendOperation::Add,
        )));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn collect_does_not_block_on_bound_states() {
        let pool = Arc::new(InternPool::new());
        let held = pool.intern_blend(Arc::new(BlendState::new()));
        let held2 = held.clone();
        // Hold the state's monitor from another thread, as a device would
        // while the state is bound.
        let (tx, rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            held2.monitor().enter();
            tx.send(()).unwrap();
            done_rx.recv().unwrap();
            held2.monitor().exit();
        });
        rx.recv().unwrap();
        // Must return without blocking on the held state.
        pool.collect();
        done_tx.send(()).unwrap();
        holder.join().unwrap();
    }
}
