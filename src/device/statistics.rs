// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! State-change frequency tracking.
//!
//! Every state kind is tracked the same way; the per-kind numbers exist so
//! an application can spot a stage it is rebinding far more often than it
//! draws.

/// A state kind tracked by [`StateStatistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Blend,
    DepthStencil,
    Rasterization,
    Viewport,
    Scissor,
    VertexStage,
    GeometryStage,
    PixelStage,
}

/// Change counts for one state kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeStats {
    /// Fewest changes seen in any completed frame.
    pub min_per_frame: u32,
    /// Most changes seen in any completed frame.
    pub max_per_frame: u32,
    /// Changes across all frames, completed or not.
    pub total: u64,
    /// Average changes per completed frame, rounded down.
    pub average: u32,
}

#[derive(Debug, Clone, Copy)]
struct ChangeGroup {
    current: u32,
    min_per_frame: u32,
    max_per_frame: u32,
    total: u64,
}

impl Default for ChangeGroup {
    fn default() -> Self {
        ChangeGroup {
            current: 0,
            min_per_frame: u32::MAX,
            max_per_frame: 0,
            total: 0,
        }
    }
}

impl ChangeGroup {
    fn changed(&mut self) {
        self.current += 1;
        self.total += 1;
    }

    fn update(&mut self) {
        self.min_per_frame = self.min_per_frame.min(self.current);
        self.max_per_frame = self.max_per_frame.max(self.current);
        self.current = 0;
    }

    fn stats(&self, frames: u64) -> ChangeStats {
        ChangeStats {
            min_per_frame: if self.min_per_frame == u32::MAX {
                0
            } else {
                self.min_per_frame
            },
            max_per_frame: self.max_per_frame,
            total: self.total,
            average: (self.total / frames.max(1)) as u32,
        }
    }
}

/// Per-device state-change statistics, one group per [`StateKind`].
#[derive(Debug, Clone, Default)]
pub struct StateStatistics {
    frame_count: u64,
    blend: ChangeGroup,
    depth_stencil: ChangeGroup,
    rasterization: ChangeGroup,
    viewport: ChangeGroup,
    scissor: ChangeGroup,
    vertex: ChangeGroup,
    geometry: ChangeGroup,
    pixel: ChangeGroup,
}

impl StateStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    fn group(&self, kind: StateKind) -> &ChangeGroup {
        match kind {
            StateKind::Blend => &self.blend,
            StateKind::DepthStencil => &self.depth_stencil,
            StateKind::Rasterization => &self.rasterization,
            StateKind::Viewport => &self.viewport,
            StateKind::Scissor => &self.scissor,
            StateKind::VertexStage => &self.vertex,
            StateKind::GeometryStage => &self.geometry,
            StateKind::PixelStage => &self.pixel,
        }
    }

    fn group_mut(&mut self, kind: StateKind) -> &mut ChangeGroup {
        match kind {
            StateKind::Blend => &mut self.blend,
            StateKind::DepthStencil => &mut self.depth_stencil,
            StateKind::Rasterization => &mut self.rasterization,
            StateKind::Viewport => &mut self.viewport,
            StateKind::Scissor => &mut self.scissor,
            StateKind::VertexStage => &mut self.vertex,
            StateKind::GeometryStage => &mut self.geometry,
            StateKind::PixelStage => &mut self.pixel,
        }
    }

    /// Snapshot of one kind's counters.
    pub fn changes(&self, kind: StateKind) -> ChangeStats {
        self.group(kind).stats(self.frame_count)
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Forgets everything tracked so far.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn changed(&mut self, kind: StateKind) {
        self.group_mut(kind).changed();
    }

    pub(crate) fn begin_frame(&mut self) {}

    pub(crate) fn end_frame(&mut self) {
        self.frame_count += 1;
        self.blend.update();
        self.depth_stencil.update();
        self.rasterization.update();
        self.viewport.update();
        self.scissor.update();
        self.vertex.update();
        self.geometry.update();
        self.pixel.update();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_tracks_uniformly() {
        let kinds = [
            StateKind::Blend,
            StateKind::DepthStencil,
            StateKind::Rasterization,
            StateKind::Viewport,
            StateKind::Scissor,
            StateKind::VertexStage,
            StateKind::GeometryStage,
            StateKind::PixelStage,
        ];
        let mut stats = StateStatistics::new();
        stats.begin_frame();
        for kind in kinds {
            stats.changed(kind);
            stats.changed(kind);
        }
        stats.end_frame();
        for kind in kinds {
            let changes = stats.changes(kind);
            assert_eq!(changes.total, 2);
            assert_eq!(changes.min_per_frame, 2);
            assert_eq!(changes.max_per_frame, 2);
            assert_eq!(changes.average, 2);
        }
    }

    #[test]
    fn extremes_span_frames() {
        let mut stats = StateStatistics::new();
        stats.begin_frame();
        stats.changed(StateKind::Blend);
        stats.changed(StateKind::Blend);
        stats.changed(StateKind::Blend);
        stats.end_frame();
        stats.begin_frame();
        stats.changed(StateKind::Blend);
        stats.end_frame();

        let changes = stats.changes(StateKind::Blend);
        assert_eq!(changes.min_per_frame, 1);
        assert_eq!(changes.max_per_frame, 3);
        assert_eq!(changes.total, 4);
        assert_eq!(changes.average, 2);
    }

    #[test]
    fn untracked_kind_reads_zero() {
        let stats = StateStatistics::new();
        assert_eq!(stats.changes(StateKind::Scissor), ChangeStats::default());
    }
}
