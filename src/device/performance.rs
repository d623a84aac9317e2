// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Frame timing and primitive throughput tracking.

use std::time::{Duration, Instant};

use crate::common::Topology;

/// Dynamic performance counters for one device.
///
/// A frame spans one outermost `enter`/`exit` pair. Primitive counts are
/// derived from the draw range and the bound topology; strips with two or
/// fewer vertices contribute nothing.
#[derive(Debug, Clone)]
pub struct DevicePerformance {
    frame_count: u64,
    full_span: Duration,
    total_triangles: u64,
    total_points: u64,
    total_lines: u64,
    total_draw_calls: u64,

    frame_started: Option<Instant>,
    last_frame_span: Duration,
    last_triangles: u64,
    last_points: u64,
    last_lines: u64,
    last_draw_calls: u32,

    max_triangles: u64,
    min_triangles: u64,
    max_points: u64,
    min_points: u64,
    max_lines: u64,
    min_lines: u64,
    max_draw_calls: u32,
    min_draw_calls: u32,
    max_frame_span: Duration,
    min_frame_span: Duration,
}

impl Default for DevicePerformance {
    fn default() -> Self {
        DevicePerformance {
            frame_count: 0,
            full_span: Duration::ZERO,
            total_triangles: 0,
            total_points: 0,
            total_lines: 0,
            total_draw_calls: 0,
            frame_started: None,
            last_frame_span: Duration::ZERO,
            last_triangles: 0,
            last_points: 0,
            last_lines: 0,
            last_draw_calls: 0,
            max_triangles: 0,
            min_triangles: u64::MAX,
            max_points: 0,
            min_points: u64::MAX,
            max_lines: 0,
            min_lines: u64::MAX,
            max_draw_calls: 0,
            min_draw_calls: u32::MAX,
            max_frame_span: Duration::ZERO,
            min_frame_span: Duration::MAX,
        }
    }
}

impl DevicePerformance {
    pub fn new() -> Self {
        Self::default()
    }

    // Totals.

    pub fn total_triangles_rendered(&self) -> u64 {
        self.total_triangles
    }

    pub fn total_points_rendered(&self) -> u64 {
        self.total_points
    }

    pub fn total_lines_rendered(&self) -> u64 {
        self.total_lines
    }

    pub fn total_draw_calls(&self) -> u64 {
        self.total_draw_calls
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn total_rendering_time(&self) -> Duration {
        self.full_span
    }

    // Per-frame extremes.

    pub fn max_triangles_per_frame(&self) -> u64 {
        self.max_triangles
    }

    pub fn min_triangles_per_frame(&self) -> u64 {
        self.min_triangles
    }

    pub fn max_points_per_frame(&self) -> u64 {
        self.max_points
    }

    pub fn min_points_per_frame(&self) -> u64 {
        self.min_points
    }

    pub fn max_lines_per_frame(&self) -> u64 {
        self.max_lines
    }

    pub fn min_lines_per_frame(&self) -> u64 {
        self.min_lines
    }

    pub fn max_draw_calls_per_frame(&self) -> u32 {
        self.max_draw_calls
    }

    pub fn min_draw_calls_per_frame(&self) -> u32 {
        self.min_draw_calls
    }

    pub fn maximum_frame_time(&self) -> Duration {
        self.max_frame_span
    }

    pub fn minimum_frame_time(&self) -> Duration {
        self.min_frame_span
    }

    pub fn average_frame_time(&self) -> Duration {
        if self.frame_count == 0 {
            return Duration::ZERO;
        }
        self.full_span / self.frame_count as u32
    }

    /// FPS of the most recently completed frame.
    pub fn current_fps(&self) -> f32 {
        1.0 / self.last_frame_span.as_secs_f32()
    }

    pub fn average_fps(&self) -> f32 {
        self.frame_count as f32 / self.full_span.as_secs_f32()
    }

    /// Resets every counter and extreme.
    pub fn reset(&mut self) {
        *self = DevicePerformance {
            frame_started: self.frame_started,
            ..Self::default()
        };
    }

    // Frame lifecycle, driven by the device's outermost enter/exit.

    pub(crate) fn begin_frame(&mut self) {
        self.frame_started = Some(Instant::now());
        self.last_triangles = 0;
        self.last_points = 0;
        self.last_lines = 0;
        self.last_draw_calls = 0;
    }

    pub(crate) fn end_frame(&mut self) {
        self.last_frame_span = self
            .frame_started
            .take()
            .map(|started| started.elapsed())
            .unwrap_or(Duration::ZERO);

        self.frame_count += 1;
        self.full_span += self.last_frame_span;
        self.total_draw_calls += self.last_draw_calls as u64;
        self.total_triangles += self.last_triangles;
        self.total_points += self.last_points;
        self.total_lines += self.last_lines;

        self.min_frame_span = self.min_frame_span.min(self.last_frame_span);
        self.max_frame_span = self.max_frame_span.max(self.last_frame_span);
        self.max_draw_calls = self.max_draw_calls.max(self.last_draw_calls);
        self.min_draw_calls = self.min_draw_calls.min(self.last_draw_calls);
        self.max_points = self.max_points.max(self.last_points);
        self.min_points = self.min_points.min(self.last_points);
        self.max_lines = self.max_lines.max(self.last_lines);
        self.min_lines = self.min_lines.min(self.last_lines);
        self.max_triangles = self.max_triangles.max(self.last_triangles);
        self.min_triangles = self.min_triangles.min(self.last_triangles);

        self.last_draw_calls = 0;
        self.last_points = 0;
        self.last_lines = 0;
        self.last_triangles = 0;
    }

    /// Accounts one draw of `count` vertices under `topology`.
    pub(crate) fn render_data(&mut self, topology: Topology, count: u64) {
        // Zero draws are invalid and not counted.
        if count == 0 {
            return;
        }
        self.last_draw_calls += 1;
        match topology {
            Topology::Point => self.last_points += count,
            Topology::Line => self.last_lines += count / 2,
            Topology::LineStrip => self.last_lines += count - 1,
            Topology::Triangle => self.last_triangles += count / 3,
            Topology::TriangleStrip => {
                if count > 2 {
                    self.last_triangles += count - 2;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_frame(calls: &[(Topology, u64)]) -> DevicePerformance {
        let mut perf = DevicePerformance::new();
        perf.begin_frame();
        for &(topology, count) in calls {
            perf.render_data(topology, count);
        }
        perf.end_frame();
        perf
    }

    #[test]
    fn triangle_list_floors() {
        let perf = one_frame(&[(Topology::Triangle, 10)]);
        assert_eq!(perf.total_triangles_rendered(), 3);
    }

    #[test]
    fn triangle_strip_counts_n_minus_two() {
        let perf = one_frame(&[(Topology::TriangleStrip, 10)]);
        assert_eq!(perf.total_triangles_rendered(), 8);
    }

    #[test]
    fn degenerate_strip_counts_nothing() {
        let perf = one_frame(&[(Topology::TriangleStrip, 2)]);
        assert_eq!(perf.total_triangles_rendered(), 0);
        // The call itself still happened.
        assert_eq!(perf.total_draw_calls(), 1);
    }

    #[test]
    fn zero_count_draw_ignored() {
        let perf = one_frame(&[(Topology::Point, 0)]);
        assert_eq!(perf.total_draw_calls(), 0);
    }

    #[test]
    fn lines_and_points_accumulate_separately() {
        let perf = one_frame(&[
            (Topology::Point, 5),
            (Topology::Line, 6),
            (Topology::LineStrip, 4),
        ]);
        assert_eq!(perf.total_points_rendered(), 5);
        assert_eq!(perf.total_lines_rendered(), 3 + 3);
        assert_eq!(perf.total_draw_calls(), 3);
    }

    #[test]
    fn per_frame_extremes() {
        let mut perf = DevicePerformance::new();
        perf.begin_frame();
        perf.render_data(Topology::Triangle, 30);
        perf.end_frame();
        perf.begin_frame();
        perf.render_data(Topology::Triangle, 3);
        perf.end_frame();
        assert_eq!(perf.max_triangles_per_frame(), 10);
        assert_eq!(perf.min_triangles_per_frame(), 1);
        assert_eq!(perf.frame_count(), 2);
    }

    #[test]
    fn reset_clears_totals() {
        let mut perf = one_frame(&[(Topology::Point, 7)]);
        perf.reset();
        assert_eq!(perf.total_points_rendered(), 0);
        assert_eq!(perf.frame_count(), 0);
    }
}
