//! Lane assignment.
//!
//! `place()` scans lanes top to bottom and takes the first one with no
//! collidable occupant. When every lane is blocked the item goes into
//! overlap mode in the lane with the fewest colliders (lowest lane on ties),
//! faded and pushed behind by the number of colliders:
//!
//! | colliders | opacity                          | z_index |
//! |-----------|----------------------------------|---------|
//! | 0         | `base_opacity`                   | 0       |
//! | n > 0     | `max(min_opacity, base - step*n)`| -n      |
//!
//! An item at least as tall as the surface (including any item on a
//! zero-height surface) always lands in lane 0 at full opacity.

use tracing::{debug, trace};

use danmaku_types::ItemId;

use crate::kinematics::{Direction, Motion, SurfaceBox, collides, rows_overlap};
use crate::occupancy::{LaneOccupancy, VisualItem};

/// Layout contract violations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("invalid duration {0}ms: must be positive and finite")]
    InvalidDuration(f64),
}

/// Fixed layout parameters for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    pub direction: Direction,
    pub base_opacity: f64,
    /// Opacity removed per colliding sibling in overlap mode.
    pub opacity_step: f64,
    /// Overlap mode never fades below this.
    pub min_opacity: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self { direction: Direction::RightToLeft, base_opacity: 1.0, opacity_step: 0.15, min_opacity: 0.3 }
    }
}

impl LayoutConfig {
    pub fn overlap_opacity(&self, colliders: usize) -> f64 {
        if colliders == 0 {
            return self.base_opacity;
        }
        (self.base_opacity - self.opacity_step * colliders as f64).max(self.min_opacity)
    }
}

/// An item waiting to be placed. Size is fixed from here on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementRequest {
    pub id: ItemId,
    pub width: f64,
    pub height: f64,
    pub duration_ms: f64,
}

/// Result of one placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneAssignment {
    pub lane: usize,
    pub top: f64,
    pub speed: f64,
    pub opacity: f64,
    pub z_index: i32,
    pub overlapping: bool,
    /// Occupants that collide with the item in its lane.
    pub colliders: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Assign a lane to `request` and record it in `occupancy`.
    ///
    /// The caller removes the entry when the item finishes or is deleted.
    #[tracing::instrument(
        name = "layout.place",
        skip(self, occupancy, request),
        fields(item = %request.id, occupants = occupancy.len())
    )]
    pub fn place(
        &self,
        request: &PlacementRequest,
        occupancy: &mut LaneOccupancy,
        surface: SurfaceBox,
        now_ms: i64,
    ) -> Result<LaneAssignment, LayoutError> {
        let duration_ms = request.duration_ms;
        if !(duration_ms.is_finite() && duration_ms > 0.0) {
            return Err(LayoutError::InvalidDuration(duration_ms));
        }

        let speed = surface.width / duration_ms;
        let height = request.height;
        let motion = Motion { width: request.width, speed, created_at_ms: now_ms };

        let assignment = if !(height > 0.0 && height < surface.height) {
            trace!(height, surface_height = surface.height, "item fills the surface, lane 0");
            self.standard(0, speed)
        } else if occupancy.is_empty() {
            self.standard(0, speed)
        } else {
            let max_lanes = (surface.height / height).floor() as usize;
            self.scan(max_lanes, height, &motion, occupancy, surface, now_ms)
        };

        occupancy.insert(VisualItem {
            id: request.id,
            width: request.width,
            height,
            duration_ms,
            speed,
            lane: assignment.lane,
            top: assignment.top,
            created_at_ms: now_ms,
            overlapping: assignment.overlapping,
            opacity: assignment.opacity,
            z_index: assignment.z_index,
        });
        Ok(assignment)
    }

    /// Number of occupants that collide with an item of `height` and
    /// `motion` placed at `lane_top`.
    pub fn colliders_at(
        &self,
        lane_top: f64,
        height: f64,
        motion: &Motion,
        occupancy: &LaneOccupancy,
        surface: SurfaceBox,
        now_ms: i64,
    ) -> usize {
        occupancy
            .iter()
            .filter(|other| rows_overlap(lane_top, height, other.top, other.height))
            .filter(|other| collides(&other.motion(), motion, now_ms, surface.width))
            .count()
    }

    fn scan(
        &self,
        max_lanes: usize,
        height: f64,
        motion: &Motion,
        occupancy: &LaneOccupancy,
        surface: SurfaceBox,
        now_ms: i64,
    ) -> LaneAssignment {
        let mut fewest: Option<(usize, usize)> = None;

        for lane in 0..max_lanes {
            let top = lane as f64 * height;
            let colliders = self.colliders_at(top, height, motion, occupancy, surface, now_ms);
            if colliders == 0 {
                return self.standard(lane, motion.speed).with_top(top);
            }
            if fewest.is_none_or(|(_, best)| colliders < best) {
                fewest = Some((lane, colliders));
            }
        }

        let (lane, colliders) = fewest.unwrap_or((0, 0));
        debug!(lane, colliders, max_lanes, "no free lane, overlapping");
        LaneAssignment {
            lane,
            top: lane as f64 * height,
            speed: motion.speed,
            opacity: self.config.overlap_opacity(colliders),
            z_index: -(colliders.min(i32::MAX as usize) as i32),
            overlapping: colliders > 0,
            colliders,
        }
    }

    fn standard(&self, lane: usize, speed: f64) -> LaneAssignment {
        LaneAssignment {
            lane,
            top: 0.0,
            speed,
            opacity: self.config.base_opacity,
            z_index: 0,
            overlapping: false,
            colliders: 0,
        }
    }
}

impl LaneAssignment {
    fn with_top(mut self, top: f64) -> Self {
        self.top = top;
        self
    }
}
