//! Travel kinematics and the collidability test.
//!
//! Positions are measured in *travel coordinates*: `p` is how far an item's
//! leading edge has moved past the entry edge of the surface. An item of
//! width `w` is fully visible once `p >= w` and gone once `p >= W + w`.
//! Travel direction only changes how `p` maps to a screen x, so the
//! collision math below is the same for both directions.
//!
//! ```text
//!  RightToLeft:  x = W - p          LeftToRight:  x = p - w
//!
//!  entry edge                       exit edge
//!  │◀── p ──────────┤
//!  │   [ leader ]   gap   [follower]│
//! ```

/// Surface size in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceBox {
    pub width: f64,
    pub height: f64,
}

impl SurfaceBox {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Screen travel direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::EnumString, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    /// Items enter on the right and leave on the left.
    #[default]
    RightToLeft,
    /// Reversed: items enter on the left.
    LeftToRight,
}

impl Direction {
    pub fn from_reversed(reversed: bool) -> Self {
        if reversed { Direction::LeftToRight } else { Direction::RightToLeft }
    }

    /// Screen x of the item's left edge for travel position `p`.
    pub fn screen_x(self, surface_width: f64, item_width: f64, p: f64) -> f64 {
        match self {
            Direction::RightToLeft => surface_width - p,
            Direction::LeftToRight => p - item_width,
        }
    }
}

/// Horizontal motion of one item.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Motion {
    pub width: f64,
    /// px per ms.
    pub speed: f64,
    pub created_at_ms: i64,
}

impl Motion {
    /// Distance travelled at `now_ms`. Clamped at zero before creation.
    pub fn progress(&self, now_ms: i64) -> f64 {
        (self.speed * (now_ms - self.created_at_ms) as f64).max(0.0)
    }

    /// Time until the trailing edge leaves a surface of `surface_width`.
    pub fn remaining_ms(&self, now_ms: i64, surface_width: f64) -> f64 {
        (surface_width + self.width - self.progress(now_ms)) / self.speed
    }

    pub fn is_finished(&self, now_ms: i64, surface_width: f64) -> bool {
        self.remaining_ms(now_ms, surface_width) <= 0.0
    }
}

/// Would `follower`, entering at `now_ms`, ever overlap `leader` horizontally?
///
/// They collide if the leader's tail has not yet cleared the entry edge, or
/// if the follower is faster and closes the gap before the leader exits or
/// the follower reaches the far edge, whichever is first.
pub fn collides(leader: &Motion, follower: &Motion, now_ms: i64, surface_width: f64) -> bool {
    let remaining = leader.remaining_ms(now_ms, surface_width);
    if remaining <= 0.0 {
        return false;
    }
    let gap = leader.progress(now_ms) - leader.width;
    if gap < 0.0 {
        return true;
    }
    let closing = follower.speed - leader.speed;
    if closing <= 0.0 {
        return false;
    }
    let follower_crossing_ms = surface_width / follower.speed;
    gap < closing * remaining.min(follower_crossing_ms)
}

/// Do `[a_top, a_top + a_height)` and `[b_top, b_top + b_height)` overlap?
pub fn rows_overlap(a_top: f64, a_height: f64, b_top: f64, b_height: f64) -> bool {
    a_top < b_top + b_height && b_top < a_top + a_height
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: f64 = 1000.0;

    fn motion(width: f64, duration_ms: f64, created_at_ms: i64) -> Motion {
        Motion { width, speed: W / duration_ms, created_at_ms }
    }

    #[test]
    fn test_progress_and_finish() {
        let m = motion(100.0, 1000.0, 0);
        assert_eq!(m.progress(500), 500.0);
        assert_eq!(m.progress(-10), 0.0);
        assert_eq!(m.remaining_ms(500, W), 600.0);
        assert!(!m.is_finished(1099, W));
        assert!(m.is_finished(1100, W));
    }

    #[test]
    fn test_tail_still_entering_collides() {
        let leader = motion(200.0, 4000.0, 0);
        let follower = motion(200.0, 4000.0, 100);
        // Leader moved 25px, its 200px tail is still on the entry edge.
        assert!(collides(&leader, &follower, 100, W));
        // 1000ms later it moved 250px: 50px gap, equal speeds.
        assert!(!collides(&leader, &follower, 1000, W));
    }

    #[test]
    fn test_faster_follower_catches_up() {
        let slow = motion(100.0, 8000.0, 0);
        let fast = motion(100.0, 2000.0, 1000);
        // Slow leader at 125px, gap 25px; the fast one closes 0.375px/ms.
        assert!(collides(&slow, &fast, 1000, W));

        // A slower follower never catches a faster leader once clear.
        let fast_leader = motion(100.0, 2000.0, 0);
        let slow_follower = motion(100.0, 8000.0, 300);
        assert!(!collides(&fast_leader, &slow_follower, 300, W));
    }

    #[test]
    fn test_catch_up_after_leader_exit_is_ignored() {
        // Leader almost gone: 5ms remaining, closing speed too small to matter.
        let leader = motion(100.0, 1000.0, 0);
        let follower = motion(100.0, 900.0, 1095);
        assert!(!collides(&leader, &follower, 1095, W));
    }

    #[test]
    fn test_finished_leader_never_collides() {
        let leader = motion(100.0, 1000.0, 0);
        let follower = motion(100.0, 100.0, 5000);
        assert!(!collides(&leader, &follower, 5000, W));
    }

    #[test]
    fn test_screen_x() {
        assert_eq!(Direction::RightToLeft.screen_x(W, 100.0, 0.0), W);
        assert_eq!(Direction::LeftToRight.screen_x(W, 100.0, 0.0), -100.0);
        assert_eq!(Direction::from_reversed(true), Direction::LeftToRight);
        assert_eq!("left_to_right".parse::<Direction>().unwrap(), Direction::LeftToRight);
    }

    #[test]
    fn test_rows_overlap() {
        assert!(rows_overlap(0.0, 30.0, 29.0, 30.0));
        assert!(!rows_overlap(0.0, 30.0, 30.0, 30.0));
        assert!(!rows_overlap(0.0, 0.0, 0.0, 30.0));
    }
}
