//! Lane occupancy — the live set of placed items used for collision queries.
//!
//! Every item on the surface has exactly one entry here. The layout engine
//! inserts on placement; the surface removes when travel completes or the
//! item is deleted out of band. Iteration order is placement order.

use danmaku_types::ItemId;
use indexmap::IndexMap;

use crate::kinematics::{Direction, Motion};

/// A placed item and its layout state.
#[derive(Clone, Debug, PartialEq)]
pub struct VisualItem {
    pub id: ItemId,
    pub width: f64,
    pub height: f64,
    pub duration_ms: f64,
    /// px per ms: surface width / duration.
    pub speed: f64,
    pub lane: usize,
    /// Pixel top of the lane the item was placed in.
    pub top: f64,
    pub created_at_ms: i64,
    pub overlapping: bool,
    pub opacity: f64,
    pub z_index: i32,
}

impl VisualItem {
    pub fn motion(&self) -> Motion {
        Motion { width: self.width, speed: self.speed, created_at_ms: self.created_at_ms }
    }

    /// Screen x of the item's left edge at `now_ms`.
    pub fn x_at(&self, now_ms: i64, surface_width: f64, direction: Direction) -> f64 {
        direction.screen_x(surface_width, self.width, self.motion().progress(now_ms))
    }

    pub fn is_finished(&self, now_ms: i64, surface_width: f64) -> bool {
        self.motion().is_finished(now_ms, surface_width)
    }
}

#[derive(Clone, Debug, Default)]
pub struct LaneOccupancy {
    items: IndexMap<ItemId, VisualItem>,
}

impl LaneOccupancy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: VisualItem) {
        self.items.insert(item.id, item);
    }

    /// Remove an item, keeping the placement order of the rest.
    pub fn remove(&mut self, id: ItemId) -> Option<VisualItem> {
        self.items.shift_remove(&id)
    }

    pub fn get(&self, id: ItemId) -> Option<&VisualItem> {
        self.items.get(&id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VisualItem> {
        self.items.values()
    }

    /// Items whose travel has completed at `now_ms`, oldest first.
    pub fn finished(&self, now_ms: i64, surface_width: f64) -> Vec<ItemId> {
        self.items
            .values()
            .filter(|item| item.is_finished(now_ms, surface_width))
            .map(|item| item.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u64, created_at_ms: i64) -> VisualItem {
        VisualItem {
            id: ItemId(id),
            width: 100.0,
            height: 20.0,
            duration_ms: 1000.0,
            speed: 1.0,
            lane: 0,
            top: 0.0,
            created_at_ms,
            overlapping: false,
            opacity: 1.0,
            z_index: 0,
        }
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut occupancy = LaneOccupancy::new();
        for id in 1..=3 {
            occupancy.insert(item(id, 0));
        }
        assert!(occupancy.remove(ItemId(2)).is_some());
        assert!(occupancy.remove(ItemId(2)).is_none());
        let ids: Vec<_> = occupancy.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![ItemId(1), ItemId(3)]);
    }

    #[test]
    fn test_finished() {
        let mut occupancy = LaneOccupancy::new();
        occupancy.insert(item(1, 0));
        occupancy.insert(item(2, 500));
        // Travel takes (1000 + 100) / 1.0 = 1100ms.
        assert_eq!(occupancy.finished(1100, 1000.0), vec![ItemId(1)]);
        assert_eq!(occupancy.finished(1600, 1000.0), vec![ItemId(1), ItemId(2)]);
    }

    #[test]
    fn test_x_at() {
        let placed = item(1, 0);
        assert_eq!(placed.x_at(250, 1000.0, Direction::RightToLeft), 750.0);
        assert_eq!(placed.x_at(250, 1000.0, Direction::LeftToRight), 150.0);
    }
}
