//! Headless surface: the items currently on screen.
//!
//! The surface owns the [`LaneOccupancy`] so that every removal path (travel
//! finished, delete, delete-by-author, eviction, retraction) drops the
//! occupancy entry together with the item. Placement goes through
//! [`Surface::place`], which evicts for the visible-item cap before asking
//! the engine for a lane.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::{debug, trace};

use danmaku_layout::{
    Direction, LaneAssignment, LaneOccupancy, LayoutEngine, LayoutError, PlacementRequest, SurfaceBox,
};
use danmaku_types::ItemId;

use crate::formatter::ItemRequest;

/// An item on the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceItem {
    pub id: ItemId,
    pub chat_id: String,
    pub author_channel_id: Option<String>,
    pub text: String,
    pub width: f64,
    pub height: f64,
    pub created_at_ms: i64,
    pub assignment: LaneAssignment,
}

/// Where an item is drawn at some instant.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedItem {
    pub id: ItemId,
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub opacity: f64,
    pub z_index: i32,
}

#[derive(Debug)]
pub struct Surface {
    size: SurfaceBox,
    direction: Direction,
    /// 0 = unlimited.
    max_visible: usize,
    items: IndexMap<ItemId, SurfaceItem>,
    by_chat_id: HashMap<String, ItemId>,
    occupancy: LaneOccupancy,
}

impl Surface {
    pub fn new(size: SurfaceBox, direction: Direction, max_visible: usize) -> Self {
        Self {
            size,
            direction,
            max_visible,
            items: IndexMap::new(),
            by_chat_id: HashMap::new(),
            occupancy: LaneOccupancy::new(),
        }
    }

    pub fn size(&self) -> SurfaceBox {
        self.size
    }

    pub fn occupancy(&self) -> &LaneOccupancy {
        &self.occupancy
    }

    /// Evict for the cap, place, and insert.
    pub fn place(
        &mut self,
        engine: &LayoutEngine,
        id: ItemId,
        request: ItemRequest,
        duration_ms: f64,
        now_ms: i64,
    ) -> Result<&SurfaceItem, LayoutError> {
        let placement = PlacementRequest { id, width: request.width, height: request.height, duration_ms };
        if !(duration_ms.is_finite() && duration_ms > 0.0) {
            return Err(LayoutError::InvalidDuration(duration_ms));
        }

        // Same chat id delivered twice (live retries): the old copy goes first
        // so its lane is free for the new one.
        if let Some(previous) = self.by_chat_id.get(&request.chat_id).copied() {
            self.remove(previous);
        }

        if self.max_visible > 0 {
            while self.items.len() >= self.max_visible {
                let Some(oldest) = self.items.first().map(|(id, _)| *id) else { break };
                debug!(item = %oldest, cap = self.max_visible, "evicting oldest item");
                self.remove(oldest);
            }
        }

        let assignment = engine.place(&placement, &mut self.occupancy, self.size, now_ms)?;
        self.by_chat_id.insert(request.chat_id.clone(), id);
        let item = SurfaceItem {
            id,
            chat_id: request.chat_id,
            author_channel_id: request.author_channel_id,
            text: request.text,
            width: request.width,
            height: request.height,
            created_at_ms: now_ms,
            assignment,
        };
        trace!(item = %id, lane = assignment.lane, overlapping = assignment.overlapping, "placed");
        Ok(&*self.items.entry(id).or_insert(item))
    }

    /// Remove items whose travel has completed.
    pub fn tick(&mut self, now_ms: i64) -> Vec<ItemId> {
        let finished = self.occupancy.finished(now_ms, self.size.width);
        for id in &finished {
            self.remove(*id);
        }
        finished
    }

    /// Remove the item showing chat entry `chat_id`.
    pub fn delete(&mut self, chat_id: &str) -> Option<ItemId> {
        let id = *self.by_chat_id.get(chat_id)?;
        self.remove(id);
        Some(id)
    }

    /// Remove every item from `channel_id`.
    pub fn delete_by_author(&mut self, channel_id: &str) -> Vec<ItemId> {
        let ids: Vec<ItemId> = self
            .items
            .values()
            .filter(|item| item.author_channel_id.as_deref() == Some(channel_id))
            .map(|item| item.id)
            .collect();
        for id in &ids {
            self.remove(*id);
        }
        ids
    }

    /// Swap the content of the item showing `target_chat_id`. Lane, position
    /// and timing stay as placed.
    pub fn replace(&mut self, target_chat_id: &str, request: ItemRequest) -> Option<ItemId> {
        let id = self.by_chat_id.remove(target_chat_id)?;
        let item = self.items.get_mut(&id)?;
        item.chat_id = request.chat_id.clone();
        item.author_channel_id = request.author_channel_id;
        item.text = request.text;
        self.by_chat_id.insert(request.chat_id, id);
        Some(id)
    }

    /// Remove everything (seek, close).
    pub fn retract_all(&mut self) -> usize {
        let count = self.items.len();
        self.items.clear();
        self.by_chat_id.clear();
        self.occupancy.clear();
        count
    }

    pub fn get(&self, id: ItemId) -> Option<&SurfaceItem> {
        self.items.get(&id)
    }

    pub fn find(&self, chat_id: &str) -> Option<&SurfaceItem> {
        self.by_chat_id.get(chat_id).and_then(|id| self.items.get(id))
    }

    pub fn items(&self) -> impl Iterator<Item = &SurfaceItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Positions of every item at `now_ms`, back to front.
    pub fn render(&self, now_ms: i64) -> Vec<RenderedItem> {
        let mut rendered: Vec<RenderedItem> = self
            .items
            .values()
            .filter_map(|item| {
                let placed = self.occupancy.get(item.id)?;
                Some(RenderedItem {
                    id: item.id,
                    text: item.text.clone(),
                    x: placed.x_at(now_ms, self.size.width, self.direction),
                    y: item.assignment.top,
                    opacity: item.assignment.opacity,
                    z_index: item.assignment.z_index,
                })
            })
            .collect();
        rendered.sort_by_key(|r| r.z_index);
        rendered
    }

    fn remove(&mut self, id: ItemId) {
        if let Some(item) = self.items.shift_remove(&id) {
            if self.by_chat_id.get(&item.chat_id) == Some(&id) {
                self.by_chat_id.remove(&item.chat_id);
            }
        }
        self.occupancy.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use danmaku_layout::LayoutConfig;

    const SIZE: SurfaceBox = SurfaceBox { width: 1000.0, height: 90.0 };

    fn request(chat_id: &str, author: &str) -> ItemRequest {
        ItemRequest {
            chat_id: chat_id.into(),
            author_channel_id: Some(author.into()),
            author: None,
            text: chat_id.to_uppercase(),
            width: 100.0,
            height: 30.0,
        }
    }

    fn place(surface: &mut Surface, id: u64, chat_id: &str, author: &str, now_ms: i64) -> LaneAssignment {
        let engine = LayoutEngine::new(LayoutConfig::default());
        surface.place(&engine, ItemId(id), request(chat_id, author), 4000.0, now_ms).unwrap().assignment
    }

    fn assert_in_sync(surface: &Surface) {
        assert_eq!(surface.len(), surface.occupancy().len());
        for item in surface.items() {
            assert!(surface.occupancy().contains(item.id));
        }
    }

    #[test]
    fn test_tick_removes_finished_items() {
        let mut surface = Surface::new(SIZE, Direction::RightToLeft, 0);
        place(&mut surface, 1, "a", "u1", 0);
        place(&mut surface, 2, "b", "u1", 2000);

        // (1000 + 100) / 0.25 = 4400ms of travel.
        assert!(surface.tick(4399).is_empty());
        assert_eq!(surface.tick(4400), vec![ItemId(1)]);
        assert!(surface.find("a").is_none());
        assert_in_sync(&surface);
    }

    #[test]
    fn test_delete_and_delete_by_author() {
        let mut surface = Surface::new(SIZE, Direction::RightToLeft, 0);
        place(&mut surface, 1, "a", "u1", 0);
        place(&mut surface, 2, "b", "u2", 0);
        place(&mut surface, 3, "c", "u1", 0);

        assert_eq!(surface.delete("b"), Some(ItemId(2)));
        assert_eq!(surface.delete("b"), None);
        assert_eq!(surface.delete_by_author("u1"), vec![ItemId(1), ItemId(3)]);
        assert!(surface.is_empty());
        assert_in_sync(&surface);
    }

    #[test]
    fn test_replace_keeps_geometry() {
        let mut surface = Surface::new(SIZE, Direction::RightToLeft, 0);
        place(&mut surface, 1, "a", "u1", 0);
        let before = surface.find("a").unwrap().clone();

        let mut replacement = request("a2", "u1");
        replacement.width = 400.0;
        replacement.text = "edited".into();
        assert_eq!(surface.replace("a", replacement), Some(ItemId(1)));

        let after = surface.find("a2").unwrap();
        assert_eq!(after.text, "edited");
        assert_eq!(after.assignment, before.assignment);
        assert_eq!(after.width, before.width);
        assert!(surface.find("a").is_none());
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let mut surface = Surface::new(SIZE, Direction::RightToLeft, 2);
        place(&mut surface, 1, "a", "u", 0);
        place(&mut surface, 2, "b", "u", 0);
        let third = place(&mut surface, 3, "c", "u", 0);

        let ids: Vec<_> = surface.items().map(|i| i.id).collect();
        assert_eq!(ids, vec![ItemId(2), ItemId(3)]);
        // Lane 0 was freed by the eviction.
        assert_eq!(third.lane, 0);
        assert_in_sync(&surface);
    }

    #[test]
    fn test_duplicate_chat_id_reuses_freed_lane() {
        let mut surface = Surface::new(SIZE, Direction::RightToLeft, 0);
        assert_eq!(place(&mut surface, 1, "a", "u", 0).lane, 0);
        let again = place(&mut surface, 2, "a", "u", 0);

        assert_eq!(again.lane, 0);
        assert!(!again.overlapping);
        assert_eq!(surface.len(), 1);
        assert_eq!(surface.find("a").map(|i| i.id), Some(ItemId(2)));
        assert!(surface.get(ItemId(1)).is_none());
        assert_in_sync(&surface);
    }

    #[test]
    fn test_retract_all() {
        let mut surface = Surface::new(SIZE, Direction::RightToLeft, 0);
        place(&mut surface, 1, "a", "u", 0);
        place(&mut surface, 2, "b", "u", 0);
        assert_eq!(surface.retract_all(), 2);
        assert!(surface.occupancy().is_empty());
        assert!(surface.find("a").is_none());
    }

    #[test]
    fn test_render_positions() {
        let mut surface = Surface::new(SIZE, Direction::RightToLeft, 0);
        place(&mut surface, 1, "a", "u", 0);
        let rendered = surface.render(1000);
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].x, 750.0);
        assert_eq!(rendered[0].y, 0.0);
    }

    #[test]
    fn test_invalid_duration_leaves_surface_untouched() {
        let mut surface = Surface::new(SIZE, Direction::RightToLeft, 1);
        place(&mut surface, 1, "a", "u", 0);
        let engine = LayoutEngine::default();
        let err = surface.place(&engine, ItemId(2), request("b", "u"), 0.0, 0).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidDuration(_)));
        assert_eq!(surface.len(), 1);
    }
}
