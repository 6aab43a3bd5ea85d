//! Lane layout for traveling chat items.
//!
//! Given a new item and the items already on the surface, the engine picks a
//! lane where the newcomer never horizontally overlaps anything it shares
//! rows with, or falls back to a faded overlapping placement.
//!
//! ```text
//!  lane 0 │ ◀── [item 1] ─────── ◀─── [item 4, overlapping, z=-1]
//!  lane 1 │         ◀── [item 2]
//!  lane 2 │               ◀── [item 3]
//! ```
//!
//! All state lives in [`LaneOccupancy`], owned by the caller. The engine is
//! stateless apart from its [`LayoutConfig`].

pub mod engine;
pub mod kinematics;
pub mod occupancy;

pub use engine::{LaneAssignment, LayoutConfig, LayoutEngine, LayoutError, PlacementRequest};
pub use kinematics::{Direction, Motion, SurfaceBox, collides, rows_overlap};
pub use occupancy::{LaneOccupancy, VisualItem};
