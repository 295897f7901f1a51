//! Stage tile grid: script coordinates <-> screen pixels
//!
//! Built once per stage from the layout supplied by the config store.
//! The only mutation after that is the camera shift.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::types::{GridPoint, Point, Rect};

/// What may be placed on a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Buildable {
    #[default]
    None,
    Melee,
    Ranged,
    Any,
}

impl Buildable {
    pub fn is_placeable(&self) -> bool {
        !matches!(self, Buildable::None)
    }
}

/// One tile of a stage layout
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileInfo {
    pub loc: GridPoint,
    /// Tile center on screen with the camera at rest
    pub pos: Point,
    #[serde(default)]
    pub buildable: Buildable,
}

/// Geometry of one stage as delivered by the config store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLayout {
    pub stage: String,
    /// Tile edge length on screen (pixels)
    pub tile_size: i32,
    pub tiles: Vec<TileInfo>,
}

/// All known layouts keyed by stage identifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutStore {
    pub layouts: BTreeMap<String, StageLayout>,
}

impl LayoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, layout: StageLayout) {
        self.layouts.insert(layout.stage.clone(), layout);
    }

    pub fn get(&self, stage: &str) -> Option<&StageLayout> {
        self.layouts.get(stage)
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.layouts.contains_key(stage)
    }
}

/// Loaded grid for the active stage
#[derive(Debug, Clone)]
pub struct TileGrid {
    stage: String,
    tile_size: i32,
    tiles: AHashMap<GridPoint, TileInfo>,
    shift: (i32, i32),
}

impl TileGrid {
    pub fn build(layout: &StageLayout) -> Self {
        let tiles = layout.tiles.iter().map(|t| (t.loc, *t)).collect();
        Self {
            stage: layout.stage.clone(),
            tile_size: layout.tile_size.max(1),
            tiles,
            shift: (0, 0),
        }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn tile_size(&self) -> i32 {
        self.tile_size
    }

    pub fn tile(&self, loc: GridPoint) -> Option<&TileInfo> {
        self.tiles.get(&loc)
    }

    /// Current on-screen center of a tile (camera shift applied)
    pub fn pixel_of(&self, loc: GridPoint) -> Option<Point> {
        self.tiles
            .get(&loc)
            .map(|t| t.pos.offset(self.shift.0, self.shift.1))
    }

    /// Current on-screen rectangle of a tile
    pub fn tile_rect(&self, loc: GridPoint) -> Option<Rect> {
        self.pixel_of(loc)
            .map(|center| Rect::around(center, self.tile_size))
    }

    pub fn is_placeable(&self, loc: GridPoint) -> bool {
        self.tiles
            .get(&loc)
            .is_some_and(|t| t.buildable.is_placeable())
    }

    /// Move every tile by a camera pan of `(dx, dy)` pixels
    pub fn shift_by(&mut self, dx: i32, dy: i32) {
        self.shift.0 += dx;
        self.shift.1 += dy;
    }

    pub fn shift(&self) -> (i32, i32) {
        self.shift
    }
}
