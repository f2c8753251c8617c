//! The shared 2-D world grid.
//!
//! A [Grid] is a fixed `width × height` array of [Cell]s stored row-major.
//! Terrain is immutable once the grid is shared; only occupant sets change at
//! runtime. Every cell guards its own occupant set with its own mutex, so
//! moves through unrelated cells never contend with each other.
//!
//! Occupants are keyed by username and tagged with the owning session id.
//! Removal only succeeds when the id matches, which keeps a stale connection
//! (replaced by a newer login under the same name) from evicting its successor.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

use super::lock;

/// Largest accepted width or height. Keeps `width * height` and cell indices well inside `i32`.
pub const MAX_DIMENSION: i32 = 1024;

/// Terrain of a single cell. Only [CellType::Empty] can be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CellType {
    #[default]
    Empty,
    Mountain,
    Grass,
    Water,
}

impl CellType {
    pub fn is_passable(self) -> bool {
        matches!(self, CellType::Empty)
    }
}

/// Integer grid coordinates. `x` grows east, `y` grows south.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }

    pub fn manhattan(self, other: Position) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// True when `other` is exactly one orthogonal step away.
    pub fn is_adjacent(self, other: Position) -> bool {
        self.manhattan(other) == 1
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

#[derive(Debug, Default)]
pub struct Cell {
    kind: CellType,
    occupants: Mutex<HashMap<String, Uuid>>,
}

impl Cell {
    fn with_kind(kind: CellType) -> Self {
        Self {
            kind,
            occupants: Mutex::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> CellType {
        self.kind
    }

    /// Usernames currently standing on this cell, sorted.
    pub fn occupants(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.occupants).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, username: &str) -> bool {
        lock(&self.occupants).contains_key(username)
    }

    fn insert(&self, username: &str, session: Uuid) {
        lock(&self.occupants).insert(username.to_string(), session);
    }

    fn remove(&self, username: &str, session: Uuid) -> bool {
        let mut occupants = lock(&self.occupants);
        match occupants.get(username) {
            Some(owner) if *owner == session => {
                occupants.remove(username);
                true
            }
            _ => false,
        }
    }
}

/// One occupant as it appears in a grid snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupantView {
    pub username: String,
    pub x: i32,
    pub y: i32,
}

/// One cell as it appears in a grid snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellView {
    #[serde(rename = "type")]
    pub kind: CellType,
    pub clients: Vec<OccupantView>,
}

#[derive(Debug)]
pub struct Grid {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
}

impl Grid {
    /// An all-[CellType::Empty] grid. Dimensions are clamped to `1..=MAX_DIMENSION`.
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.clamp(1, MAX_DIMENSION);
        let height = height.clamp(1, MAX_DIMENSION);
        let cells = (0..width * height).map(|_| Cell::default()).collect();
        Self { width, height, cells }
    }

    /// Build a grid from terrain rows indexed `[y][x]`.
    ///
    /// Returns `None` for an empty layout, ragged rows, or a side over [MAX_DIMENSION].
    pub fn from_rows(rows: &[Vec<CellType>]) -> Option<Self> {
        let height = rows.len();
        let width = rows.first().map(Vec::len)?;
        let limit = MAX_DIMENSION as usize;
        if width == 0 || width > limit || height > limit || rows.iter().any(|row| row.len() != width) {
            return None;
        }
        let cells = rows
            .iter()
            .flat_map(|row| row.iter().map(|kind| Cell::with_kind(*kind)))
            .collect();
        Some(Self {
            width: i32::try_from(width).ok()?,
            height: i32::try_from(height).ok()?,
            cells,
        })
    }

    /// Terrain rows indexed `[y][x]`, the inverse of [Grid::from_rows].
    pub fn rows(&self) -> Vec<Vec<CellType>> {
        self.cells
            .chunks(self.width as usize)
            .map(|row| row.iter().map(Cell::kind).collect())
            .collect()
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    fn index(&self, pos: Position) -> Option<usize> {
        if self.in_bounds(pos) {
            Some((pos.y * self.width + pos.x) as usize)
        } else {
            None
        }
    }

    pub fn cell_at(&self, pos: Position) -> Option<&Cell> {
        self.index(pos).map(|i| &self.cells[i])
    }

    pub fn terrain_at(&self, pos: Position) -> Option<CellType> {
        self.cell_at(pos).map(Cell::kind)
    }

    /// Change the terrain of one cell. Only possible before the grid is shared.
    pub fn set_terrain(&mut self, pos: Position, kind: CellType) -> bool {
        match self.index(pos) {
            Some(i) => {
                self.cells[i].kind = kind;
                true
            }
            None => false,
        }
    }

    pub fn is_passable(&self, pos: Position) -> bool {
        self.terrain_at(pos).is_some_and(CellType::is_passable)
    }

    /// The passable cell closest to `pos` by Manhattan distance, first in row order on ties.
    pub fn nearest_passable(&self, pos: Position) -> Option<Position> {
        (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| Position::new(x, y)))
            .filter(|p| self.is_passable(*p))
            .min_by_key(|p| p.manhattan(pos))
    }

    /// Add `username` to the occupant set at `pos`. Returns false when out of bounds.
    pub fn place(&self, username: &str, session: Uuid, pos: Position) -> bool {
        match self.cell_at(pos) {
            Some(cell) => {
                cell.insert(username, session);
                true
            }
            None => false,
        }
    }

    /// Remove `username` from the cell at `pos` if `session` still owns the entry.
    pub fn remove(&self, username: &str, session: Uuid, pos: Position) -> bool {
        self.cell_at(pos)
            .is_some_and(|cell| cell.remove(username, session))
    }

    /// Move an occupant between two cells. Each cell lock is taken on its own.
    pub fn relocate(&self, username: &str, session: Uuid, from: Position, to: Position) -> bool {
        if from == to {
            return self.cell_at(to).is_some();
        }
        if !self.in_bounds(to) {
            return false;
        }
        self.remove(username, session, from);
        self.place(username, session, to)
    }

    /// All positions whose occupant set contains `username`.
    pub fn locate(&self, username: &str) -> Vec<Position> {
        let mut found = Vec::new();
        for (i, cell) in self.cells.iter().enumerate() {
            if cell.contains(username) {
                let i = i as i32;
                found.push(Position::new(i % self.width, i / self.width));
            }
        }
        found
    }

    /// Rows of cells (indexed `[y][x]`) with their current occupants.
    pub fn snapshot(&self) -> Vec<Vec<CellView>> {
        let mut rows = Vec::with_capacity(self.height as usize);
        for y in 0..self.height {
            let mut row = Vec::with_capacity(self.width as usize);
            for x in 0..self.width {
                let pos = Position::new(x, y);
                let Some(cell) = self.cell_at(pos) else { continue };
                let clients = cell
                    .occupants()
                    .into_iter()
                    .map(|username| OccupantView { username, x, y })
                    .collect();
                row.push(CellView {
                    kind: cell.kind(),
                    clients,
                });
            }
            rows.push(row);
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_dimensions_are_capped() {
        let grid = Grid::new(i32::MAX, 3);
        assert_eq!(grid.width(), MAX_DIMENSION);
        assert_eq!(grid.height(), 3);
        let wide = vec![vec![CellType::Empty; MAX_DIMENSION as usize + 1]];
        assert!(Grid::from_rows(&wide).is_none());
    }

    #[test]
    fn nearest_passable_skips_blocked_cells() {
        let mut grid = Grid::new(3, 3);
        grid.set_terrain(Position::new(1, 1), CellType::Water);
        grid.set_terrain(Position::new(1, 0), CellType::Mountain);
        assert_eq!(grid.nearest_passable(Position::new(2, 2)), Some(Position::new(2, 2)));
        // (0,1), (2,1) and (1,2) are all one step away; row order picks (0,1).
        assert_eq!(grid.nearest_passable(Position::new(1, 1)), Some(Position::new(0, 1)));
        assert_eq!(grid.nearest_passable(Position::new(1, -4)), Some(Position::new(0, 0)));

        let mut sealed = Grid::new(1, 1);
        sealed.set_terrain(Position::ORIGIN, CellType::Mountain);
        assert_eq!(sealed.nearest_passable(Position::ORIGIN), None);
    }

    #[test]
    fn default_grid_is_empty_and_passable() {
        let grid = Grid::new(25, 25);
        assert_eq!(grid.width(), 25);
        assert_eq!(grid.height(), 25);
        assert!(grid.is_passable(Position::new(0, 0)));
        assert!(grid.is_passable(Position::new(24, 24)));
        assert!(!grid.is_passable(Position::new(25, 0)));
        assert!(!grid.is_passable(Position::new(0, -1)));
    }

    #[test]
    fn relocate_moves_exactly_one_occupant_entry() {
        let grid = Grid::new(5, 5);
        let id = Uuid::new_v4();
        assert!(grid.place("alice", id, Position::new(1, 1)));
        assert!(grid.relocate("alice", id, Position::new(1, 1), Position::new(1, 2)));
        assert!(grid.cell_at(Position::new(1, 1)).unwrap().occupants().is_empty());
        assert_eq!(
            grid.cell_at(Position::new(1, 2)).unwrap().occupants(),
            vec!["alice".to_string()]
        );
        assert_eq!(grid.locate("alice"), vec![Position::new(1, 2)]);
    }

    #[test]
    fn remove_ignores_foreign_session_id() {
        let grid = Grid::new(3, 3);
        let owner = Uuid::new_v4();
        grid.place("bob", owner, Position::ORIGIN);
        assert!(!grid.remove("bob", Uuid::new_v4(), Position::ORIGIN));
        assert!(grid.cell_at(Position::ORIGIN).unwrap().contains("bob"));
        assert!(grid.remove("bob", owner, Position::ORIGIN));
    }

    #[test]
    fn rows_round_trip_terrain() {
        let mut grid = Grid::new(3, 2);
        grid.set_terrain(Position::new(2, 1), CellType::Mountain);
        grid.set_terrain(Position::new(0, 1), CellType::Water);
        let rebuilt = Grid::from_rows(&grid.rows()).unwrap();
        assert_eq!(rebuilt.width(), 3);
        assert_eq!(rebuilt.height(), 2);
        assert_eq!(rebuilt.terrain_at(Position::new(2, 1)), Some(CellType::Mountain));
        assert_eq!(rebuilt.terrain_at(Position::new(0, 1)), Some(CellType::Water));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let rows = vec![vec![CellType::Empty; 3], vec![CellType::Empty; 2]];
        assert!(Grid::from_rows(&rows).is_none());
        assert!(Grid::from_rows(&[]).is_none());
    }

    #[test]
    fn snapshot_lists_occupants_with_cell_coordinates() {
        let grid = Grid::new(2, 2);
        grid.place("carol", Uuid::new_v4(), Position::new(1, 0));
        let snap = grid.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].len(), 2);
        assert_eq!(
            snap[0][1].clients,
            vec![OccupantView { username: "carol".into(), x: 1, y: 0 }]
        );
        let json = serde_json::to_string(&snap[0][1]).unwrap();
        assert!(json.contains("\"type\":\"Empty\""));
    }
}
