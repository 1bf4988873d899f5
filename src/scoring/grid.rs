use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Side length of the stat pad.
pub const GRID_SIZE: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: u8,
    pub y: u8,
}

impl Cell {
    pub const fn new(x: u8, y: u8) -> Self {
        Cell { x, y }
    }

    pub fn in_bounds(&self) -> bool {
        self.x < GRID_SIZE && self.y < GRID_SIZE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatButton {
    pub id: String,
    pub label: String,
    /// Stat type sent to the backend, e.g. "two_point_made"
    pub stat_type: String,
    /// Points added to the team's score when pressed (0 for non-scoring stats)
    pub point_value: u32,
    pub cell: Cell,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("unknown stat button `{0}`")]
    UnknownButton(String),
    #[error("cell ({}, {}) is outside the {n}x{n} grid", .0.x, .0.y, n = GRID_SIZE)]
    OutOfBounds(Cell),
    #[error("cell ({}, {}) is already taken by `{occupant}`", .cell.x, .cell.y)]
    Occupied { cell: Cell, occupant: String },
    #[error("duplicate stat button id `{0}`")]
    DuplicateButton(String),
}

/// Fixed 4x4 pad of stat buttons. Each cell holds at most one button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatGrid {
    buttons: Vec<StatButton>,
}

impl StatGrid {
    /// Build a grid, rejecting overlapping or out-of-bounds buttons.
    pub fn new(buttons: Vec<StatButton>) -> Result<Self, GridError> {
        let mut ids = HashSet::new();
        let mut taken: Vec<(Cell, &str)> = Vec::new();
        for b in &buttons {
            if !b.cell.in_bounds() {
                return Err(GridError::OutOfBounds(b.cell));
            }
            if !ids.insert(b.id.as_str()) {
                return Err(GridError::DuplicateButton(b.id.clone()));
            }
            if let Some((_, occupant)) = taken.iter().find(|(c, _)| *c == b.cell) {
                return Err(GridError::Occupied {
                    cell: b.cell,
                    occupant: occupant.to_string(),
                });
            }
            taken.push((b.cell, b.id.as_str()));
        }
        Ok(StatGrid { buttons })
    }

    /// Basketball pad; three cells are left free so buttons can be moved.
    pub fn default_basketball() -> Self {
        const LAYOUT: &[(&str, &str, &str, u32)] = &[
            ("2pt_made", "2PT Made", "two_point_made", 2),
            ("2pt_miss", "2PT Miss", "two_point_miss", 0),
            ("3pt_made", "3PT Made", "three_point_made", 3),
            ("3pt_miss", "3PT Miss", "three_point_miss", 0),
            ("ft_made", "FT Made", "free_throw_made", 1),
            ("ft_miss", "FT Miss", "free_throw_miss", 0),
            ("oreb", "Off Rebound", "offensive_rebound", 0),
            ("dreb", "Def Rebound", "defensive_rebound", 0),
            ("assist", "Assist", "assist", 0),
            ("steal", "Steal", "steal", 0),
            ("block", "Block", "block", 0),
            ("turnover", "Turnover", "turnover", 0),
            ("foul", "Foul", "foul", 0),
        ];
        let buttons = LAYOUT
            .iter()
            .enumerate()
            .map(|(i, (id, label, stat_type, points))| StatButton {
                id: id.to_string(),
                label: label.to_string(),
                stat_type: stat_type.to_string(),
                point_value: *points,
                cell: Cell::new(i as u8 % GRID_SIZE, i as u8 / GRID_SIZE),
            })
            .collect();
        StatGrid { buttons }
    }

    pub fn buttons(&self) -> &[StatButton] {
        &self.buttons
    }

    pub fn button(&self, id: &str) -> Option<&StatButton> {
        self.buttons.iter().find(|b| b.id == id)
    }

    pub fn button_at(&self, cell: Cell) -> Option<&StatButton> {
        self.buttons.iter().find(|b| b.cell == cell)
    }

    /// Row-major view of the pad, `None` for empty cells.
    pub fn rows(&self) -> Vec<Vec<Option<&StatButton>>> {
        (0..GRID_SIZE)
            .map(|y| (0..GRID_SIZE).map(|x| self.button_at(Cell::new(x, y))).collect())
            .collect()
    }

    /// Move a button into an empty cell and return the cell it left.
    ///
    /// Swapping is not supported: an occupied target is rejected and the
    /// button stays where it was. Dropping onto its own cell is a no-op.
    pub fn move_button(&mut self, id: &str, to: Cell) -> Result<Cell, GridError> {
        if !to.in_bounds() {
            return Err(GridError::OutOfBounds(to));
        }
        let from = self
            .button(id)
            .map(|b| b.cell)
            .ok_or_else(|| GridError::UnknownButton(id.to_string()))?;
        if from == to {
            return Ok(from);
        }
        if let Some(occupant) = self.button_at(to) {
            return Err(GridError::Occupied {
                cell: to,
                occupant: occupant.id.clone(),
            });
        }
        if let Some(b) = self.buttons.iter_mut().find(|b| b.id == id) {
            b.cell = to;
        }
        Ok(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_no_overlap(grid: &StatGrid) {
        let cells: HashSet<Cell> = grid.buttons().iter().map(|b| b.cell).collect();
        assert_eq!(cells.len(), grid.buttons().len());
        assert!(cells.iter().all(Cell::in_bounds));
    }

    #[test]
    fn test_default_layout_is_valid() {
        let grid = StatGrid::default_basketball();
        assert_no_overlap(&grid);
        assert_eq!(StatGrid::new(grid.buttons().to_vec()).unwrap(), grid);
        assert_eq!(grid.button_at(Cell::new(0, 0)).unwrap().label, "2PT Made");
        assert_eq!(grid.button("foul").unwrap().cell, Cell::new(0, 3));
        assert!(grid.button_at(Cell::new(3, 3)).is_none());
    }

    #[test]
    fn test_move_into_empty_cell() {
        let mut grid = StatGrid::default_basketball();
        let from = grid.move_button("foul", Cell::new(3, 3)).unwrap();
        assert_eq!(from, Cell::new(0, 3));
        assert_eq!(grid.button_at(Cell::new(3, 3)).unwrap().id, "foul");
        assert!(grid.button_at(Cell::new(0, 3)).is_none());
        assert_no_overlap(&grid);
    }

    #[test]
    fn test_drop_on_occupied_cell_keeps_prior_position() {
        let mut grid = StatGrid::default_basketball();
        let before = grid.clone();
        let err = grid.move_button("foul", Cell::new(0, 0)).unwrap_err();
        assert_eq!(
            err,
            GridError::Occupied {
                cell: Cell::new(0, 0),
                occupant: "2pt_made".into()
            }
        );
        assert_eq!(grid, before);
    }

    #[test]
    fn test_every_drop_preserves_occupancy() {
        let mut grid = StatGrid::default_basketball();
        let ids: Vec<String> = grid.buttons().iter().map(|b| b.id.clone()).collect();
        for (i, id) in ids.iter().enumerate() {
            for y in 0..GRID_SIZE {
                for x in 0..GRID_SIZE {
                    let target = Cell::new((x + i as u8) % GRID_SIZE, y);
                    let prior = grid.button(id).unwrap().cell;
                    match grid.move_button(id, target) {
                        Ok(_) => assert_eq!(grid.button(id).unwrap().cell, target),
                        Err(_) => assert_eq!(grid.button(id).unwrap().cell, prior),
                    }
                    assert_no_overlap(&grid);
                }
            }
        }
    }

    #[test]
    fn test_drop_on_own_cell_and_bad_targets() {
        let mut grid = StatGrid::default_basketball();
        assert_eq!(grid.move_button("steal", Cell::new(1, 2)).unwrap(), Cell::new(1, 2));
        assert_eq!(
            grid.move_button("steal", Cell::new(4, 0)),
            Err(GridError::OutOfBounds(Cell::new(4, 0)))
        );
        assert_eq!(
            grid.move_button("dunk", Cell::new(3, 3)),
            Err(GridError::UnknownButton("dunk".into()))
        );
    }

    #[test]
    fn test_new_rejects_overlap() {
        let mut buttons = StatGrid::default_basketball().buttons().to_vec();
        buttons[1].cell = buttons[0].cell;
        assert!(matches!(
            StatGrid::new(buttons),
            Err(GridError::Occupied { .. })
        ));
    }

    #[test]
    fn test_rows_shape() {
        let grid = StatGrid::default_basketball();
        let rows = grid.rows();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.len() == 4));
        assert_eq!(rows.iter().flatten().filter(|c| c.is_some()).count(), 13);
    }
}
