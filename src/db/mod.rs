use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;

use crate::scoring::{Cell, StatButton, StatGrid};

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }

    fn init(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Stat pad layouts ─────────────────────────────────────────────────────

    /// Replace the stored layout `name` with the grid's current button positions.
    pub fn save_layout(&self, name: &str, grid: &StatGrid) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM stat_layouts WHERE layout_name = ?1", params![name])?;
        let now = Utc::now();
        for b in grid.buttons() {
            tx.execute(
                "INSERT INTO stat_layouts (
                    layout_name, button_id, label, stat_type, point_value,
                    cell_x, cell_y, updated_at
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
                params![
                    name,
                    b.id,
                    b.label,
                    b.stat_type,
                    b.point_value,
                    b.cell.x,
                    b.cell.y,
                    now,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Load layout `name`; `None` if it was never saved.
    pub fn load_layout(&self, name: &str) -> Result<Option<StatGrid>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT button_id, label, stat_type, point_value, cell_x, cell_y
             FROM stat_layouts WHERE layout_name = ?1
             ORDER BY cell_y, cell_x",
        )?;
        let rows = stmt.query_map(params![name], map_button)?;
        let buttons = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        if buttons.is_empty() {
            return Ok(None);
        }
        let grid = StatGrid::new(buttons)
            .with_context(|| format!("Stored layout {} is inconsistent", name))?;
        Ok(Some(grid))
    }
}

fn map_button(row: &rusqlite::Row) -> rusqlite::Result<StatButton> {
    Ok(StatButton {
        id: row.get(0)?,
        label: row.get(1)?,
        stat_type: row.get(2)?,
        point_value: row.get(3)?,
        cell: Cell::new(row.get(4)?, row.get(5)?),
    })
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS stat_layouts (
    layout_name TEXT    NOT NULL,
    button_id   TEXT    NOT NULL,
    label       TEXT    NOT NULL,
    stat_type   TEXT    NOT NULL,
    point_value INTEGER NOT NULL DEFAULT 0,
    cell_x      INTEGER NOT NULL,
    cell_y      INTEGER NOT NULL,
    updated_at  TEXT    NOT NULL,
    PRIMARY KEY (layout_name, button_id),
    UNIQUE (layout_name, cell_x, cell_y)
);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_layout_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.load_layout("courtside").unwrap().is_none());
    }

    #[test]
    fn test_saved_layout_survives_reload() {
        let db = Database::open_in_memory().unwrap();
        let mut grid = StatGrid::default_basketball();
        grid.move_button("foul", Cell::new(3, 3)).unwrap();
        db.save_layout("courtside", &grid).unwrap();

        let loaded = db.load_layout("courtside").unwrap().unwrap();
        assert_eq!(loaded.button("foul").unwrap().cell, Cell::new(3, 3));
        assert_eq!(loaded.button("3pt_made").unwrap().point_value, 3);
        assert_eq!(loaded.buttons().len(), grid.buttons().len());
    }

    #[test]
    fn test_save_replaces_previous_layout() {
        let db = Database::open_in_memory().unwrap();
        let mut grid = StatGrid::default_basketball();
        db.save_layout("courtside", &grid).unwrap();

        // Moving into the cell another button just vacated must not trip the
        // per-cell unique constraint.
        grid.move_button("foul", Cell::new(3, 3)).unwrap();
        grid.move_button("turnover", Cell::new(0, 3)).unwrap();
        db.save_layout("courtside", &grid).unwrap();

        let loaded = db.load_layout("courtside").unwrap().unwrap();
        assert_eq!(loaded.button("turnover").unwrap().cell, Cell::new(0, 3));
        assert!(db.load_layout("bench").unwrap().is_none());
    }
}
