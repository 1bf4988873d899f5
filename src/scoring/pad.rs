use tokio::time::Instant;
use tracing::debug;

use super::drag::{
    select_input, DragInput, DragLayer, DragPreview, DragUpdate, GridGeometry, InputCapabilities,
    InputKind, Point,
};
use super::grid::{Cell, GridError, StatGrid};

/// Result of releasing a drag.
#[derive(Debug, PartialEq, Eq)]
pub enum DropOutcome {
    /// Gesture never became a drag (tap or scroll).
    NoDrag,
    /// Released outside the pad; nothing moved.
    OutsideGrid,
    Moved { button_id: String, from: Cell, to: Cell },
    Rejected(GridError),
}

/// The stat pad: grid, the input backend for this client and the floating
/// drag layer.
pub struct StatPad {
    grid: StatGrid,
    geometry: GridGeometry,
    input: Box<dyn DragInput>,
    layer: DragLayer,
    pressed: Option<String>,
}

impl StatPad {
    pub fn new(grid: StatGrid, geometry: GridGeometry, caps: InputCapabilities) -> Self {
        StatPad {
            grid,
            geometry,
            input: select_input(caps),
            layer: DragLayer::default(),
            pressed: None,
        }
    }

    pub fn grid(&self) -> &StatGrid {
        &self.grid
    }

    pub fn layer(&self) -> &DragLayer {
        &self.layer
    }

    pub fn input_kind(&self) -> InputKind {
        self.input.kind()
    }

    /// Re-pick the input backend for a newly attached client. Any gesture in
    /// flight is dropped.
    pub fn set_capabilities(&mut self, caps: InputCapabilities, geometry: GridGeometry) {
        self.input = select_input(caps);
        self.geometry = geometry;
        self.pressed = None;
        self.layer.clear();
    }

    pub fn move_button(&mut self, id: &str, to: Cell) -> Result<Cell, GridError> {
        self.grid.move_button(id, to)
    }

    /// Start a gesture on whatever button is under `at`. Returns its id.
    pub fn pointer_down(&mut self, at: Point, now: Instant) -> Option<String> {
        let cell = self.geometry.cell_at(at)?;
        let id = self.grid.button_at(cell)?.id.clone();
        self.input.start_drag(&id, at, now);
        self.pressed = Some(id.clone());
        Some(id)
    }

    pub fn pointer_move(&mut self, at: Point, now: Instant) -> DragUpdate {
        let update = self.input.update_drag(at, now);
        match update {
            DragUpdate::Dragging(pos) => {
                if let Some(id) = self.pressed.clone() {
                    self.show_preview(&id, pos);
                }
            }
            DragUpdate::Inactive => {
                self.pressed = None;
                self.layer.clear();
            }
            DragUpdate::Pending => {}
        }
        update
    }

    pub fn pointer_up(&mut self, at: Point, now: Instant) -> DropOutcome {
        self.pressed = None;
        self.layer.clear();
        let Some(intent) = self.input.end_drag(at, now) else {
            return DropOutcome::NoDrag;
        };
        let Some(to) = self.geometry.cell_at(intent.at) else {
            return DropOutcome::OutsideGrid;
        };
        match self.grid.move_button(&intent.button_id, to) {
            Ok(from) => {
                debug!("Moved stat button {} from {:?} to {:?}", intent.button_id, from, to);
                DropOutcome::Moved {
                    button_id: intent.button_id,
                    from,
                    to,
                }
            }
            Err(e) => DropOutcome::Rejected(e),
        }
    }

    fn show_preview(&mut self, id: &str, at: Point) {
        let Some(button) = self.grid.button(id) else {
            return;
        };
        self.layer.show(DragPreview {
            button_id: button.id.clone(),
            label: button.label.clone(),
            position: at,
            hover: self.geometry.cell_at(at),
        });
    }
}
