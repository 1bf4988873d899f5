//! Drag gestures for rearranging the stat pad.
//!
//! The input backend is picked once from declared device capabilities:
//! touch-first devices get [`TouchDrag`], which waits for a short press before
//! a drag starts so that swiping still scrolls; everything else gets
//! [`PointerDrag`].

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use super::grid::{Cell, GRID_SIZE};

/// Hold time before a touch turns into a drag.
pub const TOUCH_PRESS_DELAY: Duration = Duration::from_millis(200);
/// Finger travel (px) tolerated during the press delay before it counts as a scroll.
pub const TOUCH_SLOP: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Point { x, y }
    }

    fn distance(&self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Where the pad sits on screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub origin: Point,
    pub cell_size: f32,
}

impl Default for GridGeometry {
    fn default() -> Self {
        GridGeometry {
            origin: Point::new(0.0, 0.0),
            cell_size: 96.0,
        }
    }
}

impl GridGeometry {
    pub fn cell_at(&self, p: Point) -> Option<Cell> {
        let dx = (p.x - self.origin.x) / self.cell_size;
        let dy = (p.y - self.origin.y) / self.cell_size;
        if dx < 0.0 || dy < 0.0 || !dx.is_finite() || !dy.is_finite() {
            return None;
        }
        let (x, y) = (dx.floor(), dy.floor());
        if x >= f32::from(GRID_SIZE) || y >= f32::from(GRID_SIZE) {
            return None;
        }
        Some(Cell::new(x as u8, y as u8))
    }
}

/// What the client reports about its input hardware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputCapabilities {
    /// Pointer Events are available.
    pub pointer_events: bool,
    /// The primary input is a finger (coarse pointer, no hover).
    pub primary_touch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Pointer,
    Touch,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragUpdate {
    /// Touch is held but has not become a drag yet.
    Pending,
    Dragging(Point),
    /// No drag in progress (never started, or abandoned as a scroll).
    Inactive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropIntent {
    pub button_id: String,
    pub at: Point,
}

pub trait DragInput: Send + Sync {
    fn kind(&self) -> InputKind;
    fn start_drag(&mut self, button_id: &str, at: Point, now: Instant);
    fn update_drag(&mut self, at: Point, now: Instant) -> DragUpdate;
    /// Finish the gesture. `None` when it never became a drag.
    fn end_drag(&mut self, at: Point, now: Instant) -> Option<DropIntent>;
}

pub fn select_input(caps: InputCapabilities) -> Box<dyn DragInput> {
    if caps.primary_touch || !caps.pointer_events {
        Box::new(TouchDrag::new(TOUCH_PRESS_DELAY))
    } else {
        Box::new(PointerDrag::default())
    }
}

#[derive(Debug, Default)]
pub struct PointerDrag {
    active: Option<String>,
}

impl DragInput for PointerDrag {
    fn kind(&self) -> InputKind {
        InputKind::Pointer
    }

    fn start_drag(&mut self, button_id: &str, _at: Point, _now: Instant) {
        self.active = Some(button_id.to_string());
    }

    fn update_drag(&mut self, at: Point, _now: Instant) -> DragUpdate {
        match self.active {
            Some(_) => DragUpdate::Dragging(at),
            None => DragUpdate::Inactive,
        }
    }

    fn end_drag(&mut self, at: Point, _now: Instant) -> Option<DropIntent> {
        self.active.take().map(|button_id| DropIntent { button_id, at })
    }
}

#[derive(Debug)]
struct TouchPress {
    button_id: String,
    origin: Point,
    pressed_at: Instant,
    dragging: bool,
}

#[derive(Debug)]
pub struct TouchDrag {
    press_delay: Duration,
    press: Option<TouchPress>,
}

impl TouchDrag {
    pub fn new(press_delay: Duration) -> Self {
        TouchDrag {
            press_delay,
            press: None,
        }
    }
}

impl DragInput for TouchDrag {
    fn kind(&self) -> InputKind {
        InputKind::Touch
    }

    fn start_drag(&mut self, button_id: &str, at: Point, now: Instant) {
        self.press = Some(TouchPress {
            button_id: button_id.to_string(),
            origin: at,
            pressed_at: now,
            dragging: false,
        });
    }

    fn update_drag(&mut self, at: Point, now: Instant) -> DragUpdate {
        let Some(press) = self.press.as_mut() else {
            return DragUpdate::Inactive;
        };
        if press.dragging {
            return DragUpdate::Dragging(at);
        }
        if now.saturating_duration_since(press.pressed_at) >= self.press_delay {
            press.dragging = true;
            return DragUpdate::Dragging(at);
        }
        if press.origin.distance(at) > TOUCH_SLOP {
            // Moved before the hold completed: this is a scroll.
            self.press = None;
            return DragUpdate::Inactive;
        }
        DragUpdate::Pending
    }

    fn end_drag(&mut self, at: Point, now: Instant) -> Option<DropIntent> {
        let press = self.press.take()?;
        let held = now.saturating_duration_since(press.pressed_at) >= self.press_delay;
        (press.dragging || held).then(|| DropIntent {
            button_id: press.button_id,
            at,
        })
    }
}

/// Floating preview drawn under the finger/cursor while a drag is active.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DragPreview {
    pub button_id: String,
    pub label: String,
    pub position: Point,
    pub hover: Option<Cell>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DragLayer {
    preview: Option<DragPreview>,
}

impl DragLayer {
    pub fn preview(&self) -> Option<&DragPreview> {
        self.preview.as_ref()
    }

    pub fn show(&mut self, preview: DragPreview) {
        self.preview = Some(preview);
    }

    pub fn clear(&mut self) {
        self.preview = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_backend_selected_from_capabilities() {
        let desktop = InputCapabilities {
            pointer_events: true,
            primary_touch: false,
        };
        let tablet = InputCapabilities {
            pointer_events: true,
            primary_touch: true,
        };
        assert_eq!(select_input(desktop).kind(), InputKind::Pointer);
        assert_eq!(select_input(tablet).kind(), InputKind::Touch);
        assert_eq!(select_input(InputCapabilities::default()).kind(), InputKind::Touch);
    }

    #[test]
    fn test_geometry_maps_points_to_cells() {
        let g = GridGeometry {
            origin: Point::new(10.0, 20.0),
            cell_size: 50.0,
        };
        assert_eq!(g.cell_at(Point::new(10.0, 20.0)), Some(Cell::new(0, 0)));
        assert_eq!(g.cell_at(Point::new(209.0, 219.0)), Some(Cell::new(3, 3)));
        assert_eq!(g.cell_at(Point::new(210.0, 20.0)), None);
        assert_eq!(g.cell_at(Point::new(5.0, 30.0)), None);
    }

    #[test]
    fn test_pointer_drag_starts_immediately() {
        let mut p = PointerDrag::default();
        let t0 = Instant::now();
        assert_eq!(p.update_drag(Point::new(1.0, 1.0), t0), DragUpdate::Inactive);
        p.start_drag("foul", Point::new(0.0, 0.0), t0);
        assert_eq!(
            p.update_drag(Point::new(30.0, 0.0), t0),
            DragUpdate::Dragging(Point::new(30.0, 0.0))
        );
        let intent = p.end_drag(Point::new(40.0, 0.0), t0).unwrap();
        assert_eq!(intent.button_id, "foul");
        assert!(p.end_drag(Point::new(40.0, 0.0), t0).is_none());
    }

    #[test]
    fn test_touch_swipe_before_delay_is_a_scroll() {
        let mut t = TouchDrag::new(TOUCH_PRESS_DELAY);
        let t0 = Instant::now();
        t.start_drag("foul", Point::new(0.0, 0.0), t0);
        assert_eq!(t.update_drag(Point::new(3.0, 0.0), t0 + ms(50)), DragUpdate::Pending);
        assert_eq!(t.update_drag(Point::new(0.0, 40.0), t0 + ms(80)), DragUpdate::Inactive);
        assert!(t.end_drag(Point::new(0.0, 80.0), t0 + ms(300)).is_none());
    }

    #[test]
    fn test_touch_hold_then_drag() {
        let mut t = TouchDrag::new(TOUCH_PRESS_DELAY);
        let t0 = Instant::now();
        t.start_drag("steal", Point::new(0.0, 0.0), t0);
        assert_eq!(
            t.update_drag(Point::new(60.0, 0.0), t0 + ms(250)),
            DragUpdate::Dragging(Point::new(60.0, 0.0))
        );
        let intent = t.end_drag(Point::new(90.0, 0.0), t0 + ms(400)).unwrap();
        assert_eq!(intent.button_id, "steal");
        assert_eq!(intent.at, Point::new(90.0, 0.0));
    }

    #[test]
    fn test_touch_quick_tap_is_not_a_drag() {
        let mut t = TouchDrag::new(TOUCH_PRESS_DELAY);
        let t0 = Instant::now();
        t.start_drag("steal", Point::new(0.0, 0.0), t0);
        assert!(t.end_drag(Point::new(0.0, 0.0), t0 + ms(80)).is_none());
    }
}
