pub mod debounce;
pub mod drag;
pub mod grid;
pub mod pad;
pub mod recorder;

pub use drag::{GridGeometry, InputCapabilities, Point};
pub use grid::{Cell, GridError, StatButton, StatGrid};
pub use pad::{DropOutcome, StatPad};
pub use recorder::{PressOutcome, RecordError, StatRecorder, StatSink};
