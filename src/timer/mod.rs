pub mod clock;
pub mod commands;
pub mod controller;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{TimerSnapshot, TimerStore};
pub use state::{format_elapsed, Timer, TimerColor, TimerStatus, DEFAULT_TIMER_NAME};
