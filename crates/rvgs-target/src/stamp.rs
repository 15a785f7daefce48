//! Process-wide simulated-time accessor.
//!
//! Verilator-style simulators pull the current simulation time from a free
//! function rather than an object they hold. The installed target provides
//! the time source at startup and clears it at teardown; before a target
//! exists the time is 0.0.

use std::sync::Mutex;

type TimeSource = Box<dyn Fn() -> f64 + Send>;

static SOURCE: Mutex<Option<TimeSource>> = Mutex::new(None);

/// Install the time source for the currently running target.
pub fn install(source: TimeSource) {
    *SOURCE.lock().unwrap() = Some(source);
}

/// Remove the installed time source.
pub fn clear() {
    *SOURCE.lock().unwrap() = None;
}

/// Simulated time in nanoseconds, or 0.0 when no target is installed.
pub fn time_stamp() -> f64 {
    SOURCE.lock().unwrap().as_ref().map_or(0.0, |src| src())
}
