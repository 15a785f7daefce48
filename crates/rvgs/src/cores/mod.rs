//! Built-in simulator cores.
//!
//! Production targets (Verilator models and friends) live out of tree and
//! implement [`rvgs_target::Target`] themselves; the `sim` core here is a
//! small interpreter so the server is usable out of the box.

mod sim;

pub use sim::SimCore;

use rvgs_target::Target;

/// Names accepted by `--core`.
pub fn names() -> &'static [&'static str] {
    &["sim"]
}

/// Construct a core by name.
pub fn create(name: &str, memory_bytes: usize) -> Option<Box<dyn Target>> {
    match name {
        "sim" => Some(Box::new(SimCore::new(memory_bytes))),
        _ => None,
    }
}
