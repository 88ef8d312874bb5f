mod executor;
mod in_progress;
mod scan_scheduler;

pub use executor::*;
pub use in_progress::*;
pub use scan_scheduler::*;
