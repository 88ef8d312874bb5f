mod counters;
mod limits;
mod resource_monitor;
mod sampler;

pub use counters::*;
pub use limits::*;
pub use resource_monitor::*;
pub use sampler::*;
