mod arbiter;
mod priority;

pub use arbiter::{SchedulingConflict, Scheduler, TrackTarget};
pub use priority::Priority;
