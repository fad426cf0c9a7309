pub mod alerts;
pub mod common;
pub mod completions;
pub mod photo;
pub mod queue;
pub mod sync;
pub mod task;
