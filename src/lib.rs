pub mod config;
pub mod errors;
pub mod events;
pub mod interrupt;
pub mod pipeline;
pub mod reporter;
pub mod snapshot;
pub mod task;
pub mod ui;
