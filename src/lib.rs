pub mod clock;
pub mod config;
pub mod engine;
pub mod journal;
pub mod limits;
pub mod listing;
pub mod model;
pub mod observability;
pub mod reaper;
