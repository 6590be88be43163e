pub mod assignments;
pub mod backup;
pub mod core;
pub mod roster;
pub mod setup;
pub mod stats;
pub mod structure;
pub mod views;
