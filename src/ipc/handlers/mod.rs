pub mod attendance;
pub mod core;
pub mod discipline;
pub mod locations;
pub mod permits;
pub mod schedules;
pub mod setup;
pub mod students;
