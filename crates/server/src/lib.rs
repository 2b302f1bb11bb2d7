//! Process wiring for the Goldie bot: health endpoint, readiness and daily schedules.

pub mod routes;
pub mod scheduler;
pub mod state;
