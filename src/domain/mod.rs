pub mod models;
pub mod phase_machine;
