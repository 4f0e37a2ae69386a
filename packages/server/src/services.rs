pub mod action_resolver;
pub mod night_resolution;
pub mod phase_machine;
pub mod session_store;
pub mod snapshot;
pub mod visibility;
