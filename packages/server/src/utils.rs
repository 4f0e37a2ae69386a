pub mod clock;
pub mod telemetry;
pub mod test_setup;
