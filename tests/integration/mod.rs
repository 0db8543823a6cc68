//! Integration tests for the quick-look orchestration layer

mod calibration_selection;
mod driver_flow;
mod scheduler_ordering;
mod sequence_scenarios;
mod support;
