pub mod hysteresis;

pub use hysteresis::{EdgeState, EdgeStateMachine, EdgeTransition, HysteresisConfig};
