pub mod simulated;

pub use simulated::{SessionCall, SessionOp, SimulatedSession, SimulatedSessionConfig};
