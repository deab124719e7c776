//! Cross-subsystem flows.

pub mod deposit_flow;
pub mod duty_flow;
pub mod e2e_choreography;
