pub mod chain;
pub mod drift_check;
pub mod inputs;
pub mod resolve;
pub mod synth;
