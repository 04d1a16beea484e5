//! Auto-hedging of aggregate net exposure against the external liquidity
//! provider, with per-product deadband and throttle.

mod engine;
mod types;

pub use engine::{HedgeAckOutcome, HedgeEngine};
pub use types::{HedgeAck, HedgeAlert, HedgeBaseline, HedgeIntent, HedgeReject};
