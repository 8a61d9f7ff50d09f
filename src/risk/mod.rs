//! User risk ranking.

mod engine;

pub use engine::{RiskEngine, RiskLevel, RiskResult};
