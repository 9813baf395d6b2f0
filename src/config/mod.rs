// src/config/mod.rs
pub mod ai;
pub mod collector;

pub use ai::AiConfig;
pub use collector::CollectorConfig;
