// src/config/mod.rs
pub mod briefing;

pub use briefing::BriefingConfig;
