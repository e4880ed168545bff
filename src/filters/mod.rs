//! Real-time gates applied before and after the reasoning step

pub mod confluence;
pub mod cooldown;

pub use confluence::{apply_confluence_filter, ConfluenceFilter, FilterConfig, FilterResult};
pub use cooldown::{
    is_within_cooldown, CooldownCalculator, CooldownConfig, CooldownDecision, CooldownGate,
};
