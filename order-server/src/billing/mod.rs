//! Bill computation

pub mod calculator;

pub use calculator::{BillingCalculator, FeeSchedule};
