//! Utility types for promptpos.
//!
//! - [`money_amount`] - Human-readable baht amount parsing

pub mod money_amount;

pub use money_amount::*;
