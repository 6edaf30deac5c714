//! Domain models for quotes and spread opportunities.

mod opportunity;
mod quote;

pub use opportunity::{Opportunity, opportunity_id};
pub use quote::Quote;
