//! Turning a ranked candidate list into order intents.
//!
//! Two policies are available: [`single`] keeps the whole portfolio in one
//! instrument, [`stacked`] spreads it over every ranked candidate.

pub mod single;
pub mod stacked;
