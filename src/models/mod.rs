pub mod amount;
pub mod quote;

pub use amount::{format_units, parse_units, AmountError};
pub use quote::{Quote, QuoteKey, QuoteView};
