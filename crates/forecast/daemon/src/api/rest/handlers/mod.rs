//! API request handlers

mod applications;
mod health;
mod topics;

pub use applications::*;
pub use health::*;
pub use topics::*;
