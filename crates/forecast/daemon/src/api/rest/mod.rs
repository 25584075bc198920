//! REST bridge and status API

pub mod handlers;
pub mod router;
pub mod state;
