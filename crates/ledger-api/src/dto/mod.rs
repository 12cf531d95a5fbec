//! Data Transfer Objects (DTOs) for API requests and responses

pub mod balance;
pub mod billing;
pub mod common;
pub mod purchase;
pub mod rate;
pub mod usage;

pub use balance::*;
pub use billing::*;
pub use common::*;
pub use purchase::*;
pub use rate::*;
pub use usage::*;
