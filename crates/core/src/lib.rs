//! Core data types for the treasury monitor.

pub mod alert;
pub mod chain;
pub mod price;
pub mod transfer;
pub mod watchlist;

pub use alert::*;
pub use chain::*;
pub use price::*;
pub use transfer::*;
pub use watchlist::*;
