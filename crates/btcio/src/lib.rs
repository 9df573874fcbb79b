pub mod client;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

pub use client::*;
pub use constants::*;
