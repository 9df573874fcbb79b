//! Shared domain types for the wrapped-BTC bridge: addresses, OP_RETURN
//! payload codecs, signing hashes and protocol parameters.

pub mod actions;
pub mod bitcoin;
pub mod deposit;
pub mod moveargs;
pub mod params;
pub mod redeem;
pub mod scripts;
pub mod signing;
