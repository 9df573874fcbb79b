//! The bridge's runtime loops: the BTC chain monitor, the observer fanout,
//! the destination-chain synchronizer and the two transaction managers.

pub mod btc_manager;
pub mod chain_manager;
pub mod monitor;
pub mod observer;
pub mod synchronizer;
