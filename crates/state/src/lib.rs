//! The authoritative cross-chain state machine: one apply task owns every
//! write to the mint/redeem tables, fed through an ordered intake channel.

pub mod apply;
pub mod event;
pub mod handle;

pub use apply::{StateApplier, StateError};
pub use event::StateEvent;
pub use handle::StateHandle;
