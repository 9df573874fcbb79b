//! Adapter for the destination chain (EVM or Move), everything behind one
//! typed surface: tagged events decoded at this boundary, submission calls,
//! finality/canonicality queries and the error taxonomy for the opaque
//! strings the underlying nodes return.

pub mod error;
pub mod events;
pub mod movecall;
pub mod rpc;
pub mod traits;
pub mod types;

pub use error::{ChainError, ChainResult};
pub use events::{ChainEvent, ChainEventKind};
pub use rpc::RpcChainClient;
pub use traits::ChainClient;
pub use types::{BlockRef, MintCall, PrepareCall, TxReceipt};
