pub mod timing;
pub mod tx;

pub mod prelude {
    pub use super::{timing::*, tx::*};
}
