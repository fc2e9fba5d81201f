mod inspect;
mod serve;

pub use inspect::{run_order, run_state, run_validate};
pub use serve::run_serve;
