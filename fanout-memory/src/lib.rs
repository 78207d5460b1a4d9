mod context;
mod eval;
mod store;

pub use context::*;
pub use store::*;
