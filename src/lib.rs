mod context;
mod entity;
mod error;
mod expr;
mod factory;
mod provider;
mod query;
mod rebind;
mod row;
mod source;
mod value;
mod wrap;

pub use ::anyhow::Context as ErrorContext;
pub use context::*;
pub use entity::*;
pub use error::*;
pub use expr::*;
pub use factory::*;
pub use provider::*;
pub use query::*;
pub use rebind::*;
pub use row::*;
pub use source::*;
pub use value::*;
pub use wrap::*;
pub mod stream {
    pub use ::futures::stream::*;
}
pub use ::futures::future;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
