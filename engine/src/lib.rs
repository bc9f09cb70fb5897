pub mod analyze;
pub mod boolexpr;
pub mod build;
pub mod codec;
pub mod error;
pub mod meta;
pub mod permuterm;
pub mod query;
pub mod rank;

/// Document identifier, stable within one index build.
pub type DocId = u32;

pub use error::{IndexError, QueryError};
