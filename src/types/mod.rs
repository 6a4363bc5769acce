mod document;
mod query;

pub use document::{merge_patch, Document};
pub use query::{FieldFilter, FilterOp, OrderDirection};
