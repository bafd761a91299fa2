pub mod model;
pub mod validate;

pub use model::{Row, RowId, TableName};
pub use validate::RowError;
