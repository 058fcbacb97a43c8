pub mod env;
pub mod value;

pub use env::{Columns, Env, Rows};
