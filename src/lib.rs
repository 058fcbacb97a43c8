pub mod build;
pub mod common;
pub mod error;
pub mod mcfunction;
pub mod output;
pub mod parse;
pub mod project;
pub mod substitute;
pub mod template;
