pub mod get;
pub mod put;
pub mod revs;
pub mod shell;
