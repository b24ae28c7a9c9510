pub mod cli;
pub mod operator;

pub use cli::*;
pub use operator::*;
