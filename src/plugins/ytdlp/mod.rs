pub mod cli;
pub mod cookies;
pub mod driver;
pub mod output;
