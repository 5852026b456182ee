mod client;
mod config;
mod identifier;
mod sql_param;

pub use client::*;
pub use config::*;
pub use identifier::*;
pub use sql_param::*;
