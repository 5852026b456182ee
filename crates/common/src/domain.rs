mod error_category;
mod error_log;
mod insert_command;
mod ir_event;
mod result;
mod store;

pub use error_category::*;
pub use error_log::*;
pub use insert_command::*;
pub use ir_event::*;
pub use result::*;
pub use store::*;
