pub mod domain;
pub mod mqtt;
pub mod postgres;
pub mod stream_worker;

pub use domain::*;
pub use mqtt::*;
pub use postgres::*;
pub use stream_worker::*;
