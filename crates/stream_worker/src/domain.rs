mod connection_supervisor;
mod error_classifier;
mod ingest_service;
mod insert_builder;
mod ir_decoder;
mod storage_gateway;

pub use connection_supervisor::*;
pub use error_classifier::*;
pub use ingest_service::*;
pub use insert_builder::*;
pub use ir_decoder::*;
pub use storage_gateway::*;
