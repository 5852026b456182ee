pub mod domain;
pub mod postgres;
pub mod telemetry;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockConnectionFactory;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockErrorLogRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockStoreConnection;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockTelemetryWriter;
