//! Process-wide tracing setup shared by every Looma binary.

/// Subscriber initialization (filters, output format).
pub mod tracing;

pub use self::tracing::LogFormat;

/// Initialize tracing with the format selected by `LOG_FORMAT`.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}
