pub mod error;
pub mod config;
pub mod system_paths;
pub mod identity;
pub mod gateway;
pub mod query;
pub mod resources;
pub mod client;
pub mod cli;

pub use client::HelpdeskClient;
pub use config::ClientConfig;
pub use error::{ApiError, ApiResult};
pub use gateway::{Gateway, RequestDescriptor};
pub use query::{QueryCoordinator, QueryKey};

// Test-only printing helper: expands to eprintln! during tests and debug builds.
// Usage: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In release builds, a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
