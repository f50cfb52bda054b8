pub mod admin_service;
pub mod http;
pub mod metrics_defs;
#[cfg(any(test, feature = "testutils"))]
pub mod testutils;
