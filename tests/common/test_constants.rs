//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Machine name used by the lifecycle scenarios.
pub const MACHINE_NAME: &str = "docker-1";

/// Scalet identifier returned by the scripted provider.
pub const SCALET_ID: i64 = 10299;

/// SSH key identifier returned by the scripted provider.
pub const SSH_KEY_ID: i64 = 16;

/// Public address assigned once the scalet is active.
pub const PUBLIC_IP: &str = "95.213.191.120";
