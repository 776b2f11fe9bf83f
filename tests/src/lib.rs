//! # Watch Test Suite
//!
//! End-to-end flows across several SDK clients sharing one relay.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── flows.rs       # watch → relay → look delivery, package shape
//!     └── lifecycle.rs   # init, outage/reconnect, shutdown
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p watch-tests
//! cargo test -p watch-tests integration::lifecycle
//! ```

pub mod integration;
