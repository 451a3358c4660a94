//! # webwitness
//!
//! A headless-browser web reconnaissance engine: drives Chrome via the
//! DevTools protocol to collect, per target URL, the response chain,
//! headers, cookies, TLS handshake details, console output, a rendered
//! screenshot and its perceptual hash, and lightweight technology
//! fingerprints — then fans the result out to one or more sinks.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use webwitness::config::Options;
//! use webwitness::driver::Driver;
//! use webwitness::browser::ChromiumDriver;
//! use webwitness::fingerprint::BuiltinFingerprintEngine;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = Arc::new(Options::default().finalize().await?);
//!     let driver = ChromiumDriver::new(options, Arc::new(BuiltinFingerprintEngine::new()));
//!     let result = driver.witness("https://example.com".to_string()).await?;
//!     println!("probed {} -> {}", result.url, result.response_code);
//!     Ok(())
//! }
//! ```

/// Configuration and settings for the probe engine.
pub mod config;

/// Error types shared across the crate.
pub mod error;

/// The per-target observation record.
pub mod result;

/// Result sink contract and reference sinks.
pub mod writer;

/// The browser-backend contract every driver implements.
pub mod driver;

/// The chromiumoxide-backed `Driver` implementation.
pub mod browser;

/// Per-target DevTools event correlation.
pub mod assembler;

/// Screenshot capture, encode, and perceptual hashing.
pub mod screenshot;

/// Worker-pool orchestrator.
pub mod runner;

/// Lightweight response/HTML technology fingerprinting.
pub mod fingerprint;

/// Small stateless helpers shared across modules.
pub mod utils;

/// Command-line interface implementation.
pub mod cli;

pub use config::Options;
pub use driver::Driver;
pub use error::ProbeError;
pub use result::ProbeResult;
pub use runner::Runner;
