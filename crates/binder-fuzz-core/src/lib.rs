//! Binder Fuzz Core
//!
//! Randomized fuzzing engine for Android Binder-style `service call`
//! entrypoints driven through an external command-line bridge (`adb`).
//!
//! # Core Modules
//!
//! - [`catalog`]: Transaction catalog types and JSON loading
//! - [`fuzz`]: Input generation, execution, classification and the worker pool
//! - [`capture`]: Auxiliary device log capture processes
//! - [`supervisor`]: Fatal-condition termination and full restart loop
//! - [`config`]: Resolved run configuration
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use binder_fuzz_core::catalog::Catalog;
//! use binder_fuzz_core::config::FuzzConfig;
//! use binder_fuzz_core::fuzz::CommandBridge;
//! use binder_fuzz_core::supervisor::Supervisor;
//!
//! let config = FuzzConfig::default();
//! let catalog = Arc::new(Catalog::load(&config.catalog_path)?);
//! let bridge = Arc::new(CommandBridge::new(&config.bridge_program));
//! let supervisor = Supervisor::new(config, catalog, bridge);
//! let exit = supervisor.run(|| async { let _ = tokio::signal::ctrl_c().await; }).await;
//! ```

pub mod capture;
pub mod catalog;
pub mod config;
pub mod fuzz;
pub mod supervisor;
