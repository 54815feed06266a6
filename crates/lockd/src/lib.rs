//! # Shackle Lock Daemon Library
//!
//! This crate provides the lock-side services of the Shackle smart-lock
//! system: everything the device guarding the door runs, short of the
//! wireless transport itself.
//!
//! ## Overview
//!
//! - **Key Store**: issued and pending credentials with their secrets
//! - **Event Log**: bounded, persistent record of lock activity
//! - **Hardware**: relay/LED/button capability drivers per board model
//! - **Lock Service**: the protocol flows bound to stores and hardware
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Lock Service                     │
//! ├─────────────────────────────────────────────────────┤
//! │                                                     │
//! │  ┌───────────┐  ┌───────────┐  ┌────────────────┐  │
//! │  │ Key Store │  │ Event Log │  │ Lock Actuator  │  │
//! │  └───────────┘  └───────────┘  └────────────────┘  │
//! │                                                     │
//! ├─────────────────────────────────────────────────────┤
//! │          protocol (framing, envelope, auth)         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The transport integrator feeds characteristic reads, writes, and
//! notifications into [`service::LockService`]; the daemon binary runs
//! the physical button loop and the provisioning CLI.
//!
//! ## Modules
//!
//! - [`config`]: TOML configuration loading and validation
//! - [`provision`]: first-run lock identity and factory secret
//! - [`store`]: persistent key and event stores
//! - [`hardware`]: actuator capability drivers
//! - [`service`]: lock-side protocol orchestration

pub mod config;
pub mod hardware;
pub mod provision;
pub mod service;
pub mod store;

pub use config::Config;
pub use service::{LockService, ServiceError};
