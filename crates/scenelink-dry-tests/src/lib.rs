// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for SceneLink crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`observer`] - Event recorder for asserting notification order
//! - [`remote`] - Scriptable in-memory render graph with failure injection

pub mod config;
pub mod observer;
pub mod remote;

pub use config::InMemoryConfigStore;
pub use observer::RecordingObserver;
pub use remote::FakeRemote;
