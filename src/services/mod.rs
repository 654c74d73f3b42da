//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence concerns so route
//! handlers can stay focused on protocol translation and auth plumbing.

pub mod component;
pub mod instance;
pub mod project;
pub mod render;
pub mod session;

#[cfg(all(test, feature = "live-db-tests"))]
pub(crate) mod test_support;
