//! Page builder: component library, page instances, drag-and-drop ordering,
//! property forms, and the HTTP server and client around them.

pub mod builder;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod routes;
pub mod services;
pub mod state;
