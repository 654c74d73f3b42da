//! Builder client: HTTP access to the server and the session that drives
//! drag and drop and property editing.

pub mod api;
pub mod session;

pub use api::{BuilderApi, ClientError, HttpBuilderApi};
pub use session::{BuilderSession, DropOutcome, SessionError};
