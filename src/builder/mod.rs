//! Page-builder domain logic shared by the server and the builder client.
//!
//! ARCHITECTURE
//! ============
//! Nothing in here performs I/O. The client session feeds cached instances
//! through these functions to decide which request to send, and the server
//! reuses the ordering and rendering helpers inside its transactions.
//!
//! - `drag`   — typed drag payloads, drop classification, drag state machine
//! - `order`  — sibling ordering, array moves, dense reindexing
//! - `canvas` — root projection, render tree, HTML templates
//! - `form`   — property-panel form derivation from component schemas

pub mod canvas;
pub mod drag;
pub mod form;
pub mod order;
