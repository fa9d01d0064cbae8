//! In-process reservation engine for campus rooms: search for a free
//! room, reserve it, cancel, and report usage. State lives in memory,
//! every mutation is durable in JSON snapshots before it is visible,
//! and committed bookings get scannable pass artifacts.

pub mod auth;
pub mod codec;
pub mod engine;
pub mod model;
pub mod observability;
pub mod store;
