//! Browser automation: capability trait, wire-protocol client, and session
//! lifecycle management.

pub mod client;
pub mod session;
pub mod wire;

pub use client::{ClientError, Element, WebClient};
pub use session::{shutdown_signal, Session};
