//! geoipup: keeps a local copy of the Tor Metrics geoip databases current.
//!
//! The databases are published as package-registry artifacts behind a
//! JavaScript-rendered page, so the updater drives a real Edge browser via
//! its WebDriver to find the download link, then fetches, extracts, and
//! installs the files.

pub mod browser;
pub mod config;
pub mod driver;
pub mod error;
pub mod gate;
pub mod locator;
pub mod pipeline;
pub mod workflow;

pub use error::UpdateError;
