//! # courier-core
//!
//! Foundation pieces shared by the courier crates:
//!
//! - **Device tokens**: [`device_token`] validates, encodes and decodes the
//!   64-character hex form used on the wire and the 32-byte form used in storage
//! - **Clock**: [`clock::Clock`] abstracts wall-clock reads so token minting and
//!   cache expiry are deterministic under test
//! - **Logging**: [`logging::init_subscriber`] installs the `tracing` subscriber
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `courier-apns` and `courier-events`.

#![deny(unsafe_code)]

pub mod clock;
pub mod device_token;
pub mod logging;

pub use clock::{Clock, ManualClock, SystemClock};
pub use device_token::DeviceTokenError;
