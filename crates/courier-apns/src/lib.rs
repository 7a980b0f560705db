//! # courier-apns
//!
//! Apple Push Notification service delivery:
//!
//! - **Provider tokens**: [`token`] signs ES256 JWTs from a `.p8` key and caches
//!   them for reuse; [`signature`] converts the DER signature to JOSE form
//! - **Payload**: [`payload`] renders a [`Notification`] as an APNs alert body
//! - **Transport**: [`transport::PushTransport`] posts one request; the
//!   `reqwest` implementation speaks HTTP/2
//! - **Dispatch**: [`Dispatcher`] fans a notification out to many device tokens
//!   and sorts the results into delivered, invalid and unresolved
//! - **Settings**: [`config`] loads credentials and tuning from defaults, a
//!   JSON file and `COURIER_APNS_*` environment variables
//!
//! ## Crate Position
//!
//! Depends on `courier-core`. Depended on by `courier-events`.

#![deny(unsafe_code)]

pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod payload;
pub mod signature;
pub mod token;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::{ApnsSettings, ConfigError};
pub use credentials::Credentials;
pub use dispatcher::{
    DispatchOutcome, DispatchReport, Dispatcher, DispatcherOptions, PushSender, SkipReason,
    UnresolvedCause, UnresolvedToken,
};
pub use payload::Notification;
pub use token::{MintError, ProviderToken, ProviderTokenCache, TokenMinter};
pub use transport::{HttpTransport, PushTransport, TransportError};
