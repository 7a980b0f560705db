//! # courier-events
//!
//! Turns a scheduled content event into pushes:
//!
//! - **Permission**: [`permission::ViewPermission`] decides whether a subscriber
//!   may see the content the event is about
//! - **Adapter**: [`ScheduledEventAdapter`] filters subscriber records, dispatches
//!   one batch through a [`courier_apns::PushSender`] and maps the delivered and
//!   invalid device tokens back to subscriber ids
//!
//! ## Crate Position
//!
//! Depends on `courier-core` and `courier-apns`.

#![deny(unsafe_code)]

pub mod adapter;
pub mod permission;

pub use adapter::{Envelope, HandleResult, NOTIFICATION_BADGE, ScheduledEventAdapter, SubscriberToken};
pub use permission::{AllowAll, ViewPermission};
