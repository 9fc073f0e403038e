//! # relay-webhooks
//!
//! Outbound HTTP callback subscriptions.
//!
//! A registration is keyed by its destination URL
//! (`http://<host>:<port><callbackUrl>`). Each emission of the registration's
//! event source is POSTed as JSON, one request at a time. The first failed
//! delivery, or an upstream error, removes the registration and reports
//! `(url, error)` to the failure callback. There is no retry.

#![deny(unsafe_code)]

pub mod errors;
pub mod registry;
pub mod types;
pub mod url;

pub use errors::{DeliveryError, WebhookError};
pub use registry::{FailureCallback, WebhookConfig, WebhookRegistry};
pub use types::{RequestContext, WebhookRequest, WebhookStatus};
pub use url::destination_url;
