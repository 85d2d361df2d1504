//! rpcwire
//!
//! A JSON-RPC 1.0 client over HTTP and HTTPS, with client certificates, a
//! certificate hostname policy which accepts Common Names, and caller-scoped
//! connection pooling.
//!
//! Start with [`ServerProxy::builder`].

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod client;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod tls;

pub use client::{ConnectionPool, CookieKeeper, RequestHooks, ServerProxy};
pub use endpoint::Endpoint;
pub use envelope::{Params, RequestEnvelope};
pub use error::{BoxError, Error, Fault};
