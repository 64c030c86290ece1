//! HTTP transport abstraction and the reqwest-backed implementation.

pub mod client;

pub use client::{
    HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, ReqwestTransportBuilder,
    TransportError,
};
