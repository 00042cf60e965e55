//! HTTP middleware and request extractors

pub mod client_id;
pub mod request_id;

pub use client_id::ClientId;
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
