//! Client for the storefront API.
//!
//! [`ApiClient`] attaches the CSRF and bearer headers to every call and
//! transparently refreshes an expired access token once per call.

mod endpoints;
mod error;
mod facade;
mod session;
mod transport;

pub use endpoints::{ListParams, OrderListParams};
pub use error::ClientError;
pub use facade::ApiClient;
pub use session::Session;
pub use transport::{ApiRequest, ApiResponse, FilePart, ReqwestTransport, RequestBody, Transport};
