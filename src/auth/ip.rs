//! Client IP extraction utilities.

use std::net::SocketAddr;

use axum::{extract::ConnectInfo, http::request::Parts};

/// Where to read the client IP from.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IpSource {
    /// Peer address of the TCP connection
    #[default]
    Connection,
    /// First entry of `X-Forwarded-For` (behind a reverse proxy)
    XForwardedFor,
    /// `X-Real-IP` (behind a reverse proxy)
    XRealIp,
}

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &axum::http::HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Extract the client IP address.
///
/// Header sources never fall back to the connection address, since a
/// missing proxy header means the request bypassed the proxy.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    ip_source: IpSource,
) -> Result<String, &'static str> {
    let header_name = match ip_source {
        IpSource::Connection => {
            return source
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
                .ok_or("No client IP available");
        }
        IpSource::XForwardedFor => "x-forwarded-for",
        IpSource::XRealIp => "x-real-ip",
    };

    let value = source
        .headers()
        .get(header_name)
        .ok_or("IP header not present")?
        .to_str()
        .map_err(|_| "IP header contains invalid characters")?;

    let ip = value.split(',').next().unwrap_or("").trim();
    if ip.is_empty() {
        return Err("IP header is empty");
    }
    ip.parse::<std::net::IpAddr>()
        .map(|addr| addr.to_string())
        .map_err(|_| "IP header is not an IP address")
}
