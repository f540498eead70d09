//! Request-metadata extractors: the client IP and the presented device token.

use std::{
  convert::Infallible,
  net::{IpAddr, SocketAddr},
};

use axum::{
  extract::{ConnectInfo, FromRequestParts},
  http::{HeaderMap, request::Parts},
};

/// Response and request header carrying the device token.
pub const DEVICE_HEADER: &str = "x-device";

/// Headers consulted for the client address, most specific first.
const IP_HEADERS: [&str; 6] = [
  "client-ip",
  "x-forwarded-for",
  "x-forwarded",
  "x-cluster-client-ip",
  "forwarded-for",
  "forwarded",
];

/// The client address: the first valid IP found in the proxy headers, else
/// the socket peer, else an empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
    let ip = ip_from_headers(&parts.headers)
      .or_else(|| {
        parts
          .extensions
          .get::<ConnectInfo<SocketAddr>>()
          .map(|ConnectInfo(addr)| addr.ip())
      })
      .map(|ip| ip.to_string())
      .unwrap_or_default();
    Ok(Self(ip))
  }
}

fn ip_from_headers(headers: &HeaderMap) -> Option<IpAddr> {
  IP_HEADERS.iter().find_map(|name| {
    headers
      .get_all(*name)
      .iter()
      .filter_map(|v| v.to_str().ok())
      .flat_map(|v| v.split([',', ';']))
      .find_map(parse_candidate)
  })
}

/// Accept bare addresses, `host:port`, `[v6]:port` and RFC 7239 `for=` pairs.
fn parse_candidate(raw: &str) -> Option<IpAddr> {
  let mut value = raw.trim();
  if let Some((key, rest)) = value.split_once('=') {
    if !key.trim().eq_ignore_ascii_case("for") {
      return None;
    }
    value = rest.trim();
  }
  let value = value.trim_matches('"');

  value
    .parse::<IpAddr>()
    .ok()
    .or_else(|| value.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
    .or_else(|| value.strip_prefix('[')?.strip_suffix(']')?.parse().ok())
}

/// The raw `X-Device` header value, if any.
#[derive(Debug, Clone, Default)]
pub struct DeviceToken(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for DeviceToken {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
    let token = parts
      .headers
      .get(DEVICE_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::to_owned);
    Ok(Self(token))
  }
}

#[cfg(test)]
mod tests {
  use axum::http::HeaderValue;

  use super::*;

  fn with(pairs: &[(&'static str, &str)]) -> HeaderMap {
    let mut h = HeaderMap::new();
    for (k, v) in pairs {
      h.append(*k, HeaderValue::from_str(v).unwrap());
    }
    h
  }

  #[test]
  fn client_ip_header_wins() {
    let h = with(&[("x-forwarded-for", "198.51.100.7"), ("client-ip", "203.0.113.1")]);
    assert_eq!(ip_from_headers(&h), Some("203.0.113.1".parse().unwrap()));
  }

  #[test]
  fn forwarded_for_list_skips_garbage() {
    let h = with(&[("x-forwarded-for", "unknown, 198.51.100.7, 10.0.0.1")]);
    assert_eq!(ip_from_headers(&h), Some("198.51.100.7".parse().unwrap()));
  }

  #[test]
  fn rfc7239_forwarded_is_understood() {
    let h = with(&[("forwarded", "proto=https;for=\"[2001:db8::1]:4711\";by=203.0.113.43")]);
    assert_eq!(ip_from_headers(&h), Some("2001:db8::1".parse().unwrap()));
  }

  #[test]
  fn invalid_headers_fall_through() {
    let h = with(&[("client-ip", "not an ip"), ("x-cluster-client-ip", "192.0.2.9:8080")]);
    assert_eq!(ip_from_headers(&h), Some("192.0.2.9".parse().unwrap()));
    assert_eq!(ip_from_headers(&HeaderMap::new()), None);
  }
}
