//! Links and URL canonicalization.
//!
//! A link is identified by its canonical URL components plus the display name
//! it was observed with. Links that point at the tracked site itself are
//! stored with a `NULL` host so they survive a change of the site's domain.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::{Error, Result};

// ─── Canonical URL ───────────────────────────────────────────────────────────

/// The identity-bearing components of a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalUrl {
  pub scheme:   String,
  /// Lower-cased `host[:port]`, or `None` for the tracked site itself.
  pub host:     Option<String>,
  pub path:     String,
  pub query:    Option<String>,
  pub fragment: Option<String>,
}

/// A deduplicated link record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
  pub id:   i64,
  #[serde(flatten)]
  pub url:  CanonicalUrl,
  pub name: String,
}

/// Input for creating a [`Link`]; the pair is the link's natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
  pub url:  CanonicalUrl,
  pub name: String,
}

/// Cache key for a raw `(url, name)` observation.
pub fn link_cache_key(raw_url: &str, name: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(raw_url.as_bytes());
  hasher.update([0]);
  hasher.update(name.as_bytes());
  hex::encode(hasher.finalize())
}

// ─── Site ────────────────────────────────────────────────────────────────────

/// The tracked site: decides which hosts collapse to "this site" and how
/// host-less links are rendered back into absolute URLs.
#[derive(Debug, Clone)]
pub struct Site {
  base:       Url,
  host:       String,
  /// `https://<host>/`, the base that scheme-less input is resolved against.
  https_base: Url,
}

impl Site {
  /// Build a site from its absolute base URL, e.g. `https://blog.example/`.
  pub fn new(base_url: &str) -> Result<Self> {
    let base = Url::parse(base_url)
      .map_err(|e| Error::validation("site_url", e.to_string()))?;
    let host = base
      .host_str()
      .filter(|h| !h.is_empty())
      .ok_or_else(|| Error::validation("site_url", "site url has no host"))?
      .to_ascii_lowercase();

    let mut https_base = base.clone();
    // http -> https is always permitted between special schemes.
    let _ = https_base.set_scheme("https");
    https_base.set_path("/");
    https_base.set_query(None);
    https_base.set_fragment(None);

    Ok(Self { base, host, https_base })
  }

  /// Host name of the site, without port.
  pub fn host(&self) -> &str { &self.host }

  /// `host[:port]` as it would appear in a canonical link host.
  pub fn authority(&self) -> String {
    match self.base.port() {
      Some(port) => format!("{}:{port}", self.host),
      None => self.host.clone(),
    }
  }

  /// Whether `host` (a report filter value) designates the site itself.
  pub fn is_own_host(&self, host: &str) -> bool {
    host.eq_ignore_ascii_case(&self.host) || host.eq_ignore_ascii_case(&self.authority())
  }

  /// Split `raw` into canonical components.
  ///
  /// The scheme and host come from the parsed URL; path, query and fragment
  /// are sliced from `raw` as written, so no percent-encoding or dot-segment
  /// resolution is applied to them.
  pub fn canonicalize(&self, raw: &str) -> Result<CanonicalUrl> {
    let raw = raw.trim();
    if raw.is_empty() {
      return Err(Error::validation("url", "url must not be empty"));
    }

    let (parsed, rest) = match Url::parse(raw) {
      // Opaque URLs such as `mailto:` keep their path exactly.
      Ok(url) if !url.has_host() => {
        let opaque = raw.get(url.scheme().len() + 1..).unwrap_or_default();
        return Ok(split_components(url.scheme().to_owned(), None, opaque, false));
      }
      Ok(url) => {
        let after_scheme = raw.get(url.scheme().len() + 1..).unwrap_or_default();
        (url, skip_authority(after_scheme))
      }
      Err(url::ParseError::RelativeUrlWithoutBase) => {
        let url = self
          .https_base
          .join(raw)
          .map_err(|e| Error::validation("url", e.to_string()))?;
        let rest = if raw.starts_with("//") { skip_authority(raw) } else { raw };
        (url, rest)
      }
      Err(e) => return Err(Error::validation("url", e.to_string())),
    };

    let host = parsed
      .host_str()
      .filter(|h| !h.is_empty() && !h.eq_ignore_ascii_case(&self.host))
      .map(|h| match parsed.port() {
        Some(port) => format!("{}:{port}", h.to_ascii_lowercase()),
        None => h.to_ascii_lowercase(),
      });

    Ok(split_components(parsed.scheme().to_owned(), host, rest, true))
  }

  /// Render a canonical URL as an absolute URL. Host-less links take the
  /// site's current origin.
  pub fn render(&self, url: &CanonicalUrl) -> String {
    let mut out = match &url.host {
      Some(host) => format!("{}://{host}", url.scheme),
      None => self.base.origin().ascii_serialization(),
    };
    out.push_str(&url.path);
    if let Some(query) = &url.query {
      out.push('?');
      out.push_str(query);
    }
    if let Some(fragment) = &url.fragment {
      out.push('#');
      out.push_str(fragment);
    }
    out
  }
}

/// Split `rest` at the first `#` and then the first `?`. Hierarchical paths
/// are rooted at `/`.
fn split_components(
  scheme: String,
  host: Option<String>,
  rest: &str,
  hierarchical: bool,
) -> CanonicalUrl {
  let (rest, fragment) = match rest.split_once('#') {
    Some((before, fragment)) => (before, Some(fragment.to_owned())),
    None => (rest, None),
  };
  let (path, query) = match rest.split_once('?') {
    Some((path, query)) => (path, Some(query.to_owned())),
    None => (rest, None),
  };
  let path = match path {
    "" => "/".to_owned(),
    p if !hierarchical || p.starts_with('/') => p.to_owned(),
    p => format!("/{p}"),
  };
  CanonicalUrl { scheme, host, path, query, fragment }
}

/// Drop the leading slashes and `user@host:port` from a hierarchical URL
/// remainder, leaving the path, query and fragment as written.
fn skip_authority(rest: &str) -> &str {
  let rest = rest.trim_start_matches(['/', '\\']);
  match rest.find(['/', '\\', '?', '#']) {
    Some(end) => &rest[end..],
    None => "",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn site() -> Site { Site::new("https://Blog.Example").unwrap() }

  #[test]
  fn foreign_host_is_kept_lowercased() {
    let url = site().canonicalize("https://Example.COM/a?x=1").unwrap();
    assert_eq!(url, CanonicalUrl {
      scheme:   "https".into(),
      host:     Some("example.com".into()),
      path:     "/a".into(),
      query:    Some("x=1".into()),
      fragment: None,
    });
  }

  #[test]
  fn own_host_collapses_to_none() {
    let s = site();
    for raw in [
      "https://blog.example/post",
      "http://BLOG.EXAMPLE/post",
      "https://blog.example:8443/post",
    ] {
      let url = s.canonicalize(raw).unwrap();
      assert_eq!(url.host, None, "{raw}");
      assert_eq!(url.path, "/post");
    }
  }

  #[test]
  fn non_default_port_is_appended() {
    let url = site().canonicalize("http://shop.test:8080/cart").unwrap();
    assert_eq!(url.host.as_deref(), Some("shop.test:8080"));

    let url = site().canonicalize("https://shop.test:443/cart").unwrap();
    assert_eq!(url.host.as_deref(), Some("shop.test"));
  }

  #[test]
  fn missing_scheme_defaults_to_https() {
    let url = site().canonicalize("//cdn.test/lib.js").unwrap();
    assert_eq!(url.scheme, "https");
    assert_eq!(url.host.as_deref(), Some("cdn.test"));

    let url = site().canonicalize("/about#team").unwrap();
    assert_eq!(url.scheme, "https");
    assert_eq!(url.host, None);
    assert_eq!(url.path, "/about");
    assert_eq!(url.fragment.as_deref(), Some("team"));
  }

  #[test]
  fn empty_path_defaults_to_root() {
    let url = site().canonicalize("https://example.com").unwrap();
    assert_eq!(url.path, "/");
    assert_eq!(url.query, None);
    assert_eq!(url.fragment, None);
  }

  #[test]
  fn empty_query_is_distinct_from_missing_query() {
    let url = site().canonicalize("https://example.com/a?").unwrap();
    assert_eq!(url.query.as_deref(), Some(""));
  }

  #[test]
  fn empty_url_is_rejected() {
    assert!(matches!(
      site().canonicalize("   "),
      Err(Error::Validation { ref field, .. }) if field == "url"
    ));
  }

  #[test]
  fn path_query_and_fragment_are_kept_as_written() {
    let url = site().canonicalize("https://example.com/a/../b c?q=a b&r=ä#frag ment").unwrap();
    assert_eq!(url.path, "/a/../b c");
    assert_eq!(url.query.as_deref(), Some("q=a b&r=ä"));
    assert_eq!(url.fragment.as_deref(), Some("frag ment"));

    let encoded = site().canonicalize("https://example.com/b%20c?q=a%20b&r=%C3%A4#frag%20ment").unwrap();
    assert_eq!(encoded.path, "/b%20c");
    assert_ne!(url, encoded);
  }

  #[test]
  fn authority_is_skipped_when_slicing() {
    let url = site().canonicalize("https://user:pw@Example.com:8080?x#y").unwrap();
    assert_eq!(url.host.as_deref(), Some("example.com:8080"));
    assert_eq!(url.path, "/");
    assert_eq!(url.query.as_deref(), Some("x"));
    assert_eq!(url.fragment.as_deref(), Some("y"));

    let url = site().canonicalize("//cdn.test/a b?c").unwrap();
    assert_eq!(url.path, "/a b");
    assert_eq!(url.query.as_deref(), Some("c"));
  }

  #[test]
  fn relative_path_gains_a_leading_slash() {
    let url = site().canonicalize("about?tab=1").unwrap();
    assert_eq!(url.host, None);
    assert_eq!(url.path, "/about");
    assert_eq!(url.query.as_deref(), Some("tab=1"));
  }

  #[test]
  fn render_uses_site_origin_for_own_links() {
    let s = Site::new("http://localhost:8080/wp/").unwrap();
    let own = s.canonicalize("http://localhost:8080/a?b=c#d").unwrap();
    assert_eq!(s.render(&own), "http://localhost:8080/a?b=c#d");

    let foreign = s.canonicalize("https://example.com:8443/x").unwrap();
    assert_eq!(s.render(&foreign), "https://example.com:8443/x");
  }

  #[test]
  fn own_host_filter_matches_with_and_without_port() {
    let s = Site::new("http://localhost:8080/").unwrap();
    assert!(s.is_own_host("LOCALHOST"));
    assert!(s.is_own_host("localhost:8080"));
    assert!(!s.is_own_host("example.com"));
    assert_eq!(s.authority(), "localhost:8080");
  }

  #[test]
  fn cache_key_separates_url_and_name() {
    assert_ne!(link_cache_key("https://a.test/ab", "c"), link_cache_key("https://a.test/a", "bc"));
    assert_eq!(link_cache_key("u", "n"), link_cache_key("u", "n"));
  }
}
