//! Cookie jar that refuses cookies scoped to a public suffix.
//!
//! reqwest's stock `Jar` never loads a public suffix list, so a response
//! from `mox.moe` could set a cookie for all of `.moe`. This jar wraps a
//! [`cookie_store::CookieStore`] built with the bundled list, which applies
//! the RFC 6265 public-suffix rule the way browsers do.

use std::str::FromStr;
use std::sync::{LazyLock, PoisonError, RwLock};

use cookie_store::{CookieStore, RawCookie};
use publicsuffix::List;
use reqwest::header::HeaderValue;
use url::Url;

use super::SessionError;

static PUBLIC_SUFFIXES: LazyLock<Result<List, publicsuffix::Error>> =
    LazyLock::new(|| List::from_str(include_str!("../../data/public_suffix_list.dat")));

/// Thread-safe cookie store shared by every clone of a session.
#[derive(Debug)]
pub(crate) struct PublicSuffixJar {
    store: RwLock<CookieStore>,
}

impl PublicSuffixJar {
    /// Creates an empty jar loaded with the bundled public suffix list.
    pub(crate) fn new() -> Result<Self, SessionError> {
        let list = PUBLIC_SUFFIXES
            .as_ref()
            .map_err(|e| SessionError::PublicSuffixList(e.to_string()))?;
        Ok(Self {
            store: RwLock::new(CookieStore::new_with_public_suffix(Some(list.clone()))),
        })
    }

    /// `name=value` pairs the jar would send to `url`, joined for a `Cookie` header.
    pub(crate) fn header_value(&self, url: &Url) -> Option<String> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let value = store
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        (!value.is_empty()).then_some(value)
    }
}

impl reqwest::cookie::CookieStore for PublicSuffixJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let cookies = cookie_headers.filter_map(|value| {
            let text = value.to_str().ok()?;
            RawCookie::parse(text).ok().map(RawCookie::into_owned)
        });
        self.store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .store_response_cookies(cookies, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.header_value(url)
            .and_then(|value| HeaderValue::from_str(&value).ok())
    }
}
