//! Client-side URLs and the data URLs derived from them.

use std::fmt;

use arbor_core::RouteId;
use url::Url;

use crate::error::{ClientError, Result};

const DATA_SUFFIX: &str = ".data";
const ROUTE_PARAM: &str = "_route";

/// A location inside the application: pathname plus optional query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub pathname: String,
    pub search: Option<String>,
}

impl Location {
    /// Parse an origin-relative URL such as `/products/42?tab=reviews`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] for anything that is not a path.
    pub fn parse(href: &str) -> Result<Self> {
        if !href.starts_with('/') {
            return Err(ClientError::invalid_url(href, "expected an absolute path"));
        }
        let base = Url::parse("http://localhost/")?;
        let url = base
            .join(href)
            .map_err(|e| ClientError::invalid_url(href, e.to_string()))?;
        if url.host_str() != Some("localhost") {
            return Err(ClientError::invalid_url(href, "url leaves the application"));
        }
        Ok(Self {
            pathname: url.path().to_string(),
            search: url.query().filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    /// Resolve a redirect target against this location.
    ///
    /// # Errors
    ///
    /// Fails for targets on another origin.
    pub fn join(&self, target: &str) -> Result<Self> {
        if target.starts_with('/') {
            return Self::parse(target);
        }
        let base = Url::parse("http://localhost/")?.join(&self.href())?;
        let url = base
            .join(target)
            .map_err(|e| ClientError::invalid_url(target, e.to_string()))?;
        if url.host_str() != Some("localhost") {
            return Err(ClientError::invalid_url(target, "url leaves the application"));
        }
        Ok(Self {
            pathname: url.path().to_string(),
            search: url.query().filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    #[must_use]
    pub fn href(&self) -> String {
        match &self.search {
            Some(search) => format!("{}?{search}", self.pathname),
            None => self.pathname.clone(),
        }
    }

    /// URL of the payload-only representation.
    #[must_use]
    pub fn data_url(&self) -> String {
        data_url(&self.pathname, self.search.as_deref())
    }

    /// URL of a fetcher request for one route.
    #[must_use]
    pub fn fetcher_url(&self, route_id: &RouteId) -> String {
        let mut query = url::form_urlencoded::Serializer::new(self.search.clone().unwrap_or_default());
        query.append_pair(ROUTE_PARAM, route_id.as_str());
        format!("{}?{}", data_pathname(&self.pathname), query.finish())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.href())
    }
}

fn data_pathname(pathname: &str) -> String {
    let trimmed = pathname.trim_end_matches('/');
    if trimmed.is_empty() {
        format!("/{DATA_SUFFIX}")
    } else {
        format!("{trimmed}{DATA_SUFFIX}")
    }
}

/// `/products/42` becomes `/products/42.data`, `/` becomes `/.data`.
#[must_use]
pub fn data_url(pathname: &str, search: Option<&str>) -> String {
    let path = data_pathname(pathname);
    match search {
        Some(search) if !search.is_empty() => format!("{path}?{search}"),
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

    use super::*;

    #[test]
    fn test_data_urls() {
        assert_eq!(data_url("/", None), "/.data");
        assert_eq!(data_url("/products/42", Some("tab=1")), "/products/42.data?tab=1");
        assert_eq!(data_url("/products/", None), "/products.data");
    }

    #[test]
    fn test_parse_and_href() {
        let location = Location::parse("/products/42?tab=reviews").unwrap();
        assert_eq!(location.pathname, "/products/42");
        assert_eq!(location.search.as_deref(), Some("tab=reviews"));
        assert_eq!(location.href(), "/products/42?tab=reviews");
        assert!(Location::parse("products").is_err());
        assert!(Location::parse("//example.com/x").is_err());
    }

    #[test]
    fn test_fetcher_url_keeps_query() {
        let location = Location::parse("/products/42?tab=1").unwrap();
        assert_eq!(
            location.fetcher_url(&RouteId::from("products")),
            "/products/42.data?tab=1&_route=products"
        );
        let bare = Location::parse("/").unwrap();
        assert_eq!(bare.fetcher_url(&RouteId::from("root")), "/.data?_route=root");
    }

    #[test]
    fn test_join_relative_and_foreign() {
        let location = Location::parse("/products/42").unwrap();
        assert_eq!(location.join("/login").unwrap().pathname, "/login");
        assert_eq!(location.join("7").unwrap().pathname, "/products/7");
        assert!(location.join("https://example.com/").is_err());
    }
}
