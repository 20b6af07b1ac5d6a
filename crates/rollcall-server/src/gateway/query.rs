//! Query string reading for the wire endpoints.
//!
//! Terminal firmware repeats keys and varies their case. Reading never
//! fails: an undecodable query reads as empty and the first value of a
//! repeated key wins.

use std::convert::Infallible;

use axum::extract::{FromRequestParts, Query};
use axum::http::Uri;
use axum::http::request::Parts;

#[derive(Debug, Default, Clone)]
pub struct WireQuery(Vec<(String, String)>);

impl WireQuery {
    pub fn from_uri(uri: &Uri) -> Self {
        Query::<Vec<(String, String)>>::try_from_uri(uri)
            .map(|Query(pairs)| Self(pairs))
            .unwrap_or_default()
    }

    /// First value of `key`, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Serial number of the polling terminal, when non-blank.
    pub fn serial(&self) -> Option<&str> {
        self.get("SN").map(str::trim).filter(|s| !s.is_empty())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for WireQuery {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_uri(&parts.uri))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn query(uri: &str) -> WireQuery {
        WireQuery::from_uri(&uri.parse::<Uri>().unwrap())
    }

    #[test]
    fn repeated_keys_take_the_first_value() {
        let q = query("/cdata?SN=A1&table=ATTLOG&table=OPERLOG&sn=B2");
        assert_eq!(q.get("table"), Some("ATTLOG"));
        assert_eq!(q.serial(), Some("A1"));
    }

    #[test]
    fn keys_match_case_insensitively() {
        let q = query("/cdata?sn=A1&Options=all&stamp=9");
        assert_eq!(q.serial(), Some("A1"));
        assert_eq!(q.get("options"), Some("all"));
        assert_eq!(q.get("Stamp"), Some("9"));
    }

    #[test]
    fn blank_or_missing_serial_reads_as_none() {
        assert_eq!(query("/getrequest?SN=%20").serial(), None);
        assert_eq!(query("/getrequest").serial(), None);
    }
}
