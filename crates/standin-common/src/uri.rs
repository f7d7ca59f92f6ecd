//! Path and query normalization
//!
//! Both halves of the workspace need the same idea of what a resource path
//! looks like: the stand-in server builds routing keys from it and the
//! bridge joins it onto its URL root. Everything here is a pure function.

use std::collections::BTreeMap;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::form_urlencoded;

/// Query parameters keyed and ordered by name
///
/// A name may carry several values; values keep the order they were given in.
pub type QueryMap = BTreeMap<String, Vec<String>>;

/// Everything except the RFC 3986 unreserved characters gets escaped,
/// including `/`, so a segment can never introduce a new path level.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-escape a single path segment
pub fn quote_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Percent-decode a single path segment (invalid UTF-8 is replaced)
pub fn unquote_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

/// Join raw segments into a resource path with a leading `/`
///
/// Each segment is escaped with [`quote_segment`]. An empty leading segment
/// (as produced by splitting an absolute path) collapses into the leading
/// slash rather than doubling it.
pub fn join_segments<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = segments
        .into_iter()
        .map(|segment| quote_segment(segment.as_ref()))
        .collect::<Vec<_>>()
        .join("/");

    if joined.starts_with('/') {
        joined
    } else {
        format!("/{}", joined)
    }
}

/// Split an on-the-wire path into decoded segments
///
/// `"/a/b%20c"` becomes `["", "a", "b c"]`; feeding the result back through
/// [`join_segments`] yields the same normalized path.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/').map(unquote_segment).collect()
}

/// Encode query pairs, sorted by name then value
pub fn encode_query<I, K, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(String, String)> = pairs
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
        .collect();
    pairs.sort();

    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Parse a raw query string into a [`QueryMap`]
pub fn parse_query(raw: &str) -> QueryMap {
    let mut query = QueryMap::new();
    for (name, value) in form_urlencoded::parse(raw.as_bytes()) {
        query
            .entry(name.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    query
}
