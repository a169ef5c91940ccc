use http::{HeaderMap, HeaderName, HeaderValue};

use crate::protocol::HeaderMultimap;

/// Connection-scoped headers that must not cross a proxy hop
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Convert HTTP headers to the wire format
/// Supports multiple values per header name
pub fn headers_to_map(headers: &HeaderMap) -> HeaderMultimap {
    let mut map = HeaderMultimap::new();

    for (name, value) in headers.iter() {
        let key = name.as_str().to_string();
        let val = String::from_utf8_lossy(value.as_bytes()).into_owned();

        map.entry(key).or_default().push(val);
    }

    map
}

/// Convert the wire format back to an HTTP HeaderMap, appending repeated values
pub fn map_to_headers(map: &HeaderMultimap) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, values) in map.iter() {
        if let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) {
            for value in values {
                if let Ok(header_value) = HeaderValue::from_str(value) {
                    headers.append(header_name.clone(), header_value);
                }
            }
        }
    }

    headers
}

/// Whether a header only describes the current connection
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|hop| hop.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_to_map_empty() {
        let headers = HeaderMap::new();
        let map = headers_to_map(&headers);
        assert!(map.is_empty());
    }

    #[test]
    fn test_headers_to_map_groups_by_name() {
        let mut headers = HeaderMap::new();
        headers.append("accept", HeaderValue::from_static("text/html"));
        headers.append("vary", HeaderValue::from_static("origin"));
        headers.append("vary", HeaderValue::from_static("accept-encoding"));

        let map = headers_to_map(&headers);
        assert_eq!(map.len(), 2);
        assert_eq!(map["accept"], vec!["text/html"]);
        assert_eq!(map["vary"], vec!["origin", "accept-encoding"]);
    }

    #[test]
    fn test_map_to_headers_skips_unrepresentable_entries() {
        let mut map = HeaderMultimap::new();
        map.insert("x-ok".to_string(), vec!["yes".to_string()]);
        map.insert("bad name".to_string(), vec!["ignored".to_string()]);
        map.insert(
            "x-mixed".to_string(),
            vec!["fine".to_string(), "line\nbreak".to_string()],
        );

        let headers = map_to_headers(&map);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["x-ok"], "yes");
        assert_eq!(headers.get_all("x-mixed").iter().count(), 1);
    }

    #[test]
    fn test_headers_to_map_is_lossy_for_opaque_bytes() {
        let mut headers = HeaderMap::new();
        headers.insert("x-raw", HeaderValue::from_bytes(&[b'a', 0xFF]).unwrap());

        let map = headers_to_map(&headers);
        assert_eq!(map["x-raw"], vec!["a\u{FFFD}"]);
    }

    #[test]
    fn test_is_hop_by_hop() {
        assert!(is_hop_by_hop("connection"));
        assert!(is_hop_by_hop("Transfer-Encoding"));
        assert!(is_hop_by_hop("UPGRADE"));
        assert!(!is_hop_by_hop("content-length"));
        assert!(!is_hop_by_hop("x-test"));
        assert!(!is_hop_by_hop("host"));
    }

    #[test]
    fn test_repeated_values_keep_order() {
        let mut headers = HeaderMap::new();
        headers.append("x-test", "1".parse().unwrap());
        headers.append("x-test", "2".parse().unwrap());

        let map = headers_to_map(&headers);
        assert_eq!(map["x-test"], vec!["1", "2"]);

        let converted = map_to_headers(&map);
        let values: Vec<_> = converted
            .get_all("x-test")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["1", "2"]);
    }
}
