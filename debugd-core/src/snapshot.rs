//! Request-scoped debug snapshot: what the server sees about the caller,
//! the host it runs on, and its own process environment.
//!
//! Everything here is copied into owned values; nothing in a snapshot
//! aliases live process state.

use chrono::{Local, SecondsFormat};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{SocketAddr, ToSocketAddrs};

/// Local capture time, ISO-8601 with microseconds and UTC offset.
pub fn timestamp_now() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Package version plus the compiler the binary was built with.
pub fn runtime_version() -> String {
    format!(
        "debug-httpd {} ({}; {}-{})",
        env!("CARGO_PKG_VERSION"),
        env!("DEBUGD_RUSTC_VERSION"),
        std::env::consts::ARCH,
        std::env::consts::OS,
    )
}

// ── Snapshot ──────────────────────────────────────────────────

/// JSON body served for every GET that is not `/ping` or `/logs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugSnapshot {
    pub timestamp: String,
    pub request: RequestDetail,
    pub host: HostIdentity,
    pub environment_variables: BTreeMap<String, String>,
    pub runtime_version: String,
}

impl DebugSnapshot {
    /// Assemble a snapshot for one request. Never fails: lookups that go
    /// wrong degrade to empty values.
    pub fn capture(request: RequestDetail) -> Self {
        Self {
            timestamp: timestamp_now(),
            request,
            host: HostIdentity::collect(),
            environment_variables: environment(),
            runtime_version: runtime_version(),
        }
    }
}

/// The inbound request as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDetail {
    /// Raw request target, query string included.
    pub path: String,
    /// Header names keep the casing of their first occurrence.
    pub headers: IndexMap<String, String>,
    pub client_address: String,
    pub client_port: u16,
}

impl RequestDetail {
    pub fn new(path: &str, peer: SocketAddr, headers: &[(&str, &str)]) -> Self {
        Self {
            path: path.to_string(),
            headers: reflect_headers(headers),
            client_address: peer.ip().to_string(),
            client_port: peer.port(),
        }
    }
}

/// Copy request headers into an ordered map.
///
/// Repeated names are joined with `", "` in arrival order; the lookup is
/// case-insensitive so `Accept` and `accept` land on the same key.
pub fn reflect_headers(headers: &[(&str, &str)]) -> IndexMap<String, String> {
    let mut map: IndexMap<String, String> = IndexMap::with_capacity(headers.len());
    for (name, value) in headers {
        let existing = map
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v);
        match existing {
            Some(v) => {
                v.push_str(", ");
                v.push_str(value);
            }
            None => {
                map.insert((*name).to_string(), (*value).to_string());
            }
        }
    }
    map
}

/// Full process environment. Non-UTF-8 names or values are converted lossily.
pub fn environment() -> BTreeMap<String, String> {
    std::env::vars_os()
        .map(|(k, v)| {
            (
                k.to_string_lossy().into_owned(),
                v.to_string_lossy().into_owned(),
            )
        })
        .collect()
}

// ── Host identity ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostIdentity {
    pub hostname: String,
    pub fqdn: String,
    pub ip_addresses: Vec<String>,
}

impl HostIdentity {
    pub fn collect() -> Self {
        let hostname = match hostname::get() {
            Ok(name) => name.to_string_lossy().into_owned(),
            Err(e) => {
                tracing::debug!(error = %e, "hostname lookup failed");
                String::new()
            }
        };
        let fqdn = fully_qualified(&hostname);
        let ip_addresses = resolve_ip_addresses(&hostname);
        Self {
            hostname,
            fqdn,
            ip_addresses,
        }
    }
}

/// Addresses `host` resolves to, de-duplicated, in resolver order.
/// Empty when the lookup fails.
pub fn resolve_ip_addresses(host: &str) -> Vec<String> {
    if host.is_empty() {
        return Vec::new();
    }
    let resolved = match (host, 0u16).to_socket_addrs() {
        Ok(iter) => iter,
        Err(e) => {
            tracing::debug!(host = %host, error = %e, "host address lookup failed");
            return Vec::new();
        }
    };
    let mut ips: Vec<String> = Vec::new();
    for sa in resolved {
        let ip = sa.ip().to_string();
        if !ips.contains(&ip) {
            ips.push(ip);
        }
    }
    ips
}

/// Dotted canonical name for `host`, or `host` itself when the resolver
/// has nothing better.
pub fn fully_qualified(host: &str) -> String {
    match canonical_name(host) {
        Some(name) if name.contains('.') => name,
        _ => host.to_string(),
    }
}

#[cfg(unix)]
fn canonical_name(host: &str) -> Option<String> {
    use std::ffi::{CStr, CString};

    if host.is_empty() {
        return None;
    }
    let c_host = CString::new(host).ok()?;

    // SAFETY: `hints` is a plain C struct for which all-zero is a valid value;
    // `res` is only read when getaddrinfo reports success and is released
    // with freeaddrinfo exactly once.
    unsafe {
        let mut hints: libc::addrinfo = std::mem::zeroed();
        hints.ai_family = libc::AF_UNSPEC;
        hints.ai_flags = libc::AI_CANONNAME;

        let mut res: *mut libc::addrinfo = std::ptr::null_mut();
        if libc::getaddrinfo(c_host.as_ptr(), std::ptr::null(), &hints, &mut res) != 0
            || res.is_null()
        {
            return None;
        }

        let canon = (*res).ai_canonname;
        let name = if canon.is_null() {
            None
        } else {
            CStr::from_ptr(canon).to_str().ok().map(str::to_owned)
        };
        libc::freeaddrinfo(res);
        name
    }
}

#[cfg(not(unix))]
fn canonical_name(_host: &str) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "10.1.2.3:45678".parse().unwrap()
    }

    // ── reflect_headers ──────────────────────────────────────────

    #[test]
    fn headers_keep_case_and_order() {
        let map = reflect_headers(&[
            ("Host", "example.com"),
            ("X-Custom-Thing", "v"),
            ("accept", "*/*"),
        ]);
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Host", "X-Custom-Thing", "accept"]);
        assert_eq!(map["X-Custom-Thing"], "v");
    }

    #[test]
    fn repeated_headers_are_joined_under_first_casing() {
        let map = reflect_headers(&[
            ("Accept", "text/html"),
            ("X-A", "1"),
            ("accept", "application/json"),
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["Accept"], "text/html, application/json");
        assert!(!map.contains_key("accept"));
    }

    #[test]
    fn no_headers_gives_empty_map() {
        assert!(reflect_headers(&[]).is_empty());
    }

    // ── RequestDetail ────────────────────────────────────────────

    #[test]
    fn request_detail_keeps_raw_path_and_splits_peer() {
        let detail = RequestDetail::new("/foo?x=1", peer(), &[("User-Agent", "curl/8")]);
        assert_eq!(detail.path, "/foo?x=1");
        assert_eq!(detail.client_address, "10.1.2.3");
        assert_eq!(detail.client_port, 45678);
        assert_eq!(detail.headers["User-Agent"], "curl/8");
    }

    #[test]
    fn request_detail_ipv6_peer_has_no_brackets() {
        let v6: SocketAddr = "[::1]:8080".parse().unwrap();
        let detail = RequestDetail::new("/", v6, &[]);
        assert_eq!(detail.client_address, "::1");
        assert_eq!(detail.client_port, 8080);
    }

    // ── Snapshot shape ───────────────────────────────────────────

    #[test]
    fn snapshot_serializes_fields_in_stable_order() {
        let snap = DebugSnapshot::capture(RequestDetail::new("/", peer(), &[]));
        let json = serde_json::to_string_pretty(&snap).unwrap();
        let order = [
            "\"timestamp\"",
            "\"request\"",
            "\"host\"",
            "\"environment_variables\"",
            "\"runtime_version\"",
        ];
        let positions: Vec<usize> = order.iter().map(|k| json.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "got: {json}");
    }

    #[test]
    fn snapshot_environment_serializes_as_object() {
        let snap = DebugSnapshot::capture(RequestDetail::new("/", peer(), &[]));
        let value = serde_json::to_value(&snap).unwrap();
        assert!(value["environment_variables"].is_object());
        assert!(value["host"]["ip_addresses"].is_array());
        assert_eq!(value["request"]["client_port"], 45678);
    }

    #[test]
    fn snapshot_non_ascii_is_not_escaped() {
        let detail = RequestDetail::new("/", peer(), &[("X-Name", "héllo ✓")]);
        let snap = DebugSnapshot::capture(detail);
        let json = serde_json::to_string_pretty(&snap).unwrap();
        assert!(json.contains("héllo ✓"));
    }

    #[test]
    fn runtime_version_names_the_server_and_compiler() {
        let v = runtime_version();
        assert!(v.starts_with("debug-httpd "));
        assert!(v.contains("rustc"));
    }

    #[test]
    fn timestamp_is_iso8601() {
        let ts = timestamp_now();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok(), "got: {ts}");
    }

    // ── Host lookups degrade instead of failing ───────────────────

    #[test]
    fn unresolvable_host_has_no_addresses() {
        assert!(resolve_ip_addresses("no-such-host.invalid").is_empty());
    }

    #[test]
    fn empty_host_has_no_addresses() {
        assert!(resolve_ip_addresses("").is_empty());
    }

    #[test]
    fn localhost_resolves_to_loopback() {
        let ips = resolve_ip_addresses("localhost");
        assert!(
            ips.iter().any(|ip| ip == "127.0.0.1" || ip == "::1"),
            "got: {ips:?}"
        );
        let mut deduped = ips.clone();
        deduped.dedup();
        assert_eq!(deduped.len(), ips.len());
    }

    #[test]
    fn fqdn_falls_back_to_plain_name() {
        assert_eq!(fully_qualified("no-such-host.invalid"), "no-such-host.invalid");
        assert_eq!(fully_qualified(""), "");
    }

    #[test]
    fn host_identity_fqdn_is_never_empty_when_hostname_is_known() {
        let host = HostIdentity::collect();
        if !host.hostname.is_empty() {
            assert!(!host.fqdn.is_empty());
        }
    }
}
