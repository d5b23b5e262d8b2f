//! HTTP request-head inspection.

use httparse::{Request, Status, EMPTY_HEADER};

/// L7 identity pulled out of a plaintext HTTP request head.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HttpInfo {
    pub host: Option<String>,
    pub user_agent: Option<String>,
}

/// Scan the first 1024 bytes of a TCP payload for a request head and pull
/// out the `Host` and `User-Agent` headers (case-insensitive).
///
/// Partial heads are fine: whatever headers fit in the first segment are
/// used. Returns `None` when the payload is not an HTTP request.
pub fn inspect(payload: &[u8]) -> Option<HttpInfo> {
    let window = &payload[..payload.len().min(1024)];
    let mut headers = [EMPTY_HEADER; 32];
    let mut req = Request::new(&mut headers);

    match req.parse(window) {
        Ok(Status::Complete(_)) | Ok(Status::Partial) => {}
        Err(_) => return None,
    }

    let mut info = HttpInfo::default();
    for header in req.headers.iter() {
        if header.name.eq_ignore_ascii_case("host") {
            info.host = std::str::from_utf8(header.value)
                .ok()
                .map(|v| v.trim().to_string());
        } else if header.name.eq_ignore_ascii_case("user-agent") {
            info.user_agent = std::str::from_utf8(header.value)
                .ok()
                .map(|v| v.trim().to_string());
        }
    }

    if info.host.is_none() && info.user_agent.is_none() {
        return None;
    }
    Some(info)
}
