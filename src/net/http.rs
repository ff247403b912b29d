//! Minimal answers for plain HTTP requests that arrive on the WebSocket port.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

const MAX_HEAD: usize = 4096;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub upgrade: bool,
    pub origin: Option<String>,
}

const MAX_HEADERS: usize = 32;

/// Parse a request line and headers. `Ok(None)` until the head is complete.
pub fn parse_head(buf: &[u8]) -> Result<Option<RequestHead>, httparse::Error> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    if req.parse(buf)?.is_partial() {
        return Ok(None);
    }
    let method = req.method.unwrap_or_default().to_string();
    let target = req.path.unwrap_or("/");
    let path = target.split('?').next().unwrap_or(target).to_string();

    let header = |name: &str| {
        req.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .and_then(|h| std::str::from_utf8(h.value).ok())
            .map(str::trim)
    };
    let upgrade = header("upgrade").is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    let origin = header("origin").map(str::to_string);
    Ok(Some(RequestHead { method, path, upgrade, origin }))
}

/// Peek at the request head without consuming it, so a WebSocket handshake
/// can still read it. `None` if the peer closed or sent no complete head.
pub fn peek_head(stream: &TcpStream, deadline: Duration) -> io::Result<Option<RequestHead>> {
    let started = Instant::now();
    let mut buf = [0u8; MAX_HEAD];
    loop {
        let n = stream.peek(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        let parsed = parse_head(&buf[..n]).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if let Some(head) = parsed {
            return Ok(Some(head));
        }
        if n == buf.len() || started.elapsed() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Build the full response for a non-upgrade request.
pub fn render_response(head: &RequestHead, sessions: usize, allowed_origins: &[String]) -> String {
    let (status, body) = if head.method == "GET" && head.path == "/" {
        (
            "200 OK",
            serde_json::json!({ "message": "pulsegw is running", "sessions": sessions }),
        )
    } else {
        ("404 Not Found", serde_json::json!({ "detail": "Not Found" }))
    };
    let body = body.to_string();
    let mut out = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        body.len()
    );
    if let Some(origin) = &head.origin {
        if super::origin_allowed(origin, allowed_origins) {
            out.push_str(&format!("Access-Control-Allow-Origin: {origin}\r\nVary: Origin\r\n"));
        }
    }
    out.push_str("\r\n");
    out.push_str(&body);
    out
}

pub fn respond(mut stream: TcpStream, head: &RequestHead, sessions: usize, allowed_origins: &[String]) -> io::Result<()> {
    // Drain what was peeked so closing does not reset the connection.
    let mut scratch = [0u8; MAX_HEAD];
    let _ = stream.read(&mut scratch)?;
    stream.write_all(render_response(head, sessions, allowed_origins).as_bytes())?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upgrade_request() {
        let raw = b"GET /ws/heartrate?x=1 HTTP/1.1\r\nHost: h\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nOrigin: https://app.example\r\n\r\n";
        let head = parse_head(raw).unwrap().unwrap();
        assert_eq!(head.method, "GET");
        assert_eq!(head.path, "/ws/heartrate");
        assert!(head.upgrade);
        assert_eq!(head.origin.as_deref(), Some("https://app.example"));
    }

    #[test]
    fn incomplete_head_is_none() {
        assert_eq!(parse_head(b"GET / HTTP/1.1\r\nHost: h\r\n"), Ok(None));
        assert_eq!(parse_head(b"GET /ws/heart"), Ok(None));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_head(b"\x00\x01\x02 nonsense\r\n\r\n").is_err());
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let head = parse_head(b"GET /ws HTTP/1.1\r\nUPGRADE: WebSocket\r\norigin:  https://a.example \r\n\r\n")
            .unwrap()
            .unwrap();
        assert!(head.upgrade);
        assert_eq!(head.origin.as_deref(), Some("https://a.example"));
    }

    #[test]
    fn root_answers_with_session_count() {
        let head = parse_head(b"GET / HTTP/1.1\r\nOrigin: https://a.example\r\n\r\n").unwrap().unwrap();
        let resp = render_response(&head, 3, &[]);
        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(resp.contains("Access-Control-Allow-Origin: https://a.example"));
        assert!(resp.ends_with(r#"{"message":"pulsegw is running","sessions":3}"#));
    }

    #[test]
    fn other_paths_are_404_and_origin_is_enforced() {
        let head = parse_head(b"POST /upload HTTP/1.1\r\nOrigin: https://x.example\r\n\r\n").unwrap().unwrap();
        let resp = render_response(&head, 0, &["https://a.example".to_string()]);
        assert!(resp.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(!resp.contains("Access-Control-Allow-Origin"));
    }
}
