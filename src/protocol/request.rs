// ────────────────────────────────
// src/protocol/request.rs
// Minimal request framing: head up to CRLFCRLF, then Content-Length bytes.
// ────────────────────────────────
use tokio::io::{AsyncRead, AsyncReadExt};

pub const READ_CHUNK: usize = 4096;
pub const MAX_HEAD_BYTES: usize = 16 * 1024;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("connection closed before the request was complete")]
    Truncated,

    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("request exceeds {0} bytes")]
    RequestTooLarge(usize),

    #[error("malformed request line {0:?}")]
    RequestLine(String),

    #[error("malformed header line {0:?}")]
    HeaderLine(String),

    #[error("invalid Content-Length {0:?}")]
    ContentLength(String),

    #[error("unsupported Transfer-Encoding {0:?}")]
    TransferEncoding(String),

    #[error("request head is not valid UTF-8")]
    Encoding,

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl FramingError {
    /// Whether the client should get a 400 rather than a silent close.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, FramingError::Io(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub version: String,
    pub content_length: usize,
}

/// A complete request exactly as the client sent it.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub head: RequestHead,
    pub bytes: Vec<u8>,
}

/// Offset just past the blank line ending the head, if present.
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
        .map(|pos| pos + HEAD_TERMINATOR.len())
}

pub fn parse_head(head: &[u8]) -> Result<RequestHead, FramingError> {
    let text = std::str::from_utf8(head).map_err(|_| FramingError::Encoding)?;
    let mut lines = text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();

    let mut parts = request_line.split(' ');
    let (method, path, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(path), Some(version), None)
            if is_token(method) && path.starts_with('/') && version.starts_with("HTTP/") =>
        {
            (method, path, version)
        }
        _ => return Err(FramingError::RequestLine(request_line.to_string())),
    };

    let mut content_length = 0;
    for line in lines.filter(|line| !line.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FramingError::HeaderLine(line.to_string()))?;
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value
                .parse()
                .map_err(|_| FramingError::ContentLength(value.to_string()))?;
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            // Only Content-Length delimits a body here.
            return Err(FramingError::TransferEncoding(value.to_string()));
        }
    }

    Ok(RequestHead {
        method: method.to_string(),
        path: path.to_string(),
        version: version.to_string(),
        content_length,
    })
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_uppercase())
}

/// Read one request. `Ok(None)` means the peer closed before sending anything.
pub async fn read_request<R>(
    reader: &mut R,
    max_bytes: usize,
) -> Result<Option<RawRequest>, FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    let mut scanned = 0;

    let head_end = loop {
        if let Some(end) = find_head_end(&buf[scanned..]) {
            break scanned + end;
        }
        scanned = buf.len().saturating_sub(HEAD_TERMINATOR.len() - 1);
        if buf.len() > MAX_HEAD_BYTES {
            return Err(FramingError::HeadTooLarge(MAX_HEAD_BYTES));
        }

        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(FramingError::Truncated)
            };
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = parse_head(&buf[..head_end])?;
    let total = head_end
        .checked_add(head.content_length)
        .filter(|total| *total <= max_bytes)
        .ok_or(FramingError::RequestTooLarge(max_bytes))?;

    while buf.len() < total {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(FramingError::Truncated);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    buf.truncate(total);

    Ok(Some(RawRequest { head, bytes: buf }))
}
