// src/protocol/response.rs
use hyper::StatusCode;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// `HTTP/1.1 <code> <reason>\r\nContent-Length: <n>\r\n\r\n<body>`
pub fn simple_response(status: StatusCode, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\n\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

pub async fn write_response<W>(writer: &mut W, status: StatusCode, body: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&simple_response(status, body)).await?;
    writer.flush().await
}

/// Status code from a raw response's status line.
pub fn status_code(response: &[u8]) -> Option<u16> {
    let line_end = response.windows(2).position(|w| w == b"\r\n")?;
    let line = std::str::from_utf8(&response[..line_end]).ok()?;
    let mut parts = line.splitn(3, ' ');
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}
