//! Line-delimited transport for JSON-RPC 2.0
//!
//! One JSON message per line. Blank lines are skipped.

use super::protocol::{JsonRpcRequest, JsonRpcResponse};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Failure reading a request line
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A malformed line, reported back to the client as a parse error
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A line that is not UTF-8, also reported as a parse error
    #[error("Parse error: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}


/// Async line transport over any buffered reader and writer
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
}

pub type StdioTransport = LineTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

impl StdioTransport {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read the next request; `Ok(None)` means the peer closed the stream
    pub async fn read_request(&mut self) -> Result<Option<JsonRpcRequest>, ReadError> {
        loop {
            let mut buf = Vec::new();
            let bytes_read = self.reader.read_until(b'\n', &mut buf).await?;

            if bytes_read == 0 {
                return Ok(None); // EOF
            }

            let line = match String::from_utf8(buf) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!("Discarding request line that is not UTF-8: {}", e);
                    return Err(ReadError::Encoding(e));
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            return match serde_json::from_str(line) {
                Ok(request) => Ok(Some(request)),
                Err(e) => {
                    tracing::error!("Failed to parse JSON-RPC request: {}", e);
                    Err(ReadError::Parse(e))
                }
            };
        }
    }

    /// Write one response line and flush
    pub async fn write_response(&mut self, response: &JsonRpcResponse) -> io::Result<()> {
        let json = serde_json::to_string(response)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::protocol::JsonRpcError;
    use serde_json::json;

    fn transport(input: &str) -> LineTransport<&[u8], Vec<u8>> {
        LineTransport::new(input.as_bytes(), Vec::new())
    }

    #[tokio::test]
    async fn test_reads_requests_and_skips_blank_lines() {
        let mut t = transport(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\n  \n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"memory/stats\"}\n",
        );
        let first = t.read_request().await.unwrap().unwrap();
        assert_eq!(first.method, "ping");
        let second = t.read_request().await.unwrap().unwrap();
        assert_eq!(second.method, "memory/stats");
        assert!(t.read_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_line_is_parse_error() {
        let mut t = transport("not json\n");
        assert!(matches!(t.read_request().await, Err(ReadError::Parse(_))));
        assert!(t.read_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_recoverable() {
        let mut input = b"\xff\xfe\n".to_vec();
        input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n");
        let mut t = LineTransport::new(input.as_slice(), Vec::new());

        let err = t.read_request().await.unwrap_err();
        assert!(matches!(err, ReadError::Encoding(_)));

        let next = t.read_request().await.unwrap().unwrap();
        assert_eq!(next.method, "ping");
        assert!(t.read_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_response_is_one_line() {
        let mut t = transport("");
        t.write_response(&JsonRpcResponse::error(
            Some(json!(1)),
            JsonRpcError::method_not_found("unknown"),
        ))
        .await
        .unwrap();

        let written = String::from_utf8(t.into_writer()).unwrap();
        assert!(written.ends_with('\n'));
        assert_eq!(written.lines().count(), 1);
        assert!(written.contains("-32601"));
    }
}
