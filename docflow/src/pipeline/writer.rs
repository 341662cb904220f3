//! Byte sink wrapper that counts and optionally captures what passes through.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// Forwards writes to the caller's sink, counting bytes and optionally
/// keeping a copy for the byte cache.
///
/// The copy is owned by the pipeline for one `process` call. If it grows
/// past `limit` it is dropped for good; the caller's stream is unaffected.
#[derive(Debug)]
pub struct CaptureWriter<'a, W: ?Sized> {
    inner: &'a mut W,
    capture: Option<Vec<u8>>,
    limit: Option<usize>,
    written: u64,
}

impl<'a, W: AsyncWrite + Unpin + ?Sized> CaptureWriter<'a, W> {
    /// Wraps `inner`, only counting bytes.
    pub fn counting(inner: &'a mut W) -> Self {
        Self {
            inner,
            capture: None,
            limit: None,
            written: 0,
        }
    }

    /// Wraps `inner`, counting and capturing up to `limit` bytes.
    pub fn capturing(inner: &'a mut W, limit: Option<usize>) -> Self {
        Self {
            inner,
            capture: Some(Vec::new()),
            limit,
            written: 0,
        }
    }

    /// Bytes successfully written so far.
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Returns the byte count and the capture, if it is still complete.
    pub fn into_parts(self) -> (u64, Option<Vec<u8>>) {
        (self.written, self.capture)
    }

    fn record(&mut self, bytes: &[u8]) {
        self.written += bytes.len() as u64;
        let Some(buffer) = self.capture.as_mut() else {
            return;
        };
        if self
            .limit
            .is_some_and(|limit| buffer.len() + bytes.len() > limit)
        {
            tracing::debug!(limit = ?self.limit, "Byte capture limit exceeded; dropping capture");
            self.capture = None;
        } else {
            buffer.extend_from_slice(bytes);
        }
    }
}

impl<W: AsyncWrite + Unpin + ?Sized> AsyncWrite for CaptureWriter<'_, W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut *this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.record(&buf[..*n]);
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_counting_writer() {
        let mut sink: Vec<u8> = Vec::new();
        let mut writer = CaptureWriter::counting(&mut sink);
        writer.write_all(b"hello").await.unwrap();

        let (written, capture) = writer.into_parts();
        assert_eq!(written, 5);
        assert!(capture.is_none());
        assert_eq!(sink, b"hello");
    }

    #[tokio::test]
    async fn test_capturing_writer_tees() {
        let mut sink: Vec<u8> = Vec::new();
        let mut writer = CaptureWriter::capturing(&mut sink, None);
        writer.write_all(b"hello ").await.unwrap();
        writer.write_all(b"world").await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(writer.written(), 11);

        let (_, capture) = writer.into_parts();
        assert_eq!(capture.as_deref(), Some(&b"hello world"[..]));
        assert_eq!(sink, b"hello world");
    }

    #[tokio::test]
    async fn test_capture_dropped_over_limit() {
        let mut sink: Vec<u8> = Vec::new();
        let mut writer = CaptureWriter::capturing(&mut sink, Some(8));
        writer.write_all(b"hello ").await.unwrap();
        writer.write_all(b"world").await.unwrap();

        let (written, capture) = writer.into_parts();
        assert_eq!(written, 11);
        assert!(capture.is_none());
        assert_eq!(sink, b"hello world");
    }

    #[tokio::test]
    async fn test_failed_write_is_not_recorded() {
        let mut sink = tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let mut writer = CaptureWriter::capturing(&mut sink, None);

        assert!(writer.write_all(b"data").await.is_err());
        let (written, capture) = writer.into_parts();
        assert_eq!(written, 0);
        assert_eq!(capture.as_deref(), Some(&b""[..]));
    }
}
