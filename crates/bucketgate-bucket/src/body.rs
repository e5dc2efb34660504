//! Upload stream length enforcement.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// Reader that fails once the stream proves longer or shorter than declared.
///
/// The failure surfaces to the backend as an I/O error, which aborts the
/// write; [`LengthCheckedReader::mismatch`] then reports what happened.
#[derive(Debug)]
pub(crate) struct LengthCheckedReader<R> {
    inner: R,
    declared: u64,
    read: u64,
    mismatch: bool,
}

impl<R> LengthCheckedReader<R> {
    pub(crate) const fn new(inner: R, declared: u64) -> Self {
        Self {
            inner,
            declared,
            read: 0,
            mismatch: false,
        }
    }

    /// Bytes read before the mismatch, if one was detected.
    pub(crate) const fn mismatch(&self) -> Option<u64> {
        if self.mismatch {
            Some(self.read)
        } else {
            None
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for LengthCheckedReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.mismatch {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "content length mismatch",
            )));
        }

        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let n = (buf.filled().len() - before) as u64;
                this.read += n;

                if this.read > this.declared {
                    this.mismatch = true;
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "stream longer than declared {} bytes",
                            this.declared
                        ),
                    )));
                }
                if n == 0 && buf.remaining() > 0 && this.read < this.declared {
                    this.mismatch = true;
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "stream ended after {} of {} declared bytes",
                            this.read, this.declared
                        ),
                    )));
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_exact_length_passes() {
        let mut reader = LengthCheckedReader::new(&b"hello"[..], 5);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
        assert_eq!(reader.mismatch(), None);
    }

    #[tokio::test]
    async fn test_short_stream_fails() {
        let mut reader = LengthCheckedReader::new(&b"hel"[..], 5);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(reader.mismatch(), Some(3));
    }

    #[tokio::test]
    async fn test_long_stream_fails() {
        let mut reader = LengthCheckedReader::new(&b"hello world"[..], 5);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(reader.mismatch().is_some());
    }
}
