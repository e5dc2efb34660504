//! Response and upload bodies.

use std::fmt::Display;
use std::io;

use bucketgate_bucket::ObjectBody;
use bytes::{Bytes, BytesMut};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Body, Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{ProxyError, ProxyResult};

/// Read size when streaming objects.
const CHUNK_SIZE: usize = 64 * 1024;

/// Body of every gateway response.
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

/// A body with fixed content.
pub fn full(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// A body with no content.
pub fn empty() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Streams object content in chunks without buffering it whole.
pub fn stream_object(body: ObjectBody) -> ResponseBody {
    let chunks = futures_util::stream::unfold(Some(body), |state| async move {
        let mut body = state?;
        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        match body.read_buf(&mut buf).await {
            Ok(0) => None,
            Ok(_) => Some((Ok(Frame::data(buf.freeze())), Some(body))),
            Err(e) => Some((Err(e), None)),
        }
    });
    StreamBody::new(chunks).boxed_unsync()
}

/// An upload written to an anonymous temporary file.
///
/// The file is removed by the OS once the handle is dropped.
#[derive(Debug)]
pub struct SpooledUpload {
    /// Readable, seekable handle positioned at the end of the data.
    pub file: tokio::fs::File,
    /// Bytes received.
    pub len: u64,
}

/// Copies a request body to a temporary file, refusing more than `limit` bytes.
pub async fn spool<B>(mut body: B, limit: u64) -> ProxyResult<SpooledUpload>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Display,
{
    if body.size_hint().lower() > limit {
        return Err(ProxyError::PayloadTooLarge { limit });
    }

    let mut file = tokio::fs::File::from_std(tempfile::tempfile()?);
    let mut len: u64 = 0;

    while let Some(frame) = body.frame().await {
        let frame =
            frame.map_err(|e| ProxyError::bad_request(format!("failed to read request body: {e}")))?;
        let Ok(data) = frame.into_data() else {
            continue;
        };
        len += data.len() as u64;
        if len > limit {
            return Err(ProxyError::PayloadTooLarge { limit });
        }
        file.write_all(&data).await?;
    }
    file.flush().await?;

    Ok(SpooledUpload { file, len })
}
