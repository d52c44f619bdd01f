//! Body wrappers used by the proxy's access logging.

use http_body::{Body, Frame, SizeHint};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

pub trait ResponseExt {
    fn into_boxed(self) -> Response<BoxBody<Bytes, hyper::Error>>;
}

impl ResponseExt for Response<Full<Bytes>> {
    fn into_boxed(self) -> Response<BoxBody<Bytes, hyper::Error>> {
        self.map(|b| BoxBody::new(b.map_err(|never: Infallible| match never {})))
    }
}

/// Tracks bytes streamed through a response body so the access log line can
/// report a byte count even for upstream bodies the proxy never buffers.
#[derive(Clone, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

type OnComplete = Box<dyn FnOnce(u64) + Send>;

pub struct CountingBody<B> {
    inner: B,
    counter: ByteCounter,
    on_complete: Option<OnComplete>,
}

impl<B> CountingBody<B> {
    pub fn new(inner: B) -> (Self, ByteCounter) {
        let counter = ByteCounter::default();
        (
            Self {
                inner,
                counter: counter.clone(),
                on_complete: None,
            },
            counter,
        )
    }

    /// Run `f` exactly once, with the final byte count, the moment the body
    /// reports end-of-stream — this is how the proxy logs the access line
    /// with a real transferred-byte count instead of a premature guess.
    pub fn with_completion_hook(mut self, f: impl FnOnce(u64) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }
}

impl<B> Body for CountingBody<B>
where
    B: Body<Data = Bytes, Error = hyper::Error> + Unpin,
{
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let result = Pin::new(&mut self.inner).poll_frame(cx);
        match &result {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    self.counter.0.fetch_add(data.len() as u64, Ordering::Relaxed);
                }
            }
            Poll::Ready(None) => {
                if let Some(hook) = self.on_complete.take() {
                    hook(self.counter.get());
                }
            }
            _ => {}
        }
        result
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_boxed_preserves_status_and_headers() {
        let response = Response::builder()
            .status(404)
            .header("x-custom", "value")
            .body(Full::new(Bytes::from("not found")))
            .unwrap();

        let boxed = response.into_boxed();
        assert_eq!(boxed.status(), 404);
        assert_eq!(
            boxed.headers().get("x-custom").map(|v| v.to_str().unwrap()),
            Some("value")
        );
    }

    #[tokio::test]
    async fn counting_body_tracks_bytes_streamed() {
        let body = Full::new(Bytes::from("hello world"))
            .map_err(|never: Infallible| match never {});
        let boxed = BoxBody::new(body);
        let (counted, counter) = CountingBody::new(boxed);
        let mut counted = Box::pin(counted);
        let _ = counted.as_mut().frame().await;
        assert_eq!(counter.get(), "hello world".len() as u64);
    }
}
