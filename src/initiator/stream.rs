use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;

pin_project! {
    /// Passes chunks through and adds their length to a shared counter, so
    /// the bytes actually handed to the request body can be reported.
    pub struct CountingStream<S> {
        #[pin]
        inner: S,
        sent: Arc<AtomicU64>,
    }
}

impl<S> CountingStream<S> {
    pub fn new(inner: S, sent: Arc<AtomicU64>) -> Self {
        Self { inner, sent }
    }
}

impl<S> Stream for CountingStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.sent.fetch_add(chunk.len() as u64, Ordering::Relaxed);
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_counts_every_chunk() {
        let chunks = vec![
            Ok(Bytes::from_static(b"first_name,last_name\n")),
            Ok(Bytes::from_static(b"Ada,Lovelace\n")),
        ];
        let sent = Arc::new(AtomicU64::new(0));
        let stream = CountingStream::new(futures::stream::iter(chunks), sent.clone());

        let collected: Vec<_> = stream.collect().await;
        assert_eq!(collected.len(), 2);
        assert_eq!(sent.load(Ordering::Relaxed), 34);
    }

    #[tokio::test]
    async fn test_errors_pass_through_uncounted() {
        let chunks = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(std::io::Error::other("disk gone")),
        ];
        let sent = Arc::new(AtomicU64::new(0));
        let mut stream = CountingStream::new(futures::stream::iter(chunks), sent.clone());

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());
        assert_eq!(sent.load(Ordering::Relaxed), 3);
    }
}
