//! The result stream returned by `Pool::close`.

use futures::Stream;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio::sync::mpsc;

/// Results of the final stage.
///
/// Ends once the last worker of the final stage has exited. Draining it to
/// the end guarantees every worker of every stage has exited and every
/// failure has been recorded.
///
/// Results arrive in completion order, which is not submission order when a
/// stage has more than one worker or a job needed retries.
#[derive(Debug)]
pub struct Results<R> {
    rx: mpsc::Receiver<R>,
}

impl<R> Results<R> {
    pub(crate) fn new(rx: mpsc::Receiver<R>) -> Self {
        Self { rx }
    }

    /// Receives the next result, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<R> {
        self.rx.recv().await
    }

    /// Receives every remaining result until the stream ends.
    pub async fn drain(mut self) -> Vec<R> {
        let mut results = Vec::new();
        while let Some(result) = self.rx.recv().await {
            results.push(result);
        }
        results
    }
}

impl<R> Stream for Results<R> {
    type Item = R;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<R>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_drain_until_closed() {
        let (tx, rx) = mpsc::channel(4);
        for i in 0..3 {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        assert_eq!(Results::new(rx).drain().await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_stream_impl() {
        let (tx, rx) = mpsc::channel(4);
        tx.send("a").await.unwrap();
        tx.send("b").await.unwrap();
        drop(tx);

        let collected: Vec<_> = Results::new(rx).collect().await;
        assert_eq!(collected, vec!["a", "b"]);
    }
}
