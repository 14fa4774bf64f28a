use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use shared::error::{Error, Result};

/// Promise is the pending result of an operation queued on a peer
/// connection.
///
/// It is fulfilled by the operation thread once the task ran. A task that
/// was discarded because the connection closed first resolves to
/// [`Error::ErrConnectionClosed`]. Promises can be awaited, or waited on
/// from a thread that is not the operation thread itself.
#[derive(Debug)]
pub struct Promise<T> {
    rx: oneshot::Receiver<Result<T>>,
}

/// Resolver is the producing half of a [`Promise`].
#[derive(Debug)]
pub(crate) struct Resolver<T> {
    tx: oneshot::Sender<Result<T>>,
}

pub(crate) fn channel<T>() -> (Resolver<T>, Promise<T>) {
    let (tx, rx) = oneshot::channel();
    (Resolver { tx }, Promise { rx })
}

impl<T> Resolver<T> {
    pub(crate) fn resolve(self, result: Result<T>) {
        // the caller may have dropped its promise
        let _ = self.tx.send(result);
    }
}

impl<T> Promise<T> {
    /// rejected is a promise that already failed
    pub(crate) fn rejected(err: Error) -> Self {
        let (resolver, promise) = channel();
        resolver.resolve(Err(err));
        promise
    }

    /// wait blocks the current thread until the operation completed.
    ///
    /// Calling it from an event handler deadlocks, since handlers run on
    /// the thread that fulfills the promise.
    pub fn wait(self) -> Result<T> {
        match self.rx.blocking_recv() {
            Ok(result) => result,
            Err(_) => Err(Error::ErrConnectionClosed),
        }
    }

    /// try_take returns the result if the operation already completed.
    pub fn try_take(&mut self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::ErrConnectionClosed)),
        }
    }
}

impl<T> Future for Promise<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ErrConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}
