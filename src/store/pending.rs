// Pending page results.
// A ticket settles the future of exactly one generation; settling consumes it.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{Result, StoreError};

use super::resolver::PageResult;

/// Settlement handle for a caller-blocking request.
#[derive(Debug)]
pub(crate) struct Ticket {
    generation: u64,
    sender: oneshot::Sender<Result<PageResult>>,
}

impl Ticket {
    /// Create a ticket and the future it settles.
    pub(crate) fn issue(generation: u64) -> (Self, PageFuture) {
        let (sender, receiver) = oneshot::channel();
        let future = PageFuture {
            generation: Some(generation),
            state: FutureState::Waiting(receiver),
        };
        (Self { generation, sender }, future)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn settle(self, result: Result<PageResult>) {
        // The caller may have dropped its future.
        let _ = self.sender.send(result);
    }

    pub(crate) fn cancel(self) {
        self.settle(Err(StoreError::Cancelled));
    }
}

#[derive(Debug)]
enum FutureState {
    Ready(Option<Result<PageResult>>),
    Waiting(oneshot::Receiver<Result<PageResult>>),
}

/// Future returned by [`Store::get_page`](super::Store::get_page).
///
/// The request is already dispatched when this is returned; awaiting only
/// waits for its outcome.
#[derive(Debug)]
#[must_use = "the page result is only observable by awaiting the future"]
pub struct PageFuture {
    generation: Option<u64>,
    state: FutureState,
}

impl PageFuture {
    pub(crate) fn ready(result: Result<PageResult>) -> Self {
        Self {
            generation: None,
            state: FutureState::Ready(Some(result)),
        }
    }

    /// Generation of the network request behind this future, if one was dispatched.
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    /// Whether the outcome was known without a network round trip.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, FutureState::Ready(_))
    }
}

impl Future for PageFuture {
    type Output = Result<PageResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            FutureState::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(StoreError::Cancelled)))
            }
            FutureState::Waiting(receiver) => Pin::new(receiver)
                .poll(cx)
                .map(|outcome| outcome.unwrap_or(Err(StoreError::Cancelled))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ticket_settles_future() {
        let (ticket, future) = Ticket::issue(3);
        assert_eq!(future.generation(), Some(3));
        assert!(!future.is_ready());

        ticket.settle(Err(StoreError::OutOfRange {
            first_page: 4,
            page_count: 1,
        }));
        assert!(matches!(
            future.await,
            Err(StoreError::OutOfRange { first_page: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_ticket() {
        let (ticket, future) = Ticket::issue(1);
        ticket.cancel();
        assert!(matches!(future.await, Err(StoreError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropped_ticket_reads_as_cancel() {
        let (ticket, future) = Ticket::issue(1);
        drop(ticket);
        assert!(matches!(future.await, Err(StoreError::Cancelled)));
    }
}
