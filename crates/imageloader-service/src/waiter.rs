use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::coordinator::LoadError;
use crate::utils::defer::CallOnDrop;

/// The result a [`Waiter`] is resolved with.
pub type Outcome<T> = Result<Arc<T>, LoadError>;

/// A single-resolution result slot for one registered requester.
///
/// Resolving consumes the waiter, so a waiter can never be resolved twice. A waiter that is
/// dropped without being resolved makes its [`PendingLoad`] resolve to
/// [`LoadError::Cancelled`].
#[derive(Debug)]
pub struct Waiter<T> {
    ticket: u64,
    sender: oneshot::Sender<Outcome<T>>,
}

impl<T> Waiter<T> {
    /// Creates a new waiter and the future observing it.
    ///
    /// The `ticket` identifies this particular registration, even across repeated
    /// registrations of the same requester.
    pub fn new(ticket: u64) -> (Self, PendingLoad<T>) {
        let (sender, receiver) = oneshot::channel();
        let pending = PendingLoad {
            receiver,
            on_drop: None,
        };
        (Self { ticket, sender }, pending)
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Resolves the waiter.
    ///
    /// If the observing [`PendingLoad`] was already dropped, the outcome is discarded.
    pub fn resolve(self, outcome: Outcome<T>) {
        // an error here means nobody is listening anymore
        let _ = self.sender.send(outcome);
    }
}

/// The eventual result of a load.
///
/// Dropping this future before it resolves runs its release hook, which withdraws the
/// requester's interest in the fetch.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct PendingLoad<T> {
    receiver: oneshot::Receiver<Outcome<T>>,
    on_drop: Option<CallOnDrop>,
}

impl<T> PendingLoad<T> {
    /// Installs a hook to run if this future is dropped before it resolved.
    pub(crate) fn on_drop(mut self, hook: CallOnDrop) -> Self {
        self.on_drop = Some(hook);
        self
    }
}

impl<T> Future for PendingLoad<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let outcome = match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(outcome)) => outcome,
            Poll::Ready(Err(_)) => Err(LoadError::Cancelled),
        };

        if let Some(hook) = this.on_drop.take() {
            hook.disarm();
        }
        Poll::Ready(outcome)
    }
}
