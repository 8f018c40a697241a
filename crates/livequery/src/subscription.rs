//! Subscription handles and the events delivered to them.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

use objects::{DomainObject, RequestId, StoreError};

use crate::client::Command;

/// Which change an event frame reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new object matches the query.
    Create,
    /// A matching object changed and still matches.
    Update,
    /// A matching object was deleted.
    Delete,
    /// An existing object changed and now matches.
    Enter,
    /// A matching object changed and no longer matches.
    Leave,
}

/// What a subscription receives.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// The server accepted the subscription. Repeats after each reconnect.
    Subscribed,
    /// An object event.
    Event {
        /// The kind of change.
        kind: EventKind,
        /// The decoded object payload.
        object: DomainObject,
    },
    /// An error concerning this subscription only.
    Error(StoreError),
}

/// Receiving end of one subscription.
///
/// The stream ends when the subscription is removed by
/// [`crate::LiveQueryClient::unsubscribe`] or the client shuts down.
/// Dropping the handle unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: RequestId,
    events: mpsc::UnboundedReceiver<SubscriptionEvent>,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl Subscription {
    pub(crate) fn new(
        id: RequestId,
        events: mpsc::UnboundedReceiver<SubscriptionEvent>,
        commands: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        Self {
            id,
            events,
            commands,
        }
    }

    /// The request id the client assigned.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Waits for the next event; `None` once the subscription has ended.
    pub async fn next_event(&mut self) -> Option<SubscriptionEvent> {
        self.events.recv().await
    }
}

impl Stream for Subscription {
    type Item = SubscriptionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Unknown ids are ignored by the actor, so an explicit unsubscribe
        // followed by the drop is harmless.
        if let Some(commands) = self.commands.upgrade() {
            let _ = commands.send(Command::Unsubscribe(self.id));
        }
    }
}
