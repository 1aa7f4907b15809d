//! Session lifecycle events and their subscribers.

use crate::error::AuthError;
use crate::state::{AuthOperation, Session};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Kinds of events a subscriber can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionEventKind {
    /// The session was replaced, refreshed or cleared.
    SessionChanged,
    /// The session ended and the user must sign in again.
    SessionExpired,
    /// A refresh attempt failed.
    RefreshFailed,
    /// A call into the identity collaborator failed.
    AuthError,
}

impl SessionEventKind {
    /// Event name as exposed to the application.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SessionChanged => "session-changed",
            Self::SessionExpired => "session-expired",
            Self::RefreshFailed => "refresh-failed",
            Self::AuthError => "auth-error",
        }
    }
}

impl fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The current session is now `session` (`None` when signed out).
    SessionChanged {
        /// New session
        session: Option<Session>,
    },

    /// The session could not be renewed and was cleared.
    SessionExpired,

    /// A refresh attempt failed with `error`.
    RefreshFailed {
        /// Final error of the attempt
        error: AuthError,
    },

    /// `operation` failed with `error`.
    AuthError {
        /// Failed operation
        operation: AuthOperation,
        /// Classified error
        error: AuthError,
    },
}

impl SessionEvent {
    /// Kind of this event.
    #[must_use]
    pub const fn kind(&self) -> SessionEventKind {
        match self {
            Self::SessionChanged { .. } => SessionEventKind::SessionChanged,
            Self::SessionExpired => SessionEventKind::SessionExpired,
            Self::RefreshFailed { .. } => SessionEventKind::RefreshFailed,
            Self::AuthError { .. } => SessionEventKind::AuthError,
        }
    }
}

/// Handle returned by [`SessionEvents::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    handlers: BTreeMap<SessionEventKind, Vec<(SubscriptionId, Handler)>>,
}

/// Subscriber registry.
///
/// Handlers of one kind run in subscription order. Handlers are called
/// outside the registry lock, so a handler may subscribe or unsubscribe.
/// A panicking handler is logged and does not stop the remaining handlers.
#[derive(Default)]
pub struct SessionEvents {
    subscribers: Mutex<Subscribers>,
}

impl SessionEvents {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`.
    pub fn subscribe<F>(&self, kind: SessionEventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let mut subscribers = self.lock();
        let id = SubscriptionId(subscribers.next_id);
        subscribers.next_id += 1;
        subscribers
            .handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock();
        let mut removed = false;
        for handlers in subscribers.handlers.values_mut() {
            let before = handlers.len();
            handlers.retain(|(sub, _)| *sub != id);
            removed |= handlers.len() != before;
        }
        removed
    }

    /// Deliver `event` to every handler of its kind.
    pub fn emit(&self, event: &SessionEvent) {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .lock()
            .handlers
            .get(&kind)
            .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        tracing::trace!(event = %kind, handlers = handlers.len(), "Emitting session event");

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!(event = %kind, "Session event handler panicked");
            }
        }
    }

    /// Number of handlers registered for `kind`.
    #[must_use]
    pub fn subscriber_count(&self, kind: SessionEventKind) -> usize {
        self.lock().handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Remove every handler.
    pub fn clear(&self) {
        self.lock().handlers.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SessionEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribers = self.lock();
        let counts: BTreeMap<_, _> = subscribers
            .handlers
            .iter()
            .map(|(kind, hs)| (kind.as_str(), hs.len()))
            .collect();
        f.debug_struct("SessionEvents")
            .field("subscribers", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballotbox_testing::Recorder;

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let events = SessionEvents::new();
        let order = Recorder::new();

        for label in ["first", "second", "third"] {
            let order = order.clone();
            events.subscribe(SessionEventKind::SessionExpired, move |_| order.push(label));
        }
        events.emit(&SessionEvent::SessionExpired);

        assert_eq!(order.items(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_only_matching_kind_receives() {
        let events = SessionEvents::new();
        let seen = Recorder::new();

        let seen_in_handler = seen.clone();
        events.subscribe(SessionEventKind::RefreshFailed, move |e| {
            seen_in_handler.push(e.kind());
        });
        events.emit(&SessionEvent::SessionExpired);
        events.emit(&SessionEvent::RefreshFailed {
            error: AuthError::InvalidRefreshToken,
        });

        assert_eq!(seen.items(), vec![SessionEventKind::RefreshFailed]);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_others() {
        let events = SessionEvents::new();
        let seen = Recorder::new();

        events.subscribe(SessionEventKind::SessionExpired, |_| {
            std::panic::panic_any("handler failure");
        });
        let seen_in_handler = seen.clone();
        events.subscribe(SessionEventKind::SessionExpired, move |_| seen_in_handler.push(()));

        events.emit(&SessionEvent::SessionExpired);
        events.emit(&SessionEvent::SessionExpired);

        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let events = SessionEvents::new();
        let seen = Recorder::new();

        let seen_in_handler = seen.clone();
        let id = events.subscribe(SessionEventKind::SessionChanged, move |_| {
            seen_in_handler.push(());
        });
        assert_eq!(events.subscriber_count(SessionEventKind::SessionChanged), 1);

        assert!(events.unsubscribe(id));
        assert!(!events.unsubscribe(id));
        events.emit(&SessionEvent::SessionChanged { session: None });

        assert!(seen.is_empty());
        assert_eq!(events.subscriber_count(SessionEventKind::SessionChanged), 0);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(SessionEventKind::SessionChanged.to_string(), "session-changed");
        assert_eq!(SessionEventKind::AuthError.as_str(), "auth-error");
    }
}
