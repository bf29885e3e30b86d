use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::task::{Context, Poll, Waker};

use tracing::{debug, trace};

/// Reason of scopes cancelled by [`Trigger::cancel`].
pub const CANCELLED: &str = "cancelled";
/// Reason of scopes cancelled because their parent scope was.
pub const PARENT_CANCELLED: &str = "parent cancelled";

struct Shared {
    name: String,

    // set exactly once, by whoever cancels the scope first
    reason: OnceLock<&'static str>,

    waited: AtomicU64,
    wakers: Mutex<HashMap<u64, Waker>>,

    // scopes derived from this one, they are cancelled together with it
    children: Mutex<Vec<Weak<Shared>>>,
}

impl Shared {
    fn new(name: String) -> Arc<Self> {
        Arc::new(Shared {
            name,
            reason: OnceLock::new(),
            waited: AtomicU64::new(0),
            wakers: Mutex::new(HashMap::new()),
            children: Mutex::new(Vec::new()),
        })
    }

    #[inline]
    fn cancelled(&self) -> bool {
        self.reason.get().is_some()
    }

    fn next_id(&self) -> u64 {
        self.waited.fetch_add(1, Ordering::SeqCst)
    }

    fn wakers(&self) -> MutexGuard<'_, HashMap<u64, Waker>> {
        // a poisoned map is still a valid map, wakers hold no invariant
        self.wakers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn children(&self) -> MutexGuard<'_, Vec<Weak<Shared>>> {
        self.children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns true if this call flipped the scope to cancelled, only then
    /// `reason` is recorded.
    fn cancel(&self, reason: &'static str) -> bool {
        if self.reason.set(reason).is_err() {
            return false;
        }

        debug!(message = "tripwire cancelled", name = %self.name, reason);

        self.wakers().drain().for_each(|(id, waker)| {
            trace!(message = "wake tripwire", name = %self.name, id);

            waker.wake()
        });

        let children = std::mem::take(&mut *self.children());
        for child in children {
            if let Some(child) = child.upgrade() {
                child.cancel(PARENT_CANCELLED);
            }
        }

        true
    }

    fn derive(self: &Arc<Self>, name: String) -> Arc<Shared> {
        let child = Shared::new(name);

        {
            let mut children = self.children();
            // drop entries of children which are gone already
            children.retain(|child| child.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }

        // the parent might be cancelled before the child is registered, and
        // in that case the parent never sees it
        if self.cancelled() {
            child.cancel(PARENT_CANCELLED);
        }

        child
    }
}

/// The cancelling side of a scope.
///
/// Triggers can be cloned, so any number of owners can cancel the same scope.
/// Dropping a trigger does not cancel anything.
#[derive(Clone)]
pub struct Trigger {
    shared: Arc<Shared>,
}

impl Trigger {
    /// Cancel all associated tripwires, make them immediately resolved. Scopes
    /// derived from this one are cancelled as well.
    ///
    /// Cancel is idempotent, `true` is returned only by the call which actually
    /// cancelled the scope.
    pub fn cancel(&self) -> bool {
        self.shared.cancel(CANCELLED)
    }

    /// Like `cancel`, but records why. Of concurrent cancels only the first
    /// one's reason is kept, cancels cascaded from a parent included.
    pub fn cancel_with(&self, reason: &'static str) -> bool {
        self.shared.cancel(reason)
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled()
    }

    #[inline]
    pub fn reason(&self) -> Option<&'static str> {
        self.shared.reason.get().copied()
    }

    /// Returns a new `Tripwire` which observes this scope.
    pub fn tripwire(&self) -> Tripwire {
        Tripwire::from_shared(Arc::clone(&self.shared))
    }
}

/// The observing side of a scope. It is a `Future` which resolves once the
/// scope is cancelled.
pub struct Tripwire {
    shared: Arc<Shared>,
    id: u64,
}

impl Clone for Tripwire {
    fn clone(&self) -> Self {
        Self::from_shared(Arc::clone(&self.shared))
    }
}

impl Drop for Tripwire {
    fn drop(&mut self) {
        self.shared.wakers().remove(&self.id);
    }
}

impl Future for Tripwire {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.shared.cancelled() {
            return Poll::Ready(());
        }

        self.shared.wakers().insert(self.id, cx.waker().clone());

        // cancel might happen between the first check and the registration,
        // the waker map is drained already in that case.
        if self.shared.cancelled() {
            self.shared.wakers().remove(&self.id);
            return Poll::Ready(());
        }

        Poll::Pending
    }
}

impl Tripwire {
    /// Create a new root scope.
    pub fn new(name: impl Into<String>) -> (Trigger, Tripwire) {
        let shared = Shared::new(name.into());

        (
            Trigger {
                shared: Arc::clone(&shared),
            },
            Tripwire::from_shared(shared),
        )
    }

    /// Derive a child scope. Cancelling this scope cancels the child too, but
    /// cancelling the child never affects this scope.
    pub fn child(&self, name: impl Into<String>) -> (Trigger, Tripwire) {
        let shared = self.shared.derive(name.into());

        (
            Trigger {
                shared: Arc::clone(&shared),
            },
            Tripwire::from_shared(shared),
        )
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled()
    }

    /// Why the scope was cancelled, `None` while it is not.
    #[inline]
    pub fn reason(&self) -> Option<&'static str> {
        self.shared.reason.get().copied()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    fn from_shared(shared: Arc<Shared>) -> Tripwire {
        let id = shared.next_id();

        Tripwire { shared, id }
    }
}
