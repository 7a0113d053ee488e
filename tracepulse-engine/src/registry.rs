//! Subscriber registration and fan-out of analysis results.

use std::any::Any;
use std::fmt;
use std::ops::AddAssign;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, warn};

use tracepulse_types::{AnalysisName, AnalysisResult};

use crate::SubscriberError;

/// Receives analysis results as they are published.
///
/// Called synchronously from the engine's loop, once per result per cycle.
/// Implementations should return quickly; anything slow belongs on a
/// separate task fed through a channel (see [`Output::channel`](crate::Output::channel)).
///
/// Any `Fn(AnalysisName, &AnalysisResult) -> Result<(), SubscriberError>`
/// closure is a subscriber.
pub trait Subscriber: Send + Sync {
    /// Handle one result.
    fn on_result(&self, name: AnalysisName, result: &AnalysisResult) -> Result<(), SubscriberError>;
}

impl<F> Subscriber for F
where
    F: Fn(AnalysisName, &AnalysisResult) -> Result<(), SubscriberError> + Send + Sync,
{
    fn on_result(&self, name: AnalysisName, result: &AnalysisResult) -> Result<(), SubscriberError> {
        self(name, result)
    }
}

/// Adapts an infallible closure.
struct Infallible<F>(F);

impl<F> Subscriber for Infallible<F>
where
    F: Fn(AnalysisName, &AnalysisResult) + Send + Sync,
{
    fn on_result(&self, name: AnalysisName, result: &AnalysisResult) -> Result<(), SubscriberError> {
        (self.0)(name, result);
        Ok(())
    }
}

/// Identifies a registration, for [`SubscriberRegistry::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

/// Outcome of delivering one or more results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Deliveries that returned `Ok`.
    pub delivered: usize,
    /// Deliveries that returned an error or panicked.
    pub failed: usize,
    /// Weak registrations found dead and removed.
    pub pruned: usize,
}

impl AddAssign for DispatchReport {
    fn add_assign(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.pruned += other.pruned;
    }
}

enum Slot {
    Strong(Arc<dyn Subscriber>),
    Weak(Weak<dyn Subscriber>),
}

impl Slot {
    fn upgrade(&self) -> Option<Arc<dyn Subscriber>> {
        match self {
            Slot::Strong(subscriber) => Some(subscriber.clone()),
            Slot::Weak(subscriber) => subscriber.upgrade(),
        }
    }
}

struct Entry {
    id: SubscriberId,
    slot: Slot,
}

/// The set of subscribers results are fanned out to.
///
/// Subscribers are held strongly (`register`, `register_fn`) or weakly
/// (`register_weak`). A weak subscriber whose owner dropped it is skipped and
/// pruned on the next dispatch.
///
/// # Example
///
/// ```rust
/// use tracepulse_engine::SubscriberRegistry;
///
/// let registry = SubscriberRegistry::new();
/// let id = registry.register_fn(|name, result| {
///     println!("{} computed at {}", name, result.computed_at);
/// });
///
/// assert_eq!(registry.len(), 1);
/// assert!(registry.unregister(id));
/// assert!(registry.is_empty());
/// ```
pub struct SubscriberRegistry {
    entries: RwLock<Vec<Entry>>,
    next_id: AtomicU64,
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn insert(&self, slot: Slot) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push(Entry { id, slot });
        id
    }

    /// Register a subscriber, keeping it alive for as long as it stays
    /// registered.
    pub fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        self.insert(Slot::Strong(subscriber))
    }

    /// Register a closure that cannot fail.
    pub fn register_fn<F>(&self, f: F) -> SubscriberId
    where
        F: Fn(AnalysisName, &AnalysisResult) + Send + Sync + 'static,
    {
        self.register(Arc::new(Infallible(f)))
    }

    /// Register a subscriber without keeping it alive.
    ///
    /// Once the last `Arc` held by the caller is dropped, the registration
    /// lapses and is pruned on the next dispatch.
    pub fn register_weak<S>(&self, subscriber: &Arc<S>) -> SubscriberId
    where
        S: Subscriber + 'static,
    {
        let strong: Arc<dyn Subscriber> = subscriber.clone();
        self.insert(Slot::Weak(Arc::downgrade(&strong)))
    }

    /// Remove a registration.
    ///
    /// Returns `true` if it was found.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    /// Number of registrations, including weak ones not yet pruned.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a result to every subscriber in registration order.
    ///
    /// A subscriber that returns an error or panics is logged and counted;
    /// delivery continues with the next one.
    pub fn dispatch(&self, name: AnalysisName, result: &AnalysisResult) -> DispatchReport {
        // Snapshot so subscribers can (un)register from inside a callback.
        let live: Vec<(SubscriberId, Option<Arc<dyn Subscriber>>)> = self
            .entries
            .read()
            .iter()
            .map(|entry| (entry.id, entry.slot.upgrade()))
            .collect();

        let mut report = DispatchReport::default();
        let mut dead = Vec::new();

        for (id, subscriber) in live {
            let Some(subscriber) = subscriber else {
                dead.push(id);
                continue;
            };

            let outcome = catch_unwind(AssertUnwindSafe(|| subscriber.on_result(name, result)))
                .unwrap_or_else(|payload| Err(SubscriberError::Panicked(panic_message(payload))));

            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(subscriber = %id, analysis = %name, error = %e, "subscriber fault");
                }
            }
        }

        if !dead.is_empty() {
            self.entries.write().retain(|entry| !dead.contains(&entry.id));
            debug!(pruned = dead.len(), "pruned dropped subscribers");
            report.pruned = dead.len();
        }

        report
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
