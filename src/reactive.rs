//! Observable value holders
//!
//! A [`ReactiveProperty`] owns a current value and an ordered list of
//! observers. Every `set` notifies all observers, even when the value did not
//! change. `subscribe` replays the current value to the new observer before
//! any future writes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    value: T,
    observers: Vec<(u64, Observer<T>)>,
    next_id: u64,
}

impl<T> Inner<T> {
    fn snapshot_observers(&self) -> Vec<Observer<T>> {
        self.observers.iter().map(|(_, f)| Arc::clone(f)).collect()
    }
}

fn notify<T>(observers: &[Observer<T>], value: &T) {
    for observer in observers {
        observer(value);
    }
}

/// Current value plus multicast change notification
pub struct ReactiveProperty<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Observers never run under the lock, so a poisoned lock still holds a consistent value
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> ReactiveProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                value,
                observers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    pub fn get(&self) -> T {
        lock(&self.inner).value.clone()
    }

    /// Store `value` and notify every observer in registration order
    pub fn set(&self, value: T) {
        self.update(move |_| value);
    }

    /// Read-modify-write under the lock; notifies with the new value
    ///
    /// `f` must not touch this property.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> T {
        let (next, observers) = {
            let mut inner = lock(&self.inner);
            let next = f(&inner.value);
            inner.value = next.clone();
            (next, inner.snapshot_observers())
        };
        notify(&observers, &next);
        next
    }

    /// Write the value `f` returns, if any, atomically with reading the current one
    ///
    /// Returns whether a write (and notification) happened. `f` must not touch
    /// this property.
    pub fn set_if(&self, f: impl FnOnce(&T) -> Option<T>) -> bool {
        let (next, observers) = {
            let mut inner = lock(&self.inner);
            let Some(next) = f(&inner.value) else {
                return false;
            };
            inner.value = next.clone();
            (next, inner.snapshot_observers())
        };
        notify(&observers, &next);
        true
    }

    /// Deliver the current value immediately, then every subsequent write
    pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let observer: Observer<T> = Arc::new(observer);
        let current = self.get();
        observer(&current);
        self.register(observer)
    }

    /// Deliver every subsequent write, without replaying the current value
    pub fn observe_changes(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.register(Arc::new(observer))
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.inner).observers.len()
    }

    fn register(&self, observer: Observer<T>) -> Subscription {
        let id = {
            let mut inner = lock(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.observers.push((id, observer));
            id
        };

        let weak: Weak<Mutex<Inner<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).observers.retain(|(observer_id, _)| *observer_id != id);
            }
        })
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ReactiveProperty<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("ReactiveProperty")
            .field("value", &inner.value)
            .field("observers", &inner.observers.len())
            .finish()
    }
}

/// Handle that detaches its observer when dropped
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Group of subscriptions released together
#[derive(Default)]
pub struct CompositeSubscription {
    subscriptions: Vec<Subscription>,
}

impl CompositeSubscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

/// Observe `f(a, b)` whenever either property is written
///
/// The observer receives the combined value once on subscription.
pub fn combine_latest<A, B, R>(
    a: &ReactiveProperty<A>,
    b: &ReactiveProperty<B>,
    combine: impl Fn(&A, &B) -> R + Send + Sync + 'static,
    observer: impl Fn(&R) + Send + Sync + 'static,
) -> CompositeSubscription
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    R: 'static,
{
    let combine = Arc::new(combine);
    let observer = Arc::new(observer);

    observer(&combine(&a.get(), &b.get()));

    let mut subscriptions = CompositeSubscription::new();
    {
        let b_inner = Arc::downgrade(&b.inner);
        let combine = Arc::clone(&combine);
        let observer = Arc::clone(&observer);
        subscriptions.add(a.observe_changes(move |a_value| {
            if let Some(b_inner) = b_inner.upgrade() {
                let b_value = lock(&b_inner).value.clone();
                observer(&combine(a_value, &b_value));
            }
        }));
    }
    {
        let a_inner = Arc::downgrade(&a.inner);
        subscriptions.add(b.observe_changes(move |b_value| {
            if let Some(a_inner) = a_inner.upgrade() {
                let a_value = lock(&a_inner).value.clone();
                observer(&combine(&a_value, b_value));
            }
        }));
    }
    subscriptions
}
