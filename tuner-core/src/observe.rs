//! Observable state for the presentation layer.
//!
//! A [`StatePublisher`] holds the current snapshot and fans every change
//! out to subscribers over crossbeam channels. Updates and broadcasts
//! happen under one lock, so subscribers see changes in the order they
//! were applied.

use std::sync::{Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender};

struct Inner<T> {
    state: T,
    subscribers: Vec<Sender<T>>,
}

pub struct StatePublisher<T: Clone> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> StatePublisher<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: initial,
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> T {
        self.lock().state.clone()
    }

    /// Receives every snapshot published from now on.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Applies `change` and publishes the result. Subscribers whose
    /// receiver was dropped are forgotten.
    pub fn update<F>(&self, change: F) -> T
    where
        F: FnOnce(&mut T),
    {
        let mut inner = self.lock();
        change(&mut inner.state);
        let published = inner.state.clone();
        inner
            .subscribers
            .retain(|tx| tx.send(published.clone()).is_ok());
        published
    }
}
