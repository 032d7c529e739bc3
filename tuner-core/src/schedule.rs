//! # Frame Scheduler
//!
//! A cancellable repeating task on a dedicated thread, paced by a
//! crossbeam ticker and stopped through a shutdown channel.
//!
//! Cancellation joins the worker, so once [`RepeatingTask::cancel`]
//! returns the task body will never run again.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tracing::{debug, warn};

/// Runs `tick(&mut state)` once immediately and then every `period` until
/// cancelled. The state is handed back on cancellation.
pub struct RepeatingTask<S: Send + 'static> {
    name: String,
    shutdown_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<S>>,
}

impl<S: Send + 'static> RepeatingTask<S> {
    pub fn spawn<F>(name: &str, period: Duration, mut state: S, mut tick: F) -> io::Result<Self>
    where
        F: FnMut(&mut S) + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let ticker = crossbeam_channel::tick(period);
        let thread_name = name.to_string();

        let handle = thread::Builder::new().name(thread_name.clone()).spawn(move || {
            debug!("[{thread_name}] started, period {:?}", period);
            tick(&mut state);
            loop {
                crossbeam_channel::select! {
                    recv(ticker) -> _ => {
                        if cancelled(&shutdown_rx) {
                            break;
                        }
                        tick(&mut state);
                    },
                    recv(shutdown_rx) -> _ => break,
                }
            }
            debug!("[{thread_name}] finished");
            state
        })?;

        Ok(Self {
            name: name.to_string(),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Stops the task and waits for the current tick to finish.
    ///
    /// Returns `None` if the task body panicked.
    pub fn cancel(mut self) -> Option<S> {
        self.join()
    }

    fn join(&mut self) -> Option<S> {
        // Dropping the sender disconnects the channel and wakes the select.
        self.shutdown_tx.take();
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(state) => Some(state),
            Err(_) => {
                warn!("[{}] task panicked", self.name);
                None
            }
        }
    }
}

/// A message or a disconnect both mean stop.
fn cancelled(shutdown_rx: &Receiver<()>) -> bool {
    !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty))
}

impl<S: Send + 'static> Drop for RepeatingTask<S> {
    fn drop(&mut self) {
        self.join();
    }
}
