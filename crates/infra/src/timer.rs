//! Periodic dispatch trigger.

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::dispatcher::{DequeueOutcome, QueueDispatcher};

/// Calls `dequeue_next` on a background thread at a fixed interval.
pub struct DispatchTimer;

/// Handle to control a running timer.
#[derive(Debug)]
pub struct DispatchTimerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl DispatchTimerHandle {
    /// Request graceful shutdown and wait for the timer thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl Drop for DispatchTimerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl DispatchTimer {
    pub fn spawn(
        dispatcher: Arc<QueueDispatcher>,
        interval: Duration,
    ) -> std::io::Result<DispatchTimerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name("conveyor-dispatch-timer".to_string())
            .spawn(move || timer_loop(&dispatcher, interval, &shutdown_rx))?;

        Ok(DispatchTimerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn timer_loop(dispatcher: &QueueDispatcher, interval: Duration, shutdown_rx: &mpsc::Receiver<()>) {
    info!(interval_ms = interval.as_millis() as u64, "dispatch timer started");

    loop {
        match shutdown_rx.recv_timeout(interval) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        match dispatcher.dequeue_next() {
            DequeueOutcome::Dispatched { job_id, .. } => {
                debug!(job_id = %job_id, "timer dispatched job");
            }
            outcome => debug!(?outcome, "timer tick"),
        }
    }

    info!("dispatch timer stopped");
}
