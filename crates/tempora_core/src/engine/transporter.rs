//! Background transport.

use super::EngineInner;
use crate::error::CoreResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Sleep after a run that found nothing, for buffers whose wait returns
/// immediately.
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Handle to a thread that keeps moving buffered writes into the permanent
/// store.
///
/// Each round waits until the buffer is transportable, moves up to
/// `transport_batch_size` writes, then sleeps for the buffer's advertised
/// pause. A refused write is logged and retried after `transport_wait`.
/// Stopping (or dropping) the handle joins the thread.
pub struct Transporter {
    engine: Arc<EngineInner>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Transporter {
    pub(super) fn spawn(engine: Arc<EngineInner>) -> CoreResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let worker = Arc::clone(&engine);
        let handle = thread::Builder::new()
            .name("tempora-transport".into())
            .spawn(move || run(&worker, &flag))?;
        Ok(Self {
            engine,
            stop,
            handle: Some(handle),
        })
    }

    /// Asks the thread to stop and waits for it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.engine.buffer.interrupt_wait();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("transport thread panicked");
            }
        }
    }

    /// Whether the thread is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Transporter {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Transporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transporter")
            .field("running", &self.is_running())
            .finish()
    }
}

fn run(engine: &EngineInner, stop: &AtomicBool) {
    let batch = engine.config.transport_batch_size.max(1);
    tracing::info!(batch, "transporter started");
    while !stop.load(Ordering::Acquire) {
        engine.buffer.wait_until_transportable();
        if stop.load(Ordering::Acquire) {
            break;
        }
        match engine.transport_batch(batch) {
            Ok(0) => thread::sleep(IDLE_BACKOFF),
            Ok(_) => {
                let pause = engine.buffer.transport_pause();
                if !pause.is_zero() {
                    thread::sleep(pause);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "background transport failed, backing off");
                thread::sleep(engine.config.transport_wait);
            }
        }
    }
    tracing::info!(remaining = engine.buffer.len(), "transporter stopped");
}
