//! Periodic background save of every world.
//!
//! Each tick also drops the empty entries left by reads of unknown chunks.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Sender, bounded, select, tick};

use blockstore_config::AutosaveConfig;

use crate::registry::StoreRegistry;

/// Saves a registry on a fixed interval until stopped or dropped.
#[derive(Debug)]
pub struct Autosaver {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Autosaver {
    /// Starts saving `registry` every `interval`.
    pub fn start(registry: Arc<StoreRegistry>, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticker = tick(interval);

        let handle = std::thread::Builder::new()
            .name("blockstore-autosave".into())
            .spawn(move || {
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            let report = registry.save_all();
                            if !report.is_ok() {
                                tracing::warn!(failed = report.failed(), "autosave incomplete");
                            }
                            registry.forget_absent();
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
            })?;

        tracing::debug!(interval_secs = interval.as_secs_f64(), "autosave started");
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Starts an autosaver per `config`, or returns `None` when disabled.
    pub fn from_config(
        registry: Arc<StoreRegistry>,
        config: &AutosaveConfig,
    ) -> std::io::Result<Option<Self>> {
        if config.interval_secs == 0 {
            return Ok(None);
        }
        Self::start(registry, Duration::from_secs(config.interval_secs)).map(Some)
    }

    /// Stops the thread and waits for an in-progress save to finish.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        // Dropping the sender disconnects the stop channel.
        self.stop.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("autosave thread panicked");
        }
    }
}

impl Drop for Autosaver {
    fn drop(&mut self) {
        self.halt();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
