//! Time-position polling while playing.

use super::engine::EngineInput;
use crossbeam_channel::{Sender, bounded, select, tick};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Poll interval when the waveform seekbar needs smooth updates.
pub const FAST_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Default poll interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A running poller thread that feeds `EngineInput::Tick` to the engine.
///
/// Stopping is idempotent and joins the thread. Dropping the handle stops it.
pub struct PollHandle {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn spawn(interval: Duration, input: Sender<EngineInput>) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("engine-poll".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            if input.send(EngineInput::Tick).is_err() {
                                break;
                            }
                        }
                    }
                }
                tracing::trace!(target: "engine::poll", "poller exited");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop the poller and wait for its thread to exit.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the stop channel, which wakes the select
        self.stop_tx.take();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::warn!(target: "engine::poll", "poller thread panicked");
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_poller_ticks_and_stops() {
        let (tx, rx) = unbounded();
        let mut handle = PollHandle::spawn(Duration::from_millis(5), tx).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(first, EngineInput::Tick));

        handle.stop();
        assert!(!handle.is_running());
        // Second stop is a no-op
        handle.stop();

        // Drain anything sent before the stop landed; nothing arrives after
        while rx.try_recv().is_ok() {}
        std::thread::sleep(Duration::from_millis(30));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_poller_exits_when_engine_gone() {
        let (tx, rx) = unbounded();
        let mut handle = PollHandle::spawn(Duration::from_millis(1), tx).unwrap();
        drop(rx);
        // Join returns once the send fails
        handle.stop();
        assert!(!handle.is_running());
    }
}
