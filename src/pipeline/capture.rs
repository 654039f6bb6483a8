use std::{
    io,
    ops::ControlFlow,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use crate::logging::Logger;

const THREAD_NAME: &str = "kinect-capture";

/// Work performed once per loop iteration on the capture thread.
///
/// Pacing comes from the blocking waits inside the cycle; the loop itself
/// never sleeps.
pub trait CaptureWorker: Send + 'static {
    fn capture_cycle(&mut self) -> ControlFlow<()>;
}

/// Dedicated thread running [`CaptureWorker::capture_cycle`] until stopped.
///
/// The stop flag is one-shot. Joining hands the worker back so the owner can
/// release its resources after the thread is gone.
#[derive(Debug)]
pub struct CaptureLoop<W> {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<W>>,
    log: Logger,
}

impl<W: CaptureWorker> CaptureLoop<W> {
    pub fn spawn(mut worker: W, log: Logger) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let thread_log = log.clone();

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                thread_log.debug(format_args!("capture thread has started"));
                let mut cycles: u64 = 0;
                while !stop_flag.load(Ordering::Acquire) {
                    cycles += 1;
                    if worker.capture_cycle().is_break() {
                        thread_log.debug(format_args!("capture worker finished on its own"));
                        break;
                    }
                }
                thread_log.debug(format_args!("capture thread exiting after {cycles} cycles"));
                worker
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
            log,
        })
    }
}

impl<W> CaptureLoop<W> {
    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signals stop and blocks until the thread has exited.
    ///
    /// Returns the worker on the first call; later calls return `None`. A
    /// worker that panicked is lost and also yields `None`.
    pub fn ensure_completion(&mut self) -> Option<W> {
        self.signal_stop();
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(worker) => Some(worker),
            Err(_) => {
                self.log
                    .error(format_args!("capture thread panicked; its resources were dropped"));
                None
            }
        }
    }
}

impl<W> Drop for CaptureLoop<W> {
    fn drop(&mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::AtomicUsize,
        time::{Duration, Instant},
    };

    struct Counting {
        cycles: Arc<AtomicUsize>,
        limit: Option<usize>,
    }

    impl CaptureWorker for Counting {
        fn capture_cycle(&mut self) -> ControlFlow<()> {
            let done = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
            thread::sleep(Duration::from_millis(1));
            match self.limit {
                Some(limit) if done >= limit => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        }
    }

    fn wait_for(cycles: &AtomicUsize, at_least: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while cycles.load(Ordering::SeqCst) < at_least && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn no_cycles_after_completion() {
        let cycles = Arc::new(AtomicUsize::new(0));
        let worker = Counting {
            cycles: cycles.clone(),
            limit: None,
        };
        let mut capture = CaptureLoop::spawn(worker, Logger::new("test")).unwrap();
        wait_for(&cycles, 3);

        let worker = capture.ensure_completion();
        assert!(worker.is_some());
        assert!(!capture.is_running());

        let after_join = cycles.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(cycles.load(Ordering::SeqCst), after_join);
    }

    #[test]
    fn ensure_completion_is_repeatable() {
        let cycles = Arc::new(AtomicUsize::new(0));
        let worker = Counting {
            cycles,
            limit: None,
        };
        let mut capture = CaptureLoop::spawn(worker, Logger::new("test")).unwrap();
        assert!(capture.ensure_completion().is_some());
        assert!(capture.ensure_completion().is_none());
    }

    #[test]
    fn worker_can_end_the_loop() {
        let cycles = Arc::new(AtomicUsize::new(0));
        let worker = Counting {
            cycles: cycles.clone(),
            limit: Some(2),
        };
        let mut capture = CaptureLoop::spawn(worker, Logger::new("test")).unwrap();
        wait_for(&cycles, 2);
        let worker = capture.ensure_completion().unwrap();
        assert_eq!(worker.cycles.load(Ordering::SeqCst), 2);
    }
}
