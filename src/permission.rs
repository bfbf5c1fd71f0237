//! Permission gate and retry loop for the event tap
//!
//! Installing a tap fails until the user grants Accessibility access, which
//! can happen at any moment while we are running. The gate keeps retrying on a
//! fixed interval, with at most one retry pending at a time.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, select};

use crate::error::TapError;

pub const RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// Something that can install and remove the global keyboard listener.
pub trait InputTap {
    /// Install the listener. A no-op when already active.
    fn start(&mut self) -> Result<(), TapError>;
    /// Remove the listener. Safe to call when not active.
    fn stop(&mut self);
    fn is_active(&self) -> bool;
}

/// Process trust for input monitoring.
pub trait TrustPrompt {
    fn is_trusted(&self) -> bool;
    /// Ask the OS to show its permission dialog. Does not wait for an answer.
    fn request_trust(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Active,
    WaitingForRetry { due: Instant, failures: u64 },
}

pub struct PermissionGate<T, P> {
    tap: T,
    prompt: P,
    state: MonitorState,
    prompted: bool,
    retry_interval: Duration,
}

impl<T: InputTap, P: TrustPrompt> PermissionGate<T, P> {
    pub fn new(tap: T, prompt: P) -> Self {
        PermissionGate {
            tap,
            prompt,
            state: MonitorState::Idle,
            prompted: false,
            retry_interval: RETRY_INTERVAL,
        }
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Try to bring monitoring up now. Any pending retry is replaced.
    pub fn start(&mut self, now: Instant) {
        if self.state == MonitorState::Active && self.tap.is_active() {
            return;
        }

        if !self.prompted && !self.prompt.is_trusted() {
            tracing::info!("KeyBoy needs Accessibility permissions to monitor keyboard shortcuts");
            self.prompt.request_trust();
            self.prompted = true;
        }

        self.attempt(now);
    }

    /// Fire the pending retry if it is due.
    pub fn on_timer(&mut self, now: Instant) {
        if let MonitorState::WaitingForRetry { due, .. } = self.state
            && now >= due
        {
            tracing::info!("retrying to start keyboard monitoring");
            self.attempt(now);
        }
    }

    pub fn next_retry(&self) -> Option<Instant> {
        match self.state {
            MonitorState::WaitingForRetry { due, .. } => Some(due),
            _ => None,
        }
    }

    /// Tear down monitoring and cancel any pending retry.
    pub fn stop(&mut self) {
        self.tap.stop();
        if self.state != MonitorState::Idle {
            tracing::info!("keyboard monitoring stopped");
        }
        self.state = MonitorState::Idle;
    }

    fn attempt(&mut self, now: Instant) {
        match self.tap.start() {
            Ok(()) => {
                if let MonitorState::WaitingForRetry { failures, .. } = self.state {
                    tracing::debug!(failures, "cancelled pending retry");
                }
                self.state = MonitorState::Active;
                tracing::info!("keyboard monitoring started");
            }
            Err(e) => {
                let failures = match self.state {
                    MonitorState::WaitingForRetry { failures, .. } => failures + 1,
                    _ => 1,
                };
                tracing::warn!(
                    error = %e,
                    trusted = self.prompt.is_trusted(),
                    failures,
                    "could not start keyboard monitoring, retrying in {:?}",
                    self.retry_interval
                );
                self.state = MonitorState::WaitingForRetry {
                    due: now + self.retry_interval,
                    failures,
                };
            }
        }
    }
}

enum Control {
    Start,
    /// Carries the acknowledgement sent once the tap is down.
    Stop(Sender<()>),
    Shutdown,
}

/// Handle to the thread that owns the gate and fires its retry timer.
pub struct Monitor {
    control: Sender<Control>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Monitor {
    /// Move `gate` onto its own thread and start monitoring.
    pub fn spawn<T, P>(gate: PermissionGate<T, P>) -> std::io::Result<Self>
    where
        T: InputTap + Send + 'static,
        P: TrustPrompt + Send + 'static,
    {
        let (control, rx) = channel::unbounded();
        let thread = thread::Builder::new()
            .name("monitor".into())
            .spawn(move || run(gate, &rx))?;

        let monitor = Monitor {
            control,
            thread: Some(thread),
        };
        monitor.start();
        Ok(monitor)
    }

    pub fn start(&self) {
        let _ = self.control.send(Control::Start);
    }

    /// Callable from any thread. Returns once the tap is removed and any
    /// pending retry is cancelled; no key event is handled after that.
    pub fn stop(&self) {
        let (ack_tx, ack_rx) = channel::bounded(1);
        if self.control.send(Control::Stop(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Stop monitoring and end the monitor thread.
    pub fn shutdown(mut self) {
        self.stop();
        self.join();
    }

    fn join(&mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.join();
    }
}

enum Wake {
    Control(Option<Control>),
    Timer,
}

fn run<T: InputTap, P: TrustPrompt>(mut gate: PermissionGate<T, P>, control: &Receiver<Control>) {
    loop {
        let timer = match gate.next_retry() {
            Some(due) => channel::at(due),
            None => channel::never(),
        };

        let wake = select! {
            recv(control) -> msg => Wake::Control(msg.ok()),
            recv(timer) -> _ => Wake::Timer,
        };

        match wake {
            Wake::Timer => gate.on_timer(Instant::now()),
            Wake::Control(Some(Control::Start)) => gate.start(Instant::now()),
            Wake::Control(Some(Control::Stop(ack))) => {
                gate.stop();
                let _ = ack.send(());
            }
            Wake::Control(Some(Control::Shutdown) | None) => break,
        }
    }
    gate.stop();
}
