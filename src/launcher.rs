//! Application launching
//!
//! The tap callback never launches anything itself. It pushes the target onto
//! a bounded queue and a worker thread performs the launch, reporting failures
//! through the log and, if enabled, a user notification.

use std::path::Path;
use std::process::Command;
use std::thread;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::config::{ConfigHandle, LaunchTarget};
use crate::error::LaunchError;
use crate::notification;

const QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// An instance was already running and was brought to the front.
    Activated,
    /// A new instance was started.
    Opened,
    /// Started through `/usr/bin/open` after the workspace refused.
    OpenedWithFallback,
}

pub trait Launcher: Send {
    fn launch(&self, target: &LaunchTarget) -> Result<LaunchOutcome, LaunchError>;
}

/// Producer side of the launch queue, held by the dispatch path.
#[derive(Debug, Clone)]
pub struct LaunchQueue {
    tx: Sender<LaunchTarget>,
}

impl LaunchQueue {
    pub fn bounded(capacity: usize) -> (Self, Receiver<LaunchTarget>) {
        let (tx, rx) = channel::bounded(capacity);
        (LaunchQueue { tx }, rx)
    }

    /// Never blocks. Returns false if the request was dropped.
    pub fn request(&self, target: LaunchTarget) -> bool {
        match self.tx.try_send(target) {
            Ok(()) => true,
            Err(TrySendError::Full(target)) => {
                tracing::warn!(%target, "launch queue full, dropping request");
                false
            }
            Err(TrySendError::Disconnected(target)) => {
                tracing::error!(%target, "launch worker is gone, dropping request");
                false
            }
        }
    }
}

/// Start the launch worker. It runs until every [`LaunchQueue`] clone is dropped.
pub fn spawn_worker<L>(launcher: L, config: ConfigHandle) -> std::io::Result<LaunchQueue>
where
    L: Launcher + 'static,
{
    let (queue, rx) = LaunchQueue::bounded(QUEUE_CAPACITY);

    thread::Builder::new()
        .name("launcher".into())
        .spawn(move || {
            for target in rx {
                run_launch(&launcher, &target, &config);
            }
            tracing::debug!("launch worker stopped");
        })?;

    Ok(queue)
}

fn run_launch(launcher: &dyn Launcher, target: &LaunchTarget, config: &ConfigHandle) {
    match launcher.launch(target) {
        Ok(outcome) => tracing::info!(%target, ?outcome, "launched"),
        Err(e) => {
            tracing::error!(%target, error = %e, "launch failed");
            let settings = config.current().settings;
            if settings.show_notifications {
                notification::notify("KeyBoy", &e.to_string(), settings.play_sound);
            }
        }
    }
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn open_with_command(path: &str) -> Result<LaunchOutcome, LaunchError> {
    let output = Command::new("/usr/bin/open")
        .arg(path)
        .output()
        .map_err(|e| LaunchError::OpenFailed {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(LaunchError::OpenFailed {
            path: path.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(LaunchOutcome::OpenedWithFallback)
}

/// Launches bundles through `NSWorkspace`, activating running instances.
#[cfg(target_os = "macos")]
pub struct WorkspaceLauncher;

#[cfg(target_os = "macos")]
impl Launcher for WorkspaceLauncher {
    fn launch(&self, target: &LaunchTarget) -> Result<LaunchOutcome, LaunchError> {
        let path = target.as_str();
        if !Path::new(path).exists() {
            return Err(LaunchError::NotFound(path.to_string()));
        }

        let launched = workspace::with_pool(|| {
            if let Some(bundle_id) = workspace::bundle_identifier(path) {
                tracing::debug!(%bundle_id, "resolved bundle");
                if workspace::activate_running(&bundle_id) {
                    return Some(LaunchOutcome::Activated);
                }
            }
            workspace::open(path).then_some(LaunchOutcome::Opened)
        });

        match launched {
            Some(outcome) => Ok(outcome),
            None => {
                tracing::warn!(path, "workspace refused to open bundle, trying /usr/bin/open");
                open_with_command(path)
            }
        }
    }
}

#[cfg(target_os = "macos")]
mod workspace {
    use cocoa::base::{BOOL, NO, id, nil};
    use cocoa::foundation::{NSAutoreleasePool, NSString};
    use objc::{class, msg_send, sel, sel_impl};
    use std::ffi::CStr;

    /// NSApplicationActivateIgnoringOtherApps
    const ACTIVATE_IGNORING_OTHER_APPS: usize = 1 << 1;

    /// Run `f` inside an autorelease pool; the launch worker has none of its own.
    pub fn with_pool<T>(f: impl FnOnce() -> T) -> T {
        unsafe {
            let pool = NSAutoreleasePool::new(nil);
            let result = f();
            pool.drain();
            result
        }
    }

    fn ns_string(s: &str) -> id {
        unsafe { NSString::alloc(nil).init_str(s).autorelease() }
    }

    fn to_string(s: id) -> Option<String> {
        if s == nil {
            return None;
        }
        let ptr = unsafe { s.UTF8String() };
        if ptr.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }

    pub fn bundle_identifier(path: &str) -> Option<String> {
        unsafe {
            let bundle: id = msg_send![class!(NSBundle), bundleWithPath: ns_string(path)];
            if bundle == nil {
                return None;
            }
            let identifier: id = msg_send![bundle, bundleIdentifier];
            to_string(identifier)
        }
    }

    pub fn activate_running(bundle_id: &str) -> bool {
        unsafe {
            let running: id = msg_send![
                class!(NSRunningApplication),
                runningApplicationsWithBundleIdentifier: ns_string(bundle_id)
            ];
            if running == nil {
                return false;
            }
            let app: id = msg_send![running, firstObject];
            if app == nil {
                return false;
            }
            let activated: BOOL = msg_send![app, activateWithOptions: ACTIVATE_IGNORING_OTHER_APPS];
            activated != NO
        }
    }

    pub fn open(path: &str) -> bool {
        unsafe {
            let url: id = msg_send![class!(NSURL), fileURLWithPath: ns_string(path)];
            if url == nil {
                return false;
            }
            let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
            let opened: BOOL = msg_send![workspace, openURL: url];
            opened != NO
        }
    }
}

/// Stand-in for platforms without a workspace API.
#[cfg(not(target_os = "macos"))]
pub struct WorkspaceLauncher;

#[cfg(not(target_os = "macos"))]
impl Launcher for WorkspaceLauncher {
    fn launch(&self, target: &LaunchTarget) -> Result<LaunchOutcome, LaunchError> {
        if !Path::new(target.as_str()).exists() {
            return Err(LaunchError::NotFound(target.to_string()));
        }
        Err(LaunchError::Unsupported)
    }
}
