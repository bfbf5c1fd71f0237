use core_foundation::base::TCFType;
use core_foundation::runloop::{CFRunLoop, kCFRunLoopCommonModes, kCFRunLoopDefaultMode};
use core_foundation_sys::mach_port::CFMachPortInvalidate;
use core_graphics::event::{
    CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
    EventField,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use super::{RawEvent, handle_event};
use crate::dispatch::{Dispatcher, EventRouter};
use crate::error::TapError;
use crate::permission::InputTap;

/// How long the tap thread sleeps in its run loop between checks of the
/// running flag.
const RUNLOOP_SLICE: Duration = Duration::from_millis(250);

/// Session-level, head-inserted active tap for key-down and flags-changed
/// events.
pub struct EventTap {
    dispatcher: Dispatcher,
    session: Option<TapSession>,
}

impl EventTap {
    pub fn new(dispatcher: Dispatcher) -> Self {
        EventTap {
            dispatcher,
            session: None,
        }
    }
}

impl InputTap for EventTap {
    fn start(&mut self) -> Result<(), TapError> {
        if self.session.is_some() {
            return Ok(());
        }
        self.session = Some(TapSession::open(self.dispatcher.clone())?);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
    }

    fn is_active(&self) -> bool {
        self.session.is_some()
    }
}

/// One installed tap: its thread, run loop and running flag.
struct TapSession {
    runloop: Arc<CFRunLoop>,
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl TapSession {
    fn open(dispatcher: Dispatcher) -> Result<Self, TapError> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<Arc<CFRunLoop>, TapError>>();

        let thread = thread::Builder::new()
            .name("event_tap".into())
            .spawn(move || {
                let current = Arc::new(CFRunLoop::get_current());
                let router = EventRouter::new(dispatcher);
                let disabled = Arc::new(AtomicBool::new(false));
                let callback_disabled = Arc::clone(&disabled);

                let tap = match CGEventTap::new(
                    CGEventTapLocation::Session,
                    CGEventTapPlacement::HeadInsertEventTap,
                    CGEventTapOptions::Default,
                    vec![CGEventType::FlagsChanged, CGEventType::KeyDown],
                    move |_, event_type, event| {
                        let raw = match event_type {
                            CGEventType::FlagsChanged => RawEvent::FlagsChanged {
                                keycode: event
                                    .get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE),
                                flags: event.get_flags().bits(),
                            },
                            CGEventType::KeyDown => RawEvent::KeyDown {
                                keycode: event
                                    .get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE),
                            },
                            CGEventType::TapDisabledByTimeout
                            | CGEventType::TapDisabledByUserInput => {
                                handle_event(&router, RawEvent::Disabled);
                                callback_disabled.store(true, Ordering::SeqCst);
                                CFRunLoop::get_current().stop();
                                return Some(event.clone());
                            }
                            _ => return Some(event.clone()),
                        };

                        let mut new_event = event.clone();
                        if handle_event(&router, raw).swallows() {
                            new_event.set_type(CGEventType::Null);
                        }
                        Some(new_event)
                    },
                ) {
                    Ok(tap) => tap,
                    Err(_) => {
                        let _ = ready_tx.send(Err(TapError::PermissionDenied));
                        return;
                    }
                };

                let loop_source = match tap.mach_port.create_runloop_source(0) {
                    Ok(source) => source,
                    Err(_) => {
                        let _ = ready_tx.send(Err(TapError::RunLoopSource));
                        return;
                    }
                };

                unsafe {
                    current.add_source(&loop_source, kCFRunLoopCommonModes);
                    tap.enable();
                }

                let _ = ready_tx.send(Ok(Arc::clone(&current)));
                tracing::debug!("event tap installed");

                while thread_running.load(Ordering::SeqCst) {
                    unsafe {
                        CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, RUNLOOP_SLICE, false);
                    }
                    if disabled.swap(false, Ordering::SeqCst)
                        && thread_running.load(Ordering::SeqCst)
                    {
                        tracing::warn!("event tap disabled by the system, re-enabling");
                        tap.enable();
                    }
                }

                unsafe {
                    current.remove_source(&loop_source, kCFRunLoopCommonModes);
                    CFMachPortInvalidate(tap.mach_port.as_concrete_TypeRef());
                }
                tracing::debug!("event tap removed");
            })
            .map_err(|e| TapError::ThreadSpawn(e.to_string()))?;

        let runloop = match ready_rx.recv() {
            Ok(Ok(runloop)) => runloop,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(TapError::ThreadCrashed);
            }
        };

        Ok(TapSession {
            runloop,
            running,
            thread: Some(thread),
        })
    }

    /// Returns once the tap thread has exited; no callback runs after that.
    fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.runloop.stop();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TapSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
