use crate::dispatch::Dispatcher;
use crate::error::TapError;
use crate::permission::InputTap;

/// Placeholder for platforms without a global event tap. Installing always
/// fails, so the permission gate keeps retrying without ever dispatching.
pub struct EventTap {
    _dispatcher: Dispatcher,
}

impl EventTap {
    pub fn new(dispatcher: Dispatcher) -> Self {
        EventTap {
            _dispatcher: dispatcher,
        }
    }
}

impl InputTap for EventTap {
    fn start(&mut self) -> Result<(), TapError> {
        Err(TapError::Unsupported)
    }

    fn stop(&mut self) {}

    fn is_active(&self) -> bool {
        false
    }
}
