//! Input-monitoring trust checks

use crate::permission::TrustPrompt;

/// Check if the process is trusted to observe and modify keyboard input
#[cfg(target_os = "macos")]
pub fn is_trusted() -> bool {
    unsafe { accessibility_sys::AXIsProcessTrusted() }
}

/// Ask the OS to show its trust dialog. Returns the current trust state
/// without waiting for the user.
#[cfg(target_os = "macos")]
pub fn request_trust() -> bool {
    use core_foundation::base::TCFType;
    use core_foundation::boolean::CFBoolean;
    use core_foundation::dictionary::CFDictionary;
    use core_foundation::string::CFString;

    unsafe {
        let key = CFString::new("AXTrustedCheckOptionPrompt");
        let value = CFBoolean::true_value();
        let dict = CFDictionary::from_CFType_pairs(&[(key.as_CFType(), value.as_CFType())]);
        accessibility_sys::AXIsProcessTrustedWithOptions(dict.as_CFTypeRef() as *const _)
    }
}

#[cfg(not(target_os = "macos"))]
pub fn is_trusted() -> bool {
    false
}

#[cfg(not(target_os = "macos"))]
pub fn request_trust() -> bool {
    false
}

/// The real trust source used by the daemon.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTrust;

impl TrustPrompt for SystemTrust {
    fn is_trusted(&self) -> bool {
        is_trusted()
    }

    fn request_trust(&self) {
        if !request_trust() {
            tracing::info!(
                "grant KeyBoy access under System Settings > Privacy & Security > Accessibility"
            );
        }
    }
}
