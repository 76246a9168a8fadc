//! Desktop notifications, best-effort.
//!
//! Failures are swallowed: a missing notification daemon must never take
//! the shortcut engine down with it.

use notify_rust::{Notification, Urgency};

/// Critical notification for startup failures.
pub fn notify_error(title: &str, message: &str) {
    let _ = Notification::new()
        .appname("akeyshually")
        .summary(title)
        .body(message)
        .urgency(Urgency::Critical)
        .show();
}

/// Informational notification (overlay changes and the like).
pub fn notify_info(title: &str, message: &str) {
    let _ = Notification::new()
        .appname("akeyshually")
        .summary(title)
        .body(message)
        .urgency(Urgency::Normal)
        .show();
}
