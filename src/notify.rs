use std::fmt;

use time::OffsetDateTime;

use crate::config::Permission;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub shown_at: OffsetDateTime,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.body.is_empty() {
            write!(f, "{}", self.title)
        } else {
            write!(f, "{}: {}", self.title, self.body)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Shown(Notification),
    /// Permission is denied, or was asked for once and left unanswered.
    Suppressed,
    /// The frontend should ask the user and report back through
    /// [`Notifier::resolve`]. The triggering notification is not replayed.
    PermissionRequested,
}

/// Permission-gated notifications. Permission starts from config and is
/// asked for at most once per session.
#[derive(Debug, Clone)]
pub struct Notifier {
    permission: Permission,
    requested: bool,
    last: Option<Notification>,
}

impl Notifier {
    pub fn new(permission: Permission) -> Self {
        Self {
            permission,
            requested: false,
            last: None,
        }
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn last(&self) -> Option<&Notification> {
        self.last.as_ref()
    }

    pub fn notify(&mut self, title: &str, body: &str, icon: Option<&str>) -> NotifyOutcome {
        match self.permission {
            Permission::Granted => {
                let notification = Notification {
                    title: title.to_string(),
                    body: body.to_string(),
                    icon: icon.map(str::to_string),
                    shown_at: OffsetDateTime::now_utc(),
                };
                tracing::info!(title, body, "notification shown");
                self.last = Some(notification.clone());
                NotifyOutcome::Shown(notification)
            }
            Permission::Denied => {
                tracing::info!(title, "notifications are denied");
                NotifyOutcome::Suppressed
            }
            Permission::Default if self.requested => {
                tracing::debug!(title, "notification permission still undecided");
                NotifyOutcome::Suppressed
            }
            Permission::Default => {
                self.requested = true;
                NotifyOutcome::PermissionRequested
            }
        }
    }

    pub fn resolve(&mut self, answer: Permission) {
        tracing::info!(permission = %answer, "notification permission answered");
        self.permission = answer;
        self.requested = true;
    }
}
