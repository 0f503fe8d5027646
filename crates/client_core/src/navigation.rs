use std::time::Duration;

use shared::domain::Route;

/// A request to move to another view, optionally after a short
/// user-visible confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: Route,
    pub after: Duration,
    pub notice: Option<String>,
}

impl Redirect {
    pub fn immediate(to: Route) -> Self {
        Self {
            to,
            after: Duration::ZERO,
            notice: None,
        }
    }

    pub fn with_notice(to: Route, after: Duration, notice: impl Into<String>) -> Self {
        Self {
            to,
            after,
            notice: Some(notice.into()),
        }
    }

    pub async fn wait(&self) {
        if !self.after.is_zero() {
            tokio::time::sleep(self.after).await;
        }
    }
}
