//! Back-navigation policy around the scan surface.
//!
//! Leaving the scan surface is always allowed unless a review dialog is
//! pending: then a back gesture is swallowed by putting the scan surface
//! back on top of the history stack. A request left behind keeps running
//! and is offered for resumption from other surfaces.

use std::fmt;

use crate::domain::ScanRequest;

use super::engine::ScanEngine;

/// Screens the user can be on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    Home,
    Scan,
    Expenses,
    Settings,
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home => write!(f, "home"),
            Self::Scan => write!(f, "scan"),
            Self::Expenses => write!(f, "expenses"),
            Self::Settings => write!(f, "settings"),
        }
    }
}

/// Anything that can report whether a modal decision is pending.
pub trait BlockingSource {
    fn is_blocking(&self) -> bool;
    fn has_active_request(&self) -> bool;
}

impl BlockingSource for ScanEngine {
    fn is_blocking(&self) -> bool {
        ScanEngine::is_blocking(self)
    }

    fn has_active_request(&self) -> bool {
        ScanEngine::has_active_request(self)
    }
}

impl BlockingSource for ScanRequest {
    fn is_blocking(&self) -> bool {
        ScanRequest::is_blocking(self)
    }

    fn has_active_request(&self) -> bool {
        !self.is_idle()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackOutcome {
    /// The user is now on this surface.
    Navigated(Surface),
    /// A dialog is pending on the scan surface; the user stays there.
    Blocked,
    /// Nothing to go back to.
    AtRoot,
}

/// History stack of surfaces with the scan back-navigation rule applied.
#[derive(Debug, Clone)]
pub struct NavigationGuard {
    history: Vec<Surface>,
}

impl NavigationGuard {
    pub fn new(root: Surface) -> Self {
        Self {
            history: vec![root],
        }
    }

    pub fn current(&self) -> Surface {
        self.history.last().copied().unwrap_or(Surface::Home)
    }

    pub fn history(&self) -> &[Surface] {
        &self.history
    }

    pub fn push(&mut self, surface: Surface) {
        if self.current() != surface {
            self.history.push(surface);
        }
    }

    pub fn back(&mut self, source: &impl BlockingSource) -> BackOutcome {
        if self.history.len() <= 1 {
            return BackOutcome::AtRoot;
        }
        let Some(left) = self.history.pop() else {
            return BackOutcome::AtRoot;
        };
        if left == Surface::Scan && source.is_blocking() {
            log::debug!("Back navigation blocked by a pending scan dialog");
            self.history.push(Surface::Scan);
            return BackOutcome::Blocked;
        }
        BackOutcome::Navigated(self.current())
    }

    /// Whether to offer returning to an unfinished scan.
    pub fn shows_resume_affordance(&self, source: &impl BlockingSource) -> bool {
        self.current() != Surface::Scan && source.has_active_request()
    }
}
