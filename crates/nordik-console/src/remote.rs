//! Per-kind request slots and download nonces.

use std::fmt::Display;

use tracing::warn;

/// Issued when a request starts; only the latest ticket of a slot may
/// resolve it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
}

impl Ticket {
    pub fn generation(self) -> u64 {
        self.generation
    }
}

/// `{data, loading, error}` state of one request kind.
#[derive(Debug, Clone)]
pub struct Remote<T> {
    data: Option<T>,
    loading: bool,
    error: Option<String>,
    generation: u64,
}

impl<T> Default for Remote<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            generation: 0,
        }
    }
}

impl<T> Remote<T> {
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn data_mut(&mut self) -> Option<&mut T> {
        self.data.as_mut()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Starts a request, superseding any request still in flight.
    pub fn begin(&mut self) -> Ticket {
        self.generation += 1;
        self.loading = true;
        Ticket {
            generation: self.generation,
        }
    }

    /// Applies a result if `ticket` is still current. Failures clear the
    /// data and keep the message for display.
    pub fn resolve<E: Display>(&mut self, ticket: Ticket, result: Result<T, E>) -> bool {
        if ticket.generation != self.generation {
            warn!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding superseded response"
            );
            return false;
        }
        self.loading = false;
        match result {
            Ok(data) => {
                self.data = Some(data);
                self.error = None;
            }
            Err(err) => {
                self.data = None;
                self.error = Some(err.to_string());
            }
        }
        true
    }

    /// Back to the initial empty state; in-flight results are dropped.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.data = None;
        self.loading = false;
        self.error = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadTicket {
    nonce: u64,
}

/// Monotonic nonce guarding the side effect of a download trigger: each
/// trigger is delivered at most once, and a newer trigger supersedes older ones.
#[derive(Debug, Clone, Default)]
pub struct DownloadTracker {
    nonce: u64,
    delivered: u64,
}

impl DownloadTracker {
    pub fn trigger(&mut self) -> DownloadTicket {
        self.nonce += 1;
        DownloadTicket { nonce: self.nonce }
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn claim(&mut self, ticket: DownloadTicket) -> bool {
        if ticket.nonce != self.nonce || self.delivered >= ticket.nonce {
            return false;
        }
        self.delivered = ticket.nonce;
        true
    }
}
