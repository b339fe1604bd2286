// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Identifies one catalog request. Later tickets compare greater, which is
/// how a [`crate::Session`] tells a stale result from a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestTicket(u64);

impl RequestTicket {
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Hands out increasing tickets and discards results of superseded requests.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> RequestTicket {
        RequestTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }

    /// Returns `result` only if no newer ticket was issued since `ticket`.
    pub fn resolve<T>(&self, ticket: RequestTicket, result: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(result)
        } else {
            warn!(
                ticket = ticket.0,
                latest = self.latest.load(Ordering::SeqCst),
                "dropping stale catalog response"
            );
            None
        }
    }
}
