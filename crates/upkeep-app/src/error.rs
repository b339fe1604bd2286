// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use thiserror::Error;

use crate::{BundleRecordId, BundleStatus};

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("no work items selected; pick at least one item before accepting")]
    EmptySelection,

    #[error("{}", invalid_state_message(.id, .current))]
    InvalidState {
        id: BundleRecordId,
        current: Option<BundleStatus>,
    },

    #[error("catalog unavailable: {reason}")]
    UpstreamUnavailable { reason: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl BundleError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

fn invalid_state_message(id: &BundleRecordId, current: &Option<BundleStatus>) -> String {
    match current {
        None => format!("bundle {id} does not exist"),
        Some(status) => format!(
            "bundle {id} is {}; only ready_for_dispatch bundles can be dispatched",
            status.as_str()
        ),
    }
}

pub type BundleResult<T> = std::result::Result<T, BundleError>;
