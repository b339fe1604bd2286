// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod compatibility;
pub mod error;
pub mod grouping;
pub mod ids;
pub mod model;
pub mod normalize;
pub mod savings;
pub mod selection;
pub mod sequence;
pub mod session;
pub mod validation;

pub use compatibility::CompatibilityTable;
pub use error::{BundleError, BundleResult};
pub use grouping::{BundleEngine, BundlingPolicy, rank};
pub use ids::*;
pub use model::*;
pub use normalize::{NormalizedCatalog, RejectedRecord, normalize_catalog, normalize_record};
pub use savings::{SavingsBreakdown, SavingsPolicy, estimate};
pub use selection::{Selection, SelectionTotals, aggregate, default_item_selection};
pub use sequence::{RequestSequencer, RequestTicket};
pub use session::{Session, SessionCommand, SessionEvent};
