// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;

use crate::ServiceType;

/// Directional bundling affinity between service types.
///
/// `hvac -> electrical` does not imply `electrical -> hvac`. Every type is
/// compatible with itself, including types with no rule of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityTable {
    rules: BTreeMap<ServiceType, Vec<ServiceType>>,
}

impl Default for CompatibilityTable {
    fn default() -> Self {
        Self::empty()
            .with_rule(ServiceType::Plumbing, &[ServiceType::Plumbing])
            .with_rule(ServiceType::Electrical, &[ServiceType::Electrical])
            .with_rule(ServiceType::Hvac, &[ServiceType::Hvac, ServiceType::Electrical])
            .with_rule(
                ServiceType::General,
                &[
                    ServiceType::General,
                    ServiceType::Plumbing,
                    ServiceType::Electrical,
                    ServiceType::Hvac,
                ],
            )
    }
}

impl CompatibilityTable {
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Replaces the rule for `from`. The type itself is always kept first.
    pub fn with_rule(mut self, from: ServiceType, to: &[ServiceType]) -> Self {
        let mut targets = vec![from];
        for target in to {
            if !targets.contains(target) {
                targets.push(*target);
            }
        }
        self.rules.insert(from, targets);
        self
    }

    pub fn compatible_types(&self, service_type: ServiceType) -> Vec<ServiceType> {
        self.rules
            .get(&service_type)
            .cloned()
            .unwrap_or_else(|| vec![service_type])
    }

    pub fn is_compatible(&self, from: ServiceType, to: ServiceType) -> bool {
        from == to
            || self
                .rules
                .get(&from)
                .is_some_and(|targets| targets.contains(&to))
    }
}
