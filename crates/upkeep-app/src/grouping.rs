// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::compatibility::CompatibilityTable;
use crate::savings::SavingsPolicy;
use crate::{Bundle, BundleHeader, BundleOrigin, CandidateId, ServiceType, WorkItem, WorkItemId};

const SEED_DIGEST_HEX_LEN: usize = 12;

/// Named constants for each bundling mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BundlingPolicy {
    /// Maximum items in a seed-expansion bundle, seed included.
    pub seed_cap: usize,
    pub asset: SavingsPolicy,
    pub same_type: SavingsPolicy,
    pub mixed: SavingsPolicy,
    /// A mixed bundle must save strictly more than this percentage.
    pub mixed_min_savings_pct: f64,
    pub mixed_min_items: usize,
}

impl Default for BundlingPolicy {
    fn default() -> Self {
        Self {
            seed_cap: 4,
            asset: SavingsPolicy::ASSET,
            same_type: SavingsPolicy::SAME_TYPE,
            mixed: SavingsPolicy::MIXED,
            mixed_min_savings_pct: 5.0,
            mixed_min_items: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BundleEngine {
    policy: BundlingPolicy,
    compatibility: CompatibilityTable,
}

impl BundleEngine {
    pub fn new(policy: BundlingPolicy, compatibility: CompatibilityTable) -> Self {
        Self {
            policy,
            compatibility,
        }
    }

    pub fn policy(&self) -> &BundlingPolicy {
        &self.policy
    }

    /// Generates ranked candidates. With no seeds the whole catalog is
    /// partitioned; one resolvable seed is expanded; several are merged.
    pub fn generate(&self, catalog: &[WorkItem], seeds: &[WorkItemId]) -> Vec<Bundle> {
        if seeds.is_empty() {
            return self.partition_catalog(catalog);
        }

        let resolved = resolve_seeds(catalog, seeds);
        match resolved.as_slice() {
            [] => Vec::new(),
            [seed] => self.expand_seed(catalog, seed).into_iter().collect(),
            _ => {
                let merged = self.merge_seeds(catalog, &resolved);
                self.partition_catalog(&merged)
            }
        }
    }

    /// Grows a bundle around `seed` from the rest of its service area: exact
    /// type matches first, then compatible types, up to the seed cap.
    pub fn expand_seed(&self, catalog: &[WorkItem], seed: &WorkItemId) -> Option<Bundle> {
        self.seed_bundle(catalog, seed, seed)
    }

    /// Bundles the opportunity the catalog returned for `seed`. The listing
    /// need not contain the seed itself; its first item then anchors the
    /// expansion and the bundle still records `seed`.
    pub fn bundle_opportunity(&self, opportunity: &[WorkItem], seed: &WorkItemId) -> Option<Bundle> {
        if opportunity.iter().any(|item| &item.id == seed) {
            return self.expand_seed(opportunity, seed);
        }
        let anchor = opportunity.first()?;
        debug!(seed = %seed, anchor = %anchor.id, "seed not in its opportunity; anchoring on first item");
        self.seed_bundle(opportunity, &anchor.id, seed)
    }

    fn seed_bundle(
        &self,
        catalog: &[WorkItem],
        anchor_id: &WorkItemId,
        seed: &WorkItemId,
    ) -> Option<Bundle> {
        let members = self.seed_members(catalog, anchor_id)?;
        if members.len() < 2 {
            debug!(seed = %seed, "seed has no bundle partners in its service area");
            return None;
        }

        let anchor = &members[0];
        let header = BundleHeader {
            id: seed_bundle_id(&anchor.service_area, &members),
            name: format!("{} Asset Bundle", anchor.service_area),
            service_area: anchor.service_area.clone(),
            bundling_criteria: format!(
                "{} items near {} in {} sharing compatible {} work",
                members.len() - 1,
                anchor.title,
                anchor.service_area,
                anchor.service_type.label(),
            ),
            origin: BundleOrigin::AssetBundling,
            seed: Some(seed.clone()),
            policy: self.policy.asset,
        };
        debug!(seed = %seed, members = members.len(), "expanded seed bundle");
        Bundle::assemble(header, members)
    }

    /// Union of every seed and its expansion, deduplicated by id in
    /// first-seen order.
    pub fn merge_seeds(&self, catalog: &[WorkItem], seeds: &[WorkItemId]) -> Vec<WorkItem> {
        let mut seen = BTreeSet::new();
        let mut merged = Vec::new();
        for seed in seeds {
            let Some(members) = self.seed_members(catalog, seed) else {
                continue;
            };
            for item in members {
                if seen.insert(item.id.clone()) {
                    merged.push(item);
                }
            }
        }
        merged
    }

    /// Opportunity discovery: one bundle per (area, type) pair with at least
    /// two items, plus a mixed bundle per qualifying area.
    pub fn partition_catalog(&self, catalog: &[WorkItem]) -> Vec<Bundle> {
        let mut bundles = Vec::new();

        for (area, area_items) in group_by(catalog, |item| item.service_area.clone()) {
            let by_type = group_by(&area_items, |item| item.service_type);
            let type_count = by_type.len();

            for (service_type, items) in by_type {
                if items.len() < 2 {
                    continue;
                }
                let header = BundleHeader {
                    id: CandidateId::new(format!(
                        "BUNDLE-{}-{}",
                        area_key(&area),
                        service_type.as_str().to_ascii_uppercase()
                    )),
                    name: format!("{} Bundle - {area}", service_type.label()),
                    service_area: area.clone(),
                    bundling_criteria: format!(
                        "{} {} work orders in {area}",
                        items.len(),
                        service_type.label()
                    ),
                    origin: BundleOrigin::WorkOrderBundling,
                    seed: None,
                    policy: self.policy.same_type,
                };
                bundles.extend(Bundle::assemble(header, items));
            }

            if area_items.len() >= self.policy.mixed_min_items && type_count > 1 {
                let header = BundleHeader {
                    id: CandidateId::new(format!("BUNDLE-{}-MIXED", area_key(&area))),
                    name: format!("Mixed Services Bundle - {area}"),
                    service_area: area.clone(),
                    bundling_criteria: format!(
                        "{} work orders across {type_count} service types in {area}",
                        area_items.len()
                    ),
                    origin: BundleOrigin::WorkOrderBundling,
                    seed: None,
                    policy: self.policy.mixed,
                };
                if let Some(mixed) = Bundle::assemble(header, area_items) {
                    let pct = mixed.savings().savings_percentage;
                    if pct > self.policy.mixed_min_savings_pct {
                        bundles.push(mixed);
                    } else {
                        debug!(area = %area, pct, "mixed bundle below materiality threshold");
                    }
                }
            }
        }

        rank(bundles)
    }

    fn seed_members(&self, catalog: &[WorkItem], seed: &WorkItemId) -> Option<Vec<WorkItem>> {
        let anchor = catalog.iter().find(|item| &item.id == seed)?;
        let neighbours: Vec<&WorkItem> = catalog
            .iter()
            .filter(|item| item.id != anchor.id && item.service_area == anchor.service_area)
            .collect();

        let exact = neighbours
            .iter()
            .filter(|item| item.service_type == anchor.service_type);
        let compatible = neighbours.iter().filter(|item| {
            item.service_type != anchor.service_type
                && self
                    .compatibility
                    .is_compatible(anchor.service_type, item.service_type)
        });

        let cap = self.policy.seed_cap.max(1);
        let mut members = vec![anchor.clone()];
        members.extend(
            exact
                .chain(compatible)
                .take(cap - 1)
                .map(|item| (*item).clone()),
        );
        Some(members)
    }
}

/// Stable sort by total savings, largest first.
pub fn rank(mut bundles: Vec<Bundle>) -> Vec<Bundle> {
    bundles.sort_by_key(|bundle| std::cmp::Reverse(bundle.total_savings_cents()));
    bundles
}

fn resolve_seeds(catalog: &[WorkItem], seeds: &[WorkItemId]) -> Vec<WorkItemId> {
    let mut resolved: Vec<WorkItemId> = Vec::new();
    for seed in seeds {
        if !catalog.iter().any(|item| &item.id == seed) {
            warn!(seed = %seed, "ignoring seed that is not in the catalog");
            continue;
        }
        if !resolved.contains(seed) {
            resolved.push(seed.clone());
        }
    }
    resolved
}

/// Groups in first-seen key order, keeping catalog order inside each group.
fn group_by<K: PartialEq>(
    items: &[WorkItem],
    key: impl Fn(&WorkItem) -> K,
) -> Vec<(K, Vec<WorkItem>)> {
    let mut groups: Vec<(K, Vec<WorkItem>)> = Vec::new();
    for item in items {
        let item_key = key(item);
        match groups.iter_mut().find(|(existing, _)| *existing == item_key) {
            Some((_, members)) => members.push(item.clone()),
            None => groups.push((item_key, vec![item.clone()])),
        }
    }
    groups
}

fn area_key(area: &str) -> String {
    area.split_whitespace().collect()
}

fn seed_bundle_id(area: &str, members: &[WorkItem]) -> CandidateId {
    let mut hasher = Sha256::new();
    for item in members {
        hasher.update(item.id.as_str().as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(SEED_DIGEST_HEX_LEN);
    for byte in digest.iter().take(SEED_DIGEST_HEX_LEN / 2) {
        use std::fmt::Write as _;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    CandidateId::new(format!("BUNDLE-{}-SEED-{hex}", area_key(area)))
}

/// Service types present in `items`, in first-seen order.
pub fn distinct_service_types(items: &[WorkItem]) -> Vec<ServiceType> {
    group_by(items, |item| item.service_type)
        .into_iter()
        .map(|(service_type, _)| service_type)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfidenceLevel, Priority};

    fn item(id: &str, area: &str, service_type: ServiceType, priority: Priority, cost: i64) -> WorkItem {
        WorkItem {
            id: WorkItemId::new(id),
            title: format!("job {id}"),
            property_id: "P-1".to_owned(),
            property_name: "Sunset Apartments".to_owned(),
            service_area: area.to_owned(),
            service_type,
            priority,
            estimated_cost_cents: cost,
            estimated_duration_hours: 1.0,
            specific_location: String::new(),
            last_serviced_at: None,
            days_until_service: None,
            confidence: ConfidenceLevel::Medium,
            installed_on: None,
            asset_age_years: None,
        }
    }

    fn ids(bundle: &Bundle) -> Vec<&str> {
        bundle.items().iter().map(|item| item.id.as_str()).collect()
    }

    #[test]
    fn seed_expansion_prefers_exact_then_compatible_and_caps_at_four() {
        let catalog = vec![
            item("H1", "North", ServiceType::Hvac, Priority::Medium, 100),
            item("E1", "North", ServiceType::Electrical, Priority::Medium, 100),
            item("H2", "North", ServiceType::Hvac, Priority::Medium, 100),
            item("P1", "North", ServiceType::Plumbing, Priority::Medium, 100),
            item("H3", "North", ServiceType::Hvac, Priority::Medium, 100),
            item("E2", "North", ServiceType::Electrical, Priority::Medium, 100),
            item("H4", "South", ServiceType::Hvac, Priority::Medium, 100),
        ];
        let engine = BundleEngine::default();
        let bundle = engine
            .expand_seed(&catalog, &WorkItemId::new("H1"))
            .expect("seed should expand");
        assert_eq!(ids(&bundle), vec!["H1", "H2", "H3", "E1"]);
        assert_eq!(bundle.header.origin, BundleOrigin::AssetBundling);
        assert_eq!(bundle.header.seed, Some(WorkItemId::new("H1")));
        assert!(bundle.id().as_str().starts_with("BUNDLE-North-SEED-"));
        assert_eq!(bundle.id().as_str().len(), "BUNDLE-North-SEED-".len() + 12);
    }

    #[test]
    fn seed_expansion_respects_direction_of_compatibility() {
        let catalog = vec![
            item("E1", "North", ServiceType::Electrical, Priority::Low, 100),
            item("H1", "North", ServiceType::Hvac, Priority::Low, 100),
        ];
        let engine = BundleEngine::default();
        assert!(engine.expand_seed(&catalog, &WorkItemId::new("E1")).is_none());
        assert!(engine.expand_seed(&catalog, &WorkItemId::new("H1")).is_some());
    }

    #[test]
    fn lone_seed_yields_no_bundle() {
        let catalog = vec![
            item("H1", "North", ServiceType::Hvac, Priority::High, 100),
            item("H2", "South", ServiceType::Hvac, Priority::High, 100),
        ];
        let bundles = BundleEngine::default().generate(&catalog, &[WorkItemId::new("H1")]);
        assert!(bundles.is_empty());
    }

    #[test]
    fn unknown_seeds_are_ignored() {
        let catalog = vec![
            item("P1", "North", ServiceType::Plumbing, Priority::High, 100),
            item("P2", "North", ServiceType::Plumbing, Priority::High, 100),
        ];
        let engine = BundleEngine::default();
        assert!(engine.generate(&catalog, &[WorkItemId::new("NOPE")]).is_empty());
        let bundles = engine.generate(&catalog, &[WorkItemId::new("NOPE"), WorkItemId::new("P1")]);
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].header.origin, BundleOrigin::AssetBundling);
    }

    #[test]
    fn partition_emits_same_type_and_mixed_bundles_ranked_by_savings() {
        let catalog = vec![
            item("P1", "North District", ServiceType::Plumbing, Priority::Low, 12_000),
            item("P2", "North District", ServiceType::Plumbing, Priority::High, 8_500),
            item("E1", "North District", ServiceType::Electrical, Priority::Medium, 15_000),
            item("H1", "West", ServiceType::Hvac, Priority::Low, 18_000),
        ];
        let bundles = BundleEngine::default().partition_catalog(&catalog);
        let bundle_ids: Vec<&str> = bundles.iter().map(|bundle| bundle.id().as_str()).collect();
        assert_eq!(
            bundle_ids,
            vec!["BUNDLE-NorthDistrict-MIXED", "BUNDLE-NorthDistrict-PLUMBING"]
        );
        let plumbing = &bundles[1];
        assert_eq!(plumbing.header.name, "Plumbing Bundle - North District");
        assert_eq!(ids(plumbing), vec!["P2", "P1"]);
        let mixed = &bundles[0];
        assert_eq!(mixed.header.name, "Mixed Services Bundle - North District");
        assert_eq!(mixed.header.policy, SavingsPolicy::MIXED);
    }

    #[test]
    fn mixed_bundle_below_threshold_is_dropped() {
        let catalog = vec![
            item("P1", "North", ServiceType::Plumbing, Priority::Low, 1_000_000),
            item("P2", "North", ServiceType::Plumbing, Priority::Low, 1_000_000),
            item("E1", "North", ServiceType::Electrical, Priority::Low, 1_000_000),
        ];
        let bundles = BundleEngine::default().partition_catalog(&catalog);
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].id().as_str(), "BUNDLE-North-PLUMBING");
    }

    #[test]
    fn multi_seed_merges_then_partitions() {
        let catalog = vec![
            item("P1", "North", ServiceType::Plumbing, Priority::Low, 100),
            item("P2", "North", ServiceType::Plumbing, Priority::Low, 100),
            item("E1", "South", ServiceType::Electrical, Priority::Low, 100),
            item("E2", "South", ServiceType::Electrical, Priority::Low, 100),
            item("E3", "South", ServiceType::Electrical, Priority::Low, 100),
        ];
        let engine = BundleEngine::default();
        let merged = engine.merge_seeds(&catalog, &[WorkItemId::new("P1"), WorkItemId::new("E2")]);
        let merged_ids: Vec<&str> = merged.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(merged_ids, vec!["P1", "P2", "E2", "E1", "E3"]);

        let bundles = engine.generate(&catalog, &[WorkItemId::new("P1"), WorkItemId::new("E2")]);
        assert_eq!(bundles.len(), 2);
        assert!(
            bundles
                .iter()
                .all(|bundle| bundle.header.origin == BundleOrigin::WorkOrderBundling)
        );
    }

    #[test]
    fn opportunity_without_its_seed_anchors_on_first_item() {
        let opportunity = vec![
            item("ASSET-7", "Sunset Ridge", ServiceType::Hvac, Priority::High, 18_000),
            item("ASSET-8", "Sunset Ridge", ServiceType::Hvac, Priority::Medium, 9_000),
            item("ASSET-9", "Sunset Ridge", ServiceType::Electrical, Priority::Low, 4_000),
        ];
        let seed = WorkItemId::new("WO-123");
        let engine = BundleEngine::default();
        assert!(engine.generate(&opportunity, std::slice::from_ref(&seed)).is_empty());

        let bundle = engine
            .bundle_opportunity(&opportunity, &seed)
            .expect("opportunity should bundle");
        assert_eq!(ids(&bundle), vec!["ASSET-7", "ASSET-8", "ASSET-9"]);
        assert_eq!(bundle.header.seed, Some(seed));
        assert_eq!(bundle.header.origin, BundleOrigin::AssetBundling);
        assert_eq!(bundle.header.policy, SavingsPolicy::ASSET);
    }

    #[test]
    fn opportunity_containing_its_seed_expands_that_seed() {
        let opportunity = vec![
            item("P1", "North", ServiceType::Plumbing, Priority::Low, 100),
            item("H1", "North", ServiceType::Hvac, Priority::Low, 100),
            item("H2", "North", ServiceType::Hvac, Priority::Low, 100),
        ];
        let engine = BundleEngine::default();
        let seed = WorkItemId::new("H2");
        assert_eq!(
            engine.bundle_opportunity(&opportunity, &seed),
            engine.expand_seed(&opportunity, &seed)
        );
        assert!(engine.bundle_opportunity(&[], &seed).is_none());
    }

    #[test]
    fn empty_catalog_yields_nothing() {
        assert!(BundleEngine::default().generate(&[], &[]).is_empty());
    }

    #[test]
    fn rank_is_stable_for_equal_savings() {
        let catalog = vec![
            item("A1", "A", ServiceType::General, Priority::Low, 100),
            item("A2", "A", ServiceType::General, Priority::Low, 100),
            item("B1", "B", ServiceType::General, Priority::Low, 100),
            item("B2", "B", ServiceType::General, Priority::Low, 100),
        ];
        let bundles = BundleEngine::default().partition_catalog(&catalog);
        let bundle_ids: Vec<&str> = bundles.iter().map(|bundle| bundle.id().as_str()).collect();
        assert_eq!(bundle_ids, vec!["BUNDLE-A-GENERAL", "BUNDLE-B-GENERAL"]);
    }

    #[test]
    fn distinct_types_keep_first_seen_order() {
        let catalog = vec![
            item("A", "N", ServiceType::Lighting, Priority::Low, 1),
            item("B", "N", ServiceType::Hvac, Priority::Low, 1),
            item("C", "N", ServiceType::Lighting, Priority::Low, 1),
        ];
        assert_eq!(
            distinct_service_types(&catalog),
            vec![ServiceType::Lighting, ServiceType::Hvac]
        );
    }
}
