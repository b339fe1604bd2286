// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use upkeep_app::{
    BundleEngine, ConfidenceLevel, Priority, ServiceType, WorkItem, WorkItemId, normalize_catalog,
};
use upkeep_testkit::{WorkOrderFaker, fixture_now};

fn plumbing(id: &str, cost_cents: i64, hours: f64) -> WorkItem {
    WorkItem {
        id: WorkItemId::new(id),
        title: format!("Plumbing job {id}"),
        property_id: "PROP-001".to_owned(),
        property_name: "Sunset Apartments".to_owned(),
        service_area: "North".to_owned(),
        service_type: ServiceType::Plumbing,
        priority: Priority::Medium,
        estimated_cost_cents: cost_cents,
        estimated_duration_hours: hours,
        specific_location: String::new(),
        last_serviced_at: None,
        days_until_service: None,
        confidence: ConfidenceLevel::Medium,
        installed_on: None,
        asset_age_years: None,
    }
}

#[test]
fn three_plumbing_jobs_in_one_area_form_one_bundle() -> Result<()> {
    let catalog = vec![
        plumbing("WO-1", 12_000, 2.0),
        plumbing("WO-2", 8_500, 1.0),
        plumbing("WO-3", 6_500, 0.5),
    ];
    let bundles = BundleEngine::default().generate(&catalog, &[]);
    assert_eq!(bundles.len(), 1);

    let bundle = &bundles[0];
    let savings = bundle.savings();
    assert_eq!(bundle.id().as_str(), "BUNDLE-North-PLUMBING");
    assert_eq!(savings.total_cost_cents, 27_000);
    assert_eq!(savings.total_duration_hours, 3.5);
    assert_eq!(savings.travel_savings_cents, 10_000);
    assert_eq!(savings.bulk_discount_cents, 2_700);
    assert_eq!(savings.total_savings_cents, 12_700);
    assert!((savings.savings_percentage - 47.04).abs() < 0.01);
    Ok(())
}

#[test]
fn isolated_hvac_seed_yields_no_bundles() -> Result<()> {
    let mut faker = WorkOrderFaker::new(11);
    let seed = faker.work_item_in("Harbor Point", ServiceType::Hvac);
    let mut catalog = vec![seed.clone()];
    for _ in 0..10 {
        catalog.push(faker.work_item_in("North District", ServiceType::Hvac));
    }
    let bundles = BundleEngine::default().generate(&catalog, &[seed.id]);
    assert!(bundles.is_empty());
    Ok(())
}

#[test]
fn bundle_totals_are_exact_item_sums() -> Result<()> {
    let engine = BundleEngine::default();
    for seed in 1..200 {
        let mut faker = WorkOrderFaker::new(seed);
        let len = 2 + faker.int_n(20);
        let catalog = faker.catalog(len);
        for bundle in engine.generate(&catalog, &[]) {
            assert!(bundle.item_count() >= 2, "seed {seed}");
            let cost: i64 = bundle
                .items()
                .iter()
                .map(|item| item.estimated_cost_cents)
                .sum();
            let hours: f64 = bundle
                .items()
                .iter()
                .map(|item| item.estimated_duration_hours)
                .sum();
            let savings = bundle.savings();
            assert_eq!(savings.total_cost_cents, cost, "seed {seed}");
            assert_eq!(bundle.total_cost_cents(), cost, "seed {seed}");
            assert_eq!(savings.total_duration_hours, hours, "seed {seed}");
        }
    }
    Ok(())
}

#[test]
fn savings_are_never_negative_or_nan() -> Result<()> {
    let engine = BundleEngine::default();
    for seed in 1..200 {
        let mut faker = WorkOrderFaker::new(seed);
        let catalog = faker.catalog(16);
        let seeds: Vec<WorkItemId> = catalog.iter().take(2).map(|item| item.id.clone()).collect();
        let mut bundles = engine.generate(&catalog, &[]);
        bundles.extend(engine.generate(&catalog, &seeds[..1]));
        bundles.extend(engine.generate(&catalog, &seeds));
        for bundle in bundles {
            let savings = bundle.savings();
            assert!(savings.total_savings_cents >= 0, "seed {seed}");
            assert!(savings.savings_percentage >= 0.0, "seed {seed}");
            assert!(!savings.savings_percentage.is_nan(), "seed {seed}");
            if savings.total_cost_cents == 0 {
                assert_eq!(savings.savings_percentage, 0.0, "seed {seed}");
            }
        }
    }
    Ok(())
}

#[test]
fn grouping_is_repeatable() -> Result<()> {
    let engine = BundleEngine::default();
    for seed in 1..100 {
        let catalog = WorkOrderFaker::new(seed).catalog(24);
        let seeds: Vec<WorkItemId> = catalog.iter().step_by(5).map(|item| item.id.clone()).collect();
        assert_eq!(engine.generate(&catalog, &[]), engine.generate(&catalog, &[]));
        assert_eq!(
            engine.generate(&catalog, &seeds),
            engine.generate(&catalog, &seeds)
        );
    }
    Ok(())
}

#[test]
fn bundles_are_ranked_and_items_ordered_by_priority() -> Result<()> {
    let engine = BundleEngine::default();
    for seed in 1..100 {
        let catalog = WorkOrderFaker::new(seed).catalog(30);
        let bundles = engine.generate(&catalog, &[]);
        for pair in bundles.windows(2) {
            assert!(pair[0].total_savings_cents() >= pair[1].total_savings_cents());
        }
        for bundle in &bundles {
            for pair in bundle.items().windows(2) {
                assert!(pair[0].priority >= pair[1].priority);
            }
        }
    }
    Ok(())
}

#[test]
fn faked_asset_records_all_normalize() -> Result<()> {
    let mut faker = WorkOrderFaker::new(5);
    let records: Vec<_> = (0..40).map(|_| faker.asset_record()).collect();
    let catalog = normalize_catalog(&records, fixture_now());
    assert!(catalog.rejected.is_empty(), "{:?}", catalog.rejected);
    assert_eq!(catalog.items.len(), 40);
    for item in &catalog.items {
        assert!(item.id.as_str().starts_with("ASSET-"));
        assert!(item.days_until_service.is_some());
    }
    Ok(())
}
