//! # Seed Data Generator
//!
//! Populates a demo tenant for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./tally_dev.db with 40 work orders (default)
//! cargo run -p tally-db --bin seed
//!
//! # Custom amount
//! cargo run -p tally-db --bin seed -- --orders 200
//!
//! # Specify database path
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db
//! ```
//!
//! ## Generated Data
//! - Tenant-wide rules for technicians, sellers and drivers
//! - A tiered rule and a custom formula rule for one technician
//! - A 1.5× technician campaign over the current month
//! - A maintenance contract with a monthly work order and a recurring link
//! - Completed work orders with product and service lines, run through
//!   commission generation

use chrono::{Datelike, Duration, NaiveDate, Utc};
use std::env;
use tally_core::{
    AppliesTo, CalculationType, CommissionCampaign, CommissionRule, EngineConfig, EngineContext,
    LineKind, RecurringCommission, RecurringContract, RecurringStatus, Role, RuleType,
    TechnicianAssignment, Tier, Trigger, WorkOrder, WorkOrderItem,
};
use tally_db::engine::generator::BatchOutcome;
use tally_db::{CommissionEngine, Database, DbConfig};
use uuid::Uuid;

const DEMO_TENANT: &str = "demo";

const TECHNICIANS: &[&str] = &["tech-ana", "tech-bruno", "tech-carla"];
const SELLERS: &[&str] = &["seller-davi", "seller-eva"];
const DRIVERS: &[&str] = &["driver-fabio"];
const SOURCES: &[&str] = &["website", "referral", "walk_in"];

/// (description, unit price cents, cost cents, kind)
const CATALOGUE: &[(&str, i64, i64, LineKind)] = &[
    ("Compressor", 85_000, 52_000, LineKind::Product),
    ("Refrigerant gas", 12_000, 6_500, LineKind::Product),
    ("Thermostat", 9_900, 4_000, LineKind::Product),
    ("Installation", 25_000, 0, LineKind::Service),
    ("Preventive maintenance", 18_000, 0, LineKind::Service),
    ("Diagnosis", 8_000, 0, LineKind::Service),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut orders: usize = 40;
    let mut db_path = String::from("./tally_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--orders" | "-o" => {
                if i + 1 < args.len() {
                    orders = args[i + 1].parse().unwrap_or(40);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -o, --orders <N>   Number of work orders to generate (default: 40)");
                println!("  -d, --db <PATH>    Database file path (default: ./tally_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Tally Seed Data Generator");
    println!("=========================");
    println!("Database: {}", db_path);
    println!("Work orders: {}", orders);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.rules().list(DEMO_TENANT, true).await?;
    if !existing.is_empty() {
        println!("⚠ Tenant '{}' already has {} rules", DEMO_TENANT, existing.len());
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let today = Utc::now().date_naive();

    // Rules
    let rules = demo_rules();
    for rule in &rules {
        db.rules().insert(rule).await?;
    }
    println!("✓ {} commission rules", rules.len());

    // Campaign over the current month
    let month_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today);
    db.campaigns()
        .insert(&CommissionCampaign {
            id: Uuid::new_v4().to_string(),
            tenant_id: DEMO_TENANT.to_string(),
            name: "Technician boost".to_string(),
            multiplier_bps: 15_000,
            applies_to_role: Some(Role::Technician),
            applies_to_calculation_type: None,
            starts_at: month_start,
            ends_at: month_start + Duration::days(27),
            active: true,
            created_at: Utc::now(),
        })
        .await?;
    println!("✓ Campaign 'Technician boost' (1.5×)");

    // Contract, its monthly order and the recurring link
    let contract = RecurringContract {
        id: Uuid::new_v4().to_string(),
        tenant_id: DEMO_TENANT.to_string(),
        name: "Mall HVAC maintenance".to_string(),
        is_active: true,
        monthly_value_cents: Some(350_000),
        total_value_cents: Some(4_200_000),
    };
    db.contracts().insert(&contract).await?;
    let mut monthly = work_order(0);
    monthly.recurring_contract_id = Some(contract.id.clone());
    db.work_orders().insert(&monthly).await?;
    let recurring_rule = rules
        .iter()
        .find(|r| r.name == "Contract account manager")
        .map(|r| r.id.clone())
        .unwrap_or_default();
    db.recurring()
        .insert(&RecurringCommission {
            id: Uuid::new_v4().to_string(),
            tenant_id: DEMO_TENANT.to_string(),
            user_id: SELLERS[0].to_string(),
            recurring_contract_id: contract.id.clone(),
            commission_rule_id: recurring_rule,
            status: RecurringStatus::Active,
            last_generated_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await?;
    println!("✓ Contract '{}' with recurring link", contract.name);

    // Work orders
    let start = std::time::Instant::now();
    let mut order_ids = Vec::with_capacity(orders);
    for seed in 1..=orders {
        let order = work_order(seed);
        db.work_orders().insert(&order).await?;
        for (line, (_, price, cost, kind)) in CATALOGUE.iter().enumerate() {
            if (seed + line) % 3 != 0 {
                continue;
            }
            db.work_orders()
                .insert_item(&WorkOrderItem {
                    id: Uuid::new_v4().to_string(),
                    work_order_id: order.id.clone(),
                    kind: *kind,
                    quantity: 1 + (seed % 2) as i64,
                    unit_price_cents: *price,
                    cost_price_cents: *cost,
                })
                .await?;
        }
        if seed % 4 == 0 {
            db.work_orders()
                .insert_assignment(
                    &TechnicianAssignment {
                        work_order_id: order.id.clone(),
                        user_id: TECHNICIANS[(seed + 1) % TECHNICIANS.len()].to_string(),
                        role: None,
                    },
                    0,
                )
                .await?;
        }
        if seed % 5 == 0 {
            db.work_orders()
                .insert_expense(DEMO_TENANT, &order.id, 3_500, "approved", true)
                .await?;
        }
        order_ids.push(order.id);
    }
    println!("✓ {} work orders in {:?}", orders, start.elapsed());

    // Generation
    let engine = CommissionEngine::new(db.clone(), EngineConfig::default());
    let ctx = EngineContext::new(DEMO_TENANT, today).with_actor("seed");
    let report = engine
        .generate_batch(&ctx, &order_ids, Trigger::OsCompleted)
        .await;
    let events: usize = report
        .items
        .iter()
        .map(|item| match &item.result {
            BatchOutcome::Generated { events_count, .. } => *events_count,
            _ => 0,
        })
        .sum();
    println!(
        "✓ Generated {} commission events ({} orders, {} conflicts, {} failed)",
        events, report.generated, report.conflicts, report.failed
    );

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn work_order(seed: usize) -> WorkOrder {
    let base = 15_000 + ((seed * 7_919) % 120_000) as i64;
    WorkOrder {
        id: Uuid::new_v4().to_string(),
        tenant_id: DEMO_TENANT.to_string(),
        number: format!("OS-{:05}", seed),
        total_cents: base,
        displacement_value_cents: if seed % 2 == 0 { 4_000 } else { 0 },
        is_warranty: seed % 11 == 0,
        assignee_id: Some(TECHNICIANS[seed % TECHNICIANS.len()].to_string()),
        seller_id: Some(SELLERS[seed % SELLERS.len()].to_string()),
        driver_id: (seed % 3 == 0).then(|| DRIVERS[0].to_string()),
        recurring_contract_id: None,
        quote_source: Some(SOURCES[seed % SOURCES.len()].to_string()),
        received_at: None,
        completed_at: Some(Utc::now()),
        created_at: Utc::now(),
    }
}

fn rule(name: &str, calculation_type: CalculationType, value: i64, role: Option<Role>, priority: i64) -> CommissionRule {
    let now = Utc::now();
    CommissionRule {
        id: Uuid::new_v4().to_string(),
        tenant_id: DEMO_TENANT.to_string(),
        owner_user_id: None,
        name: name.to_string(),
        rule_type: RuleType::Percentage,
        value_hundredths: value,
        applies_to: AppliesTo::All,
        calculation_type,
        applies_to_role: role,
        applies_when: Trigger::OsCompleted,
        tiers: Vec::new(),
        formula: None,
        source_filter: None,
        priority,
        active: true,
        created_at: now,
        updated_at: now,
    }
}

fn demo_rules() -> Vec<CommissionRule> {
    vec![
        rule("Technician labour", CalculationType::PercentGrossMinusDisplacement, 800, Some(Role::Technician), 10),
        rule("Seller net", CalculationType::PercentNet, 500, Some(Role::Seller), 10),
        CommissionRule {
            source_filter: Some("referral".to_string()),
            ..rule("Referral seller bonus", CalculationType::PercentGross, 200, Some(Role::Seller), 5)
        },
        CommissionRule {
            rule_type: RuleType::Fixed,
            ..rule("Driver trip", CalculationType::FixedPerOs, 2_500, Some(Role::Driver), 10)
        },
        CommissionRule {
            owner_user_id: Some(TECHNICIANS[0].to_string()),
            tiers: vec![
                Tier { threshold_cents: 0, value_bps: 300 },
                Tier { threshold_cents: 50_000, value_bps: 500 },
                Tier { threshold_cents: 100_000, value_bps: 700 },
            ],
            ..rule("Senior tiered bonus", CalculationType::TieredGross, 0, Some(Role::Technician), 20)
        },
        CommissionRule {
            owner_user_id: Some(TECHNICIANS[1].to_string()),
            formula: Some("services * percent / 100 + 10".to_string()),
            ..rule("Service specialist", CalculationType::CustomFormula, 200, Some(Role::Technician), 30)
        },
        CommissionRule {
            owner_user_id: Some(SELLERS[0].to_string()),
            ..rule("Contract account manager", CalculationType::PercentGross, 300, None, 0)
        },
    ]
}
