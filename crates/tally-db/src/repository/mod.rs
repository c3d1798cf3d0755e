//! # Repository Module
//!
//! One repository per table family of the commission ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and Transactions                        │
//! │                                                                         │
//! │  CommissionEngine                                                       │
//! │       │                                                                 │
//! │       │  db.rules().applicable_for(tenant, user, role, trigger)         │
//! │       │  (reads go straight to the pool)                                │
//! │       │                                                                 │
//! │       │  let mut tx = db.pool().begin().await?;                         │
//! │       │  db.events().insert(&mut *tx, &event)                           │
//! │       │  (writes that must be atomic take the transaction's connection) │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! │                                                                         │
//! │  Guards live in the SQL: conditional UPDATEs (`WHERE status = ?`) and   │
//! │  UNIQUE indexes, never a read-then-write in application code.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`rule::RuleRepository`] - Commission rules
//! - [`campaign::CampaignRepository`] - Campaign multipliers
//! - [`event::EventRepository`] - Ledger events and generation markers
//! - [`dispute::DisputeRepository`] - Disputes on events
//! - [`settlement::SettlementRepository`] - Per-period settlements
//! - [`goal::GoalRepository`] - Goals and their achievement cache
//! - [`recurring::RecurringRepository`] - Recurring commission links
//! - [`release::ReleaseRepository`] - Payment releases, one per receivable
//! - [`split::SplitRepository`] - Shares of split events
//! - [`work_order::WorkOrderRepository`] - Work orders, lines, technicians, expenses
//! - [`contract::ContractRepository`] - Recurring contracts
//! - [`outbox::OutboxRepository`] - Notification outbox

pub mod campaign;
pub mod contract;
pub mod dispute;
pub mod event;
pub mod goal;
pub mod outbox;
pub mod recurring;
pub mod release;
pub mod rule;
pub mod settlement;
pub mod split;
pub mod work_order;
