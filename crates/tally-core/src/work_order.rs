//! # Work Order Snapshots
//!
//! Read-only views of the collaborators the engine consumes: work orders,
//! their lines and technician assignments, and recurring contracts.
//! The engine never mutates any of these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::period::Period;
use crate::types::Role;

/// Kind of a work order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Product,
    Service,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct WorkOrder {
    pub id: String,
    pub tenant_id: String,
    pub number: String,
    pub total_cents: i64,
    pub displacement_value_cents: i64,
    pub is_warranty: bool,
    pub assignee_id: Option<String>,
    pub seller_id: Option<String>,
    pub driver_id: Option<String>,
    pub recurring_contract_id: Option<String>,
    /// Lead source of the originating quote.
    pub quote_source: Option<String>,
    #[ts(as = "Option<String>")]
    pub received_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl WorkOrder {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// The month the order's commissions belong to: completion, else
    /// reception, else creation.
    pub fn period(&self) -> Period {
        let at = self
            .completed_at
            .or(self.received_at)
            .unwrap_or(self.created_at);
        Period::from_date(at.date_naive())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct WorkOrderItem {
    pub id: String,
    pub work_order_id: String,
    pub kind: LineKind,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub cost_price_cents: i64,
}

impl WorkOrderItem {
    /// Line total (unit price × quantity).
    pub fn total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }

    /// Line cost (cost price × quantity).
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_price_cents).multiply_quantity(self.quantity)
    }
}

/// A technician attached to a work order through the many-to-many table.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TechnicianAssignment {
    pub work_order_id: String,
    pub user_id: String,
    /// Missing role means technician.
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RecurringContract {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub is_active: bool,
    pub monthly_value_cents: Option<i64>,
    pub total_value_cents: Option<i64>,
}

impl RecurringContract {
    /// The amount a recurring commission is computed on: the monthly value,
    /// or the total value for contracts billed without one.
    pub fn billing_base(&self) -> Money {
        Money::from_cents(
            self.monthly_value_cents
                .or(self.total_value_cents)
                .unwrap_or(0),
        )
    }
}

// =============================================================================
// Calculation Context
// =============================================================================

/// Everything a rule may look at besides its own base amount.
///
/// Built once per work order and shared by every (user, rule) evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationContext {
    pub gross: Money,
    /// Approved expenses that affect the net value.
    pub expenses: Money,
    pub displacement: Money,
    pub products_total: Money,
    pub services_total: Money,
    /// Σ cost price × quantity over all lines.
    pub cost: Money,
    pub items_count: i64,
    pub product_lines: i64,
    pub service_lines: i64,
}

impl CalculationContext {
    /// Builds the context from a work order, its lines and the sum of its
    /// approved expenses.
    pub fn from_work_order(order: &WorkOrder, items: &[WorkOrderItem], expenses: Money) -> Self {
        let mut ctx = CalculationContext {
            gross: order.total(),
            expenses,
            displacement: Money::from_cents(order.displacement_value_cents),
            items_count: items.len() as i64,
            ..Default::default()
        };

        for item in items {
            ctx.cost += item.cost();
            match item.kind {
                LineKind::Product => {
                    ctx.products_total += item.total();
                    ctx.product_lines += 1;
                }
                LineKind::Service => {
                    ctx.services_total += item.total();
                    ctx.service_lines += 1;
                }
            }
        }

        ctx
    }

    /// Context for a base amount with no work order detail (recurring runs).
    pub fn for_amount(base: Money) -> Self {
        CalculationContext {
            gross: base,
            ..Default::default()
        }
    }
}
