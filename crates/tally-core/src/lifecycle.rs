//! # Lifecycle State Machines
//!
//! Every status change in the ledger goes through one of these checks.
//! They are monotonic: nothing returns to an earlier state.
//!
//! ```text
//! Event        pending ──► approved ──► paid
//!                 │            │
//!                 └────────────┴──► reversed
//!
//! Dispute      open ──► accepted | rejected | cancelled
//!
//! Settlement   closed ──► paid
//!
//! Recurring    active ◄──► paused
//!                 │           │
//!                 └─────┬─────┘
//!                       ▼
//!                  terminated
//! ```

use crate::error::{CoreError, CoreResult};
use crate::types::{
    CommissionEvent, DisputeStatus, EventStatus, RecurringStatus, SettlementStatus,
};

/// Whether an event may move from `from` to `to`.
pub fn event_transition_allowed(from: EventStatus, to: EventStatus) -> bool {
    use EventStatus::*;
    matches!(
        (from, to),
        (Pending, Approved) | (Pending, Reversed) | (Approved, Paid) | (Approved, Reversed)
    )
}

pub fn check_event_transition(from: EventStatus, to: EventStatus) -> CoreResult<()> {
    if event_transition_allowed(from, to) {
        Ok(())
    } else {
        Err(CoreError::InvalidEventTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Blocks a user from approving or reversing a commission they earn
/// themselves, unless they hold elevated privilege.
pub fn check_not_self_approval(
    event: &CommissionEvent,
    actor_id: &str,
    privileged: bool,
) -> CoreResult<()> {
    if !privileged && event.user_id == actor_id {
        return Err(CoreError::SelfApproval);
    }
    Ok(())
}

/// Disputes may only be raised on events that have not been settled or
/// reversed.
pub fn check_disputable(status: EventStatus) -> CoreResult<()> {
    match status {
        EventStatus::Pending | EventStatus::Approved => Ok(()),
        other => Err(CoreError::EventNotDisputable {
            status: other.to_string(),
        }),
    }
}

pub fn check_dispute_open(status: DisputeStatus) -> CoreResult<()> {
    if status == DisputeStatus::Open {
        Ok(())
    } else {
        Err(CoreError::DisputeNotOpen {
            status: status.to_string(),
        })
    }
}

pub fn check_settlement_payable(status: SettlementStatus) -> CoreResult<()> {
    if status == SettlementStatus::Closed {
        Ok(())
    } else {
        Err(CoreError::InvalidSettlementTransition {
            from: status.to_string(),
            to: SettlementStatus::Paid.to_string(),
        })
    }
}

pub fn check_recurring_transition(from: RecurringStatus, to: RecurringStatus) -> CoreResult<()> {
    use RecurringStatus::*;
    let ok = matches!(
        (from, to),
        (Active, Paused) | (Paused, Active) | (Active, Terminated) | (Paused, Terminated)
    );
    if ok {
        Ok(())
    } else {
        Err(CoreError::InvalidRecurringTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Trigger;
    use chrono::Utc;

    #[test]
    fn test_event_transition_table() {
        use EventStatus::*;
        let all = [Pending, Approved, Paid, Reversed];
        let allowed = [
            (Pending, Approved),
            (Pending, Reversed),
            (Approved, Paid),
            (Approved, Reversed),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    event_transition_allowed(from, to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(check_event_transition(EventStatus::Paid, EventStatus::Reversed).is_err());
        assert!(check_event_transition(EventStatus::Reversed, EventStatus::Approved).is_err());
    }

    #[test]
    fn test_self_approval() {
        let event = CommissionEvent {
            id: "e1".to_string(),
            tenant_id: "t1".to_string(),
            rule_id: "r1".to_string(),
            work_order_id: Some("wo1".to_string()),
            recurring_commission_id: None,
            user_id: "alice".to_string(),
            role: None,
            trigger_type: Trigger::OsCompleted,
            period: "2025-01".to_string(),
            base_amount_cents: 100,
            commission_amount_cents: 10,
            multiplier_bps: 10_000,
            status: EventStatus::Pending,
            settlement_id: None,
            notes: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(
            check_not_self_approval(&event, "alice", false),
            Err(CoreError::SelfApproval)
        ));
        assert!(check_not_self_approval(&event, "alice", true).is_ok());
        assert!(check_not_self_approval(&event, "manager", false).is_ok());
    }

    #[test]
    fn test_dispute_and_settlement_checks() {
        assert!(check_disputable(EventStatus::Pending).is_ok());
        assert!(check_disputable(EventStatus::Approved).is_ok());
        assert!(check_disputable(EventStatus::Paid).is_err());
        assert!(check_disputable(EventStatus::Reversed).is_err());

        assert!(check_dispute_open(DisputeStatus::Open).is_ok());
        assert!(check_dispute_open(DisputeStatus::Cancelled).is_err());

        assert!(check_settlement_payable(SettlementStatus::Closed).is_ok());
        assert!(check_settlement_payable(SettlementStatus::Paid).is_err());
    }

    #[test]
    fn test_recurring_transitions() {
        use RecurringStatus::*;
        assert!(check_recurring_transition(Active, Paused).is_ok());
        assert!(check_recurring_transition(Paused, Active).is_ok());
        assert!(check_recurring_transition(Paused, Terminated).is_ok());
        assert!(check_recurring_transition(Terminated, Active).is_err());
        assert!(check_recurring_transition(Active, Active).is_err());
    }
}
