//! Who earns on a work order.
//!
//! The assignee is a technician, the seller a seller and the driver a
//! driver; every user in the technician assignment table joins with their own
//! role (technician when unset). Pairs are deduplicated by (user, role), so
//! one user may appear once per role.

use serde::Serialize;
use std::collections::HashSet;

use crate::config::EngineConfig;
use crate::types::Role;
use crate::work_order::{TechnicianAssignment, WorkOrder};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Beneficiary {
    pub user_id: String,
    pub role: Role,
    /// Amount divisor: the technician count for technicians on a shared
    /// order, otherwise 1.
    pub split_divisor: u32,
}

/// Resolves the distinct (user, role) pairs of a work order, in a stable
/// order: assignee, assigned technicians, seller, driver.
pub fn resolve_beneficiaries(
    order: &WorkOrder,
    assignments: &[TechnicianAssignment],
    config: &EngineConfig,
) -> Vec<Beneficiary> {
    let mut seen: HashSet<(String, Role)> = HashSet::new();
    let mut list: Vec<Beneficiary> = Vec::new();

    let mut push = |user_id: &str, role: Role, list: &mut Vec<Beneficiary>| {
        if seen.insert((user_id.to_string(), role)) {
            list.push(Beneficiary {
                user_id: user_id.to_string(),
                role,
                split_divisor: 1,
            });
        }
    };

    if let Some(assignee) = order.assignee_id.as_deref() {
        push(assignee, Role::Technician, &mut list);
    }
    for a in assignments {
        push(&a.user_id, a.role.unwrap_or(Role::Technician), &mut list);
    }

    let technicians: HashSet<String> = list
        .iter()
        .filter(|b| b.role == Role::Technician)
        .map(|b| b.user_id.clone())
        .collect();

    if let Some(seller) = order.seller_id.as_deref() {
        let blocked = config.block_seller_when_technician && technicians.contains(seller);
        if !blocked {
            push(seller, Role::Seller, &mut list);
        }
    }
    if let Some(driver) = order.driver_id.as_deref() {
        push(driver, Role::Driver, &mut list);
    }

    if config.split_technician_commissions && technicians.len() > 1 {
        let divisor = technicians.len() as u32;
        for b in list.iter_mut().filter(|b| b.role == Role::Technician) {
            b.split_divisor = divisor;
        }
    }

    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn order() -> WorkOrder {
        WorkOrder {
            id: "wo1".to_string(),
            tenant_id: "t1".to_string(),
            number: "OS-1".to_string(),
            total_cents: 100_000,
            displacement_value_cents: 0,
            is_warranty: false,
            assignee_id: Some("alice".to_string()),
            seller_id: Some("bob".to_string()),
            driver_id: Some("carol".to_string()),
            recurring_contract_id: None,
            quote_source: None,
            received_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    fn assign(user: &str, role: Option<Role>) -> TechnicianAssignment {
        TechnicianAssignment {
            work_order_id: "wo1".to_string(),
            user_id: user.to_string(),
            role,
        }
    }

    fn pairs(list: &[Beneficiary]) -> Vec<(&str, Role)> {
        list.iter().map(|b| (b.user_id.as_str(), b.role)).collect()
    }

    #[test]
    fn test_all_roles_in_order() {
        let list = resolve_beneficiaries(&order(), &[], &EngineConfig::default());
        assert_eq!(
            pairs(&list),
            vec![
                ("alice", Role::Technician),
                ("bob", Role::Seller),
                ("carol", Role::Driver)
            ]
        );
    }

    #[test]
    fn test_dedup_by_user_and_role() {
        let assignments = vec![
            assign("alice", None),
            assign("dave", Some(Role::Technician)),
            assign("alice", Some(Role::Driver)),
        ];
        let list = resolve_beneficiaries(&order(), &assignments, &EngineConfig::default());
        assert_eq!(
            pairs(&list),
            vec![
                ("alice", Role::Technician),
                ("dave", Role::Technician),
                ("alice", Role::Driver),
                ("bob", Role::Seller),
                ("carol", Role::Driver)
            ]
        );
        let divisors: Vec<u32> = list.iter().map(|b| b.split_divisor).collect();
        assert_eq!(divisors, vec![2, 2, 1, 1, 1]);
    }

    #[test]
    fn test_technicians_split_by_default() {
        let list = resolve_beneficiaries(&order(), &[assign("dave", None)], &EngineConfig::default());
        let techs: Vec<u32> = list
            .iter()
            .filter(|b| b.role == Role::Technician)
            .map(|b| b.split_divisor)
            .collect();
        assert_eq!(techs, vec![2, 2]);
        assert!(list
            .iter()
            .filter(|b| b.role != Role::Technician)
            .all(|b| b.split_divisor == 1));
    }

    #[test]
    fn test_split_can_be_turned_off() {
        let config = EngineConfig {
            split_technician_commissions: false,
            ..Default::default()
        };
        let list = resolve_beneficiaries(&order(), &[assign("dave", None)], &config);
        assert!(list.iter().all(|b| b.split_divisor == 1));
    }

    #[test]
    fn test_seller_blocked_by_default_when_also_technician() {
        let mut wo = order();
        wo.seller_id = Some("alice".to_string());

        let blocked = resolve_beneficiaries(&wo, &[], &EngineConfig::default());
        assert!(!pairs(&blocked).contains(&("alice", Role::Seller)));
        assert!(pairs(&blocked).contains(&("alice", Role::Technician)));

        let config = EngineConfig {
            block_seller_when_technician: false,
            ..Default::default()
        };
        let open = resolve_beneficiaries(&wo, &[], &config);
        assert!(pairs(&open).contains(&("alice", Role::Seller)));
    }

    #[test]
    fn test_empty_order_has_no_beneficiaries() {
        let mut wo = order();
        wo.assignee_id = None;
        wo.seller_id = None;
        wo.driver_id = None;
        assert!(resolve_beneficiaries(&wo, &[], &EngineConfig::default()).is_empty());
    }
}
