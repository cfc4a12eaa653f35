use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{LedgerError, LedgerResult};
use crate::models::{Event, TicketType};

/// How ticket types without a capacity of their own are treated when the
/// parent event is capacity-limited.
///
/// `Exclude` leaves them out of the allocation sum, so ticket-type
/// allocations can add up to more than the event holds; sales are still
/// capped by [`admit_sale`]. `Reject` refuses to create such a ticket type in
/// the first place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnboundedCapacityPolicy {
    #[default]
    Exclude,
    Reject,
}

impl FromStr for UnboundedCapacityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exclude" => Ok(UnboundedCapacityPolicy::Exclude),
            "reject" => Ok(UnboundedCapacityPolicy::Reject),
            other => Err(format!("unknown unbounded capacity policy '{other}'")),
        }
    }
}

/// Decides whether `proposed` fits next to the event's other ticket types.
///
/// `others` must not contain the ticket type being updated. Pure: callers are
/// responsible for holding the event lock while the decision is acted upon.
pub fn admit(
    event: &Event,
    others: &[TicketType],
    proposed: Option<i32>,
    policy: UnboundedCapacityPolicy,
) -> LedgerResult<()> {
    if let Some(capacity) = proposed {
        if capacity < 0 {
            return Err(LedgerError::Validation(
                "ticket type capacity must not be negative".to_string(),
            ));
        }
    }

    let Some(event_capacity) = event.capacity else {
        return Ok(());
    };

    let Some(proposed) = proposed else {
        return match policy {
            UnboundedCapacityPolicy::Exclude => Ok(()),
            UnboundedCapacityPolicy::Reject => Err(exceeded(event.id, None, event_capacity, None)),
        };
    };

    let allocated: i64 = others
        .iter()
        .filter(|other| other.event_id == event.id)
        .filter_map(|other| other.capacity)
        .map(i64::from)
        .sum();
    let requested = allocated + i64::from(proposed);

    if requested > i64::from(event_capacity) {
        return Err(exceeded(event.id, None, event_capacity, Some(requested)));
    }
    Ok(())
}

/// Decides whether `requested` new tickets fit next to the ones already
/// `issued`, both keyed by ticket type.
///
/// Every ticket type with a capacity is checked on its own, then the event
/// capacity is checked against all tickets of the event, unbounded ticket
/// types included. `issued` must count every non-cancelled ticket of the
/// event.
pub fn admit_sale(
    event: &Event,
    ticket_types: &[TicketType],
    issued: &HashMap<Uuid, i64>,
    requested: &HashMap<Uuid, i64>,
) -> LedgerResult<()> {
    for ticket_type in ticket_types {
        let Some(wanted) = requested.get(&ticket_type.id).copied() else {
            continue;
        };
        if let Some(capacity) = ticket_type.capacity {
            let total = issued.get(&ticket_type.id).copied().unwrap_or(0) + wanted;
            if total > i64::from(capacity) {
                return Err(exceeded(
                    event.id,
                    Some(ticket_type.id),
                    capacity,
                    Some(total),
                ));
            }
        }
    }

    if let Some(capacity) = event.capacity {
        let total = issued.values().sum::<i64>() + requested.values().sum::<i64>();
        if total > i64::from(capacity) {
            return Err(exceeded(event.id, None, capacity, Some(total)));
        }
    }
    Ok(())
}

/// A ticket type cannot be shrunk below the tickets it has already issued.
pub fn ensure_floor(
    ticket_type: &TicketType,
    proposed: Option<i32>,
    issued: i64,
) -> LedgerResult<()> {
    match proposed {
        Some(capacity) if i64::from(capacity) < issued => Err(exceeded(
            ticket_type.event_id,
            Some(ticket_type.id),
            capacity,
            Some(issued),
        )),
        _ => Ok(()),
    }
}

fn exceeded(
    event_id: Uuid,
    ticket_type_id: Option<Uuid>,
    capacity: i32,
    requested: Option<i64>,
) -> LedgerError {
    LedgerError::CapacityExceeded {
        event_id,
        ticket_type_id,
        capacity,
        requested,
    }
}
