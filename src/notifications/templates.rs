//! Event → notification templates.
//!
//! | event              | category     | link                   | action         |
//! |--------------------|--------------|------------------------|----------------|
//! | `notification`     | payload type | none                   | none           |
//! | `debt.created`     | `debt`       | `/debts/{debtId}`      | "View debt"    |
//! | `debt.updated`     | `debt`       | `/debts/{debtId}`      | "View debt"    |
//! | `payment.received` | `payment`    | `/debts/{debtId}`      | "View debt"    |
//! | `dispute.created`  | `dispute`    | `/disputes/{disputeId}`| "View dispute" |
//!
//! A payload without the resource id still produces a notification, just
//! without link or action. `data.updated` and `admin.audit-log` never
//! produce notifications.

use chrono::Utc;
use serde_json::Value;

use super::NewNotification;
use crate::events::{parse_timestamp, InboundEvent};

pub const GENERIC_CATEGORY: &str = "general";

const VIEW_DEBT: &str = "View debt";
const VIEW_DISPUTE: &str = "View dispute";

pub fn debt_link(debt_id: &str) -> String {
    format!("/debts/{}", urlencoding::encode(debt_id))
}

pub fn dispute_link(dispute_id: &str) -> String {
    format!("/disputes/{}", urlencoding::encode(dispute_id))
}

fn counterpart(name: Option<&str>, email: Option<&str>) -> String {
    name.or(email)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("a debtor")
        .to_string()
}

fn body_or(message: Option<&str>, fallback: impl FnOnce() -> String) -> String {
    match message.map(str::trim) {
        Some(message) if !message.is_empty() => message.to_string(),
        _ => fallback(),
    }
}

fn link_to(draft: NewNotification, link: Option<String>, action: &str) -> NewNotification {
    match link {
        Some(link) => draft.with_link(link, action),
        None => draft,
    }
}

fn stamp(draft: NewNotification, timestamp: Option<&Value>) -> NewNotification {
    draft.occurred_at(parse_timestamp(timestamp).unwrap_or_else(Utc::now))
}

/// Build the notification for `event`, if it is one that produces one.
pub fn render(event: &InboundEvent) -> Option<NewNotification> {
    let draft = match event {
        InboundEvent::Notification(notice) => {
            let category = match notice.kind.trim() {
                "" => GENERIC_CATEGORY,
                kind => kind,
            };
            stamp(
                NewNotification::new(category, notice.subject.clone(), notice.message.clone()),
                notice.timestamp.as_ref(),
            )
        }
        InboundEvent::DebtCreated(debt) => {
            let who = counterpart(debt.debtor_name.as_deref(), debt.debtor_email.as_deref());
            stamp(
                link_to(
                    NewNotification::new(
                        "debt",
                        "New debt",
                        body_or(debt.message.as_deref(), || format!("A new debt was registered for {who}")),
                    ),
                    debt.debt_id.as_deref().map(debt_link),
                    VIEW_DEBT,
                ),
                debt.timestamp.as_ref(),
            )
        }
        InboundEvent::DebtUpdated(debt) => stamp(
            link_to(
                NewNotification::new(
                    "debt",
                    "Debt updated",
                    body_or(debt.message.as_deref(), || "A debt was updated".to_string()),
                ),
                debt.debt_id.as_deref().map(debt_link),
                VIEW_DEBT,
            ),
            debt.timestamp.as_ref(),
        ),
        InboundEvent::PaymentReceived(payment) => {
            let who = counterpart(payment.debtor_name.as_deref(), payment.debtor_email.as_deref());
            stamp(
                link_to(
                    NewNotification::new(
                        "payment",
                        "Payment received",
                        body_or(payment.message.as_deref(), || format!("Payment received from {who}")),
                    ),
                    payment.debt_id.as_deref().map(debt_link),
                    VIEW_DEBT,
                ),
                payment.timestamp.as_ref(),
            )
        }
        InboundEvent::DisputeCreated(dispute) => stamp(
            link_to(
                NewNotification::new(
                    "dispute",
                    "Dispute opened",
                    body_or(dispute.message.as_deref(), || "A debt was disputed".to_string()),
                ),
                dispute.dispute_id.as_deref().map(dispute_link),
                VIEW_DISPUTE,
            ),
            dispute.timestamp.as_ref(),
        ),
        InboundEvent::DataUpdated(_) | InboundEvent::AdminAuditLog(_) => return None,
    };
    Some(draft)
}
