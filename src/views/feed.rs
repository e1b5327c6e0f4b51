use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::api::{Charge, ChargeStatus, Debt, DebtStatus};
use crate::notifications::templates::debt_link;
use crate::notifications::Notification;

pub const FEED_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedKind {
    Notification,
    PendingDebt,
    PendingCharge,
    OverdueCharge,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: String,
    pub kind: FeedKind,
    pub title: String,
    pub detail: String,
    pub link: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

fn is_overdue(charge: &Charge, today: NaiveDate) -> bool {
    match charge.status {
        ChargeStatus::Overdue => true,
        ChargeStatus::Pending => charge.due_date < today,
        _ => false,
    }
}

fn charge_time(charge: &Charge) -> DateTime<Utc> {
    charge
        .created_at
        .unwrap_or_else(|| charge.due_date.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}

/// Merge notifications and outstanding debts/charges into one feed,
/// newest first, keeping at most [`FEED_LIMIT`] items.
pub fn build_feed(
    notifications: &[Notification],
    debts: &[Debt],
    charges: &[Charge],
    today: NaiveDate,
) -> Vec<FeedItem> {
    let mut items: Vec<FeedItem> = notifications
        .iter()
        .map(|n| FeedItem {
            id: format!("notification:{}", n.id),
            kind: FeedKind::Notification,
            title: n.title.clone(),
            detail: n.body.clone(),
            link: n.link.clone(),
            occurred_at: n.occurred_at,
        })
        .collect();

    items.extend(
        debts
            .iter()
            .filter(|debt| debt.status == DebtStatus::Pending)
            .map(|debt| FeedItem {
                id: format!("debt:{}", debt.id),
                kind: FeedKind::PendingDebt,
                title: debt
                    .debtor_name
                    .clone()
                    .or_else(|| debt.debtor_email.clone())
                    .unwrap_or_else(|| "Pending debt".to_string()),
                detail: format!("{} pending", money(debt.amount)),
                link: Some(debt_link(&debt.id)),
                occurred_at: debt.created_at,
            }),
    );

    items.extend(
        charges
            .iter()
            .filter(|charge| matches!(charge.status, ChargeStatus::Pending | ChargeStatus::Overdue))
            .map(|charge| {
                let overdue = is_overdue(charge, today);
                let label = match charge.installment {
                    Some(n) => format!("Installment {n}"),
                    None => charge.description.clone().unwrap_or_else(|| "Charge".to_string()),
                };
                FeedItem {
                    id: format!("charge:{}", charge.id),
                    kind: if overdue {
                        FeedKind::OverdueCharge
                    } else {
                        FeedKind::PendingCharge
                    },
                    title: label,
                    detail: format!(
                        "{} {} {}",
                        money(charge.amount),
                        if overdue { "overdue since" } else { "due" },
                        charge.due_date
                    ),
                    link: Some(debt_link(&charge.debt_id)),
                    occurred_at: charge_time(charge),
                }
            }),
    );

    // Stable sort keeps source order among equal timestamps.
    items.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
    items.truncate(FEED_LIMIT);
    items
}
