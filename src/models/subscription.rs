// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscription model and the paywall's notion of "active".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Subscription status as written by the payment integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
    Trialing,
}

/// Billing plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPlan {
    Quarterly,
    Yearly,
}

/// Zero-or-one subscription row per user (`subscriptions` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub status: SubscriptionStatus,
    pub plan: SubscriptionPlan,
    pub payment_provider: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Active means status `active` and a period end strictly in the future.
    ///
    /// `trialing` does not grant access.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active
            && self.current_period_end.is_some_and(|end| end > now)
    }
}

/// A missing row is a normal state and simply means "not active".
pub fn is_active(subscription: Option<&Subscription>, now: DateTime<Utc>) -> bool {
    subscription.is_some_and(|s| s.is_active_at(now))
}

/// A plan as presented on the paywall.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PlanOffer {
    pub id: &'static str,
    pub name: &'static str,
    pub price: &'static str,
    pub period: &'static str,
    pub description: &'static str,
    pub popular: bool,
}

impl SubscriptionPlan {
    pub const ALL: [SubscriptionPlan; 2] = [SubscriptionPlan::Quarterly, SubscriptionPlan::Yearly];

    pub fn offer(&self) -> PlanOffer {
        match self {
            SubscriptionPlan::Quarterly => PlanOffer {
                id: "quarterly",
                name: "Trimestral",
                price: "R$ 49,90",
                period: "/3 meses",
                description: "Acesso completo por 3 meses",
                popular: false,
            },
            SubscriptionPlan::Yearly => PlanOffer {
                id: "yearly",
                name: "Anual",
                price: "R$ 149,90",
                period: "/ano",
                description: "Economize 25%!",
                popular: true,
            },
        }
    }
}
