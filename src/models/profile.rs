//! Profile model (one row per authenticated user).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// User profile stored in the `profiles` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Same value as the auth user id
    pub id: String,
    pub full_name: Option<String>,
    pub birthdate: Option<NaiveDate>,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Set once when onboarding is finished
    pub onboarding_completed_at: Option<DateTime<Utc>>,
    pub consent_terms_at: Option<DateTime<Utc>>,
    pub consent_disclaimer_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_locale() -> String {
    "pt-BR".to_string()
}

impl Profile {
    /// Presence of the completion timestamp is the only criterion.
    pub fn is_onboarding_complete(&self) -> bool {
        self.onboarding_completed_at.is_some()
    }
}

/// Partial update for a profile row. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding_completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent_terms_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent_disclaimer_at: Option<DateTime<Utc>>,
}

impl ProfileUpdate {
    /// The write performed when a user finishes onboarding: name, birthdate,
    /// and every consent/completion timestamp stamped with `now`.
    pub fn complete_onboarding(full_name: String, birthdate: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            full_name: Some(full_name),
            birthdate: Some(birthdate),
            locale: None,
            onboarding_completed_at: Some(now),
            consent_terms_at: Some(now),
            consent_disclaimer_at: Some(now),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
