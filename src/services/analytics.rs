// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Product analytics events.
//!
//! Every event is logged at debug level. When a PostHog project key is
//! configured the event is also captured through the PostHog HTTP API on a
//! background task; capture failures are logged and otherwise ignored.

use chrono::Utc;
use dashmap::DashSet;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsEvent {
    OnboardingStarted,
    OnboardingCompleted,
    PaywallViewed,
    SubscriptionStarted,
    SubscriptionActivated,
    ReadingGenerationStarted,
    ReadingGenerationCompleted,
    ReadingGenerationFailed,
    ProfileViewed,
    TabSelected,
}

impl AnalyticsEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsEvent::OnboardingStarted => "onboarding_started",
            AnalyticsEvent::OnboardingCompleted => "onboarding_completed",
            AnalyticsEvent::PaywallViewed => "paywall_viewed",
            AnalyticsEvent::SubscriptionStarted => "subscription_started",
            AnalyticsEvent::SubscriptionActivated => "subscription_activated",
            AnalyticsEvent::ReadingGenerationStarted => "reading_generation_started",
            AnalyticsEvent::ReadingGenerationCompleted => "reading_generation_completed",
            AnalyticsEvent::ReadingGenerationFailed => "reading_generation_failed",
            AnalyticsEvent::ProfileViewed => "profile_viewed",
            AnalyticsEvent::TabSelected => "tab_selected",
        }
    }
}

/// Optional event properties. Unset fields are omitted from the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_previous_subscription: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate_year: Option<i32>,
}

impl EventProperties {
    pub fn for_user(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Clone)]
struct PostHog {
    key: String,
    capture_url: String,
}

/// Analytics client. Cheap to clone.
#[derive(Clone)]
pub struct Analytics {
    http: reqwest::Client,
    posthog: Option<PostHog>,
    identified: Arc<DashSet<String>>,
}

impl Analytics {
    /// Create a client; capture is disabled when `posthog_key` is `None`.
    pub fn new(http: reqwest::Client, posthog_key: Option<String>, posthog_host: &str) -> Self {
        let posthog = posthog_key.map(|key| PostHog {
            key,
            capture_url: format!("{}/capture/", posthog_host.trim_end_matches('/')),
        });
        Self {
            http,
            posthog,
            identified: Arc::new(DashSet::new()),
        }
    }

    /// Log-only client.
    pub fn disabled() -> Self {
        Self::new(reqwest::Client::new(), None, "")
    }

    pub fn is_enabled(&self) -> bool {
        self.posthog.is_some()
    }

    pub fn track(&self, event: AnalyticsEvent, properties: EventProperties) {
        tracing::debug!(event = event.as_str(), properties = ?properties, "Analytics event");

        let distinct_id = properties
            .user_id
            .clone()
            .unwrap_or_else(|| "anonymous".to_string());
        self.capture(event.as_str(), &distinct_id, serde_json::to_value(&properties).ok());
    }

    /// Associate subsequent events with `user_id`. Repeated calls are no-ops.
    pub fn identify(&self, user_id: &str) {
        if !self.identified.insert(user_id.to_string()) {
            return;
        }
        tracing::debug!(user_id, "Analytics identify");
        self.capture("$identify", user_id, None);
    }

    /// Forget the identity of a signed-out user.
    pub fn reset(&self, user_id: &str) {
        if self.identified.remove(user_id).is_some() {
            tracing::debug!(user_id, "Analytics identity reset");
        }
    }

    pub fn is_identified(&self, user_id: &str) -> bool {
        self.identified.contains(user_id)
    }

    fn capture(&self, event: &str, distinct_id: &str, properties: Option<serde_json::Value>) {
        let Some(posthog) = &self.posthog else {
            return;
        };

        let body = capture_body(&posthog.key, event, distinct_id, properties);
        let request = self.http.post(&posthog.capture_url).json(&body);
        let event = event.to_string();

        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    tracing::warn!(event = %event, status = %response.status(), "Analytics capture rejected");
                }
                Err(e) => {
                    tracing::warn!(event = %event, error = %e, "Analytics capture failed");
                }
            }
        });
    }
}

fn capture_body(
    api_key: &str,
    event: &str,
    distinct_id: &str,
    properties: Option<serde_json::Value>,
) -> serde_json::Value {
    serde_json::json!({
        "api_key": api_key,
        "event": event,
        "distinct_id": distinct_id,
        "properties": properties.unwrap_or_else(|| serde_json::json!({})),
        "timestamp": Utc::now().to_rfc3339(),
    })
}
