// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Periodic forecasts (weekly, monthly, yearly).

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastType {
    Weekly,
    Monthly,
    Yearly,
}

impl ForecastType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastType::Weekly => "weekly",
            ForecastType::Monthly => "monthly",
            ForecastType::Yearly => "yearly",
        }
    }

    /// Tab label shown to users.
    pub fn label(&self) -> &'static str {
        match self {
            ForecastType::Weekly => "Semanal",
            ForecastType::Monthly => "Mensal",
            ForecastType::Yearly => "Anual",
        }
    }
}

/// A delivered forecast row (`forecasts` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub forecast_type: ForecastType,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub audio_url: Option<String>,
    pub audio_duration_seconds: Option<u32>,
    pub prompt_version: String,
    pub model_used: String,
    #[serde(default)]
    pub calculation_base: serde_json::Value,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

const MONTHS_SHORT: [&str; 12] = [
    "jan", "fev", "mar", "abr", "mai", "jun", "jul", "ago", "set", "out", "nov", "dez",
];

const MONTHS_LONG: [&str; 12] = [
    "janeiro",
    "fevereiro",
    "março",
    "abril",
    "maio",
    "junho",
    "julho",
    "agosto",
    "setembro",
    "outubro",
    "novembro",
    "dezembro",
];

impl Forecast {
    /// Human label for the covered period, in Portuguese.
    ///
    /// Weekly: "02 fev - 08 fev"; monthly: "fevereiro de 2026"; yearly: "2026".
    pub fn period_label(&self) -> String {
        let start = self.period_start;
        match self.forecast_type {
            ForecastType::Weekly => format!(
                "{:02} {} - {:02} {}",
                start.day(),
                MONTHS_SHORT[start.month0() as usize],
                self.period_end.day(),
                MONTHS_SHORT[self.period_end.month0() as usize]
            ),
            ForecastType::Monthly => {
                format!("{} de {}", MONTHS_LONG[start.month0() as usize], start.year())
            }
            ForecastType::Yearly => start.year().to_string(),
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio_url.is_some()
    }
}

/// Type selector for the forecast list ("all" disables the type predicate).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastScope {
    #[default]
    All,
    Weekly,
    Monthly,
    Yearly,
}

impl ForecastScope {
    pub fn forecast_type(&self) -> Option<ForecastType> {
        match self {
            ForecastScope::All => None,
            ForecastScope::Weekly => Some(ForecastType::Weekly),
            ForecastScope::Monthly => Some(ForecastType::Monthly),
            ForecastScope::Yearly => Some(ForecastType::Yearly),
        }
    }
}

/// Optional predicates for listing forecasts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct ForecastFilter {
    #[serde(rename = "type", default)]
    pub scope: ForecastScope,
    /// Only forecasts whose period starts on or after this date
    pub start_date: Option<NaiveDate>,
    /// Only forecasts whose period ends on or before this date
    pub end_date: Option<NaiveDate>,
}

impl ForecastFilter {
    pub fn validate(&self) -> Result<(), AppError> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(AppError::BadRequest(
                    "start_date must not be after end_date".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Stable cache discriminator for this filter.
    pub fn cache_key(&self) -> String {
        let date = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
        format!(
            "type={};start={};end={}",
            self.scope.forecast_type().map(|t| t.as_str()).unwrap_or("all"),
            date(self.start_date),
            date(self.end_date)
        )
    }
}
