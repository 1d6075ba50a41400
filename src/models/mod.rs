// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for rows read from (and written to) the data store.

pub mod forecast;
pub mod job;
pub mod profile;
pub mod reading;
pub mod subscription;

pub use forecast::{Forecast, ForecastFilter, ForecastScope, ForecastType};
pub use job::{GenerationStatus, Job, JobStatus};
pub use profile::{Profile, ProfileUpdate};
pub use reading::{Reading, ReadingContent, ReadingSection};
pub use subscription::{PlanOffer, Subscription, SubscriptionPlan, SubscriptionStatus};
