// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cached profile and subscription reads for the signed-in user.

use crate::middleware::auth::AuthUser;
use crate::models::{Profile, Subscription};
use crate::services::query_cache::{kinds, QueryKey, QueryState};
use crate::AppState;

pub fn profile_key(user_id: &str) -> QueryKey {
    QueryKey::new(kinds::PROFILE, user_id)
}

pub fn subscription_key(user_id: &str) -> QueryKey {
    QueryKey::new(kinds::SUBSCRIPTION, user_id)
}

pub async fn profile(state: &AppState, user: &AuthUser) -> QueryState<Option<Profile>> {
    let db = state.db.clone();
    let token = user.access_token.clone();
    let user_id = user.user_id.clone();

    state
        .queries
        .profiles
        .get(
            &profile_key(&user.user_id),
            state.config.cache_max_age,
            move || async move { db.get_profile(&token, &user_id).await },
        )
        .await
}

pub async fn subscription(state: &AppState, user: &AuthUser) -> QueryState<Option<Subscription>> {
    let db = state.db.clone();
    let token = user.access_token.clone();
    let user_id = user.user_id.clone();

    state
        .queries
        .subscriptions
        .get(
            &subscription_key(&user.user_id),
            state.config.cache_max_age,
            move || async move { db.get_subscription(&token, &user_id).await },
        )
        .await
}

/// Replace the cached profile after a successful write.
pub fn store_profile(state: &AppState, profile: Profile) {
    let key = profile_key(&profile.id);
    state.queries.profiles.set(&key, Some(profile));
}
