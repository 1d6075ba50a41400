// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access gate: decides which view a visitor may reach.
//!
//! The decision is a pure function of three facts (identity, onboarding,
//! subscription). Stages are strictly ordered and a visitor is always sent to
//! the first stage they have not cleared:
//!
//! ```text
//! SignIn < Onboarding < Paywall < Authorized
//! ```

use crate::services::query_cache::QueryState;
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// One gate input as currently known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fact {
    /// Fetch in flight with nothing cached yet
    Loading,
    /// Fetch failed with nothing cached to fall back on
    Failed,
    Known(bool),
}

impl Fact {
    /// Derive a fact from a cached query. Cached data wins over a failed
    /// refresh.
    pub fn from_query<T>(state: &QueryState<T>, predicate: impl FnOnce(&T) -> bool) -> Self {
        match (&state.data, &state.error) {
            (Some(data), _) => Fact::Known(predicate(data)),
            (None, Some(_)) => Fact::Failed,
            (None, None) => Fact::Loading,
        }
    }
}

impl From<bool> for Fact {
    fn from(value: bool) -> Self {
        Fact::Known(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateInputs {
    pub identity: Fact,
    pub onboarded: Fact,
    pub subscribed: Fact,
}

impl GateInputs {
    /// Inputs for a visitor without a session. Profile and subscription
    /// fetches are never issued without an identity.
    pub const ANONYMOUS: GateInputs = GateInputs {
        identity: Fact::Known(false),
        onboarded: Fact::Known(false),
        subscribed: Fact::Known(false),
    };

    pub fn known(identity: bool, onboarded: bool, subscribed: bool) -> Self {
        Self {
            identity: identity.into(),
            onboarded: onboarded.into(),
            subscribed: subscribed.into(),
        }
    }

    fn any_loading(&self) -> bool {
        [self.identity, self.onboarded, self.subscribed].contains(&Fact::Loading)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Stage {
    SignIn,
    Onboarding,
    Paywall,
    Authorized,
}

impl Stage {
    /// Where a visitor at this stage belongs.
    pub fn route(&self) -> Route {
        match self {
            Stage::SignIn => Route::Login,
            Stage::Onboarding => Route::Onboarding,
            Stage::Paywall => Route::Paywall,
            Stage::Authorized => Route::Mapa,
        }
    }
}

/// Result of walking the stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePosition {
    Loading,
    /// The fact needed to clear this stage failed to load
    Unavailable(Stage),
    /// First stage not yet cleared (`Authorized` when all are)
    At(Stage),
}

/// Walk stages in order and stop at the first one not cleared.
pub fn first_unmet_stage(inputs: &GateInputs) -> StagePosition {
    if inputs.any_loading() {
        return StagePosition::Loading;
    }

    let checks = [
        (Stage::SignIn, inputs.identity),
        (Stage::Onboarding, inputs.onboarded),
        (Stage::Paywall, inputs.subscribed),
    ];

    for (stage, fact) in checks {
        match fact {
            Fact::Known(true) => continue,
            Fact::Known(false) => return StagePosition::At(stage),
            Fact::Failed => return StagePosition::Unavailable(stage),
            Fact::Loading => return StagePosition::Loading,
        }
    }

    StagePosition::At(Stage::Authorized)
}

/// How a route is gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    /// Requires every stage cleared
    Protected,
    /// Login/signup: only for visitors without a session
    PublicOnly,
    /// Renders only for visitors at the onboarding stage
    Onboarding,
    /// Renders only for visitors at the paywall stage
    Paywall,
}

impl GateMode {
    /// The stage at which this mode renders.
    pub fn stage(&self) -> Stage {
        match self {
            GateMode::Protected => Stage::Authorized,
            GateMode::PublicOnly => Stage::SignIn,
            GateMode::Onboarding => Stage::Onboarding,
            GateMode::Paywall => Stage::Paywall,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum GateDecision {
    Loading,
    RedirectToLogin,
    RedirectToOnboarding,
    RedirectToPaywall,
    RedirectToHome,
    Render,
    /// A required fact could not be fetched; show an error view with retry
    Unavailable,
}

impl GateDecision {
    fn redirect_to(stage: Stage) -> Self {
        match stage {
            Stage::SignIn => GateDecision::RedirectToLogin,
            Stage::Onboarding => GateDecision::RedirectToOnboarding,
            Stage::Paywall => GateDecision::RedirectToPaywall,
            Stage::Authorized => GateDecision::RedirectToHome,
        }
    }

    /// Redirect target, if this decision is a redirect.
    pub fn location(&self) -> Option<Route> {
        match self {
            GateDecision::RedirectToLogin => Some(Route::Login),
            GateDecision::RedirectToOnboarding => Some(Route::Onboarding),
            GateDecision::RedirectToPaywall => Some(Route::Paywall),
            GateDecision::RedirectToHome => Some(Route::Mapa),
            _ => None,
        }
    }
}

/// Decide what a visitor gets for a route gated by `mode`.
///
/// Any loading input yields `Loading` and no redirect. Otherwise the visitor
/// is sent to their first unmet stage, or the route renders if that stage is
/// the one `mode` serves.
pub fn decide(mode: GateMode, inputs: &GateInputs) -> GateDecision {
    match first_unmet_stage(inputs) {
        StagePosition::Loading => GateDecision::Loading,
        StagePosition::Unavailable(_) => GateDecision::Unavailable,
        StagePosition::At(stage) if stage == mode.stage() => GateDecision::Render,
        StagePosition::At(stage) => GateDecision::redirect_to(stage),
    }
}

/// Every page route of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Landing,
    Login,
    Signup,
    ResetPassword,
    Onboarding,
    Paywall,
    Mapa,
    Previsoes,
    Perfil,
}

impl Route {
    pub const ALL: [Route; 9] = [
        Route::Landing,
        Route::Login,
        Route::Signup,
        Route::ResetPassword,
        Route::Onboarding,
        Route::Paywall,
        Route::Mapa,
        Route::Previsoes,
        Route::Perfil,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Landing => "/",
            Route::Login => "/login",
            Route::Signup => "/signup",
            Route::ResetPassword => "/reset-password",
            Route::Onboarding => "/onboarding",
            Route::Paywall => "/paywall",
            Route::Mapa => "/mapa",
            Route::Previsoes => "/previsoes",
            Route::Perfil => "/perfil",
        }
    }

    pub fn from_path(path: &str) -> Option<Route> {
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        Route::ALL.into_iter().find(|route| route.path() == path)
    }

    /// Gate applied to this route; `None` means always open.
    pub fn gate_mode(&self) -> Option<GateMode> {
        match self {
            Route::Landing | Route::ResetPassword => None,
            Route::Login | Route::Signup => Some(GateMode::PublicOnly),
            Route::Onboarding => Some(GateMode::Onboarding),
            Route::Paywall => Some(GateMode::Paywall),
            Route::Mapa | Route::Previsoes | Route::Perfil => Some(GateMode::Protected),
        }
    }
}
