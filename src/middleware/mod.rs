// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (sessions, access gate, security headers).

pub mod auth;
pub mod gate;
pub mod security;

pub use auth::{load_session, require_auth, AuthUser, Identity};
pub use gate::{gate_api, gate_pages};
