//! Data store layer (Supabase PostgREST).

pub mod supabase;

pub use supabase::SupabaseDb;

/// Table names as constants.
pub mod tables {
    pub const PROFILES: &str = "profiles";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    pub const READINGS: &str = "readings";
    pub const JOBS: &str = "jobs";
    pub const FORECASTS: &str = "forecasts";
}
