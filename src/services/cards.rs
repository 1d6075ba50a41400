// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Major arcana card images.

use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Storage bucket holding the card artwork.
const CARDS_BUCKET: &str = "cards";

/// The 22 major arcana as named in generated readings.
const ARCANA: [(&str, &str); 22] = [
    ("O Louco", "o_louco.png"),
    ("O Mago", "o_mago.png"),
    ("A Sacerdotisa", "a_sacerdotisa.png"),
    ("A Imperatriz", "a_imperatriz.png"),
    ("O Imperador", "o_imperador.png"),
    ("O Hierofante", "o_hierofante.png"),
    ("Os Enamorados", "os_enamorados.png"),
    ("O Carro", "o_carro.png"),
    ("A Justiça", "a_justica.png"),
    ("O Eremita", "o_eremita.png"),
    ("A Roda da Fortuna", "a_roda_da_fortuna.png"),
    ("A Força", "a_forca.png"),
    ("O Pendurado", "o_pendurado.png"),
    ("A Morte", "a_morte.png"),
    ("A Temperança", "a_temperanca.png"),
    ("O Diabo", "o_diabo.png"),
    ("A Torre", "a_torre.png"),
    ("A Estrela", "a_estrela.png"),
    ("A Lua", "a_lua.png"),
    ("O Sol", "o_sol.png"),
    ("O Julgamento", "o_julgamento.png"),
    ("O Mundo", "o_mundo.png"),
];

/// Image locations for one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CardImage {
    pub arcano: String,
    /// Public object storage URL
    pub url: String,
    /// Bundled asset used when the storage URL fails to load
    pub fallback_url: String,
    /// Whether the name is one of the 22 major arcana
    pub known: bool,
}

/// Lowercase, strip accents, join words with `_`, drop anything else.
pub fn slugify(name: &str) -> String {
    let folded: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    folded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

/// Image file name for an arcana name; unknown names are slugified.
pub fn card_filename(arcano: &str) -> (String, bool) {
    let arcano = arcano.trim();
    match ARCANA.iter().find(|(name, _)| *name == arcano) {
        Some((_, file)) => (file.to_string(), true),
        None => (format!("{}.png", slugify(arcano)), false),
    }
}

pub fn card_image(supabase_url: &str, arcano: &str) -> CardImage {
    let (file, known) = card_filename(arcano);
    CardImage {
        arcano: arcano.trim().to_string(),
        url: format!(
            "{}/storage/v1/object/public/{}/{}",
            supabase_url.trim_end_matches('/'),
            CARDS_BUCKET,
            file
        ),
        fallback_url: format!("/{}/{}", CARDS_BUCKET, file),
        known,
    }
}
