// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Life-map readings: one generated interpretation per section.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The five fixed sections of a user's life map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSection {
    MissaoDaAlma,
    Personalidade,
    Destino,
    Proposito,
    ManifestacaoMaterial,
    /// Section keys this build does not know about (never required)
    #[serde(other)]
    Unknown,
}

impl ReadingSection {
    /// Every section a complete life map must contain, in display order.
    pub const ALL: [ReadingSection; 5] = [
        ReadingSection::MissaoDaAlma,
        ReadingSection::Personalidade,
        ReadingSection::Destino,
        ReadingSection::Proposito,
        ReadingSection::ManifestacaoMaterial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingSection::MissaoDaAlma => "missao_da_alma",
            ReadingSection::Personalidade => "personalidade",
            ReadingSection::Destino => "destino",
            ReadingSection::Proposito => "proposito",
            ReadingSection::ManifestacaoMaterial => "manifestacao_material",
            ReadingSection::Unknown => "unknown",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ReadingSection::MissaoDaAlma => "Missão da Alma",
            ReadingSection::Personalidade => "Personalidade",
            ReadingSection::Destino => "Destino",
            ReadingSection::Proposito => "Propósito",
            ReadingSection::ManifestacaoMaterial => "Manifestação Material",
            ReadingSection::Unknown => "Desconhecida",
        }
    }
}

/// Generated interpretation stored as JSON in `readings.content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingContent {
    /// Major arcana name, e.g. "O Hierofante"
    pub arcano: String,
    pub titulo: String,
    pub interpretacao: String,
    pub sombra: String,
    pub conselho: String,
}

/// A produced reading row. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: String,
    pub user_id: String,
    pub section: ReadingSection,
    pub content: ReadingContent,
    pub prompt_version: String,
    pub model_used: String,
    pub created_at: DateTime<Utc>,
}

/// Find the produced reading for one section.
pub fn reading_for_section(readings: &[Reading], section: ReadingSection) -> Option<&Reading> {
    readings.iter().find(|r| r.section == section)
}

/// True iff every required section has a produced row.
///
/// Job status plays no part: a section's content may exist even if another
/// section's job failed.
pub fn has_all_sections(readings: &[Reading], required: &[ReadingSection]) -> bool {
    let present: HashSet<ReadingSection> = readings.iter().map(|r| r.section).collect();
    required.iter().all(|s| present.contains(s))
}
