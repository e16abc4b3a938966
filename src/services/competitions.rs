// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Competition registry loaded from JSON.

use dashmap::DashMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::models::Competition;

/// Accepts a bare array or `{"competitions": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum CompetitionFile {
    List(Vec<Competition>),
    Wrapped { competitions: Vec<Competition> },
}

/// Shared registry of known competitions. Cheap to clone.
#[derive(Default, Clone)]
pub struct CompetitionRegistry {
    competitions: Arc<DashMap<String, Competition>>,
}

impl CompetitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load competitions from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let json_data =
            fs::read_to_string(path.as_ref()).map_err(|e| RegistryError::IoError(e.to_string()))?;
        Self::load_from_json(&json_data)
    }

    /// Load competitions from a JSON string.
    pub fn load_from_json(json_data: &str) -> Result<Self, RegistryError> {
        let file: CompetitionFile = serde_json::from_str(json_data)
            .map_err(|e| RegistryError::ParseError(e.to_string()))?;
        let list = match file {
            CompetitionFile::List(list) => list,
            CompetitionFile::Wrapped { competitions } => competitions,
        };

        let registry = Self::new();
        for competition in list {
            if registry.competitions.contains_key(&competition.id) {
                return Err(RegistryError::Duplicate(competition.id));
            }
            registry.upsert(competition)?;
        }

        tracing::info!(count = registry.competitions.len(), "Loaded competitions");
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<Competition> {
        self.competitions.get(id).map(|c| c.clone())
    }

    /// All competitions, oldest start first.
    pub fn list(&self) -> Vec<Competition> {
        let mut list: Vec<Competition> = self
            .competitions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        list.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        list
    }

    /// Add or replace a competition.
    pub fn upsert(&self, competition: Competition) -> Result<(), RegistryError> {
        if competition.id.trim().is_empty() {
            return Err(RegistryError::Invalid("competition id is empty".to_string()));
        }
        if competition.end <= competition.start {
            return Err(RegistryError::Invalid(format!(
                "competition {} ends before it starts",
                competition.id
            )));
        }
        self.competitions
            .insert(competition.id.clone(), competition);
        Ok(())
    }

    /// Competitions listing `participant_id` as a member.
    pub fn competitions_for_participant(&self, participant_id: &str) -> Vec<Competition> {
        self.list()
            .into_iter()
            .filter(|c| c.includes(participant_id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.competitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.competitions.is_empty()
    }
}

/// Errors from competition loading.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Failed to read file: {0}")]
    IoError(String),

    #[error("Failed to parse competitions: {0}")]
    ParseError(String),

    #[error("Duplicate competition id: {0}")]
    Duplicate(String),

    #[error("Invalid competition: {0}")]
    Invalid(String),
}
