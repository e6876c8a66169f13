//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs:
//! pool identity, the ticket size table, and the database URL. The
//! table is validated here so the allocation solver can trust it.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;

use crate::types::TicketSizeLevel;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub pool: PoolConfig,
    pub levels: Vec<LevelConfig>,
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    pub id: String,
    pub name: String,
    /// Value of one quota share.
    pub quota_value: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LevelConfig {
    pub number_count: u8,
    pub cost: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// The validated ticket size table, sorted by ascending size.
    pub fn ticket_levels(&self) -> Vec<TicketSizeLevel> {
        let mut levels: Vec<TicketSizeLevel> = self
            .levels
            .iter()
            .map(|l| TicketSizeLevel {
                number_count: l.number_count,
                cost: l.cost,
            })
            .collect();
        levels.sort_by_key(|l| l.number_count);
        levels
    }

    /// Costs must be strictly increasing with wager size.
    fn validate(&self) -> Result<()> {
        if self.levels.is_empty() {
            bail!("Ticket size table is empty");
        }
        let levels = self.ticket_levels();
        for pair in levels.windows(2) {
            if pair[1].number_count == pair[0].number_count {
                bail!("Duplicate ticket size: {}", pair[0].number_count);
            }
            if pair[1].cost <= pair[0].cost {
                bail!(
                    "Ticket costs must increase with size: {} vs {}",
                    pair[0],
                    pair[1]
                );
            }
        }
        Ok(())
    }
}
