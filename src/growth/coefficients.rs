//! Growth context coefficients
//!
//! Two dimensionless factors scale soil-water capacities to the crop:
//! the root-depth coefficient (shallow roots reach half the layer) and the
//! growth-stage coefficient (water demand by phenological stage). Both fall
//! back to the neutral 1.0 whenever the feed cannot answer.

use crate::config::GrowthConfig;
use crate::growth::feed::GrowthFeed;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const NEUTRAL_COEFFICIENT: f64 = 1.0;
pub const SHALLOW_ROOT_COEFFICIENT: f64 = 0.5;

/// Simulator stage labels mapped onto configuration keys
const STAGE_ALIASES: [(&str, &str); 6] = [
    ("播种-出苗期", "sowing-emergence"),
    ("出苗-分蘖期", "emergence-tillering"),
    ("分蘖-越冬期", "tillering-overwintering"),
    ("返青-拔节期", "greening-jointing"),
    ("拔节-抽穗期", "jointing-heading"),
    ("抽穗-成熟期", "heading-maturity"),
];

pub fn canonical_stage_name(name: &str) -> &str {
    let trimmed = name.trim();
    STAGE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == trimmed)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(trimmed)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthCoefficients {
    pub root_depth_coefficient: f64,
    pub growth_stage_coefficient: f64,
    pub root_depth_m: Option<f64>,
    pub stage: Option<String>,
}

impl Default for GrowthCoefficients {
    fn default() -> Self {
        Self {
            root_depth_coefficient: NEUTRAL_COEFFICIENT,
            growth_stage_coefficient: NEUTRAL_COEFFICIENT,
            root_depth_m: None,
            stage: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GrowthContextProvider {
    feed: Arc<dyn GrowthFeed>,
    root_depth_threshold_m: f64,
    stage_coefficients: BTreeMap<String, f64>,
}

impl GrowthContextProvider {
    pub fn new(feed: Arc<dyn GrowthFeed>, config: &GrowthConfig) -> Self {
        Self {
            feed,
            root_depth_threshold_m: config.root_depth_threshold_m,
            stage_coefficients: config.stage_coefficients.clone(),
        }
    }

    pub fn coefficients(&self, today: NaiveDate) -> GrowthCoefficients {
        let (root_depth_coefficient, root_depth_m) = self.root_depth(today);
        let (growth_stage_coefficient, stage) = self.growth_stage(today);
        GrowthCoefficients {
            root_depth_coefficient,
            growth_stage_coefficient,
            root_depth_m,
            stage,
        }
    }

    pub fn root_depth_coefficient(&self, today: NaiveDate) -> f64 {
        self.root_depth(today).0
    }

    pub fn growth_stage_coefficient(&self, today: NaiveDate) -> f64 {
        self.growth_stage(today).0
    }

    fn root_depth(&self, today: NaiveDate) -> (f64, Option<f64>) {
        let row = match self.feed.current_row(today) {
            Ok(Some(row)) => row,
            Ok(None) => {
                warn!(date = %today, "Growth feed has no rows, neutral root-depth coefficient");
                return (NEUTRAL_COEFFICIENT, None);
            }
            Err(error) => {
                warn!(date = %today, error = %error, "Growth feed unavailable, neutral root-depth coefficient");
                return (NEUTRAL_COEFFICIENT, None);
            }
        };

        let Some(depth) = row.root_depth_m else {
            warn!(date = %row.date, "Root depth missing from feed row, neutral coefficient");
            return (NEUTRAL_COEFFICIENT, None);
        };

        let coefficient = if depth < self.root_depth_threshold_m {
            SHALLOW_ROOT_COEFFICIENT
        } else {
            NEUTRAL_COEFFICIENT
        };
        debug!(
            root_depth_m = depth,
            threshold_m = self.root_depth_threshold_m,
            coefficient,
            "Root-depth coefficient"
        );
        (coefficient, Some(depth))
    }

    fn growth_stage(&self, today: NaiveDate) -> (f64, Option<String>) {
        let stage = match self.feed.stage_at(today) {
            Ok(Some(stage)) => stage,
            Ok(None) => {
                warn!(date = %today, "No growth stage covers today, neutral stage coefficient");
                return (NEUTRAL_COEFFICIENT, None);
            }
            Err(error) => {
                warn!(date = %today, error = %error, "Stage table unavailable, neutral stage coefficient");
                return (NEUTRAL_COEFFICIENT, None);
            }
        };

        let canonical = canonical_stage_name(&stage.name).to_string();
        match self.stage_coefficients.get(&canonical) {
            Some(coefficient) => {
                debug!(stage = %canonical, coefficient, "Growth-stage coefficient");
                (*coefficient, Some(canonical))
            }
            None => {
                warn!(stage = %stage.name, "No coefficient configured for stage, using neutral");
                (NEUTRAL_COEFFICIENT, Some(canonical))
            }
        }
    }
}
