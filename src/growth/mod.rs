//! # Growth Context
//!
//! Reads the crop simulator's daily feed and stage table, and turns the
//! current row into the root-depth and growth-stage coefficients the decision
//! engine scales soil capacities by. Also keeps the simulator's output fresh
//! by running it at most once per day.

pub mod coefficients;
pub mod feed;
pub mod refresh;

pub use coefficients::{canonical_stage_name, GrowthCoefficients, GrowthContextProvider};
pub use feed::{FeedError, FeedRow, FileGrowthFeed, GrowthFeed, GrowthStage};
pub use refresh::{
    CommandModelRunner, CropModelRefresher, CropModelRunner, RefreshError, RefreshOutcome,
};
