use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use crate::at_risk::DEFAULT_THRESHOLD;
use crate::client::{HttpChurnService, SharedService};
use crate::paginate::DEFAULT_PAGE_SIZE;
use crate::risk::TierTable;

/// Settings shared by every subcommand; each flag falls back to an environment variable.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Base URL of the churn model service
    #[arg(long, global = true, env = "CHURN_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,
    /// Predictions shown per page
    #[arg(
        long,
        global = true,
        env = "CHURN_PAGE_SIZE",
        default_value_t = DEFAULT_PAGE_SIZE,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub page_size: usize,
    /// Default at-risk threshold
    #[arg(long, global = true, env = "CHURN_AT_RISK_THRESHOLD", default_value_t = DEFAULT_THRESHOLD.to_string())]
    pub threshold: String,
    /// Tier table for prediction results, e.g. "High>0.7:red,Medium>0.5:yellow,Low:green"
    #[arg(long, global = true, env = "CHURN_RESULTS_TIERS")]
    pub results_tiers: Option<TierTable>,
    /// Tier table for at-risk customers, e.g. "Critical>0.8:red,High>0.7:orange,Medium:yellow"
    #[arg(long, global = true, env = "CHURN_AT_RISK_TIERS")]
    pub at_risk_tiers: Option<TierTable>,
    #[arg(long, global = true, env = "CHURN_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,
    /// Training runs server side, so reads wait much longer than connects
    #[arg(long, global = true, env = "CHURN_READ_TIMEOUT_SECS", default_value_t = 300)]
    pub read_timeout_secs: u64,
}

impl Config {
    pub fn service(&self) -> SharedService {
        Arc::new(HttpChurnService::new(
            &self.api_url,
            Duration::from_secs(self.connect_timeout_secs),
            Duration::from_secs(self.read_timeout_secs),
        ))
    }

    pub fn results_table(&self) -> TierTable {
        self.results_tiers.clone().unwrap_or_else(TierTable::results)
    }

    pub fn at_risk_table(&self) -> TierTable {
        self.at_risk_tiers.clone().unwrap_or_else(TierTable::at_risk)
    }
}
