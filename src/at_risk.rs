use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{run_blocking, ServiceError, SharedService};
use crate::models::{AtRiskResponse, ResultSet, UploadedFile};
use crate::risk::{annotate_rows, AnnotatedRow, TierTable};

pub const DEFAULT_THRESHOLD: f64 = 0.6;

pub fn parse_threshold(input: &str) -> Option<f64> {
    input
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtRiskTicket {
    pub request_id: Uuid,
    pub storage_key: String,
    pub threshold: f64,
}

#[derive(Debug, PartialEq)]
pub enum AtRiskView<'a> {
    NotRun,
    Loading,
    NoneAtRisk { threshold: f64 },
    Customers {
        threshold: f64,
        rows: Vec<AnnotatedRow<'a>>,
    },
}

pub struct AtRiskFilter {
    results: Option<(f64, ResultSet)>,
    in_flight: Option<Uuid>,
    last_error: Option<String>,
    table: TierTable,
}

impl AtRiskFilter {
    pub fn new(table: TierTable) -> Self {
        Self {
            results: None,
            in_flight: None,
            last_error: None,
            table,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Start a query, or `None` when the threshold does not parse or no dataset is selected.
    pub fn begin(&mut self, input: &str, dataset: Option<&UploadedFile>) -> Option<AtRiskTicket> {
        let Some(threshold) = parse_threshold(input) else {
            debug!(input, "ignoring non-numeric threshold");
            return None;
        };
        let Some(dataset) = dataset else {
            debug!("at-risk query needs a selected dataset");
            return None;
        };
        if let Some(previous) = self.in_flight {
            debug!(request_id = %previous, "at-risk query re-triggered while loading");
        }
        let request_id = Uuid::new_v4();
        self.in_flight = Some(request_id);
        info!(%request_id, dataset = %dataset.filename, threshold, "at-risk query requested");
        Some(AtRiskTicket {
            request_id,
            storage_key: dataset.filename.clone(),
            threshold,
        })
    }

    /// Apply a response. The last response to arrive wins; failures keep prior results.
    pub fn resolve(&mut self, ticket: &AtRiskTicket, outcome: Result<AtRiskResponse, ServiceError>) {
        if self.in_flight == Some(ticket.request_id) {
            self.in_flight = None;
        }
        match outcome {
            Ok(response) => {
                let results = ResultSet::new(response.at_risk_users.unwrap_or_default());
                info!(request_id = %ticket.request_id, customers = results.len(), "at-risk query completed");
                self.results = Some((ticket.threshold, results));
                self.last_error = None;
            }
            Err(err) => {
                warn!(request_id = %ticket.request_id, error = %err, "at-risk query failed");
                self.last_error = Some(err.to_string());
            }
        }
    }

    pub fn view(&self) -> AtRiskView<'_> {
        if self.is_loading() {
            return AtRiskView::Loading;
        }
        match &self.results {
            None => AtRiskView::NotRun,
            Some((threshold, results)) if results.is_empty() => AtRiskView::NoneAtRisk {
                threshold: *threshold,
            },
            Some((threshold, results)) => AtRiskView::Customers {
                threshold: *threshold,
                rows: annotate_rows(results.records(), 0, &self.table),
            },
        }
    }
}

pub fn threshold_percent(threshold: f64) -> String {
    format!("{:.0}%", threshold * 100.0)
}

pub async fn analyze(
    filter: &mut AtRiskFilter,
    service: &SharedService,
    input: &str,
    dataset: Option<&UploadedFile>,
) -> bool {
    let Some(ticket) = filter.begin(input, dataset) else {
        return false;
    };
    let (storage_key, threshold) = (ticket.storage_key.clone(), ticket.threshold);
    let outcome = run_blocking(service, move |svc| svc.at_risk(&storage_key, threshold)).await;
    filter.resolve(&ticket, outcome);
    true
}
