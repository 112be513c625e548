use tracing::{info, warn};

use crate::client::{run_blocking, ServiceError, SharedService};
use crate::models::{ModelMetrics, ResultsResponse, TrainingRun, LOGISTIC_REGRESSION, RANDOM_FOREST};

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationState {
    Loading,
    Ready(Vec<TrainingRun>),
    Failed(String),
}

/// Side-by-side metric blocks for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison<'a> {
    pub run: &'a TrainingRun,
    pub logistic_regression: Option<&'a ModelMetrics>,
    pub random_forest: Option<&'a ModelMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RocPoint {
    pub fpr: f64,
    pub tpr: f64,
}

pub struct EvaluationSelector {
    state: EvaluationState,
    selected: Option<String>,
}

impl Default for EvaluationSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluationSelector {
    pub fn new() -> Self {
        Self {
            state: EvaluationState::Loading,
            selected: None,
        }
    }

    pub fn state(&self) -> &EvaluationState {
        &self.state
    }

    /// Apply the run-list fetch. A body without `results` is an error, not an empty list.
    pub fn load(&mut self, outcome: Result<ResultsResponse, ServiceError>) {
        self.state = match outcome {
            Ok(ResultsResponse { results: Some(runs) }) => {
                info!(runs = runs.len(), "training runs loaded");
                EvaluationState::Ready(runs)
            }
            Ok(ResultsResponse { results: None }) => {
                warn!("results response had no results field");
                EvaluationState::Failed("Failed to fetch results".to_string())
            }
            Err(err) => {
                warn!(error = %err, "failed to fetch training runs");
                EvaluationState::Failed(err.to_string())
            }
        };
    }

    pub fn runs(&self) -> &[TrainingRun] {
        match &self.state {
            EvaluationState::Ready(runs) => runs,
            _ => &[],
        }
    }

    /// Select a run by id; an empty id clears the selection.
    pub fn select(&mut self, id: &str) {
        let id = id.trim();
        self.selected = (!id.is_empty()).then(|| id.to_string());
    }

    pub fn selected_run(&self) -> Option<&TrainingRun> {
        let id = self.selected.as_deref()?;
        self.runs().iter().find(|run| run.id == id)
    }

    pub fn comparison(&self) -> Option<Comparison<'_>> {
        self.selected_run().map(compare)
    }
}

pub fn compare(run: &TrainingRun) -> Comparison<'_> {
    Comparison {
        run,
        logistic_regression: run.metrics.get(LOGISTIC_REGRESSION),
        random_forest: run.metrics.get(RANDOM_FOREST),
    }
}

/// Approximate ROC curve from an AUC alone: 11 points on `tpr = fpr^(1 - auc)`.
pub fn approximate_roc(auc: f64) -> Vec<RocPoint> {
    (0..=10)
        .map(|step| {
            let fpr = step as f64 / 10.0;
            RocPoint {
                fpr,
                tpr: fpr.powf(1.0 - auc),
            }
        })
        .collect()
}

pub fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

/// Fetch the persisted runs once for this selector.
pub async fn activate(selector: &mut EvaluationSelector, service: &SharedService) {
    let outcome = run_blocking(service, |svc| svc.list_runs()).await;
    selector.load(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::stub::StubService;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn metrics(roc_auc: f64) -> ModelMetrics {
        ModelMetrics {
            roc_auc,
            precision: 0.5,
            recall: 0.8,
            f1: 0.6,
        }
    }

    fn run(id: &str, lr_auc: f64, rf_auc: f64) -> TrainingRun {
        TrainingRun {
            id: id.to_string(),
            original_filename: format!("{id}.csv"),
            metrics: BTreeMap::from([
                (LOGISTIC_REGRESSION.to_string(), metrics(lr_auc)),
                (RANDOM_FOREST.to_string(), metrics(rf_auc)),
            ]),
        }
    }

    fn loaded() -> EvaluationSelector {
        let mut selector = EvaluationSelector::new();
        selector.load(Ok(ResultsResponse {
            results: Some(vec![run("A", 0.84, 0.92), run("B", 0.81, 0.88)]),
        }));
        selector
    }

    #[test]
    fn selection_is_a_local_lookup() {
        let mut selector = loaded();
        selector.select("B");
        let comparison = selector.comparison().unwrap();
        assert_eq!(comparison.run.id, "B");
        assert_eq!(comparison.random_forest.unwrap().roc_auc, 0.88);

        selector.select("A");
        assert_eq!(selector.comparison().unwrap().logistic_regression.unwrap().roc_auc, 0.84);

        selector.select("missing");
        assert!(selector.selected_run().is_none());
        assert!(selector.comparison().is_none());

        selector.select("");
        assert!(selector.selected_run().is_none());
    }

    #[test]
    fn failed_fetch_is_a_distinct_state() {
        let mut selector = EvaluationSelector::new();
        selector.load(Err(ServiceError::Transport("refused".to_string())));
        assert!(matches!(selector.state(), EvaluationState::Failed(_)));
        assert!(selector.runs().is_empty());

        let mut selector = EvaluationSelector::new();
        selector.load(Ok(ResultsResponse { results: None }));
        assert!(matches!(selector.state(), EvaluationState::Failed(_)));

        let mut selector = EvaluationSelector::new();
        selector.load(Ok(ResultsResponse {
            results: Some(vec![]),
        }));
        assert_eq!(selector.state(), &EvaluationState::Ready(vec![]));
    }

    #[test]
    fn missing_model_block_is_none() {
        let mut partial = run("C", 0.7, 0.7);
        partial.metrics.remove(RANDOM_FOREST);
        let comparison = compare(&partial);
        assert!(comparison.random_forest.is_none());
        assert!(comparison.logistic_regression.is_some());
    }

    #[test]
    fn roc_approximation_spans_unit_square() {
        let points = approximate_roc(0.9227);
        assert_eq!(points.len(), 11);
        assert_eq!(points[0], RocPoint { fpr: 0.0, tpr: 0.0 });
        assert!((points[10].tpr - 1.0).abs() < 1e-12);
        assert!(points.windows(2).all(|w| w[1].tpr >= w[0].tpr));
        assert!(points[5].tpr > approximate_roc(0.848)[5].tpr);
    }

    #[test]
    fn percent_has_one_decimal() {
        assert_eq!(percent(0.9227), "92.3%");
    }

    #[tokio::test]
    async fn activation_fetches_runs_once() {
        let stub = Arc::new(StubService {
            runs: Some(vec![run("A", 0.8, 0.9)]),
            ..StubService::default()
        });
        let service: SharedService = stub.clone();
        let mut selector = EvaluationSelector::new();
        activate(&mut selector, &service).await;
        selector.select("A");
        selector.select("A");
        assert!(selector.comparison().is_some());
        assert_eq!(*stub.calls.lock().unwrap(), ["results"]);
    }
}
