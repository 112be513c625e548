use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{run_blocking, ServiceError, SharedService};
use crate::models::{PredictResponse, PredictionRecord, ResultSet, UploadedFile};
use crate::paginate::{PageLabel, Paginator};
use crate::risk::{annotate_rows, AnnotatedRow, TierTable};

#[derive(Debug, Clone, PartialEq)]
pub enum TrainingState {
    Idle,
    Ready,
    InProgress,
    Completed(ResultSet),
    Failed(String),
}

impl TrainingState {
    pub fn name(&self) -> &'static str {
        match self {
            TrainingState::Idle => "idle",
            TrainingState::Ready => "ready",
            TrainingState::InProgress => "in_progress",
            TrainingState::Completed(_) => "completed",
            TrainingState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub label: &'static str,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceTicket {
    pub request_id: Uuid,
    pub storage_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Applied,
    Stale,
}

pub struct TrainingWorkflow {
    state: TrainingState,
    dataset: Option<UploadedFile>,
    // Only a response carrying this id may change the state.
    in_flight: Option<Uuid>,
    pager: Paginator,
    table: TierTable,
}

impl TrainingWorkflow {
    pub fn new(page_size: usize, table: TierTable) -> Self {
        Self {
            state: TrainingState::Idle,
            dataset: None,
            in_flight: None,
            pager: Paginator::new(page_size),
            table,
        }
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    pub fn dataset(&self) -> Option<&UploadedFile> {
        self.dataset.as_ref()
    }

    /// Select a dataset. Any in-flight request becomes stale and prior results are dropped.
    pub fn select(&mut self, dataset: UploadedFile) {
        if let Some(stale) = self.in_flight.take() {
            debug!(request_id = %stale, "selection superseded in-flight request");
        }
        debug!(dataset = %dataset.original_name, "dataset selected");
        self.dataset = Some(dataset);
        self.state = TrainingState::Ready;
        self.pager.reset();
    }

    pub fn trigger(&self) -> Trigger {
        let (label, enabled) = match self.state {
            TrainingState::Idle => ("Select a CSV file first", false),
            TrainingState::Ready => ("Start Training Models", true),
            TrainingState::InProgress => ("Training in progress...", false),
            TrainingState::Completed(_) => ("Training Completed Successfully", false),
            TrainingState::Failed(_) => ("Training Failed - Retry?", true),
        };
        Trigger {
            label,
            enabled: enabled && self.dataset.is_some(),
        }
    }

    /// Move to `InProgress` and hand out the request to issue, or `None` when
    /// the trigger is disabled.
    pub fn begin(&mut self) -> Option<InferenceTicket> {
        if !self.trigger().enabled {
            debug!(state = self.state.name(), "training trigger ignored");
            return None;
        }
        let storage_key = self.dataset.as_ref()?.filename.clone();
        let request_id = Uuid::new_v4();
        self.in_flight = Some(request_id);
        self.state = TrainingState::InProgress;
        info!(%request_id, dataset = %storage_key, "inference requested");
        Some(InferenceTicket {
            request_id,
            storage_key,
        })
    }

    pub fn resolve(
        &mut self,
        request_id: Uuid,
        outcome: Result<PredictResponse, ServiceError>,
    ) -> Resolution {
        if self.in_flight != Some(request_id) {
            debug!(%request_id, "discarding stale inference response");
            return Resolution::Stale;
        }
        self.in_flight = None;
        match outcome {
            Ok(response) => {
                let results = ResultSet::new(response.predictions.unwrap_or_default());
                info!(%request_id, predictions = results.len(), "inference completed");
                self.pager.reset();
                self.state = TrainingState::Completed(results);
            }
            Err(err) => {
                warn!(%request_id, error = %err, "inference failed");
                self.state = TrainingState::Failed(err.to_string());
            }
        }
        Resolution::Applied
    }

    pub fn results(&self) -> Option<&ResultSet> {
        match &self.state {
            TrainingState::Completed(results) => Some(results),
            _ => None,
        }
    }

    fn result_len(&self) -> usize {
        self.results().map_or(0, ResultSet::len)
    }

    pub fn page_size(&self) -> usize {
        self.pager.limit()
    }

    pub fn set_page_size(&mut self, size: usize) {
        self.pager.set_page_size(size);
    }

    pub fn next_page(&mut self) {
        let len = self.result_len();
        self.pager.next(len);
    }

    pub fn prev_page(&mut self) {
        self.pager.prev();
    }

    pub fn page_label(&self) -> PageLabel {
        self.pager.page_label(self.result_len())
    }

    pub fn page(&self) -> &[PredictionRecord] {
        match self.results() {
            Some(results) => self.pager.window(results.records()),
            None => &[],
        }
    }

    pub fn page_rows(&self) -> Vec<AnnotatedRow<'_>> {
        annotate_rows(self.page(), self.pager.offset(), &self.table)
    }
}

pub async fn train(
    workflow: &mut TrainingWorkflow,
    service: &SharedService,
) -> Option<Resolution> {
    let ticket = workflow.begin()?;
    let storage_key = ticket.storage_key;
    let outcome = run_blocking(service, move |svc| svc.predict(&storage_key)).await;
    Some(workflow.resolve(ticket.request_id, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::stub::StubService;
    use std::sync::Arc;

    fn dataset(name: &str) -> UploadedFile {
        UploadedFile {
            filename: format!("uploads/{name}"),
            original_name: name.to_string(),
        }
    }

    fn rows(prefix: &str, count: usize) -> Vec<PredictionRecord> {
        (0..count)
            .map(|idx| PredictionRecord::new(&format!("{prefix}-{idx}"), 0.4, 0.6))
            .collect()
    }

    fn ok(records: Vec<PredictionRecord>) -> Result<PredictResponse, ServiceError> {
        Ok(PredictResponse {
            predictions: Some(records),
        })
    }

    fn workflow() -> TrainingWorkflow {
        TrainingWorkflow::new(10, TierTable::results())
    }

    #[test]
    fn trigger_without_dataset_is_a_no_op() {
        let mut flow = workflow();
        assert!(!flow.trigger().enabled);
        assert_eq!(flow.trigger().label, "Select a CSV file first");
        assert!(flow.begin().is_none());
        assert_eq!(flow.state(), &TrainingState::Idle);
    }

    #[test]
    fn only_one_request_in_flight() {
        let mut flow = workflow();
        flow.select(dataset("telco.csv"));
        let ticket = flow.begin().unwrap();
        assert_eq!(ticket.storage_key, "uploads/telco.csv");
        assert_eq!(flow.state(), &TrainingState::InProgress);
        assert!(flow.begin().is_none());
    }

    #[test]
    fn empty_predictions_complete_rather_than_fail() {
        let mut flow = workflow();
        flow.select(dataset("telco.csv"));
        let ticket = flow.begin().unwrap();
        assert_eq!(flow.resolve(ticket.request_id, ok(vec![])), Resolution::Applied);
        assert_eq!(flow.state(), &TrainingState::Completed(ResultSet::default()));
        assert!(flow.page().is_empty());
        assert_eq!(flow.page_label().to_string(), "1 of 1");
    }

    #[test]
    fn missing_predictions_field_completes_empty() {
        let mut flow = workflow();
        flow.select(dataset("telco.csv"));
        let ticket = flow.begin().unwrap();
        flow.resolve(ticket.request_id, Ok(PredictResponse::default()));
        assert_eq!(flow.results().map(ResultSet::len), Some(0));
    }

    #[test]
    fn failure_then_retry_completes_with_new_data_only() {
        let mut flow = workflow();
        flow.select(dataset("telco.csv"));
        let first = flow.begin().unwrap();
        flow.resolve(
            first.request_id,
            Err(ServiceError::Status {
                code: 500,
                body: "boom".to_string(),
            }),
        );
        assert!(matches!(flow.state(), TrainingState::Failed(_)));
        assert!(flow.trigger().enabled);
        assert!(flow.results().is_none());

        let retry = flow.begin().unwrap();
        assert_eq!(flow.state(), &TrainingState::InProgress);
        flow.resolve(retry.request_id, ok(rows("new", 3)));
        let results = flow.results().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results.records()[0].display_key(0), "new-0");
        assert!(!flow.trigger().enabled);
    }

    #[test]
    fn stale_response_never_overwrites_later_results() {
        let mut flow = workflow();
        flow.select(dataset("a.csv"));
        let first = flow.begin().unwrap();
        flow.select(dataset("b.csv"));
        assert_eq!(flow.state(), &TrainingState::Ready);
        let second = flow.begin().unwrap();

        assert_eq!(flow.resolve(second.request_id, ok(rows("b", 2))), Resolution::Applied);
        assert_eq!(flow.resolve(first.request_id, ok(rows("a", 5))), Resolution::Stale);
        assert_eq!(flow.results().unwrap().len(), 2);
        assert_eq!(flow.dataset().unwrap().original_name, "b.csv");
    }

    #[test]
    fn stale_response_arriving_first_is_ignored() {
        let mut flow = workflow();
        flow.select(dataset("a.csv"));
        let first = flow.begin().unwrap();
        flow.select(dataset("b.csv"));
        let second = flow.begin().unwrap();

        assert_eq!(flow.resolve(first.request_id, ok(rows("a", 5))), Resolution::Stale);
        assert_eq!(flow.state(), &TrainingState::InProgress);
        flow.resolve(second.request_id, ok(rows("b", 2)));
        assert_eq!(flow.results().unwrap().len(), 2);
    }

    #[test]
    fn completion_resets_to_first_page_keeping_size() {
        let mut flow = workflow();
        flow.set_page_size(5);
        flow.select(dataset("a.csv"));
        let ticket = flow.begin().unwrap();
        flow.resolve(ticket.request_id, ok(rows("a", 12)));
        flow.next_page();
        flow.next_page();
        flow.next_page();
        assert_eq!(flow.page_label().to_string(), "3 of 3");
        assert_eq!(flow.page().len(), 2);
        assert_eq!(flow.page_rows()[0].key, "a-10");

        flow.select(dataset("a.csv"));
        let ticket = flow.begin().unwrap();
        flow.resolve(ticket.request_id, ok(rows("a", 12)));
        assert_eq!(flow.page_label().to_string(), "1 of 3");
        assert_eq!(flow.page_size(), 5);
    }

    #[tokio::test]
    async fn train_issues_one_request_with_storage_key() {
        let stub = Arc::new(StubService::default());
        stub.predictions.lock().unwrap().push_back(Ok(rows("c", 4)));
        let service: SharedService = stub.clone();

        let mut flow = workflow();
        assert_eq!(train(&mut flow, &service).await, None);
        flow.select(dataset("telco.csv"));
        assert_eq!(train(&mut flow, &service).await, Some(Resolution::Applied));
        assert_eq!(flow.results().unwrap().len(), 4);
        assert_eq!(*stub.calls.lock().unwrap(), ["predict uploads/telco.csv"]);
    }
}
