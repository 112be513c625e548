use std::path::Path;

use tracing::{debug, warn};

use crate::client::{run_blocking, ServiceError, SharedService};
use crate::models::{FilesResponse, ResultsResponse, TrainingRun, UploadResponse, UploadedFile};

pub struct Session {
    service: SharedService,
    files: Vec<UploadedFile>,
    runs: Vec<TrainingRun>,
}

impl Session {
    pub fn new(service: SharedService) -> Self {
        Self {
            service,
            files: Vec::new(),
            runs: Vec::new(),
        }
    }

    pub fn service(&self) -> &SharedService {
        &self.service
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    pub fn runs(&self) -> &[TrainingRun] {
        &self.runs
    }

    pub fn has_evaluation(&self) -> bool {
        !self.runs.is_empty()
    }

    pub fn find_dataset(&self, name: &str) -> Option<&UploadedFile> {
        let name = name.trim();
        self.files
            .iter()
            .find(|file| file.original_name == name)
            .or_else(|| self.files.iter().find(|file| file.filename == name))
    }

    pub async fn activate(&mut self) {
        let (files, runs) = tokio::join!(
            run_blocking(&self.service, |svc| svc.list_files()),
            run_blocking(&self.service, |svc| svc.list_runs()),
        );
        self.apply_files(files);
        self.apply_runs(runs);
    }

    pub async fn refresh_files(&mut self) {
        let outcome = run_blocking(&self.service, |svc| svc.list_files()).await;
        self.apply_files(outcome);
    }

    pub async fn refresh_runs(&mut self) {
        let outcome = run_blocking(&self.service, |svc| svc.list_runs()).await;
        self.apply_runs(outcome);
    }

    /// Upload a dataset and refresh the file cache when the service accepts it.
    pub async fn upload(&mut self, path: &Path) -> Result<UploadResponse, ServiceError> {
        let owned = path.to_path_buf();
        let response = run_blocking(&self.service, move |svc| svc.upload(&owned)).await?;
        self.refresh_files().await;
        Ok(response)
    }

    fn apply_files(&mut self, outcome: Result<FilesResponse, ServiceError>) {
        match outcome {
            Ok(response) => {
                self.files = response.files.unwrap_or_default();
                debug!(files = self.files.len(), "uploaded file cache refreshed");
            }
            Err(err) => warn!(error = %err, "error fetching uploaded files"),
        }
    }

    fn apply_runs(&mut self, outcome: Result<ResultsResponse, ServiceError>) {
        match outcome {
            Ok(response) => {
                self.runs = response.results.unwrap_or_default();
                debug!(runs = self.runs.len(), "training run cache refreshed");
            }
            Err(err) => warn!(error = %err, "error fetching trained results"),
        }
    }
}
