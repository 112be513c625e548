use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const LOGISTIC_REGRESSION: &str = "LogisticRegression";
pub const RANDOM_FOREST: &str = "RandomForest";

/// One row of inference output.
///
/// Probabilities are optional on the wire so a single bad row does not
/// poison the whole response; a record without both is a data-quality
/// failure and is never scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    #[serde(rename = "customerID", alias = "customerId", default)]
    pub customer_id: Option<String>,
    #[serde(rename = "LogisticRegressionProb", default)]
    pub logistic_regression: Option<f64>,
    #[serde(rename = "RandomForestProb", default)]
    pub random_forest: Option<f64>,
}

impl PredictionRecord {
    #[cfg(test)]
    pub fn new(customer_id: &str, logistic_regression: f64, random_forest: f64) -> Self {
        Self {
            customer_id: Some(customer_id.to_string()),
            logistic_regression: Some(logistic_regression),
            random_forest: Some(random_forest),
        }
    }

    /// Both model probabilities, or `None` when either is absent or not a number.
    pub fn probabilities(&self) -> Option<(f64, f64)> {
        match (self.logistic_regression, self.random_forest) {
            (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Some((a, b)),
            _ => None,
        }
    }

    /// Customer id, falling back to the row position.
    pub fn display_key(&self, index: usize) -> String {
        match self.customer_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("#{index}"),
        }
    }
}

/// Ordered predictions exactly as the service returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    records: Vec<PredictionRecord>,
}

impl ResultSet {
    pub fn new(records: Vec<PredictionRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[PredictionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Server-assigned storage key.
    pub filename: String,
    pub original_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    #[serde(rename = "ROC_AUC")]
    pub roc_auc: f64,
    #[serde(rename = "Precision")]
    pub precision: f64,
    #[serde(rename = "Recall")]
    pub recall: f64,
    #[serde(rename = "F1")]
    pub f1: f64,
}

impl ModelMetrics {
    /// Metric names and values in display order.
    pub fn named(&self) -> [(&'static str, f64); 4] {
        [
            ("ROC_AUC", self.roc_auc),
            ("Precision", self.precision),
            ("Recall", self.recall),
            ("F1", self.f1),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRun {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub original_filename: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, ModelMetrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilesResponse {
    pub files: Option<Vec<UploadedFile>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultsResponse {
    pub results: Option<Vec<TrainingRun>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictResponse {
    pub predictions: Option<Vec<PredictionRecord>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AtRiskResponse {
    pub at_risk_users: Option<Vec<PredictionRecord>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadResponse {
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PredictRequest<'a> {
    pub filename: &'a str,
}

#[derive(Debug, Serialize)]
pub struct AtRiskRequest<'a> {
    pub filename: &'a str,
    pub threshold: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prediction_rows_with_service_field_names() {
        let body = r#"{"predictions":[
            {"customerID":"7590-VHVEG","LogisticRegressionProb":0.62,"RandomForestProb":0.58},
            {"LogisticRegressionProb":0.1}
        ]}"#;
        let parsed: PredictResponse = serde_json::from_str(body).unwrap();
        let rows = parsed.predictions.unwrap();
        assert_eq!(rows[0].probabilities(), Some((0.62, 0.58)));
        assert_eq!(rows[0].display_key(0), "7590-VHVEG");
        assert_eq!(rows[1].probabilities(), None);
        assert_eq!(rows[1].display_key(1), "#1");
    }

    #[test]
    fn missing_collections_parse_as_none() {
        let parsed: PredictResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.predictions.is_none());
        let parsed: ResultsResponse = serde_json::from_str(r#"{"detail":"x"}"#).unwrap();
        assert!(parsed.results.is_none());
    }

    #[test]
    fn training_run_keeps_metric_layout() {
        let body = r#"{"_id":"65f1","original_filename":"telco.csv","metrics":{
            "LogisticRegression":{"ROC_AUC":0.848,"Precision":0.519,"Recall":0.801,"F1":0.63},
            "RandomForest":{"ROC_AUC":0.9227,"Precision":0.654,"Recall":0.872,"F1":0.75}
        }}"#;
        let run: TrainingRun = serde_json::from_str(body).unwrap();
        assert_eq!(run.id, "65f1");
        assert_eq!(run.metrics[RANDOM_FOREST].roc_auc, 0.9227);
        assert_eq!(run.metrics[LOGISTIC_REGRESSION].named()[3], ("F1", 0.63));
    }
}
