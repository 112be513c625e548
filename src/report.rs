use std::fmt::Write;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::evaluation::{approximate_roc, compare, percent};
use crate::models::{ModelMetrics, ResultSet, TrainingRun, UploadedFile};
use crate::risk::{self, Tier, TierTable};

#[derive(Debug, Clone, PartialEq)]
pub struct TierSummary {
    pub tier: Tier,
    pub count: usize,
    pub avg_risk: f64,
}

/// Tier mix of a result set plus the number of rows that could not be scored.
pub fn summarize_tiers(results: &ResultSet, table: &TierTable) -> (Vec<TierSummary>, usize) {
    let mut map: std::collections::HashMap<Tier, (usize, f64)> = std::collections::HashMap::new();
    let mut unscored = 0usize;

    for record in results.records() {
        match risk::annotate(record, table) {
            Some(annotation) => {
                let entry = map.entry(annotation.tier).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += annotation.composite_risk;
            }
            None => unscored += 1,
        }
    }

    let mut summaries: Vec<TierSummary> = map
        .into_iter()
        .map(|(tier, (count, total_risk))| TierSummary {
            tier,
            count,
            avg_risk: if count == 0 {
                0.0
            } else {
                total_risk / count as f64
            },
        })
        .collect();

    summaries.sort_by_key(|summary| summary.tier);
    (summaries, unscored)
}

/// Most recent run trained on the named dataset.
pub fn latest_run_for<'a>(runs: &'a [TrainingRun], original_name: &str) -> Option<&'a TrainingRun> {
    runs.iter().rev().find(|run| run.original_filename == original_name)
}

pub fn build_report(
    dataset: &UploadedFile,
    results: &ResultSet,
    run: Option<&TrainingRun>,
    table: &TierTable,
    generated_at: DateTime<Utc>,
) -> String {
    let (summaries, unscored) = summarize_tiers(results, table);
    let ranked = risk::rank_by_composite(results.records());

    let mut output = String::new();

    let _ = writeln!(output, "# Churn Prediction Report");
    let _ = writeln!(
        output,
        "Generated for {} at {}",
        dataset.original_name,
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Mix");
    let _ = writeln!(output, "Tiers: {table}");

    if results.is_empty() {
        let _ = writeln!(output, "Training completed with zero predictions.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} customers (avg risk {})",
                summary.tier.as_str(),
                summary.count,
                percent(summary.avg_risk)
            );
        }
        if unscored > 0 {
            let _ = writeln!(output, "- {unscored} rows missing a model probability");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Customers");

    if ranked.is_empty() {
        let _ = writeln!(output, "No scored customers.");
    } else {
        for (idx, record, composite) in ranked.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} composite {} (LR {}, RF {})",
                record.display_key(*idx),
                percent(*composite),
                percent(record.logistic_regression.unwrap_or_default()),
                percent(record.random_forest.unwrap_or_default())
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Model Evaluation");

    match run {
        None => {
            let _ = writeln!(output, "No trained results available for this dataset.");
        }
        Some(run) => {
            let comparison = compare(run);
            let _ = writeln!(output, "Run {}", run.id);
            write_model(&mut output, "Logistic Regression", comparison.logistic_regression);
            write_model(&mut output, "Random Forest", comparison.random_forest);
        }
    }

    output
}

fn write_model(output: &mut String, name: &str, metrics: Option<&ModelMetrics>) {
    let _ = writeln!(output);
    let _ = writeln!(output, "### {name}");
    let Some(metrics) = metrics else {
        let _ = writeln!(output, "No metrics recorded.");
        return;
    };
    for (metric, value) in metrics.named() {
        let _ = writeln!(output, "- {metric}: {}", percent(value));
    }
    let curve: Vec<String> = approximate_roc(metrics.roc_auc)
        .iter()
        .map(|point| format!("({:.1}, {:.3})", point.fpr, point.tpr))
        .collect();
    let _ = writeln!(output, "- ROC (approx.): {}", curve.join(" "));
}

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    customer_id: String,
    logistic_regression: Option<f64>,
    random_forest: Option<f64>,
    composite_risk: Option<f64>,
    tier: Option<&'a str>,
}

pub fn write_csv<W: std::io::Write>(
    writer: W,
    results: &ResultSet,
    table: &TierTable,
) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in risk::annotate_rows(results.records(), 0, table) {
        writer.serialize(ExportRow {
            customer_id: row.key,
            logistic_regression: row.record.logistic_regression,
            random_forest: row.record.random_forest,
            composite_risk: row.annotation.map(|a| a.composite_risk),
            tier: row.annotation.map(|a| a.tier.as_str()),
        })?;
    }
    writer.flush()?;
    Ok(results.len())
}

pub fn export_csv(path: &Path, results: &ResultSet, table: &TierTable) -> anyhow::Result<usize> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_csv(file, results, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PredictionRecord, LOGISTIC_REGRESSION};
    use chrono::TimeZone;

    fn results() -> ResultSet {
        let mut broken = PredictionRecord::new("broken", 0.3, 0.3);
        broken.random_forest = None;
        ResultSet::new(vec![
            PredictionRecord::new("a", 0.875, 0.875),
            PredictionRecord::new("b", 0.5, 0.625),
            PredictionRecord::new("c", 0.125, 0.25),
            PredictionRecord::new("d", 0.25, 0.25),
            broken,
        ])
    }

    fn dataset() -> UploadedFile {
        UploadedFile {
            filename: "uploads/a1.csv".to_string(),
            original_name: "telco.csv".to_string(),
        }
    }

    #[test]
    fn summarizes_tiers_in_order() {
        let (summaries, unscored) = summarize_tiers(&results(), &TierTable::results());
        assert_eq!(unscored, 1);
        let counts: Vec<(Tier, usize)> = summaries.iter().map(|s| (s.tier, s.count)).collect();
        assert_eq!(counts, [(Tier::High, 1), (Tier::Medium, 1), (Tier::Low, 2)]);
        assert!((summaries[2].avg_risk - 0.21875).abs() < 1e-9);
    }

    #[test]
    fn picks_latest_run_for_dataset() {
        let runs = vec![
            TrainingRun {
                id: "1".to_string(),
                original_filename: "telco.csv".to_string(),
                metrics: Default::default(),
            },
            TrainingRun {
                id: "2".to_string(),
                original_filename: "other.csv".to_string(),
                metrics: Default::default(),
            },
            TrainingRun {
                id: "3".to_string(),
                original_filename: "telco.csv".to_string(),
                metrics: Default::default(),
            },
        ];
        assert_eq!(latest_run_for(&runs, "telco.csv").unwrap().id, "3");
        assert!(latest_run_for(&runs, "none.csv").is_none());
    }

    #[test]
    fn report_includes_sections() {
        let mut run = TrainingRun {
            id: "65f1".to_string(),
            original_filename: "telco.csv".to_string(),
            metrics: Default::default(),
        };
        run.metrics.insert(
            LOGISTIC_REGRESSION.to_string(),
            ModelMetrics {
                roc_auc: 0.848,
                precision: 0.519,
                recall: 0.801,
                f1: 0.63,
            },
        );
        let at = Utc.with_ymd_and_hms(2026, 2, 3, 9, 30, 0).unwrap();
        let report = build_report(&dataset(), &results(), Some(&run), &TierTable::results(), at);
        assert!(report.contains("Generated for telco.csv at 2026-02-03 09:30 UTC"));
        assert!(report.contains("Tiers: High>0.7:red,Medium>0.5:yellow,Low:green"));
        assert!(report.contains("- High: 1 customers (avg risk 87.5%)"));
        assert!(report.contains("- 1 rows missing a model probability"));
        assert!(report.contains("- a composite 87.5% (LR 87.5%, RF 87.5%)"));
        assert!(report.contains("- ROC_AUC: 84.8%"));
        assert!(report.contains("### Random Forest\nNo metrics recorded."));
    }

    #[test]
    fn empty_results_report_zero_predictions() {
        let at = Utc.with_ymd_and_hms(2026, 2, 3, 9, 30, 0).unwrap();
        let report = build_report(&dataset(), &ResultSet::default(), None, &TierTable::results(), at);
        assert!(report.contains("Training completed with zero predictions."));
        assert!(report.contains("No trained results available for this dataset."));
    }

    #[test]
    fn csv_export_leaves_unscored_columns_empty() {
        let mut buffer = Vec::new();
        let written = write_csv(&mut buffer, &results(), &TierTable::results()).unwrap();
        assert_eq!(written, 5);
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "customer_id,logistic_regression,random_forest,composite_risk,tier"
        );
        assert_eq!(lines[1], "a,0.875,0.875,0.875,High");
        assert_eq!(lines[5], "broken,0.3,,,");
    }
}
