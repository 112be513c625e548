use std::fmt::Write as _;
use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::at_risk::{analyze, threshold_percent, AtRiskFilter, AtRiskView};
use crate::config::Config;
use crate::evaluation::{self, approximate_roc, percent, EvaluationSelector, EvaluationState};
use crate::models::ModelMetrics;
use crate::risk::AnnotatedRow;
use crate::session::Session;
use crate::workflow::{train, Resolution, TrainingState, TrainingWorkflow};

pub const PAGE_SIZE_CHOICES: [usize; 4] = [5, 10, 20, 50];

const HELP: &str = "\
commands:
  files              list uploaded datasets
  upload <path>      upload a CSV dataset
  select <name>      choose a dataset for training
  train              run training and inference on the selected dataset
  next | prev        move through prediction pages
  size <n>           set predictions per page (5, 10, 20, 50)
  at-risk [t]        list customers at or above threshold t
  runs               load persisted training runs
  run <id>           compare models for one run
  status             show session overview
  quit               leave the console";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Console {
    session: Session,
    workflow: TrainingWorkflow,
    filter: AtRiskFilter,
    evaluation: EvaluationSelector,
    default_threshold: String,
}

impl Console {
    pub fn new(session: Session, config: &Config) -> Self {
        Self {
            session,
            workflow: TrainingWorkflow::new(config.page_size, config.results_table()),
            filter: AtRiskFilter::new(config.at_risk_table()),
            evaluation: EvaluationSelector::new(),
            default_threshold: config.threshold.clone(),
        }
    }

    pub async fn handle(&mut self, line: &str) -> (Flow, String) {
        let line = line.trim();
        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        let output = match command {
            "" => String::new(),
            "help" => HELP.to_string(),
            "quit" | "exit" => return (Flow::Quit, String::new()),
            "files" => {
                self.session.refresh_files().await;
                render_files(&self.session)
            }
            "upload" if !arg.is_empty() => match self.session.upload(Path::new(arg)).await {
                Ok(response) => format!(
                    "CSV uploaded successfully! Saved as: {}",
                    response.filename.as_deref().unwrap_or(arg)
                ),
                Err(err) => {
                    warn!(error = %err, path = arg, "upload failed");
                    "Upload failed".to_string()
                }
            },
            "select" if !arg.is_empty() => match self.session.find_dataset(arg) {
                Some(dataset) => {
                    self.workflow.select(dataset.clone());
                    render_training(&self.workflow)
                }
                None => format!("No uploaded dataset named {arg}"),
            },
            "train" => {
                if train(&mut self.workflow, self.session.service()).await == Some(Resolution::Applied)
                    && self.workflow.results().is_some()
                {
                    self.session.refresh_runs().await;
                }
                render_training(&self.workflow)
            }
            "next" => {
                self.workflow.next_page();
                render_training(&self.workflow)
            }
            "prev" => {
                self.workflow.prev_page();
                render_training(&self.workflow)
            }
            "size" => match arg.parse::<usize>() {
                Ok(size) if PAGE_SIZE_CHOICES.contains(&size) => {
                    self.workflow.set_page_size(size);
                    render_training(&self.workflow)
                }
                _ => format!("Page size must be one of {PAGE_SIZE_CHOICES:?}"),
            },
            "at-risk" => {
                let input = if arg.is_empty() {
                    self.default_threshold.as_str()
                } else {
                    arg
                };
                let sent = analyze(
                    &mut self.filter,
                    self.session.service(),
                    input,
                    self.workflow.dataset(),
                )
                .await;
                if sent {
                    render_at_risk(&self.filter)
                } else if self.workflow.dataset().is_none() {
                    "Select a dataset first".to_string()
                } else {
                    "Enter a numeric threshold".to_string()
                }
            }
            "runs" => {
                evaluation::activate(&mut self.evaluation, self.session.service()).await;
                render_runs(&self.evaluation)
            }
            "run" => {
                self.evaluation.select(arg);
                render_comparison(&self.evaluation)
            }
            "status" => render_status(&self.session, &self.workflow),
            _ => format!("Unknown command: {line} (try help)"),
        };
        (Flow::Continue, output)
    }
}

pub async fn run(config: &Config) -> anyhow::Result<()> {
    let mut session = Session::new(config.service());
    session.activate().await;
    let mut console = Console::new(session, config);

    println!("{}", render_status(&console.session, &console.workflow));
    println!("Type help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let (flow, output) = console.handle(&line).await;
        if !output.is_empty() {
            println!("{output}");
        }
        if flow == Flow::Quit {
            break;
        }
    }
    Ok(())
}

pub fn render_files(session: &Session) -> String {
    if session.files().is_empty() {
        return "No uploaded datasets.".to_string();
    }
    let mut output = String::new();
    let _ = writeln!(output, "Uploaded datasets ({}):", session.files().len());
    for file in session.files() {
        let _ = writeln!(output, "- {} ({})", file.original_name, file.filename);
    }
    output.trim_end().to_string()
}

pub fn render_status(session: &Session, workflow: &TrainingWorkflow) -> String {
    let dataset = workflow
        .dataset()
        .map_or("none", |dataset| dataset.original_name.as_str());
    let trigger = workflow.trigger();
    format!(
        "Uploaded files: {} | Evaluation data: {} | Dataset: {} | {}{}",
        session.files().len(),
        if session.has_evaluation() { "available" } else { "none" },
        dataset,
        trigger.label,
        if trigger.enabled { "" } else { " (disabled)" }
    )
}

fn render_row(output: &mut String, row: &AnnotatedRow<'_>) {
    match row.annotation {
        Some(annotation) => {
            let _ = writeln!(
                output,
                "{:<20} {:>8} {:>8}  {} ({}) {}",
                row.key,
                percent(row.record.logistic_regression.unwrap_or_default()),
                percent(row.record.random_forest.unwrap_or_default()),
                annotation.tier.as_str(),
                annotation.colour,
                percent(annotation.composite_risk)
            );
        }
        None => {
            let _ = writeln!(output, "{:<20} missing model probability", row.key);
        }
    }
}

fn table_header(output: &mut String) {
    let _ = writeln!(
        output,
        "{:<20} {:>8} {:>8}  Risk",
        "Customer ID", "LR", "RF"
    );
}

pub fn render_training(workflow: &TrainingWorkflow) -> String {
    match workflow.state() {
        TrainingState::Idle => workflow.trigger().label.to_string(),
        TrainingState::Ready => format!(
            "Dataset {} ready: {}",
            workflow
                .dataset()
                .map_or("", |dataset| dataset.original_name.as_str()),
            workflow.trigger().label
        ),
        TrainingState::InProgress => workflow.trigger().label.to_string(),
        TrainingState::Failed(_) => workflow.trigger().label.to_string(),
        TrainingState::Completed(results) if results.is_empty() => {
            "Training Completed Successfully: zero predictions returned.".to_string()
        }
        TrainingState::Completed(results) => {
            let mut output = String::new();
            let _ = writeln!(output, "Prediction Results");
            table_header(&mut output);
            for row in workflow.page_rows() {
                render_row(&mut output, &row);
            }
            let _ = write!(
                output,
                "Page {} ({} per page, {} predictions)",
                workflow.page_label(),
                workflow.page_size(),
                results.len()
            );
            output
        }
    }
}

pub fn render_at_risk(filter: &AtRiskFilter) -> String {
    let mut output = String::new();
    if filter.last_error().is_some() {
        let _ = writeln!(output, "At-risk query failed; try again.");
    }
    match filter.view() {
        AtRiskView::NotRun => {
            let _ = write!(output, "Run an at-risk analysis to see customers likely to churn.");
        }
        AtRiskView::Loading => {
            let _ = write!(output, "Analyzing...");
        }
        AtRiskView::NoneAtRisk { threshold } => {
            let _ = write!(
                output,
                "No at-risk customers found for this threshold ({}). Try adjusting the threshold value.",
                threshold_percent(threshold)
            );
        }
        AtRiskView::Customers { threshold, rows } => {
            let _ = writeln!(
                output,
                "At-Risk Customers: {} | Threshold: {}",
                rows.len(),
                threshold_percent(threshold)
            );
            table_header(&mut output);
            for row in &rows {
                render_row(&mut output, row);
            }
        }
    }
    output.trim_end().to_string()
}

pub fn render_runs(selector: &EvaluationSelector) -> String {
    match selector.state() {
        EvaluationState::Loading => "Loading results...".to_string(),
        EvaluationState::Failed(_) => "Error: failed to fetch results.".to_string(),
        EvaluationState::Ready(runs) if runs.is_empty() => {
            "No trained results available. Train a model first.".to_string()
        }
        EvaluationState::Ready(runs) => {
            let mut output = String::new();
            let _ = writeln!(output, "Trained results:");
            for run in runs {
                let _ = writeln!(output, "- {} {}", run.id, run.original_filename);
            }
            output.trim_end().to_string()
        }
    }
}

fn render_model(output: &mut String, name: &str, metrics: Option<&ModelMetrics>) {
    let _ = writeln!(output, "{name}");
    match metrics {
        None => {
            let _ = writeln!(output, "  no metrics recorded");
        }
        Some(metrics) => {
            for (metric, value) in metrics.named() {
                let _ = writeln!(output, "  {metric:<10} {:>7}", percent(value));
            }
            let curve: Vec<String> = approximate_roc(metrics.roc_auc)
                .iter()
                .map(|point| format!("{:.2}", point.tpr))
                .collect();
            let _ = writeln!(output, "  ROC tpr    {}", curve.join(" "));
        }
    }
}

pub fn render_comparison(selector: &EvaluationSelector) -> String {
    if let EvaluationState::Failed(_) = selector.state() {
        return render_runs(selector);
    }
    let Some(comparison) = selector.comparison() else {
        return "No run selected. Use runs to list available results.".to_string();
    };
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Run {} ({})",
        comparison.run.id, comparison.run.original_filename
    );
    render_model(&mut output, "Logistic Regression", comparison.logistic_regression);
    render_model(&mut output, "Random Forest", comparison.random_forest);
    output.trim_end().to_string()
}
