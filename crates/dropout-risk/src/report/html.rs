//! Self-contained HTML training report.
use std::path::Path;

use chrono::{DateTime, Utc};
use maud::{html, Markup, PreEscaped, DOCTYPE};
use plotly::Plot;

use crate::artifact::write_atomically;
use crate::error::Result;
use crate::metrics::Evaluation;
use crate::report::plots::{plot_metric_bars, plot_roc_curves};

const PLOTLY_JS: &str = "https://cdn.plot.ly/plotly-2.12.1.min.js";

pub struct ReportSection {
    title: String,
    content: Vec<Markup>,
}

impl ReportSection {
    pub fn new(title: &str) -> Self {
        ReportSection {
            title: title.to_string(),
            content: Vec::new(),
        }
    }

    pub fn add_content(&mut self, markup: Markup) {
        self.content.push(markup);
    }

    pub fn add_plot(&mut self, plot: Plot) {
        let div_id = format!(
            "plot-{}-{}",
            self.title.to_lowercase().replace(' ', "-"),
            self.content.len()
        );
        self.content
            .push(PreEscaped(plot.to_inline_html(Some(div_id.as_str()))));
    }
}

pub struct Report {
    title: String,
    generated_at: DateTime<Utc>,
    sections: Vec<ReportSection>,
}

impl Report {
    pub fn new(title: &str) -> Self {
        Report {
            title: title.to_string(),
            generated_at: Utc::now(),
            sections: Vec::new(),
        }
    }

    pub fn add_section(&mut self, section: ReportSection) {
        self.sections.push(section);
    }

    pub fn render(&self) -> String {
        let page = html! {
            (DOCTYPE)
            html {
                head {
                    meta charset="utf-8";
                    title { (self.title) }
                    script src=(PLOTLY_JS) {}
                    style {
                        "body { font-family: sans-serif; margin: 2em; color: #222; }
                         table { border-collapse: collapse; margin: 1em 0; }
                         th, td { border: 1px solid #ccc; padding: 4px 10px; text-align: right; }
                         th:first-child, td:first-child { text-align: left; }
                         .deployed { font-weight: bold; }"
                    }
                }
                body {
                    h1 { (self.title) }
                    p { "Generated " (self.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()) }
                    @for part in &self.sections {
                        section {
                            h2 { (part.title) }
                            @for block in &part.content {
                                div { (block) }
                            }
                        }
                    }
                }
            }
        };
        page.into_string()
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_atomically(path.as_ref(), self.render().as_bytes())
    }
}

fn comparison_table(evaluations: &[(String, &Evaluation)], deployed: &str) -> Markup {
    html! {
        table {
            tr {
                th { "Model" } th { "Accuracy" } th { "AUC" } th { "Precision" } th { "Recall" }
                th { "CV accuracy" }
            }
            @for (name, eval) in evaluations {
                tr class=[(name == deployed).then_some("deployed")] {
                    td { (name) }
                    td { (format!("{:.4}", eval.accuracy)) }
                    td { (format!("{:.4}", eval.auc)) }
                    td { (format!("{:.4}", eval.precision)) }
                    td { (format!("{:.4}", eval.recall)) }
                    td { (cv_cell(eval)) }
                }
            }
        }
    }
}

fn cv_cell(eval: &Evaluation) -> String {
    match &eval.cross_validation {
        Some(cv) => format!(
            "{:.4} ± {:.4} ({} folds)",
            cv.mean_accuracy,
            cv.std_accuracy,
            cv.folds()
        ),
        None => "n/a".to_string(),
    }
}

fn confusion_table(eval: &Evaluation) -> Markup {
    let [[tn, fp], [fn_, tp]] = eval.confusion_matrix;
    html! {
        table {
            tr { th { "" } th { "Predicted retained" } th { "Predicted dropout" } }
            tr { td { "Retained" } td { (tn) } td { (fp) } }
            tr { td { "Dropout" } td { (fn_) } td { (tp) } }
        }
    }
}

/// Build the training report: metric table, ROC curves, metric bars, confusion
/// matrices and the configuration used.
pub fn training_report(
    evaluations: &[(String, &Evaluation)],
    deployed: &str,
    dataset_summary: &str,
    config_json: &str,
) -> Report {
    let mut report = Report::new("Dropout Risk Model Training Report");

    let mut overview = ReportSection::new("Overview");
    overview.add_content(html! {
        p { (dataset_summary) }
        p { "Deployed model: " strong { (deployed) } }
    });
    overview.add_content(comparison_table(evaluations, deployed));
    overview.add_plot(plot_roc_curves(evaluations, "ROC curves on the test partition"));
    overview.add_plot(plot_metric_bars(evaluations, "Test metrics"));
    report.add_section(overview);

    let mut confusion = ReportSection::new("Confusion Matrices");
    for (name, eval) in evaluations {
        confusion.add_content(html! {
            h3 { (name) }
            (confusion_table(eval))
        });
    }
    report.add_section(confusion);

    let mut config_section = ReportSection::new("Configuration");
    config_section.add_content(html! {
        pre { code { (config_json) } }
    });
    report.add_section(config_section);

    report
}
