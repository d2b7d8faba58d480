use plotly::common::{DashType, Line, Mode};
use plotly::layout::{Axis, BarMode, Layout};
use plotly::{Bar, Plot, Scatter};

use crate::metrics::Evaluation;

/// ROC curves of several models on one chart, with the chance diagonal.
pub fn plot_roc_curves(evaluations: &[(String, &Evaluation)], title: &str) -> Plot {
    let mut plot = Plot::new();
    for (name, eval) in evaluations {
        let (fpr, tpr): (Vec<f64>, Vec<f64>) = eval.roc_curve.iter().copied().unzip();
        let label = format!("{} (AUC {:.3})", name, eval.auc);
        let trace = Scatter::new(fpr, tpr).mode(Mode::Lines).name(label.as_str());
        plot.add_trace(trace);
    }

    let reference_line = Scatter::new(vec![0.0, 1.0], vec![0.0, 1.0])
        .mode(Mode::Lines)
        .name("Chance")
        .line(Line::new().color("grey").dash(DashType::Dash));
    plot.add_trace(reference_line);

    plot.set_layout(
        Layout::new()
            .title(title)
            .x_axis(Axis::new().title("False positive rate"))
            .y_axis(Axis::new().title("True positive rate")),
    );
    plot
}

/// Grouped bars of accuracy, AUC, precision and recall per model.
pub fn plot_metric_bars(evaluations: &[(String, &Evaluation)], title: &str) -> Plot {
    let metrics: [(&str, fn(&Evaluation) -> f64); 4] = [
        ("Accuracy", |e| e.accuracy),
        ("AUC", |e| e.auc),
        ("Precision", |e| e.precision),
        ("Recall", |e| e.recall),
    ];
    let names: Vec<String> = evaluations.iter().map(|(n, _)| n.clone()).collect();

    let mut plot = Plot::new();
    for (metric, get) in metrics {
        let values: Vec<f64> = evaluations.iter().map(|(_, e)| get(e)).collect();
        plot.add_trace(Bar::new(names.clone(), values).name(metric));
    }
    plot.set_layout(
        Layout::new()
            .title(title)
            .bar_mode(BarMode::Group)
            .y_axis(Axis::new().title("Score").range(vec![0.0, 1.0])),
    );
    plot
}
