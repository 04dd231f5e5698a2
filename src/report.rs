//! Textual verification reports.
//!
//! Renders the per-time metric table and the mean ± std summary of a
//! verification run, using the model display names and units from the
//! [`PipelineConfig`].

use fcverify_core::metrics::Metric;
use fcverify_core::summary::ComparisonSummary;
use fcverify_core::{ModelId, PipelineConfig, VerificationResult};

const RULE_WIDTH: usize = 60;

/// Labels used when rendering a report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLabels {
    pub primary: String,
    pub alternate: String,
    pub units: String,
}

impl ReportLabels {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            primary: config.primary_name.clone(),
            alternate: config.alternate_name.clone(),
            units: config.units.clone(),
        }
    }

    pub fn model(&self, model: ModelId) -> &str {
        match model {
            ModelId::Primary => &self.primary,
            ModelId::Alternate => &self.alternate,
        }
    }
}

/// Format one value the way it is reported: errors with two decimals, R²
/// with three.
fn format_value(metric: Metric, value: f64) -> String {
    match metric {
        Metric::R2 => format!("{value:.3}"),
        _ => format!("{value:.2}"),
    }
}

/// One line per valid time and model.
///
/// ```text
/// 2024-06-01T06:00:00  IFS   MAE: 1.02, RMSE: 1.31, R²: 0.954
/// ```
pub fn render_time_table(result: &VerificationResult, labels: &ReportLabels) -> String {
    let width = ModelId::ALL
        .iter()
        .map(|m| labels.model(*m).len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for (index, time) in result.times().iter().enumerate() {
        for model in ModelId::ALL {
            let record = &result.records(model)[index];
            let metrics: Vec<String> = Metric::ALL
                .iter()
                .map(|m| format!("{}: {}", m.label(), format_value(*m, record.get(*m))))
                .collect();
            out.push_str(&format!(
                "{time}  {:<width$}  {}\n",
                labels.model(model),
                metrics.join(", ")
            ));
        }
    }
    out
}

/// Mean ± population std of every metric for both models.
pub fn render_summary(summary: &ComparisonSummary, labels: &ReportLabels) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = format!("{rule}\nSUMMARY STATISTICS\n{rule}\n");

    for model in ModelId::ALL {
        let stats = summary.get(model);
        out.push_str(&format!(
            "\n{} Forecast ({} valid times):\n",
            labels.model(model),
            stats.count
        ));
        for metric in Metric::ALL {
            let m = stats.get(metric);
            let label = format!("{}:", metric.label());
            let unit = if metric.has_unit() {
                format!(" {}", labels.units)
            } else {
                String::new()
            };
            out.push_str(&format!(
                "  {label:<6}{} ± {}{unit}\n",
                format_value(metric, m.mean),
                format_value(metric, m.std)
            ));
        }
    }
    out.push_str(&rule);
    out.push('\n');
    out
}
