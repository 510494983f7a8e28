use crate::config::{Instruments, WorkflowConfig};
use qflow_domain::services::handlers::lookup_handler;
use qflow_domain::value_objects::date_range::DateRange;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl ValidationReport {
    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(Issue {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(Issue {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

fn join(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(Issue::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors fail validation; with `strict`, warnings fail it too.
pub fn validate(config: &WorkflowConfig, strict: bool) -> Result<ValidationReport, String> {
    let report = check(config);
    if !report.errors.is_empty() {
        return Err(format!("validation failed: {}", join(&report.errors)));
    }
    if strict && !report.warnings.is_empty() {
        return Err(format!("strict validation failed: {}", join(&report.warnings)));
    }
    Ok(report)
}

/// Collects every issue without failing.
pub fn check(config: &WorkflowConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    let window = check_handler_window(config, &mut report);
    check_segments(config, window, &mut report);
    check_records(config, &mut report);
    check_backtest(config, &mut report);
    check_handler(config, &mut report);
    report
}

fn check_handler_window(config: &WorkflowConfig, report: &mut ValidationReport) -> Option<DateRange> {
    let handler = &config.data_handler_config;
    let window = match handler.window() {
        Ok(window) => window,
        Err(err) => {
            report.error("data_handler_config", format!("handler window: {err}"));
            return None;
        }
    };

    match handler.fit_window() {
        Some(Ok(fit)) => {
            if !window.covers(&fit) {
                report.error(
                    "data_handler_config",
                    format!("fit window {fit} is outside the handler window {window}"),
                );
            }
        }
        Some(Err(err)) => report.error("data_handler_config", format!("fit window: {err}")),
        None => {
            if handler.fit_start_time.is_some() != handler.fit_end_time.is_some() {
                report.error(
                    "data_handler_config",
                    "fit_start_time and fit_end_time must be set together",
                );
            }
        }
    }

    if let Instruments::Market(market) = &handler.instruments {
        if market != &config.market {
            report.warn(
                "data_handler_config.instruments",
                format!("instruments '{market}' differs from market '{}'", config.market),
            );
        }
    }
    Some(window)
}

fn check_segments(config: &WorkflowConfig, window: Option<DateRange>, report: &mut ValidationReport) {
    let segments = &config.task.dataset.kwargs.segments;
    let mut ranges: Vec<(&str, DateRange)> = Vec::new();
    for (name, (start, end)) in segments.named() {
        let path = format!("task.dataset.kwargs.segments.{name}");
        match DateRange::new(start, end) {
            Ok(range) => {
                if let Some(window) = window {
                    if !window.covers(&range) {
                        report.error(
                            path,
                            format!("segment {range} is outside the handler window {window}"),
                        );
                    }
                }
                ranges.push((name, range));
            }
            Err(err) => report.error(path, err),
        }
    }

    for pair in ranges.windows(2) {
        let (prev_name, prev) = pair[0];
        let (name, range) = pair[1];
        if range.start < prev.start {
            report.error(
                "task.dataset.kwargs.segments",
                format!("segment {name} starts before {prev_name}; expected train -> valid -> test"),
            );
        } else if range.overlaps(&prev) {
            report.warn(
                "task.dataset.kwargs.segments",
                format!("segments {prev_name} ({prev}) and {name} ({range}) overlap"),
            );
        }
    }

    let train = ranges.iter().find(|(name, _)| *name == "train").map(|(_, r)| *r);
    let fit_end = config.data_handler_config.fit_end_time;
    if let (Some(train), Some(fit_end)) = (train, fit_end) {
        if fit_end > train.end {
            report.warn(
                "data_handler_config.fit_end_time",
                format!(
                    "fit window ends {fit_end}, after the train segment end {}; normalization sees later data",
                    train.end
                ),
            );
        }
    }
}

fn short_class(class: &str) -> &str {
    class.rsplit('.').next().unwrap_or(class)
}

fn check_records(config: &WorkflowConfig, report: &mut ValidationReport) {
    let mut seen_signal = false;
    for (idx, record) in config.task.record.iter().enumerate() {
        match short_class(&record.class) {
            "SignalRecord" => seen_signal = true,
            class @ ("SigAnaRecord" | "PortAnaRecord") if !seen_signal => report.error(
                format!("task.record.{idx}"),
                format!("{class} must come after a SignalRecord"),
            ),
            _ => {}
        }
    }
}

fn check_backtest(config: &WorkflowConfig, report: &mut ValidationReport) {
    let Some(port) = &config.port_analysis_config else {
        return;
    };
    let backtest = &port.backtest;
    let path = "port_analysis_config.backtest";

    if let Some(account) = backtest.account {
        if !(account > 0.0) {
            report.error(format!("{path}.account"), format!("must be > 0, got {account}"));
        }
    }
    for (name, value) in [
        ("open_cost", backtest.open_cost),
        ("close_cost", backtest.close_cost),
        ("min_cost", backtest.min_cost),
    ] {
        if let Some(value) = value {
            if !(value >= 0.0) {
                report.error(format!("{path}.{name}"), format!("must be >= 0, got {value}"));
            }
        }
    }
    if let Some(limit) = backtest.limit_threshold {
        if !(limit > 0.0 && limit < 1.0) {
            report.error(
                format!("{path}.limit_threshold"),
                format!("must be in (0, 1), got {limit}"),
            );
        }
    }
    if let Some(benchmark) = &backtest.benchmark {
        if benchmark != &config.benchmark {
            report.warn(
                format!("{path}.benchmark"),
                format!("'{benchmark}' differs from top-level benchmark '{}'", config.benchmark),
            );
        }
    }
}

fn check_handler(config: &WorkflowConfig, report: &mut ValidationReport) {
    let handler = &config.task.dataset.kwargs.handler;
    let has_loader = handler
        .kwargs
        .get("data_loader")
        .is_some_and(|loader| !loader.is_null());
    if !has_loader && lookup_handler(short_class(&handler.class)).is_none() {
        report.warn(
            "task.dataset.kwargs.handler.class",
            format!(
                "handler '{}' is not in the built-in catalogue; its columns cannot be listed",
                handler.class
            ),
        );
    }
}
