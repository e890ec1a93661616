//! Optimization reporting: aggregates the before/after counts and applied
//! rewrites every pass produces, and can render them as plain text, JSON,
//! or HTML (§4.2).

use serde::Serialize;

/// One pass's effect on one function.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass_name: String,
    pub function_name: String,
    pub instrs_before: usize,
    pub instrs_after: usize,
    pub rewrites: Vec<String>,
}

impl PassReport {
    pub fn changed(&self) -> bool {
        self.instrs_before != self.instrs_after || !self.rewrites.is_empty()
    }
}

/// Collects every pass's [`PassReport`] for one compilation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OptimizationReporter {
    reports: Vec<PassReport>,
}

impl OptimizationReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, report: PassReport) {
        self.reports.push(report);
    }

    pub fn reports(&self) -> &[PassReport] {
        &self.reports
    }

    pub fn total_rewrites(&self) -> usize {
        self.reports.iter().map(|r| r.rewrites.len()).sum()
    }

    pub fn render(&self, formatter: &dyn ReportFormatter) -> String {
        formatter.format(self)
    }
}

/// Renders an [`OptimizationReporter`]'s accumulated reports.
pub trait ReportFormatter {
    fn format(&self, reporter: &OptimizationReporter) -> String;
}

pub struct TextReportFormatter;

impl ReportFormatter for TextReportFormatter {
    fn format(&self, reporter: &OptimizationReporter) -> String {
        let mut out = String::new();
        for report in reporter.reports() {
            out.push_str(&format!(
                "{} on {}: {} -> {} instructions ({} rewrite(s))\n",
                report.pass_name,
                report.function_name,
                report.instrs_before,
                report.instrs_after,
                report.rewrites.len()
            ));
            for rewrite in &report.rewrites {
                out.push_str(&format!("  - {rewrite}\n"));
            }
        }
        out
    }
}

pub struct JSONReportFormatter;

impl ReportFormatter for JSONReportFormatter {
    fn format(&self, reporter: &OptimizationReporter) -> String {
        serde_json::to_string_pretty(reporter).unwrap_or_else(|_| "[]".to_string())
    }
}

pub struct HTMLReportFormatter;

impl ReportFormatter for HTMLReportFormatter {
    fn format(&self, reporter: &OptimizationReporter) -> String {
        let mut out = String::from("<table>\n<tr><th>Pass</th><th>Function</th><th>Before</th><th>After</th><th>Rewrites</th></tr>\n");
        for report in reporter.reports() {
            out.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                html_escape(&report.pass_name),
                html_escape(&report.function_name),
                report.instrs_before,
                report.instrs_after,
                report.rewrites.len(),
            ));
        }
        out.push_str("</table>\n");
        out
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_formatter_includes_rewrite_count() {
        let mut reporter = OptimizationReporter::new();
        reporter.record(PassReport {
            pass_name: "constant-folding".into(),
            function_name: "main".into(),
            instrs_before: 10,
            instrs_after: 7,
            rewrites: vec!["folded 2 + 3 -> 5".into()],
        });
        let text = reporter.render(&TextReportFormatter);
        assert!(text.contains("constant-folding"));
        assert!(text.contains("1 rewrite(s)"));
    }

    #[test]
    fn json_formatter_round_trips_counts() {
        let mut reporter = OptimizationReporter::new();
        reporter.record(PassReport {
            pass_name: "dce".into(),
            function_name: "main".into(),
            instrs_before: 5,
            instrs_after: 3,
            rewrites: vec![],
        });
        let json = reporter.render(&JSONReportFormatter);
        assert!(json.contains("\"instrs_before\": 5"));
    }
}
