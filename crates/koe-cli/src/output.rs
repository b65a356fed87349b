//! Output formatting for the CLI.

use crate::config::OutputFormat;
use crate::error::Result;
use colored::*;
use koe_domain::{
    AccelerationCase, Case, CaseId, ConsequenceResult, Event, OwnerDecision, PreclusionVerdict, Severity, Track, TrackKind,
};
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Selected output format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Format a folded case.
    pub fn format_case(&self, case: &Case) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(case)?),
            OutputFormat::Quiet => Ok(TrackKind::ALL
                .iter()
                .map(|kind| format!("{}={}", kind, case.track_status(*kind)))
                .collect::<Vec<_>>()
                .join(" ")),
            OutputFormat::Table => Ok(self.format_case_table(case)),
        }
    }

    fn format_case_table(&self, case: &Case) -> String {
        let mut out = String::new();
        out.push_str(&format!("{} (version {})\n", self.colorize(case.id.as_str(), "cyan"), case.version));
        out.push_str(&format!("Title:      {}\n", case.title));
        if !case.owner.is_empty() || !case.contractor.is_empty() {
            out.push_str(&format!("Parties:    {} / {}\n", case.owner, case.contractor));
        }
        out.push_str(&format!("Category:   {} ({})\n", case.category, case.category.rule_id()));
        if let Some(acceleration) = case.acceleration {
            out.push_str(&format!("Forsering:  {}\n", acceleration));
        }

        let mut builder = Builder::default();
        builder.push_record(["Track", "Status", "Claimed", "Approved", "Grade", "Answered in", "Subsidiary", "Timely"]);
        for kind in TrackKind::ALL {
            let status = case.track_status(kind).to_string();
            match case.track(kind) {
                Some(track) => builder.push_record(track_row(track, status)),
                None => builder.push_record([
                    kind.to_string(),
                    status,
                    "-".into(),
                    "-".into(),
                    "-".into(),
                    "-".into(),
                    "-".into(),
                    "-".into(),
                ]),
            }
        }
        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));
        out.push_str(&table.to_string());
        out.push('\n');

        let verdict = &case.basis_preclusion;
        if verdict.is_assessable() {
            out.push_str(&format!(
                "Basis notice: {} days after discovery ({}){}\n",
                verdict.days_elapsed,
                verdict.applicable_rule,
                if verdict.at_risk { ", at risk of preclusion" } else { "" }
            ));
        }

        out.push_str(&self.format_consequence_line(case.consequence.as_ref()));
        for promotion in &case.reversals {
            if !promotion.promoted.is_empty() {
                let promoted: Vec<String> = promotion.promoted.iter().map(ToString::to_string).collect();
                out.push('\n');
                out.push_str(&self.info(&format!(
                    "Reversal {} promoted {} to principal",
                    promotion.reversal_event,
                    promoted.join(", ")
                )));
            }
        }
        out
    }

    fn format_consequence_line(&self, consequence: Option<&ConsequenceResult>) -> String {
        let Some(consequence) = consequence else {
            return self.info("Basis not yet decided");
        };
        let mut line = self.severity(consequence.severity, consequence.message_key.as_str());
        if let Some(key) = consequence.reversal_message_key {
            line.push('\n');
            line.push_str(&self.warning(key.as_str()));
        }
        line
    }

    /// Format a case's event history.
    pub fn format_events(&self, events: &[Event]) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(events)?),
            OutputFormat::Quiet => Ok(events.iter().map(|e| e.id.to_string()).collect::<Vec<_>>().join("\n")),
            OutputFormat::Table => {
                if events.is_empty() {
                    return Ok(self.colorize("No events found.", "yellow"));
                }

                let mut builder = Builder::default();
                builder.push_record(["#", "Timestamp", "Track", "Event", "Actor", "Details"]);
                for (i, event) in events.iter().enumerate() {
                    builder.push_record([
                        (i + 1).to_string(),
                        event.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                        event.track_kind.to_string(),
                        event.event_type.to_string(),
                        event.actor_role.to_string(),
                        event_details(event),
                    ]);
                }
                let mut table = builder.build();
                table
                    .with(Style::rounded())
                    .with(Modify::new(Rows::first()).with(Alignment::center()));
                Ok(table.to_string())
            }
        }
    }

    /// Format stored case identifiers.
    pub fn format_case_ids(&self, ids: &[CaseId]) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(ids)?),
            OutputFormat::Table if ids.is_empty() => Ok(self.colorize("No cases found.", "yellow")),
            _ => Ok(ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join("\n")),
        }
    }

    /// Format a preclusion verdict.
    pub fn format_verdict(&self, verdict: &PreclusionVerdict) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(verdict)?),
            OutputFormat::Quiet => Ok(match verdict.is_precluded {
                Some(precluded) => precluded.to_string(),
                None => "null".to_string(),
            }),
            OutputFormat::Table => Ok(match verdict.is_precluded {
                None => self.info(&format!("Not yet assessable under {}", verdict.applicable_rule)),
                Some(true) => self.error(&format!(
                    "Precluded: {} days elapsed under {}",
                    verdict.days_elapsed, verdict.applicable_rule
                )),
                Some(false) if verdict.at_risk => self.warning(&format!(
                    "Not precluded, but {} days exceed the deadline under {} (lateness not invoked)",
                    verdict.days_elapsed, verdict.applicable_rule
                )),
                Some(false) => self.success(&format!(
                    "Timely: {} days elapsed under {}",
                    verdict.days_elapsed, verdict.applicable_rule
                )),
            }),
        }
    }

    /// Format an approval grade.
    pub fn format_grade(&self, grade: Option<u8>) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::json!({ "grade": grade }).to_string()),
            OutputFormat::Quiet => Ok(grade.map_or("null".to_string(), |g| g.to_string())),
            OutputFormat::Table => Ok(match grade {
                Some(g) => format!("Approval grade: {}%", g),
                None => self.info("No grade: nothing claimed"),
            }),
        }
    }

    /// Format a consequence.
    pub fn format_consequence(&self, consequence: Option<&ConsequenceResult>) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&consequence)?),
            OutputFormat::Quiet => Ok(consequence.map_or("null".to_string(), |c| c.message_key.to_string())),
            OutputFormat::Table => Ok(self.format_consequence_line(consequence)),
        }
    }

    /// Format an acceleration case.
    pub fn format_acceleration(&self, case: &AccelerationCase) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(case)?),
            OutputFormat::Quiet => Ok(case.cost_within_limit().to_string()),
            OutputFormat::Table => {
                let mut builder = Builder::default();
                builder.push_record(["Case", "Rejected days"]);
                for track in case.tracks() {
                    builder.push_record([track.case_id.to_string(), track.rejected_days.to_string()]);
                }
                builder.push_record(["Total".to_string(), case.total_rejected_days().to_string()]);
                let mut table = builder.build();
                table
                    .with(Style::rounded())
                    .with(Modify::new(Rows::first()).with(Alignment::center()));

                let mut out = format!(
                    "Acceleration {} (version {}): {}\n",
                    self.colorize(&case.id().to_string(), "cyan"),
                    case.version(),
                    case.state()
                );
                if let Some(date) = case.notice_date() {
                    out.push_str(&format!("Notified:   {}\n", date));
                }
                out.push_str(&table.to_string());
                out.push_str(&format!(
                    "\nDaily rate {:.0} NOK, ceiling {:.0} NOK, estimate {:.0} NOK\n",
                    case.daily_penalty_rate(),
                    case.max_cost_ceiling(),
                    case.estimated_cost()
                ));
                out.push_str(&if case.cost_within_limit() {
                    self.success("Estimate is within the ceiling; acceleration may be activated")
                } else if !case.percentage_confirmed() {
                    self.warning("Percentage-of-contract ceiling not confirmed; activation refused")
                } else {
                    self.error("Estimate exceeds the ceiling; activation refused")
                });
                if let Some(incurred) = case.current_incurred_cost() {
                    out.push_str(&format!("\nIncurred so far: {:.0} NOK", incurred));
                }
                match case.owner_response() {
                    Some(OwnerDecision::Accepted) => out.push_str("\nOwner accepted the acceleration cost"),
                    Some(OwnerDecision::Rejected) => out.push_str("\nOwner rejected the acceleration cost"),
                    None => {}
                }
                Ok(out)
            }
        }
    }

    /// Format stored acceleration cases.
    pub fn format_accelerations(&self, cases: &[AccelerationCase]) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(cases)?),
            OutputFormat::Quiet => Ok(cases.iter().map(|c| c.id().to_string()).collect::<Vec<_>>().join("\n")),
            OutputFormat::Table => {
                if cases.is_empty() {
                    return Ok(self.colorize("No acceleration cases found.", "yellow"));
                }

                let mut builder = Builder::default();
                builder.push_record(["Acceleration", "State", "Cases", "Days", "Ceiling", "Estimate", "Version"]);
                for case in cases {
                    let referenced: Vec<String> = case.tracks().iter().map(|t| t.case_id.to_string()).collect();
                    builder.push_record([
                        case.id().to_string(),
                        case.state().to_string(),
                        referenced.join(", "),
                        case.total_rejected_days().to_string(),
                        format!("{:.0}", case.max_cost_ceiling()),
                        format!("{:.0}", case.estimated_cost()),
                        case.version().to_string(),
                    ]);
                }
                let mut table = builder.build();
                table
                    .with(Style::rounded())
                    .with(Modify::new(Rows::first()).with(Alignment::center()));
                Ok(table.to_string())
            }
        }
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    fn severity(&self, severity: Severity, message: &str) -> String {
        match severity {
            Severity::Success => self.success(message),
            Severity::Warning => self.warning(message),
            Severity::Danger => self.error(message),
            Severity::Info => self.info(message),
        }
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            "cyan" => text.cyan().to_string(),
            _ => text.to_string(),
        }
    }
}

fn value(v: Option<f64>) -> String {
    v.map_or("-".to_string(), |v| format!("{}", v))
}

fn track_row(track: &Track, status: String) -> [String; 8] {
    [
        track.kind.to_string(),
        status,
        value(track.claimed_value),
        value(track.approved_value),
        track.grade().map_or("-".to_string(), |g| format!("{}%", g)),
        track.response_days().map_or("-".to_string(), |d| format!("{} days", d)),
        if track.is_subsidiary { "yes" } else { "no" }.to_string(),
        track.was_timely.map_or("-".to_string(), |t| t.to_string()),
    ]
}

fn event_details(event: &Event) -> String {
    let p = &event.payload;
    let mut parts = Vec::new();
    if let Some(details) = &p.case {
        parts.push(format!("opened \"{}\" [{}]", details.title, details.category));
    }
    if let Some(v) = p.claimed_value {
        parts.push(format!("claimed {}", v));
    }
    if let Some(r) = p.result {
        parts.push(r.to_string());
    }
    if let Some(v) = p.approved_value {
        parts.push(format!("approved {}", v));
    }
    if let Some(t) = p.was_timely {
        parts.push(format!("timely {}", t));
    }
    if let Some(c) = &p.comment {
        parts.push(c.clone());
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use koe_domain::{CaseProjection, ResponseResult};

    fn test_case() -> Case {
        let events = vec![
            Event::claim_sent(TrackKind::Basis, Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap(), None),
            Event::claim_sent(TrackKind::Compensation, Utc.with_ymd_and_hms(2024, 1, 3, 8, 0, 0).unwrap(), Some(100.0)),
            Event::response(
                TrackKind::Compensation,
                Utc.with_ymd_and_hms(2024, 1, 9, 8, 0, 0).unwrap(),
                ResponseResult::PartiallyApproved,
                Some(45.0),
            ),
        ];
        CaseProjection::default().fold(&CaseId::new("KOE-1"), &events).unwrap()
    }

    #[test]
    fn test_case_table() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let output = formatter.format_case(&test_case()).unwrap();
        assert!(output.contains("KOE-1"));
        assert!(output.contains("Subsidiary"));
        assert!(output.contains("45%"));
        assert!(output.contains("Basis not yet decided"));
    }

    #[test]
    fn test_case_quiet() {
        let formatter = Formatter::new(OutputFormat::Quiet, false);
        let output = formatter.format_case(&test_case()).unwrap();
        assert_eq!(output, "basis=sent compensation=partially_approved schedule=draft");
    }

    #[test]
    fn test_case_json() {
        let formatter = Formatter::new(OutputFormat::Json, false);
        let output = formatter.format_case(&test_case()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["compensation"]["status"], "partially_approved");
    }

    #[test]
    fn test_empty_events() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let output = formatter.format_events(&[]).unwrap();
        assert!(output.contains("No events found"));
    }

    #[test]
    fn test_grade_formats() {
        assert_eq!(Formatter::new(OutputFormat::Quiet, false).format_grade(None).unwrap(), "null");
        assert_eq!(
            Formatter::new(OutputFormat::Table, false).format_grade(Some(45)).unwrap(),
            "Approval grade: 45%"
        );
    }

    #[test]
    fn test_colorize_disabled() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let msg = formatter.success("test");
        assert_eq!(msg, "✓ test");
    }
}
