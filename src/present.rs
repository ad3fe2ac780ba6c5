//! Plain-text rendering of outcomes and history for the terminal.

use std::io::{self, Write};

use serde_json::{Map, Value};

use crate::reconcile::{Outcome, OutcomeKind, ReprobeOutcome};
use crate::storage::HistoryEntry;

/// Labels for the passport fields the provider extracts.
const FIELD_LABELS: &[(&str, &str)] = &[
    ("numero_passeport", "Passport number"),
    ("nom", "Surname"),
    ("prenom", "Given names"),
    ("date", "Date"),
];

/// Consumer of the reconciliation core's results.
pub trait Presenter {
    fn render_outcome(&mut self, outcome: &Outcome) -> io::Result<()>;
    fn render_history(&mut self, entries: &[HistoryEntry]) -> io::Result<()>;
    fn render_notice(&mut self, message: &str) -> io::Result<()>;

    fn render_reprobe(&mut self, result: &ReprobeOutcome) -> io::Result<()> {
        match result {
            ReprobeOutcome::Succeeded(outcome) => self.render_outcome(outcome),
            ReprobeOutcome::StillInReview => {
                self.render_notice("The document is still awaiting manual validation.")
            }
            ReprobeOutcome::Pending { status } => {
                self.render_notice(&format!("Current status: {}", status))
            }
        }
    }
}

pub struct TerminalPresenter<W: Write> {
    out: W,
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render_fields(&mut self, fields: &Map<String, Value>) -> io::Result<()> {
        writeln!(self.out, "\nExtracted fields:")?;
        for (key, label) in FIELD_LABELS {
            if let Some(value) = fields.get(*key).and_then(display_value) {
                writeln!(self.out, "  {:<16} {}", label, value)?;
            }
        }
        for (key, value) in fields {
            if FIELD_LABELS.iter().any(|(k, _)| *k == key.as_str()) {
                continue;
            }
            if let Some(value) = display_value(value) {
                writeln!(self.out, "  {:<16} {}", key, value)?;
            }
        }
        Ok(())
    }
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn render_outcome(&mut self, outcome: &Outcome) -> io::Result<()> {
        writeln!(self.out)?;
        match outcome {
            Outcome::Succeeded {
                document_name,
                result_summary,
                extracted_fields,
            } => {
                writeln!(self.out, "Status:   Analysis complete")?;
                writeln!(self.out, "Document: {}", document_name)?;
                writeln!(self.out, "Result:   {}", result_summary)?;
                if let Some(fields) = extracted_fields {
                    self.render_fields(fields)?;
                }
            }
            Outcome::ManualReviewRequired { execution_id } => {
                writeln!(self.out, "Status:   Manual validation required")?;
                writeln!(self.out, "Reference: {}", execution_id)?;
                writeln!(
                    self.out,
                    "An agent must review this document. Run `idp-reconciler refresh {}` to check again.",
                    execution_id
                )?;
            }
            Outcome::TimedOut => {
                writeln!(self.out, "Status:   Still processing")?;
                writeln!(self.out, "The analysis is taking longer than expected; try refreshing later.")?;
            }
            Outcome::Failed { reason } => {
                writeln!(self.out, "Status:   Failed")?;
                writeln!(self.out, "Reason:   {}", reason)?;
            }
        }
        Ok(())
    }

    fn render_history(&mut self, entries: &[HistoryEntry]) -> io::Result<()> {
        if entries.is_empty() {
            return writeln!(self.out, "No analyses yet.");
        }
        writeln!(
            self.out,
            "{:<24} | {:<28} | {:<17} | Status",
            "Execution", "Document", "When"
        )?;
        writeln!(self.out, "{:-<24}-|-{:-<28}-|-{:-<17}-|-{:-<26}", "", "", "", "")?;
        for e in entries {
            writeln!(
                self.out,
                "{:<24} | {:<28} | {:<17} | {}",
                e.execution_id,
                e.document_name,
                e.timestamp.format("%d/%m/%Y %H:%M").to_string(),
                status_label(e.outcome_kind)
            )?;
        }
        Ok(())
    }

    fn render_notice(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.out, "{}", message)
    }
}

fn status_label(kind: OutcomeKind) -> &'static str {
    match kind {
        OutcomeKind::Succeeded => "SUCCEEDED",
        OutcomeKind::ManualReviewRequired => "Validation required",
        OutcomeKind::TimedOut => "Still processing",
        OutcomeKind::Failed => "FAILED",
    }
}

fn display_value(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn render<F: FnOnce(&mut TerminalPresenter<Vec<u8>>) -> io::Result<()>>(f: F) -> String {
        let mut p = TerminalPresenter::new(Vec::new());
        f(&mut p).unwrap();
        String::from_utf8(p.into_inner()).unwrap()
    }

    #[test]
    fn test_succeeded_with_passport_fields() {
        let fields = json!({"nom": "DIOP", "numero_passeport": "AB123", "extra": 7});
        let outcome = Outcome::Succeeded {
            document_name: "passport.jpg".into(),
            result_summary: "Passeport valide".into(),
            extracted_fields: fields.as_object().cloned(),
        };
        let text = render(|p| p.render_outcome(&outcome));
        assert!(text.contains("Document: passport.jpg"));
        assert!(text.contains("Passport number  AB123"));
        assert!(text.contains("Surname          DIOP"));
        assert!(text.contains("extra            7"));
        // Labelled fields come first, in label order.
        assert!(text.find("Passport number").unwrap() < text.find("Surname").unwrap());
    }

    #[test]
    fn test_manual_review_mentions_refresh() {
        let text = render(|p| {
            p.render_outcome(&Outcome::ManualReviewRequired {
                execution_id: "EX7".into(),
            })
        });
        assert!(text.contains("Manual validation required"));
        assert!(text.contains("refresh EX7"));
    }

    #[test]
    fn test_timed_out_is_not_an_error_message() {
        let text = render(|p| p.render_outcome(&Outcome::TimedOut));
        assert!(text.contains("Still processing"));
        assert!(!text.contains("Failed"));
    }

    #[test]
    fn test_history_table() {
        let entry = HistoryEntry {
            execution_id: "EX1".into(),
            document_name: "scan.pdf".into(),
            timestamp: chrono::Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, 0).unwrap(),
            outcome_kind: OutcomeKind::ManualReviewRequired,
            result_summary: None,
            provider_file_ref: Some("f1".into()),
            extracted_fields: None,
            updated_at: None,
        };
        let text = render(|p| p.render_history(&[entry]));
        assert!(text.contains("EX1"));
        assert!(text.contains("01/03/2026 09:05"));
        assert!(text.contains("Validation required"));

        let empty = render(|p| p.render_history(&[]));
        assert_eq!(empty, "No analyses yet.\n");
    }

    #[test]
    fn test_reprobe_pending_notice() {
        let text = render(|p| {
            p.render_reprobe(&ReprobeOutcome::Pending {
                status: "RUNNING".into(),
            })
        });
        assert_eq!(text, "Current status: RUNNING\n");
    }
}
