use serde::Serialize;

use crate::training::document::{DocumentStatus, TrainingDocument};

/// Whether the session is training a brand-new solution or refining one that
/// already has working instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    NewSolution,
    Editing,
}

/// Thresholds a session must meet before training counts as done.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadinessGate {
    pub min_documents: usize,
    pub min_approved: usize,
    pub min_confidence: f64,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self {
            min_documents: 2,
            min_approved: 1,
            min_confidence: 70.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub total_documents: usize,
    pub approved_documents: usize,
    /// Mean confidence of approved documents; 0 when none are approved.
    pub average_confidence: f64,
    /// Human-readable list of unmet requirements.
    pub missing: Vec<String>,
}

impl ReadinessGate {
    /// New solutions need `min_documents`, `min_approved` and a mean approved
    /// confidence of at least `min_confidence`. Editing only needs one approval.
    pub fn evaluate(&self, documents: &[TrainingDocument], mode: SessionMode) -> ReadinessReport {
        let approved: Vec<&TrainingDocument> = documents
            .iter()
            .filter(|d| d.status == DocumentStatus::Approved)
            .collect();
        let average_confidence = if approved.is_empty() {
            0.0
        } else {
            approved
                .iter()
                .map(|d| f64::from(d.confidence().unwrap_or(0)))
                .sum::<f64>()
                / approved.len() as f64
        };

        let mut missing = Vec::new();
        match mode {
            SessionMode::NewSolution => {
                if documents.len() < self.min_documents {
                    missing.push(format!(
                        "upload at least {} documents ({} so far)",
                        self.min_documents,
                        documents.len()
                    ));
                }
                if approved.len() < self.min_approved {
                    missing.push(format!(
                        "approve at least {} document(s) ({} so far)",
                        self.min_approved,
                        approved.len()
                    ));
                }
                if average_confidence < self.min_confidence {
                    missing.push(format!(
                        "reach {:.0}% average confidence on approved documents (currently {:.0}%)",
                        self.min_confidence, average_confidence
                    ));
                }
            }
            SessionMode::Editing => {
                if approved.is_empty() {
                    missing.push("approve at least 1 document".to_string());
                }
            }
        }

        ReadinessReport {
            ready: missing.is_empty(),
            total_documents: documents.len(),
            approved_documents: approved.len(),
            average_confidence,
            missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractionResult;
    use crate::models::document::DocumentKind;
    use serde_json::json;

    /// A ready document whose extraction scores `filled` out of 4 fields.
    fn document(filled: usize, approve: bool) -> TrainingDocument {
        let mut doc = TrainingDocument::new("doc.txt", DocumentKind::Text);
        let mut fields = serde_json::Map::new();
        for i in 0..4 {
            let v = if i < filled { json!("x") } else { json!(null) };
            fields.insert(format!("f{i}"), v);
        }
        doc.complete_processing(ExtractionResult::Valid(fields));
        if approve {
            doc.approve().unwrap();
        }
        doc
    }

    #[test]
    fn test_new_solution_needs_two_documents() {
        let gate = ReadinessGate::default();
        let report = gate.evaluate(&[document(4, true)], SessionMode::NewSolution);
        assert!(!report.ready);
        assert_eq!(report.missing.len(), 1);

        let report = gate.evaluate(
            &[document(4, true), document(1, false)],
            SessionMode::NewSolution,
        );
        assert!(report.ready);
        assert_eq!(report.average_confidence, 100.0);
    }

    #[test]
    fn test_new_solution_needs_confident_approvals() {
        let gate = ReadinessGate::default();
        // Approved at 75% and 50% -> mean 62.5 < 70
        let docs = [document(3, true), document(2, true)];
        let report = gate.evaluate(&docs, SessionMode::NewSolution);
        assert!(!report.ready);
        assert_eq!(report.approved_documents, 2);
        assert_eq!(report.average_confidence, 62.5);
    }

    #[test]
    fn test_unapproved_documents_do_not_count_toward_confidence() {
        let gate = ReadinessGate::default();
        let docs = [document(4, false), document(4, false), document(4, false)];
        let report = gate.evaluate(&docs, SessionMode::NewSolution);
        assert!(!report.ready);
        assert_eq!(report.average_confidence, 0.0);
    }

    #[test]
    fn test_editing_needs_one_approval_only() {
        let gate = ReadinessGate::default();
        assert!(!gate.evaluate(&[], SessionMode::Editing).ready);
        let report = gate.evaluate(&[document(1, true)], SessionMode::Editing);
        assert!(report.ready);
        assert_eq!(report.average_confidence, 25.0);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let gate = ReadinessGate {
            min_documents: 1,
            min_approved: 1,
            min_confidence: 20.0,
        };
        assert!(gate.evaluate(&[document(1, true)], SessionMode::NewSolution).ready);
    }
}
