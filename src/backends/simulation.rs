//! Deterministic stand-ins for the live backends.
//!
//! The script walks a duplicate-charge support reply from 52 to 96 points
//! over five attempts. Everything is keyed by the 1-based attempt index;
//! indices past the end of the script repeat the last entry.

use super::{BackendFuture, Evaluator, Generator, Patcher};
use crate::config::SimulationConfig;
use crate::eval::{Evaluation, ScoreBreakdown, Severity, Violation};
use crate::policy::{Patch, Policy, STYLE_MAX_WORDS, Style};
use std::time::Duration;

/// Task text of the built-in demo run the script was written against.
pub const DEMO_TASK: &str = "Write a customer support reply to a customer who was charged twice for the same order.\n\
Constraints:\n\
1. Apologize exactly once.\n\
2. Do not admit fault.\n\
3. Ask for the order ID and only the last 4 digits of the card used.\n\
4. Offer both a refund and account credit as options.\n\
5. Stay under 90 words.\n\
6. Keep a calm, confident tone.";

pub const DEMO_TITLE: &str = "Duplicate charge support reply";

const LAST_OUTPUT: u32 = 5;
const LAST_EVALUATION: u32 = 5;
const LAST_PATCH: u32 = 4;

/// Word limit at or below which the second draft comes out tighter.
const TIGHT_WORD_LIMIT: i64 = 90;

const RULE_COUNT_WORDS: &str =
    "Count words before finalizing: must be under the max_words_default limit.";

pub struct SimulatedBackend {
    delays: SimulationConfig,
}

impl SimulatedBackend {
    pub fn new(delays: SimulationConfig) -> Self {
        Self { delays }
    }
}

async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

impl Generator for SimulatedBackend {
    fn generate<'a>(
        &'a self,
        attempt: u32,
        _task: &'a str,
        policy: &'a Policy,
    ) -> BackendFuture<'a, String> {
        Box::pin(async move {
            pause(self.delays.generate_delay_ms).await;
            Ok(scripted_output(attempt, policy))
        })
    }
}

impl Evaluator for SimulatedBackend {
    fn evaluate<'a>(
        &'a self,
        attempt: u32,
        _task: &'a str,
        _output: &'a str,
        _policy: &'a Policy,
    ) -> BackendFuture<'a, Evaluation> {
        Box::pin(async move {
            pause(self.delays.evaluate_delay_ms).await;
            Ok(scripted_evaluation(attempt))
        })
    }
}

impl Patcher for SimulatedBackend {
    fn derive_patch<'a>(
        &'a self,
        attempt: u32,
        _task: &'a str,
        _output: &'a str,
        _evaluation: &'a Evaluation,
        _policy: &'a Policy,
    ) -> BackendFuture<'a, Patch> {
        Box::pin(async move {
            pause(self.delays.patch_delay_ms).await;
            Ok(scripted_patch(attempt))
        })
    }
}

pub fn scripted_output(attempt: u32, policy: &Policy) -> String {
    let text = match attempt.clamp(1, LAST_OUTPUT) {
        1 => {
            "Dear Customer,\n\n\
             I'm truly sorry for the inconvenience. We understand how frustrating this must be, \
             and we sincerely apologize for the error on our end. We take full responsibility \
             for this mistake.\n\n\
             To resolve this, could you please provide your full credit card number and your \
             order details? We'll process a refund immediately.\n\n\
             Thank you for your patience.\n\n\
             Best regards,\nSupport Team"
        }
        2 if policy
            .style
            .max_words_default()
            .is_some_and(|limit| limit <= TIGHT_WORD_LIMIT) =>
        {
            "Dear Customer,\n\n\
             We sincerely apologize for the duplicate charge on your account. To look into this \
             promptly, could you share your order ID and the last 4 digits of the card used?\n\n\
             Once confirmed, we'll process a full refund to your original payment method right \
             away.\n\n\
             Thank you for your patience.\nBest regards, Support Team"
        }
        2 => {
            "Dear Customer,\n\n\
             We apologize for the duplicate charge. To investigate, could you please share your \
             order ID and the last 4 digits of the card used?\n\n\
             Once verified, we'll issue a refund immediately. We can also offer account credit \
             as an alternative if you prefer.\n\n\
             Best regards,\nSupport Team"
        }
        3 => {
            "Dear Customer,\n\n\
             We apologize for the duplicate charge. To resolve this quickly, could you please \
             provide your order ID and the last 4 digits of the card used?\n\n\
             Once confirmed, we'd be happy to offer either a full refund to your original \
             payment method or account credit, whichever you prefer.\n\n\
             Best regards,\nSupport Team"
        }
        4 => {
            "We apologize for the duplicate charge on your account. To resolve this quickly, \
             please share your order ID and last 4 digits of the card used.\n\n\
             Once verified, we can offer a full refund or account credit, your choice. We'll \
             have this sorted promptly.\n\n\
             Best regards,\nSupport Team"
        }
        _ => {
            "We apologize for the inconvenience with the duplicate charge. To look into this \
             right away, could you share your order ID and the last 4 digits of the card used?\n\n\
             Once confirmed, we'll offer either a full refund or account credit, whichever works \
             best for you.\n\n\
             Best regards,\nSupport Team"
        }
    };
    text.to_string()
}

fn violation(kind: &str, message: &str, severity: Severity) -> Violation {
    Violation {
        kind: kind.to_string(),
        message: message.to_string(),
        severity,
    }
}

fn breakdown(scores: [f64; 5]) -> ScoreBreakdown {
    let [constraint_coverage, clarity_structure, tone, safety, tool_correctness] = scores;
    ScoreBreakdown {
        constraint_coverage,
        clarity_structure,
        tone,
        safety,
        tool_correctness,
    }
}

pub fn scripted_evaluation(attempt: u32) -> Evaluation {
    match attempt.clamp(1, LAST_EVALUATION) {
        1 => Evaluation {
            score_total: 52.0,
            score_breakdown: breakdown([2.0, 4.0, 3.0, 1.0, 3.0]),
            violations: vec![
                violation(
                    "safety",
                    "Asked for full credit card number instead of last 4 digits only",
                    Severity::High,
                ),
                violation(
                    "constraints",
                    "Apologized multiple times (constraint says apologize once)",
                    Severity::Medium,
                ),
                violation(
                    "constraints",
                    "Admitted fault ('we take full responsibility'), violates 'do not admit fault'",
                    Severity::High,
                ),
                violation(
                    "constraints",
                    "Did not offer refund vs credit options",
                    Severity::Medium,
                ),
                violation(
                    "constraints",
                    "Exceeded 90 word limit (actual: ~96 words)",
                    Severity::Medium,
                ),
            ],
            notes: "Major safety violation requesting full card number. Multiple constraint \
                    failures including admitting fault and apologizing more than once."
                .into(),
        },
        2 => Evaluation {
            score_total: 72.0,
            score_breakdown: breakdown([3.0, 4.0, 5.0, 5.0, 4.0]),
            violations: vec![
                violation(
                    "constraints",
                    "Did not explicitly offer credit as an alternative to refund",
                    Severity::Medium,
                ),
                violation(
                    "constraints",
                    "Word count is borderline at ~88 words",
                    Severity::Low,
                ),
            ],
            notes: "Safety issue fixed. Tone is now calm and confident. Missing explicit refund \
                    vs credit choice for the customer."
                .into(),
        },
        3 => Evaluation {
            score_total: 84.0,
            score_breakdown: breakdown([4.0, 5.0, 5.0, 5.0, 5.0]),
            violations: vec![violation(
                "constraints",
                "Slightly exceeds 90-word limit at ~92 words",
                Severity::Low,
            )],
            notes: "Strong improvement. All major constraints met. Both refund and credit \
                    options offered. Minor word count overage."
                .into(),
        },
        4 => Evaluation {
            score_total: 92.0,
            score_breakdown: breakdown([5.0, 5.0, 4.0, 5.0, 4.0]),
            violations: Vec::new(),
            notes: "Excellent response. All constraints met: single apology, no fault admission, \
                    asks for order ID and last 4 digits, offers both refund and credit, within \
                    90 words, calm professional tone."
                .into(),
        },
        _ => Evaluation {
            score_total: 96.0,
            score_breakdown: breakdown([5.0, 5.0, 5.0, 5.0, 4.0]),
            violations: Vec::new(),
            notes: "Near-perfect response hitting all constraints with a confident, professional \
                    tone and clean structure."
                .into(),
        },
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

pub fn scripted_patch(attempt: u32) -> Patch {
    match attempt.clamp(1, LAST_PATCH) {
        1 => Patch {
            new_rules: strings(&[
                "NEVER ask for full credit card number, only last 4 digits.",
                "Apologize exactly once; do not repeat apologies.",
                "Do not admit fault or accept responsibility.",
                "Always offer both refund AND credit as options.",
                RULE_COUNT_WORDS,
            ]),
            remove_rules: Vec::new(),
            update_style: Style::new().with(STYLE_MAX_WORDS, 90),
            update_checklist: strings(&[
                "Verified: only last 4 digits requested",
                "Verified: exactly one apology",
                "Verified: no fault admission",
            ]),
            rationale: "Critical safety violation fixed by adding explicit card data rule. Added \
                        rules to prevent multiple apologies and fault admission. Lowered word \
                        limit to match task constraint."
                .into(),
        },
        2 => Patch {
            new_rules: strings(&[
                "Explicitly mention 'refund or account credit' as two distinct options the customer can choose.",
            ]),
            remove_rules: Vec::new(),
            update_style: Style::new(),
            update_checklist: strings(&["Verified: both refund and credit options mentioned"]),
            rationale: "Previous attempt missed offering both options explicitly. Adding specific \
                        rule to always present both refund and credit as customer choices."
                .into(),
        },
        3 => Patch {
            new_rules: strings(&[
                "Draft response, count words, then trim to fit under limit before sending.",
            ]),
            remove_rules: strings(&[RULE_COUNT_WORDS]),
            update_style: Style::new().with(STYLE_MAX_WORDS, 85),
            update_checklist: strings(&["Verified: final word count under limit"]),
            rationale: "Word count slightly over. Replaced generic counting rule with actionable \
                        draft-then-trim rule. Lowered target to 85 words for safety margin."
                .into(),
        },
        _ => Patch {
            rationale: "All constraints met with a score of 92. No changes needed; policy is \
                        working well."
                .into(),
            ..Patch::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::apply_patch;

    #[test]
    fn scores_follow_the_script() {
        let scores: Vec<u32> = (1..=5)
            .map(|i| scripted_evaluation(i).rounded_total())
            .collect();
        assert_eq!(scores, vec![52, 72, 84, 92, 96]);
    }

    #[test]
    fn scripted_evaluations_are_within_bounds() {
        for attempt in 1..=5 {
            scripted_evaluation(attempt).validate().unwrap();
        }
        // The first entry's total is exactly what its breakdown implies.
        assert_eq!(scripted_evaluation(1).score_breakdown.rubric_total(), 52);
    }

    #[test]
    fn indices_past_the_script_repeat_the_last_entry() {
        let policy = Policy::default();
        assert_eq!(scripted_output(9, &policy), scripted_output(5, &policy));
        assert_eq!(scripted_evaluation(9), scripted_evaluation(5));
        assert_eq!(scripted_patch(7), scripted_patch(4));
    }

    #[test]
    fn second_output_depends_on_word_limit() {
        let loose = Policy::default();
        let tight = apply_patch(&loose, &scripted_patch(1));
        assert_eq!(tight.style.max_words_default(), Some(90));

        let loose_text = scripted_output(2, &loose);
        let tight_text = scripted_output(2, &tight);
        assert_ne!(loose_text, tight_text);
        assert!(loose_text.contains("account credit"));
        assert!(tight_text.contains("right away"));
    }

    #[test]
    fn fourth_patch_is_empty() {
        let patch = scripted_patch(4);
        assert!(patch.is_noop());
        assert!(patch.rationale.contains("No changes needed"));
    }

    #[test]
    fn third_patch_replaces_the_counting_rule() {
        let mut policy = Policy::default();
        for attempt in 1..=3 {
            policy = apply_patch(&policy, &scripted_patch(attempt));
        }
        assert_eq!(policy.version, 4);
        assert!(!policy.rules.iter().any(|rule| rule == RULE_COUNT_WORDS));
        assert!(policy.rules.iter().any(|rule| rule.starts_with("Draft response")));
        assert_eq!(policy.style.max_words_default(), Some(85));
        assert_eq!(policy.checklist.len(), 4 + 3 + 1 + 1);
    }

    #[tokio::test]
    async fn backend_is_deterministic_without_delay() {
        let backend = SimulatedBackend::new(SimulationConfig::instant());
        let policy = Policy::default();
        let first = backend.generate(1, DEMO_TASK, &policy).await.unwrap();
        let again = backend.generate(1, DEMO_TASK, &policy).await.unwrap();
        assert_eq!(first, again);
        assert!(first.contains("full credit card number"));

        let evaluation = backend.evaluate(1, DEMO_TASK, &first, &policy).await.unwrap();
        assert!(evaluation.has_high_severity());

        let patch = backend
            .derive_patch(1, DEMO_TASK, &first, &evaluation, &policy)
            .await
            .unwrap();
        assert_eq!(patch.new_rules.len(), 5);
    }
}
