use super::types::{Patch, Policy};
use std::collections::HashSet;

/// Merge `patch` into `current`, producing the next policy version.
///
/// Removal is by exact string match. Additions skip anything already present
/// (after removal for rules), so re-applying a patch adds nothing new. The
/// version always advances, even for an empty patch.
pub fn apply_patch(current: &Policy, patch: &Patch) -> Policy {
    let removed: HashSet<&str> = patch.remove_rules.iter().map(String::as_str).collect();
    let mut rules: Vec<String> = current
        .rules
        .iter()
        .filter(|rule| !removed.contains(rule.as_str()))
        .cloned()
        .collect();
    append_unique(&mut rules, &patch.new_rules);

    let mut checklist = current.checklist.clone();
    append_unique(&mut checklist, &patch.update_checklist);

    Policy {
        version: current.version + 1,
        rules,
        style: current.style.overlay(&patch.update_style),
        checklist,
    }
}

// Duplicates inside `additions` are suppressed too, so the result never
// holds the same string twice.
fn append_unique(target: &mut Vec<String>, additions: &[String]) {
    let mut seen: HashSet<String> = target.iter().cloned().collect();
    for item in additions {
        if seen.insert(item.clone()) {
            target.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Style, StyleValue};

    fn patch(new_rules: &[&str], remove_rules: &[&str], checklist: &[&str]) -> Patch {
        Patch {
            new_rules: new_rules.iter().map(ToString::to_string).collect(),
            remove_rules: remove_rules.iter().map(ToString::to_string).collect(),
            update_style: Style::new(),
            update_checklist: checklist.iter().map(ToString::to_string).collect(),
            rationale: "test".into(),
        }
    }

    fn has_duplicates(items: &[String]) -> bool {
        let unique: HashSet<&String> = items.iter().collect();
        unique.len() != items.len()
    }

    #[test]
    fn empty_patch_still_advances_version() {
        let base = Policy::default();
        let next = apply_patch(&base, &Patch::default());

        assert_eq!(next.version, base.version + 1);
        assert_eq!(next.rules, base.rules);
        assert_eq!(next.style, base.style);
        assert_eq!(next.checklist, base.checklist);
    }

    #[test]
    fn appends_new_rules_after_existing_in_order() {
        let base = Policy::default();
        let next = apply_patch(&base, &patch(&["Rule A", "Rule B"], &[], &[]));

        assert_eq!(next.rules.len(), base.rules.len() + 2);
        assert_eq!(next.rules[..base.rules.len()], base.rules[..]);
        assert_eq!(next.rules[base.rules.len()], "Rule A");
        assert_eq!(next.rules[base.rules.len() + 1], "Rule B");
    }

    #[test]
    fn removes_rules_by_exact_match_only() {
        let base = Policy::default();
        let exact = base.rules[0].clone();
        let next = apply_patch(&base, &patch(&[], &[&exact, "before answering"], &[]));

        assert!(!next.rules.contains(&exact));
        assert_eq!(next.rules, vec![base.rules[1].clone()]);
    }

    #[test]
    fn remove_then_readd_in_same_patch_keeps_rule_at_end() {
        let base = Policy::default();
        let first = base.rules[0].clone();
        let next = apply_patch(&base, &patch(&[&first], &[&first], &[]));

        assert_eq!(next.rules, vec![base.rules[1].clone(), first]);
    }

    #[test]
    fn reapplying_patch_is_idempotent_except_version() {
        let base = Policy::default();
        let p = patch(&["Rule A"], &[], &["Check A"]);
        let once = apply_patch(&base, &p);
        let twice = apply_patch(&once, &p);

        assert_eq!(twice.rules, once.rules);
        assert_eq!(twice.checklist, once.checklist);
        assert_eq!(twice.style, once.style);
        assert_eq!(twice.version, once.version + 1);
    }

    #[test]
    fn duplicate_additions_within_one_patch_are_suppressed() {
        let base = Policy::default();
        let next = apply_patch(
            &base,
            &patch(&["Rule A", "Rule A"], &[], &["Check A", "Check A"]),
        );

        assert!(!has_duplicates(&next.rules));
        assert!(!has_duplicates(&next.checklist));
        assert_eq!(next.rules.iter().filter(|r| *r == "Rule A").count(), 1);
    }

    #[test]
    fn checklist_skips_items_already_present() {
        let base = Policy::default();
        let existing = base.checklist[0].clone();
        let next = apply_patch(&base, &patch(&[], &[], &[&existing, "New item"]));

        assert_eq!(next.checklist.len(), base.checklist.len() + 1);
        assert_eq!(next.checklist.last().map(String::as_str), Some("New item"));
    }

    #[test]
    fn style_update_overlays_key_by_key() {
        let base = Policy::default();
        let mut p = Patch::default();
        p.update_style = Style::new().with("max_words_default", 90);
        let next = apply_patch(&base, &p);

        assert_eq!(next.style.max_words_default(), Some(90));
        assert_eq!(next.style.tone(), Some("calm, confident"));
    }

    #[test]
    fn does_not_mutate_current_policy() {
        let base = Policy::default();
        let snapshot = base.clone();
        let _ = apply_patch(&base, &patch(&["Rule A"], &[&snapshot.rules[0]], &["Check"]));
        assert_eq!(base, snapshot);
    }

    #[test]
    fn no_duplicates_after_a_sequence_of_patches() {
        let mut policy = Policy::default();
        let patches = [
            patch(&["A", "B", "C"], &[], &["x", "y"]),
            patch(&["B", "D"], &["A"], &["y", "z"]),
            patch(&["A", "D", "E"], &["C"], &["x", "w"]),
            patch(&["E", "E"], &["missing"], &["w"]),
        ];
        for (i, p) in patches.iter().enumerate() {
            policy = apply_patch(&policy, p);
            assert_eq!(policy.version as usize, i + 2);
            assert!(!has_duplicates(&policy.rules), "rules: {:?}", policy.rules);
            assert!(!has_duplicates(&policy.checklist));
        }
        assert!(policy.rules.contains(&"A".to_string()));
        assert!(!policy.rules.contains(&"C".to_string()));
        assert_eq!(
            policy.style.get("tone"),
            Some(&StyleValue::Text("calm, confident".into()))
        );
    }
}
