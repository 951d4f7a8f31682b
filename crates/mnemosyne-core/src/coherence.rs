//! Relationship coherence table (§4.1 step 5): the checked relationship
//! types each carry a small set of allowed description phrases; a mismatch
//! is logged and the edge is created anyway. `RELATED_TO` accepts any
//! description. This never blocks persistence — see spec.md §4.1: "logged
//! but do not block creation".

use mnemosyne_common::entities::{COHERENCE_CHECKED_RELATIONSHIPS, RELATED_TO};

/// Allowed description phrases per checked relationship type. Each entry
/// is matched case-insensitively as a substring; a description matching
/// none of its type's phrases is incoherent.
fn allowed_phrases(relationship_type: &str) -> Option<&'static [&'static str]> {
    match relationship_type {
        "INFLUENCES" => Some(&["influences", "shapes", "affects"]),
        "CAUSES" => Some(&["causes", "leads to", "results in"]),
        "IS_SIMILAR_TO" => Some(&["similar to", "resembles", "parallels"]),
        "INSPIRES" => Some(&["inspires", "motivates"]),
        "CONTRIBUTES_TO" => Some(&["contributes to", "adds to", "supports"]),
        "IS_A_TYPE_OF" => Some(&["is a type of", "is a kind of", "is a form of"]),
        "IS_PART_OF" => Some(&["is part of", "belongs to", "component of"]),
        "PRECEDES" => Some(&["precedes", "comes before", "before"]),
        "FOLLOWS" => Some(&["follows", "comes after", "after"]),
        "ENABLES" => Some(&["enables", "makes possible", "allows"]),
        "PREVENTS" => Some(&["prevents", "blocks", "inhibits"]),
        "EXEMPLIFIES_TRAIT" => Some(&["exemplifies", "demonstrates", "embodies"]),
        "SUPPORTS_VALUE" => Some(&["supports", "reinforces", "upholds"]),
        "IS_MILESTONE_FOR" => Some(&["milestone", "marks progress"]),
        "IS_METAPHOR_FOR" => Some(&["metaphor for", "symbolizes"]),
        "REPRESENTS_SYMBOLICALLY" => Some(&["represents", "symbolizes", "stands for"]),
        _ => None,
    }
}

/// Check `(relationship_type, description)` against the coherence table.
/// Returns whether the pair is coherent; logs a warning when it isn't.
/// `RELATED_TO` and any relationship type outside the checked list are
/// always coherent — the table only restricts the sixteen named types.
pub fn check(relationship_type: &str, description: &str) -> bool {
    if relationship_type == RELATED_TO {
        return true;
    }
    if !COHERENCE_CHECKED_RELATIONSHIPS.contains(&relationship_type) {
        return true;
    }
    let Some(phrases) = allowed_phrases(relationship_type) else {
        return true;
    };
    let lower = description.to_lowercase();
    let coherent = phrases.iter().any(|p| lower.contains(p));
    if !coherent {
        tracing::warn!(
            relationship_type,
            description,
            "relationship description did not match coherence table; creating edge anyway"
        );
    }
    coherent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn related_to_accepts_any_description() {
        assert!(check(RELATED_TO, "completely arbitrary text"));
    }

    #[test]
    fn unchecked_relationship_type_is_always_coherent() {
        assert!(check("STRATEGIC_RELATIONSHIP", "anything goes here"));
    }

    #[test]
    fn checked_relationship_with_matching_phrase_is_coherent() {
        assert!(check("CAUSES", "This event causes the downstream effect."));
    }

    #[test]
    fn checked_relationship_with_no_matching_phrase_is_flagged_but_still_true_is_false() {
        assert!(!check("CAUSES", "These two things are just related somehow."));
    }
}
