//! Label decoding and roster reconciliation.
//!
//! Display labels follow the community convention
//! `【部署A/部署B】個人名（ニックネーム）` (ASCII brackets and parens
//! also occur). Matching free-text names against the roster is an
//! explicit three-stage pipeline: extract, normalize, tiered match.
//! Each stage is independently testable.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::models::{RosterMember, UNKNOWN_DEPARTMENT};

static LEADING_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:【([^】]*)】|\[([^\]]*)\])").expect("valid tag pattern"));
static TRAILING_PAREN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:（[^（）]*）|\([^()]*\))\s*$").expect("valid paren pattern")
});

/// Department tags encoded in a display label.
///
/// A label with no bracket tag, or whose tag holds only empty
/// segments, falls into the single "unknown" sentinel group.
pub fn extract_departments(label: &str) -> Vec<String> {
    let Some(caps) = LEADING_TAG.captures(label) else {
        return vec![UNKNOWN_DEPARTMENT.to_string()];
    };
    let tag = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default();

    let departments: Vec<String> = tag
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();

    if departments.is_empty() {
        vec![UNKNOWN_DEPARTMENT.to_string()]
    } else {
        departments
    }
}

/// The personal-name part of a display label: one leading bracket tag
/// and one trailing parenthesized nickname stripped, line breaks
/// removed, surrounding whitespace trimmed.
pub fn extract_personal_name(label: &str) -> String {
    let without_tag = LEADING_TAG.replace(label, "");
    let without_suffix = TRAILING_PAREN.replace(&without_tag, "");
    without_suffix
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Canonical comparison form of a name: Unicode compatibility
/// normalization, then every space character (ASCII and full-width)
/// and line break removed. Idempotent.
pub fn normalize(name: &str) -> String {
    name.nfkc().filter(|c| !c.is_whitespace()).collect()
}

/// Tiered fuzzy match of free text against the roster.
///
/// Members are visited in the supplied order and the first one
/// passing any tier wins: (a) normalized-name equality, (b) normalized
/// substring containment in either direction, (c) raw containment of
/// the trimmed free text inside the raw label. Callers must supply a
/// stable roster ordering for reproducible results.
pub fn match_roster<'a>(free_text: &str, roster: &'a [RosterMember]) -> Option<&'a RosterMember> {
    let raw = free_text.trim();
    let needle = normalize(free_text);

    for member in roster {
        let name = normalize(&extract_personal_name(&member.raw_label));
        if !needle.is_empty() {
            if name == needle {
                return Some(member);
            }
            if !name.is_empty() && (name.contains(needle.as_str()) || needle.contains(name.as_str()))
            {
                return Some(member);
            }
        }
        if !raw.is_empty() && member.raw_label.contains(raw) {
            return Some(member);
        }
    }
    None
}
