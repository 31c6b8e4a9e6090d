//! Structured form-submission parsing.
//!
//! Lunch-programme submissions arrive as plain text built from
//! `【見出し】` blocks, one value per block, participants one per
//! line. Submissions missing their required fields are not errors;
//! callers skip them and count the skip in run diagnostics.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static FIELD_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"【([^】]+)】").expect("valid field-header pattern"));
static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid number pattern"));

const MARKER_FIELD: &str = "【代表者名】";

/// One parsed lunch-programme submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub representative: String,
    pub department: String,
    pub date: String,
    pub participant_count: u32,
    pub participants: Vec<String>,
    pub total_amount: u64,
}

/// Parse a submission out of raw message text. Returns `None` when the
/// text is not a form post or the representative/participant fields
/// are missing.
pub fn parse_submission(content: &str) -> Option<Submission> {
    if !content.contains(MARKER_FIELD) {
        return None;
    }

    let fields = split_fields(content);
    let field = |name: &str| fields.get(name).cloned().unwrap_or_default();

    let representative = field("代表者名");
    let participants: Vec<String> = field("参加メンバー")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if representative.is_empty() || participants.is_empty() {
        return None;
    }

    Some(Submission {
        representative,
        department: field("代表者の所属部署"),
        date: field("ランチ実施日"),
        participant_count: first_number(&field("参加人数")) as u32,
        participants,
        total_amount: first_number(&field("合計金額（税込）")),
    })
}

/// Cut the text into `【見出し】` blocks: each field's body runs from
/// the end of its header to the start of the next one.
fn split_fields(content: &str) -> HashMap<String, String> {
    let headers: Vec<(String, usize, usize)> = FIELD_HEADER
        .captures_iter(content)
        .map(|caps| {
            let whole = caps.get(0).expect("group 0 is the whole match");
            (caps[1].to_string(), whole.start(), whole.end())
        })
        .collect();

    let mut fields = HashMap::new();
    for (index, (name, _, body_start)) in headers.iter().enumerate() {
        let body_end = headers
            .get(index + 1)
            .map(|(_, next_start, _)| *next_start)
            .unwrap_or(content.len());
        fields.insert(
            name.clone(),
            content[*body_start..body_end].trim().to_string(),
        );
    }
    fields
}

fn first_number(text: &str) -> u64 {
    FIRST_NUMBER
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_FORM: &str = "【代表者名】\n與儀 あんり\n\
【代表者の所属部署】\n社長室\n\
【ランチ実施日】\n2024-06-14\n\
【参加人数】\n3\n\
【参加メンバー】\n與儀 あんり\n田中 太郎\n佐藤 花子\n\
【合計金額（税込）】\n4500\n\
【ランチ会議の感想をひとこと】\n楽しかったです\n";

    #[test]
    fn full_form_parses_every_field() {
        let submission = parse_submission(FULL_FORM).unwrap();
        assert_eq!(submission.representative, "與儀 あんり");
        assert_eq!(submission.department, "社長室");
        assert_eq!(submission.date, "2024-06-14");
        assert_eq!(submission.participant_count, 3);
        assert_eq!(
            submission.participants,
            vec!["與儀 あんり", "田中 太郎", "佐藤 花子"]
        );
        assert_eq!(submission.total_amount, 4500);
    }

    #[test]
    fn trailing_extra_fields_are_ignored() {
        let submission = parse_submission(FULL_FORM).unwrap();
        // the 感想 block carries no aggregation data and is dropped
        assert_eq!(submission.participants.len(), 3);
    }

    #[test]
    fn non_form_text_is_ignored() {
        assert_eq!(parse_submission("今日のランチは美味しかった"), None);
    }

    #[test]
    fn missing_participants_invalidate_the_submission() {
        let text = "【代表者名】\n與儀 あんり\n【参加メンバー】\n\n";
        assert_eq!(parse_submission(text), None);
    }

    #[test]
    fn missing_representative_invalidates_the_submission() {
        let text = "【代表者名】\n\n【参加メンバー】\n田中 太郎\n";
        assert_eq!(parse_submission(text), None);
    }

    #[test]
    fn blank_participant_lines_are_dropped() {
        let text = "【代表者名】\n田中 太郎\n【参加メンバー】\n田中 太郎\n\n  佐藤 花子  \n";
        let submission = parse_submission(text).unwrap();
        assert_eq!(submission.participants, vec!["田中 太郎", "佐藤 花子"]);
    }

    #[test]
    fn missing_numeric_fields_default_to_zero() {
        let text = "【代表者名】\n田中 太郎\n【参加メンバー】\n田中 太郎\n";
        let submission = parse_submission(text).unwrap();
        assert_eq!(submission.participant_count, 0);
        assert_eq!(submission.total_amount, 0);
    }
}
