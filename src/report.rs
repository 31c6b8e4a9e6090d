//! Report table assembly and rendering.
//!
//! Heterogeneous aggregate sections (actor ranking, department
//! roll-up, top posts, summary pairs) are laid out side by side with a
//! zip-longest composition, then rendered as a UTF-8-with-BOM CSV
//! artifact. Ratios are formatted with `{:.2}`, which rounds half to
//! even; tests pin the exact rendered values.

use std::fmt::Write;

use crate::aggregate::AggregateResult;
use crate::error::ReportError;
use crate::identity;
use crate::models::{ActorKey, ActorStats, RosterMember};
use crate::period;

/// One named concern rendered as a block of columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSection {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportSection {
    fn width(&self) -> usize {
        self.headers.len()
    }
}

/// Row-aligned table ready for CSV rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Lay sections out side by side: one blank separator column between
/// adjacent sections, shorter sections padded with empty cells up to
/// the deepest one.
pub fn compose_sections(sections: &[ReportSection]) -> Table {
    let mut header = Vec::new();
    for (index, section) in sections.iter().enumerate() {
        if index > 0 {
            header.push(String::new());
        }
        header.extend(section.headers.iter().cloned());
    }

    let depth = sections.iter().map(|s| s.rows.len()).max().unwrap_or(0);
    let mut rows = Vec::with_capacity(depth);
    for row_index in 0..depth {
        let mut row = Vec::with_capacity(header.len());
        for (index, section) in sections.iter().enumerate() {
            if index > 0 {
                row.push(String::new());
            }
            match section.rows.get(row_index) {
                Some(cells) => row.extend(cells.iter().cloned()),
                None => row.extend(std::iter::repeat(String::new()).take(section.width())),
            }
        }
        rows.push(row);
    }

    Table { header, rows }
}

/// Totals over the active actor rows. The table's totals row and the
/// accompanying digest both read from here so they cannot diverge.
pub fn totals(result: &AggregateResult) -> (u64, u64, u64) {
    let mut posts = 0;
    let mut received = 0;
    let mut given = 0;
    for stats in result.actors.values() {
        posts += stats.posts;
        received += stats.received;
        given += stats.given;
    }
    (posts, received, given)
}

/// Actor ranking plus synthetic zero rows for inactive roster members
/// and a final totals row.
pub fn actor_section(result: &AggregateResult, roster: &[RosterMember]) -> ReportSection {
    let mut ranked: Vec<&ActorStats> = result.actors.values().collect();
    ranked.sort_by(|a, b| {
        b.received
            .cmp(&a.received)
            .then_with(|| b.posts.cmp(&a.posts))
            .then_with(|| a.display_name.cmp(&b.display_name))
    });

    let mut rows: Vec<Vec<String>> = ranked.iter().map(|stats| actor_row(stats)).collect();

    // Known-but-inactive members stay visible, in roster order.
    for member in roster {
        if !result.actors.contains_key(&ActorKey::Member(member.id)) {
            rows.push(vec![
                identity::extract_personal_name(&member.raw_label),
                identity::extract_departments(&member.raw_label).join("/"),
                "0".to_string(),
                "0".to_string(),
                "0".to_string(),
                format_ratio(0.0),
            ]);
        }
    }

    let (posts, received, given) = totals(result);
    let average = if posts == 0 {
        0.0
    } else {
        received as f64 / posts as f64
    };
    rows.push(vec![
        "Total".to_string(),
        String::new(),
        posts.to_string(),
        received.to_string(),
        given.to_string(),
        format_ratio(average),
    ]);

    ReportSection {
        headers: ["名前", "部署", "投稿数", "いいね数", "いいね付与数", "平均いいね数"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
        rows,
    }
}

fn actor_row(stats: &ActorStats) -> Vec<String> {
    vec![
        stats.display_name.clone(),
        stats.departments.join("/"),
        stats.posts.to_string(),
        stats.received.to_string(),
        stats.given.to_string(),
        format_ratio(stats.average_received()),
    ]
}

/// Department roll-up, busiest first.
pub fn group_section(result: &AggregateResult) -> ReportSection {
    let mut groups: Vec<(&String, _)> = result.groups.iter().collect();
    groups.sort_by(|(a_name, a), (b_name, b)| {
        b.posts
            .cmp(&a.posts)
            .then_with(|| b.received.cmp(&a.received))
            .then_with(|| a_name.cmp(b_name))
    });

    ReportSection {
        headers: ["部署", "投稿数", "いいね数"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
        rows: groups
            .into_iter()
            .map(|(name, stats)| {
                vec![
                    name.clone(),
                    stats.posts.to_string(),
                    stats.received.to_string(),
                ]
            })
            .collect(),
    }
}

/// Highest-endorsed posts of the run.
pub fn top_section(result: &AggregateResult) -> ReportSection {
    ReportSection {
        headers: ["名前", "いいね数", "日時", "抜粋"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
        rows: result
            .top_posts
            .iter()
            .map(|post| {
                vec![
                    post.display_name.clone(),
                    post.metric.to_string(),
                    post.timestamp
                        .with_timezone(&period::reference_zone())
                        .format("%Y-%m-%d %H:%M")
                        .to_string(),
                    post.excerpt.clone(),
                ]
            })
            .collect(),
    }
}

/// Key/value summary pairs, stacked vertically.
pub fn summary_section(result: &AggregateResult, roster_len: usize) -> ReportSection {
    let rate = usage_rate(result.unique_form_participants, roster_len);
    let pairs = vec![
        ("メンバー数", roster_len.to_string()),
        ("利用者数", result.unique_form_participants.to_string()),
        ("利用率", format_percent(rate)),
        ("イベント数", result.form_events.to_string()),
        ("延べ参加人数", result.form_participant_total.to_string()),
        ("合計金額", format!("¥{}", result.total_amount)),
    ];

    ReportSection {
        headers: ["項目", "値"].iter().map(|h| h.to_string()).collect(),
        rows: pairs
            .into_iter()
            .map(|(item, value)| vec![item.to_string(), value])
            .collect(),
    }
}

/// The full multi-section report table.
pub fn build_table(result: &AggregateResult, roster: &[RosterMember]) -> Table {
    compose_sections(&[
        actor_section(result, roster),
        group_section(result),
        top_section(result),
        summary_section(result, roster.len()),
    ])
}

/// Render the table as a comma-separated artifact: UTF-8 with a
/// byte-order mark, header row first.
pub fn render_csv(table: &Table) -> Result<Vec<u8>, ReportError> {
    let mut body = Vec::new();
    {
        let mut writer = csv::Writer::from_writer(&mut body);
        writer.write_record(&table.header)?;
        for row in &table.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
    }

    let mut artifact = Vec::with_capacity(body.len() + 3);
    artifact.extend_from_slice(&[0xEF, 0xBB, 0xBF]);
    artifact.extend_from_slice(&body);
    Ok(artifact)
}

/// Short human digest accompanying the artifact, fed by the same
/// totals the table renders.
pub fn summary_digest(result: &AggregateResult, roster_len: usize, period_label: &str) -> String {
    let (posts, received, given) = totals(result);
    let rate = usage_rate(result.unique_form_participants, roster_len);

    let mut out = String::new();
    let _ = writeln!(out, "**{period_label}** の集計結果です。");
    let _ = writeln!(out, "📝 投稿数: {posts}");
    let _ = writeln!(out, "❤️ いいね数: {received}（付与 {given}）");
    let _ = writeln!(out, "📊 イベント数: {}回", result.form_events);
    let _ = writeln!(
        out,
        "👥 利用者: {}人 / メンバー {}人",
        result.unique_form_participants, roster_len
    );
    let _ = writeln!(out, "📈 利用率: {}", format_percent(rate));
    let _ = write!(out, "💰 総金額: ¥{}", result.total_amount);
    out
}

/// Digest for a single-actor query.
pub fn actor_digest(stats: &ActorStats, period_label: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "**{period_label}** の **{}** さん", stats.display_name);
    let _ = writeln!(out, "❤️ いいね数: **{}**", stats.received);
    let _ = write!(out, "📝 投稿数: **{}**", stats.posts);
    out
}

fn usage_rate(unique: usize, roster_len: usize) -> f64 {
    if roster_len == 0 {
        0.0
    } else {
        unique as f64 * 100.0 / roster_len as f64
    }
}

fn format_ratio(value: f64) -> String {
    format!("{value:.2}")
}

fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Diagnostics;
    use crate::models::GroupStats;
    use std::collections::BTreeMap;

    fn section(headers: &[&str], rows: Vec<Vec<&str>>) -> ReportSection {
        ReportSection {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    fn stats(name: &str, departments: &[&str], posts: u64, received: u64, given: u64) -> ActorStats {
        ActorStats {
            display_name: name.to_string(),
            departments: departments.iter().map(|d| d.to_string()).collect(),
            posts,
            received,
            given,
        }
    }

    fn result_with(actors: Vec<(ActorKey, ActorStats)>) -> AggregateResult {
        AggregateResult {
            actors: actors.into_iter().collect(),
            groups: BTreeMap::new(),
            top_posts: Vec::new(),
            form_events: 0,
            form_participant_total: 0,
            unique_form_participants: 0,
            total_amount: 0,
            diagnostics: Diagnostics::default(),
        }
    }

    #[test]
    fn sections_are_padded_to_the_deepest_one() {
        let left = section(&["a", "b"], vec![vec!["1", "2"], vec!["3", "4"]]);
        let right = section(&["c"], vec![vec!["x"]]);
        let table = compose_sections(&[left, right]);

        assert_eq!(table.header, vec!["a", "b", "", "c"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0], vec!["1", "2", "", "x"]);
        assert_eq!(table.rows[1], vec!["3", "4", "", ""]);
    }

    #[test]
    fn every_composed_row_matches_the_header_width() {
        let table = compose_sections(&[
            section(&["a"], vec![vec!["1"]]),
            section(&["b", "c"], vec![vec!["2", "3"], vec!["4", "5"], vec!["6", "7"]]),
        ]);
        for row in &table.rows {
            assert_eq!(row.len(), table.header.len());
        }
    }

    #[test]
    fn actor_rows_sort_by_received_then_posts_then_name() {
        let result = result_with(vec![
            (ActorKey::Member(1), stats("いとう", &["営業"], 2, 5, 0)),
            (ActorKey::Member(2), stats("あべ", &["開発"], 1, 5, 0)),
            (ActorKey::Member(3), stats("うえだ", &["開発"], 2, 5, 0)),
            (ActorKey::Member(4), stats("えんどう", &["広報"], 9, 9, 0)),
        ]);
        let section = actor_section(&result, &[]);

        let names: Vec<&str> = section.rows.iter().map(|row| row[0].as_str()).collect();
        // received desc, then posts desc, then name asc, then totals row
        assert_eq!(names, vec!["えんどう", "いとう", "うえだ", "あべ", "Total"]);
    }

    #[test]
    fn inactive_roster_members_get_zero_rows_before_the_totals_row() {
        let result = result_with(vec![(
            ActorKey::Member(1),
            stats("田中 太郎", &["営業"], 2, 4, 0),
        )]);
        let roster = vec![
            RosterMember {
                id: 1,
                raw_label: "【営業】田中 太郎".to_string(),
            },
            RosterMember {
                id: 2,
                raw_label: "【開発】佐藤 花子（はな）".to_string(),
            },
        ];
        let section = actor_section(&result, &roster);

        assert_eq!(section.rows.len(), 3);
        assert_eq!(
            section.rows[1],
            vec!["佐藤 花子", "開発", "0", "0", "0", "0.00"]
        );
        assert_eq!(section.rows[2][0], "Total");
    }

    #[test]
    fn totals_row_sums_active_rows_and_recomputes_the_average() {
        let result = result_with(vec![
            (ActorKey::Member(1), stats("田中", &["営業"], 1, 1, 2)),
            (ActorKey::Member(2), stats("佐藤", &["開発"], 2, 1, 0)),
        ]);
        let section = actor_section(&result, &[]);
        let total = section.rows.last().unwrap();

        // 2/3, not the average of the per-actor averages (0.75)
        assert_eq!(total, &vec!["Total", "", "3", "2", "2", "0.67"]);
    }

    #[test]
    fn ratio_formatting_is_pinned() {
        assert_eq!(format_ratio(1.0 / 3.0), "0.33");
        assert_eq!(format_ratio(3.0), "3.00");
        assert_eq!(format_ratio(2.0 / 3.0), "0.67");
        assert_eq!(format_percent(200.0 / 3.0), "66.7%");
    }

    #[test]
    fn groups_rank_busiest_first() {
        let mut result = result_with(Vec::new());
        result.groups.insert("営業".to_string(), GroupStats { posts: 1, received: 9 });
        result.groups.insert("開発".to_string(), GroupStats { posts: 4, received: 2 });
        let section = group_section(&result);

        assert_eq!(section.rows[0][0], "開発");
        assert_eq!(section.rows[1][0], "営業");
    }

    #[test]
    fn artifact_starts_with_a_bom_and_the_header_row() {
        let result = result_with(vec![(
            ActorKey::Member(1),
            stats("田中", &["営業"], 1, 3, 0),
        )]);
        let table = build_table(&result, &[]);
        let artifact = render_csv(&table).unwrap();

        assert_eq!(&artifact[..3], &[0xEF, 0xBB, 0xBF]);
        let text = String::from_utf8(artifact[3..].to_vec()).unwrap();
        let first_line = text.lines().next().unwrap();
        assert!(first_line.starts_with("名前,部署,投稿数"));
    }

    #[test]
    fn digest_reports_the_same_totals_as_the_table() {
        let result = result_with(vec![
            (ActorKey::Member(1), stats("田中", &["営業"], 1, 3, 1)),
            (ActorKey::Member(2), stats("佐藤", &["開発"], 2, 2, 0)),
        ]);
        let table = build_table(&result, &[]);
        let totals_row = table
            .rows
            .iter()
            .find(|row| row[0] == "Total")
            .unwrap()
            .clone();
        let digest = summary_digest(&result, 10, "2024年6月");

        assert!(digest.contains(&format!("投稿数: {}", totals_row[2])));
        assert!(digest.contains(&format!("いいね数: {}", totals_row[3])));
        assert!(digest.contains("2024年6月"));
    }

    #[test]
    fn actor_digest_carries_both_counters() {
        let digest = actor_digest(&stats("田中 太郎", &["営業"], 4, 9, 0), "2024年6月");
        assert!(digest.contains("**田中 太郎** さん"));
        assert!(digest.contains("**9**"));
        assert!(digest.contains("**4**"));
    }
}
