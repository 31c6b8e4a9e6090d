//! Single-pass event aggregation.
//!
//! Aggregation is a sequential, order-dependent fold: events arrive
//! oldest first and duplicate suppression relies on that ordering, so
//! one source's stream must not be processed in parallel. All state
//! lives in one `AggregateState` owned by the fold; dropping the
//! future mid-run discards the partial counters (there is no
//! partial-report contract).

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::ReportError;
use crate::form;
use crate::identity;
use crate::models::{
    ActorKey, ActorStats, EndorsementEntry, Event, GroupStats, RankedPost, RosterMember,
    TimeWindow, UNKNOWN_DEPARTMENT,
};
use crate::source::{EventSource, SourceError};

static URL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s<>]+").expect("valid url pattern"));

/// Which event categories suppress later duplicates within one run.
/// Form reminders are deduplicated by default; post dedup is opt-in.
#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    pub posts: bool,
    pub forms: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            posts: false,
            forms: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Endorsement kind counted into `received`. Other kinds on the
    /// same post are ignored.
    pub endorsement_kind: String,
    /// Restrict post/received counting to this roster member. Grant
    /// attribution still applies to every granter.
    pub actor_filter: Option<u64>,
    pub dedup: DedupConfig,
    /// Number of top posts to keep; zero disables the ranking.
    pub top_posts: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            endorsement_kind: "❤️".to_string(),
            actor_filter: None,
            dedup: DedupConfig::default(),
            top_posts: 5,
        }
    }
}

/// Per-run skip counters, reported alongside the aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub outside_window: u64,
    pub malformed_submissions: u64,
    pub duplicates_skipped: u64,
    pub endorser_fetches_denied: u64,
}

/// Completed aggregation for one run.
#[derive(Debug)]
pub struct AggregateResult {
    pub actors: BTreeMap<ActorKey, ActorStats>,
    pub groups: BTreeMap<String, GroupStats>,
    pub top_posts: Vec<RankedPost>,
    pub form_events: u64,
    pub form_participant_total: u64,
    pub unique_form_participants: usize,
    pub total_amount: u64,
    pub diagnostics: Diagnostics,
}

impl AggregateResult {
    /// An empty result set is "no data for this period", not an error.
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

#[derive(Clone, Copy)]
enum Category {
    Post,
    Form,
}

#[derive(Debug, Default)]
struct AggregateState {
    actors: BTreeMap<ActorKey, ActorStats>,
    groups: BTreeMap<String, GroupStats>,
    post_tokens: HashSet<String>,
    form_tokens: HashSet<String>,
    ranked: Vec<RankedPost>,
    form_events: u64,
    form_participant_total: u64,
    form_participants: BTreeSet<ActorKey>,
    total_amount: u64,
    diagnostics: Diagnostics,
}

impl AggregateState {
    /// Apply one event's counter deltas to the actor and fan the
    /// post/received part out to every department the actor carries.
    fn add(&mut self, actor: &Resolved, posts: u64, received: u64, given: u64) {
        let stats = self
            .actors
            .entry(actor.key.clone())
            .or_insert_with(|| ActorStats {
                display_name: actor.display_name.clone(),
                departments: actor.departments.clone(),
                ..ActorStats::default()
            });
        stats.posts += posts;
        stats.received += received;
        stats.given += given;

        if posts > 0 || received > 0 {
            for department in &actor.departments {
                let group = self.groups.entry(department.clone()).or_default();
                group.posts += posts;
                group.received += received;
            }
        }
    }

    /// Token-based duplicate suppression, scoped to this run and one
    /// category. Events without an extractable token always count.
    fn is_duplicate(&mut self, category: Category, enabled: bool, content: &str) -> bool {
        if !enabled {
            return false;
        }
        let Some(token) = extract_token(content) else {
            return false;
        };
        let seen = match category {
            Category::Post => &mut self.post_tokens,
            Category::Form => &mut self.form_tokens,
        };
        if seen.insert(token) {
            false
        } else {
            self.diagnostics.duplicates_skipped += 1;
            true
        }
    }
}

/// Resolved identity for one event subject.
struct Resolved {
    key: ActorKey,
    display_name: String,
    departments: Vec<String>,
}

fn resolve_actor(label: &str, roster: &[RosterMember]) -> Resolved {
    match identity::match_roster(label, roster) {
        Some(member) => Resolved {
            key: ActorKey::Member(member.id),
            display_name: identity::extract_personal_name(&member.raw_label),
            departments: identity::extract_departments(&member.raw_label),
        },
        None => Resolved {
            key: ActorKey::Unresolved(identity::normalize(label)),
            display_name: label.trim().to_string(),
            departments: vec![UNKNOWN_DEPARTMENT.to_string()],
        },
    }
}

/// Fold the window-bounded event streams of `source_ids` into per-actor
/// and per-group counters.
///
/// A permission failure on a stream fetch aborts the whole run as
/// `SourceUnreadable`; every per-event failure only skips that event.
pub async fn aggregate<S>(
    source: &S,
    source_ids: &[String],
    window: &TimeWindow,
    roster: &[RosterMember],
    opts: &AggregateOptions,
) -> Result<AggregateResult, ReportError>
where
    S: EventSource + ?Sized,
{
    let mut state = AggregateState::default();

    for source_id in source_ids {
        let events = source
            .fetch_events(source_id, window)
            .await
            .map_err(ReportError::from_source)?;
        debug!(source_id = %source_id, count = events.len(), "fetched events");

        for event in events {
            // No-op when the source already bounded the stream.
            if !window.contains(event.timestamp()) {
                state.diagnostics.outside_window += 1;
                continue;
            }

            match event {
                Event::Post {
                    actor_label,
                    timestamp,
                    message_id,
                    endorsements,
                    content,
                } => {
                    handle_post(
                        source,
                        source_id,
                        &mut state,
                        roster,
                        opts,
                        &actor_label,
                        timestamp,
                        message_id,
                        &endorsements,
                        &content,
                    )
                    .await;
                }
                Event::EndorsementGrant { granter_label, .. } => {
                    let granter = resolve_actor(&granter_label, roster);
                    state.add(&granter, 0, 0, 1);
                }
                Event::FormSubmission { content, .. } => {
                    handle_submission(&mut state, roster, opts, &content);
                }
            }
        }
    }

    let mut top_posts = state.ranked;
    // Stable sort keeps arrival order for equal metrics.
    top_posts.sort_by(|a, b| b.metric.cmp(&a.metric));
    top_posts.truncate(opts.top_posts);

    Ok(AggregateResult {
        actors: state.actors,
        groups: state.groups,
        top_posts,
        form_events: state.form_events,
        form_participant_total: state.form_participant_total,
        unique_form_participants: state.form_participants.len(),
        total_amount: state.total_amount,
        diagnostics: state.diagnostics,
    })
}

#[allow(clippy::too_many_arguments)]
async fn handle_post<S>(
    source: &S,
    source_id: &str,
    state: &mut AggregateState,
    roster: &[RosterMember],
    opts: &AggregateOptions,
    actor_label: &str,
    timestamp: DateTime<Utc>,
    message_id: u64,
    endorsements: &[EndorsementEntry],
    content: &str,
) where
    S: EventSource + ?Sized,
{
    if state.is_duplicate(Category::Post, opts.dedup.posts, content) {
        return;
    }

    let author = resolve_actor(actor_label, roster);
    let author_counted = opts
        .actor_filter
        .map_or(true, |id| author.key == ActorKey::Member(id));

    // First entry of the configured kind wins; later duplicates of the
    // same kind on one post are ignored.
    let received = endorsements
        .iter()
        .find(|entry| entry.kind == opts.endorsement_kind)
        .map(|entry| entry.count)
        .unwrap_or(0);

    if author_counted {
        state.add(&author, 1, received, 0);
        if opts.top_posts > 0 && received > 0 {
            state.ranked.push(RankedPost {
                display_name: author.display_name.clone(),
                metric: received,
                timestamp,
                excerpt: excerpt(content),
            });
        }
    }

    // One granter-enumeration call per endorsed post. Denied access is
    // skipped, not fatal; each granter is attributed independently.
    if !endorsements.is_empty() {
        match source.fetch_endorsers(source_id, message_id).await {
            Ok(granters) => {
                for label in granters {
                    let granter = resolve_actor(&label, roster);
                    state.add(&granter, 0, 0, 1);
                }
            }
            Err(SourceError::Forbidden { .. }) => {
                state.diagnostics.endorser_fetches_denied += 1;
                warn!(source_id, message_id, "endorser enumeration forbidden, skipping");
            }
            Err(err) => {
                warn!(source_id, message_id, %err, "endorser enumeration failed, skipping");
            }
        }
    }
}

fn handle_submission(
    state: &mut AggregateState,
    roster: &[RosterMember],
    opts: &AggregateOptions,
    content: &str,
) {
    if state.is_duplicate(Category::Form, opts.dedup.forms, content) {
        return;
    }

    let Some(submission) = form::parse_submission(content) else {
        state.diagnostics.malformed_submissions += 1;
        debug!("skipping malformed form submission");
        return;
    };
    if submission.participant_count as usize != submission.participants.len() {
        debug!(
            representative = %submission.representative,
            declared = submission.participant_count,
            listed = submission.participants.len(),
            "participant count mismatch in submission"
        );
    }
    debug!(
        representative = %submission.representative,
        department = %submission.department,
        date = %submission.date,
        participants = submission.participants.len(),
        amount = submission.total_amount,
        "counted form submission"
    );

    state.form_events += 1;
    state.form_participant_total += submission.participants.len() as u64;
    state.total_amount += submission.total_amount;

    for label in &submission.participants {
        let participant = resolve_actor(label, roster);
        if let Some(id) = opts.actor_filter {
            if participant.key != ActorKey::Member(id) {
                continue;
            }
        }
        state.form_participants.insert(participant.key.clone());
        state.add(&participant, 1, 0, 0);
    }
}

fn extract_token(content: &str) -> Option<String> {
    URL_TOKEN.find(content).map(|m| {
        m.as_str()
            .trim_end_matches(['.', ',', ')', '>', '"', '\''])
            .trim_end_matches('/')
            .to_string()
    })
}

fn excerpt(content: &str) -> String {
    const MAX_CHARS: usize = 50;
    let flat: String = content
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    let mut out: String = flat.chars().take(MAX_CHARS).collect();
    if flat.chars().count() > MAX_CHARS {
        out.push('…');
    }
    out
}
