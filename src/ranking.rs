use crate::calc::{ordinal_rank, CalcError};
use crate::store;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

pub const UNRANKED_LABEL: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingScope {
    pub class_id: String,
    pub academic_year_id: String,
    pub academic_term_id: String,
    pub school_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingSummary {
    pub ranked_reports: usize,
    pub unranked_reports: usize,
    pub class_positions: usize,
    pub batch_positions: usize,
    pub course_positions: usize,
    pub course_ranking_applied: bool,
}

pub fn is_senior_school(school_type: &str) -> bool {
    let t = school_type.trim();
    t.eq_ignore_ascii_case("HIGH") || t.eq_ignore_ascii_case("SHS")
}

/// Tie-aware positions for `scores`, returned in input order.
///
/// Equal scores share a position and the next distinct score resumes at its
/// 1-based index (90, 80, 80, 60 => 1, 2, 2, 4). Scores `<= 0` are not ranked.
pub fn assign_positions(scores: &[f64]) -> Vec<Option<i64>> {
    let mut order: Vec<usize> = (0..scores.len())
        .filter(|&i| scores[i] > 0.0)
        .collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

    let mut out = vec![None; scores.len()];
    let mut prev: Option<(f64, i64)> = None;
    for (idx, &i) in order.iter().enumerate() {
        let position = match prev {
            Some((score, pos)) if score == scores[i] => pos,
            _ => (idx + 1) as i64,
        };
        out[i] = Some(position);
        prev = Some((scores[i], position));
    }
    out
}

/// Runs [`assign_positions`] independently inside each group. Items whose key
/// is `None` do not take part and stay unranked.
pub fn rank_by_group<T, K, FK, FS>(items: &[T], group_key: FK, score: FS) -> Vec<Option<i64>>
where
    K: Eq + Hash,
    FK: Fn(&T) -> Option<K>,
    FS: Fn(&T) -> f64,
{
    let mut groups: HashMap<K, Vec<usize>> = HashMap::new();
    for (i, item) in items.iter().enumerate() {
        if let Some(k) = group_key(item) {
            groups.entry(k).or_default().push(i);
        }
    }

    let mut out = vec![None; items.len()];
    for members in groups.values() {
        let scores: Vec<f64> = members.iter().map(|&i| score(&items[i])).collect();
        for (&i, pos) in members.iter().zip(assign_positions(&scores)) {
            out[i] = pos;
        }
    }
    out
}

pub fn rank_remark(position: Option<i64>, ranked_count: usize) -> &'static str {
    let Some(p) = position else {
        return "No scores recorded.";
    };
    let n = ranked_count.max(1) as i64;
    let top_quarter = (n + 3) / 4;
    let top_half = (n + 1) / 2;
    if p == 1 {
        "Excellent work!"
    } else if p <= top_quarter {
        "Very good performance."
    } else if p <= top_half {
        "Good effort, keep it up."
    } else {
        "Keep trying!"
    }
}

fn rank_overall(
    conn: &rusqlite::Connection,
    scope: &RankingScope,
    class_students: &[String],
    summary: &mut RankingSummary,
) -> Result<(), CalcError> {
    let reports = store::load_period_reports(
        conn,
        class_students,
        &scope.academic_year_id,
        &scope.academic_term_id,
    )?;
    let positions = rank_by_group(&reports, |_| Some(()), |r| r.average_score);
    let ranked_count = positions.iter().filter(|p| p.is_some()).count();

    for (report, position) in reports.iter().zip(&positions) {
        let rank = position
            .map(ordinal_rank)
            .unwrap_or_else(|| UNRANKED_LABEL.to_string());
        store::write_report_rank(conn, &report.id, &rank, rank_remark(*position, ranked_count))?;
    }
    summary.ranked_reports = ranked_count;
    summary.unranked_reports = reports.len() - ranked_count;
    Ok(())
}

fn rank_subjects_in_class(
    conn: &rusqlite::Connection,
    details: &[store::DetailRow],
    summary: &mut RankingSummary,
) -> Result<(), CalcError> {
    let positions = rank_by_group(details, |d| Some(d.subject_id.clone()), |d| d.total_score);
    for (detail, position) in details.iter().zip(&positions) {
        store::write_class_position(conn, &detail.id, position.unwrap_or(0))?;
    }
    summary.class_positions = positions.iter().filter(|p| p.is_some()).count();
    Ok(())
}

fn rank_subjects_in_batches(
    conn: &rusqlite::Connection,
    scope: &RankingScope,
    class_students: &[String],
    class_details: &[store::DetailRow],
    summary: &mut RankingSummary,
) -> Result<(), CalcError> {
    let class_batches = store::load_primary_batches(conn, class_students)?;
    let batch_ids: Vec<String> = class_batches
        .values()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    // Students outside any batch keep no batch position.
    for detail in class_details {
        if !class_batches.contains_key(&detail.student_id) {
            store::write_batch_position(conn, &detail.id, None)?;
        }
    }
    if batch_ids.is_empty() {
        return Ok(());
    }

    let members = store::load_active_batch_members(conn, &batch_ids)?;
    let member_batches = store::load_primary_batches(conn, &members)?;
    let cohort: Vec<String> = members
        .into_iter()
        .filter(|s| {
            member_batches
                .get(s)
                .map(|b| class_batches.values().any(|cb| cb == b))
                .unwrap_or(false)
        })
        .collect();
    let details = store::load_period_details(
        conn,
        &cohort,
        &scope.academic_year_id,
        &scope.academic_term_id,
    )?;

    let positions = rank_by_group(
        &details,
        |d| {
            member_batches
                .get(&d.student_id)
                .map(|b| (d.subject_id.clone(), b.clone()))
        },
        |d| d.total_score,
    );
    for (detail, position) in details.iter().zip(&positions) {
        store::write_batch_position(conn, &detail.id, *position)?;
    }
    summary.batch_positions = positions.iter().filter(|p| p.is_some()).count();
    Ok(())
}

fn rank_subjects_in_course(
    conn: &rusqlite::Connection,
    scope: &RankingScope,
    class_details: &[store::DetailRow],
    summary: &mut RankingSummary,
) -> Result<(), CalcError> {
    let course_id = if is_senior_school(&scope.school_type) {
        store::load_class_course_id(conn, &scope.class_id)?
    } else {
        None
    };
    let Some(course_id) = course_id else {
        for detail in class_details {
            store::write_course_position(conn, &detail.id, None)?;
        }
        return Ok(());
    };

    let students = store::load_active_course_students(conn, &course_id)?;
    let details = store::load_period_details(
        conn,
        &students,
        &scope.academic_year_id,
        &scope.academic_term_id,
    )?;
    let positions = rank_by_group(&details, |d| Some(d.subject_id.clone()), |d| d.total_score);
    for (detail, position) in details.iter().zip(&positions) {
        store::write_course_position(conn, &detail.id, *position)?;
    }
    summary.course_positions = positions.iter().filter(|p| p.is_some()).count();
    summary.course_ranking_applied = true;
    Ok(())
}

/// Recomputes every rank and position for the class/year/term from the
/// persisted term reports. Must run after the aggregator's writes committed.
pub fn rank_term_reports(
    conn: &rusqlite::Connection,
    scope: &RankingScope,
) -> Result<RankingSummary, CalcError> {
    let class_students: Vec<String> = store::load_active_students(conn, &scope.class_id)?
        .into_iter()
        .map(|s| s.id)
        .collect();
    let mut summary = RankingSummary::default();
    if class_students.is_empty() {
        return Ok(summary);
    }

    let tx = conn.unchecked_transaction().map_err(CalcError::db)?;

    rank_overall(&tx, scope, &class_students, &mut summary)?;

    let class_details = store::load_period_details(
        &tx,
        &class_students,
        &scope.academic_year_id,
        &scope.academic_term_id,
    )?;
    rank_subjects_in_class(&tx, &class_details, &mut summary)?;
    rank_subjects_in_batches(&tx, scope, &class_students, &class_details, &mut summary)?;
    rank_subjects_in_course(&tx, scope, &class_details, &mut summary)?;

    tx.commit().map_err(CalcError::db)?;

    tracing::info!(
        class_id = %scope.class_id,
        ranked = summary.ranked_reports,
        unranked = summary.unranked_reports,
        course = summary.course_ranking_applied,
        "rankings recomputed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_share_position_and_skip_next() {
        assert_eq!(
            assign_positions(&[90.0, 80.0, 80.0, 60.0]),
            vec![Some(1), Some(2), Some(2), Some(4)]
        );
    }

    #[test]
    fn positions_follow_input_order() {
        assert_eq!(
            assign_positions(&[60.0, 90.0, 80.0, 80.0]),
            vec![Some(4), Some(1), Some(2), Some(2)]
        );
    }

    #[test]
    fn zero_scores_are_unranked() {
        assert_eq!(
            assign_positions(&[0.0, 55.0, 0.0, 70.0]),
            vec![None, Some(2), None, Some(1)]
        );
        assert!(assign_positions(&[]).is_empty());
    }

    #[test]
    fn leading_tie_is_shared_first_place() {
        assert_eq!(
            assign_positions(&[75.5, 75.5, 75.5, 40.0]),
            vec![Some(1), Some(1), Some(1), Some(4)]
        );
    }

    #[test]
    fn groups_rank_independently() {
        let items = vec![
            ("math", 80.0),
            ("eng", 50.0),
            ("math", 90.0),
            ("eng", 70.0),
            ("math", 80.0),
        ];
        let got = rank_by_group(&items, |(s, _)| Some(*s), |(_, v)| *v);
        assert_eq!(got, vec![Some(2), Some(2), Some(1), Some(1), Some(2)]);
    }

    #[test]
    fn ungrouped_items_stay_unranked() {
        let items = vec![(Some("b1"), 50.0), (None, 99.0), (Some("b1"), 60.0)];
        let got = rank_by_group(&items, |(b, _)| *b, |(_, v)| *v);
        assert_eq!(got, vec![Some(2), None, Some(1)]);
    }

    #[test]
    fn remarks_by_tier() {
        assert_eq!(rank_remark(Some(1), 8), "Excellent work!");
        assert_eq!(rank_remark(Some(2), 8), "Very good performance.");
        assert_eq!(rank_remark(Some(4), 8), "Good effort, keep it up.");
        assert_eq!(rank_remark(Some(5), 8), "Keep trying!");
        assert_eq!(rank_remark(Some(2), 2), "Keep trying!");
        assert_eq!(rank_remark(None, 8), "No scores recorded.");
    }

    #[test]
    fn senior_school_types() {
        assert!(is_senior_school("HIGH"));
        assert!(is_senior_school("shs"));
        assert!(!is_senior_school("BASIC"));
        assert!(!is_senior_school(""));
    }
}
