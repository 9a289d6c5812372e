use crate::models::FeatureRow;

pub const REASON_INACTIVE: &str = "No progress for 2+ weeks";
pub const REASON_SUDDEN_DROP: &str = "Sudden drop in weekly growth";
pub const REASON_DECLINING: &str = "Consistent decline over weeks";

/// Annotate an engineered feature table with drift fields.
///
/// Rows must be ordered by (subject, week); each subject partition is
/// rescanned from its first week so the inactivity counter is always
/// recomputed from scratch rather than carried across runs.
pub fn annotate(rows: &mut [FeatureRow]) {
    let mut start = 0;
    while start < rows.len() {
        let subject_id = rows[start].subject_id;
        let mut end = start;
        while end < rows.len() && rows[end].subject_id == subject_id {
            end += 1;
        }
        annotate_partition(&mut rows[start..end]);
        start = end;
    }
}

fn annotate_partition(rows: &mut [FeatureRow]) {
    let mut inactive = 0;
    for idx in 0..rows.len() {
        let growth = rows[idx].weekly_growth;
        let prev_growth = if idx >= 1 { rows[idx - 1].weekly_growth } else { 0 };
        let growth_two_back = (idx >= 2).then(|| rows[idx - 2].weekly_growth);

        if growth == 0 {
            inactive += 1;
        } else {
            inactive = 0;
        }

        let inactivity = inactive >= 2;

        // Preserved as-is: when rolling_growth_3week <= 0 the comparison is
        // trivially true for any negative growth.
        let sudden_drop =
            growth < 0 && f64::from(growth.abs()) > 0.5 * rows[idx].rolling_growth_3week;

        let declining_trend = match growth_two_back {
            Some(two_back) => growth < prev_growth && prev_growth < two_back,
            None => false,
        };

        let row = &mut rows[idx];
        row.prev_weekly_growth = prev_growth;
        row.inactive_weeks = inactive;
        row.sudden_drop = sudden_drop;
        row.declining_trend = declining_trend;
        row.drift_flag = inactivity || sudden_drop || declining_trend;
        // First match wins: inactivity, then sudden drop, then declining
        // trend. Inactivity requires zero growth while a sudden drop
        // requires negative growth (which resets the counter), so those
        // two can never fire in the same week and the inactivity-first
        // ranking only shows across adjacent weeks; sudden drop and
        // declining trend can overlap, and the drop wins.
        row.drift_reason = if inactivity {
            Some(REASON_INACTIVE.to_string())
        } else if sudden_drop {
            Some(REASON_SUDDEN_DROP.to_string())
        } else if declining_trend {
            Some(REASON_DECLINING.to_string())
        } else {
            None
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::engineer;
    use crate::models::SnapshotRow;
    use chrono::{Duration, NaiveDate};
    use uuid::Uuid;

    fn history(totals: &[i32]) -> Vec<FeatureRow> {
        let subject_id = Uuid::new_v4();
        let start = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let snapshots: Vec<SnapshotRow> = totals
            .iter()
            .enumerate()
            .map(|(i, &total)| {
                let day = start + Duration::days(7 * i as i64);
                SnapshotRow {
                    subject_id,
                    handle: "avery".to_string(),
                    week_number: i as i32 + 1,
                    week_start_date: day,
                    calendar_date: day,
                    easy_solved: total,
                    medium_solved: 0,
                    hard_solved: 0,
                    total_solved: total,
                }
            })
            .collect();
        let mut rows = engineer(&snapshots);
        annotate(&mut rows);
        rows
    }

    #[test]
    fn steady_grower_never_drifts() {
        let rows = history(&[10, 20, 30, 40, 50]);
        for row in &rows[1..] {
            assert_eq!(row.weekly_growth, 10);
            assert_eq!(row.inactive_weeks, 0);
            assert!(!row.drift_flag);
            assert_eq!(row.drift_reason, None);
        }
    }

    #[test]
    fn stalled_subject_flags_inactivity_from_week_three() {
        let rows = history(&[10, 10, 10, 10]);
        assert_eq!(rows[1].inactive_weeks, 1);
        assert!(!rows[1].drift_flag);
        assert_eq!(rows[2].inactive_weeks, 2);
        assert_eq!(rows[3].inactive_weeks, 3);
        for row in &rows[2..] {
            assert!(row.drift_flag);
            assert_eq!(row.drift_reason.as_deref(), Some(REASON_INACTIVE));
        }
    }

    #[test]
    fn inactivity_counter_resets_on_any_growth() {
        let rows = history(&[10, 10, 10, 25, 25]);
        assert_eq!(rows[2].inactive_weeks, 2);
        assert_eq!(rows[3].inactive_weeks, 0);
        assert_eq!(rows[4].inactive_weeks, 1);
        assert!(!rows[3].drift_flag);
    }

    #[test]
    fn sudden_drop_fires_against_positive_rolling_growth() {
        // growths: 10, 10, 10, -25; rolling mean at week 4 = (10+10-25)/3
        let rows = history(&[10, 20, 30, 5]);
        let week4 = &rows[3];
        assert_eq!(week4.weekly_growth, -25);
        assert!(week4.sudden_drop);
        assert!(week4.drift_flag);
        assert_eq!(week4.drift_reason.as_deref(), Some(REASON_SUDDEN_DROP));
    }

    #[test]
    fn stall_then_crash_reports_each_reason_in_turn() {
        // weeks 2-3 stall (inactive_weeks hits 2), week 4 crashes, weeks
        // 5-6 stall again. A negative week resets the inactivity counter,
        // so the crash week reports the sudden drop and the second stall
        // reports inactivity.
        let rows = history(&[10, 10, 10, 2, 2, 2]);
        assert_eq!(rows[2].drift_reason.as_deref(), Some(REASON_INACTIVE));
        assert!(rows[3].sudden_drop);
        assert_eq!(rows[3].drift_reason.as_deref(), Some(REASON_SUDDEN_DROP));
        assert_eq!(rows[5].inactive_weeks, 2);
        assert_eq!(rows[5].drift_reason.as_deref(), Some(REASON_INACTIVE));
    }

    #[test]
    fn sudden_drop_outranks_declining_trend() {
        // growths: 10, 5, -20 -> both rules fire at week 4; the drop wins.
        let rows = history(&[10, 20, 25, 5]);
        let week4 = &rows[3];
        assert!(week4.sudden_drop);
        assert!(week4.declining_trend);
        assert_eq!(week4.drift_reason.as_deref(), Some(REASON_SUDDEN_DROP));
    }

    #[test]
    fn declining_trend_needs_three_strictly_decreasing_growths() {
        // growths: 30, 20, 10 -> strictly decreasing at week 4
        let rows = history(&[30, 60, 80, 90]);
        let week4 = &rows[3];
        assert_eq!(week4.weekly_growth, 10);
        assert_eq!(week4.prev_weekly_growth, 20);
        assert!(week4.declining_trend);
        assert_eq!(week4.drift_reason.as_deref(), Some(REASON_DECLINING));
    }

    #[test]
    fn flat_growth_is_not_a_declining_trend() {
        let rows = history(&[10, 20, 30, 40]);
        for row in &rows {
            assert!(!row.declining_trend);
        }
    }

    #[test]
    fn partitions_are_annotated_independently() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let mut snapshots = Vec::new();
        for (handle, totals) in [("avery", vec![10, 10, 10]), ("jules", vec![5, 15, 25])] {
            let subject_id = Uuid::new_v4();
            for (i, total) in totals.into_iter().enumerate() {
                let day = start + Duration::days(7 * i as i64);
                snapshots.push(SnapshotRow {
                    subject_id,
                    handle: handle.to_string(),
                    week_number: i as i32 + 1,
                    week_start_date: day,
                    calendar_date: day,
                    easy_solved: total,
                    medium_solved: 0,
                    hard_solved: 0,
                    total_solved: total,
                });
            }
        }
        let mut rows = engineer(&snapshots);
        annotate(&mut rows);
        assert_eq!(rows[2].inactive_weeks, 2);
        assert!(rows[2].drift_flag);
        // second subject starts fresh
        assert_eq!(rows[3].inactive_weeks, 0);
        assert_eq!(rows[3].prev_weekly_growth, 0);
        assert!(!rows[4].drift_flag);
    }
}
