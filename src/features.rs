use crate::models::{FeatureRow, SnapshotRow};

/// Derive the full weekly feature table from raw snapshots.
///
/// `rows` must already be ordered by (subject, date); partitions are the
/// maximal runs of rows sharing a subject_id, and no lag or rolling window
/// ever crosses a partition boundary. The output fully replaces any prior
/// feature table, so repeated runs over the same input are identical.
pub fn engineer(rows: &[SnapshotRow]) -> Vec<FeatureRow> {
    let mut out = Vec::with_capacity(rows.len());
    let mut growth_history: Vec<i32> = Vec::new();
    let mut prev: Option<&SnapshotRow> = None;

    for row in rows {
        if prev.map(|p| p.subject_id) != Some(row.subject_id) {
            growth_history.clear();
            prev = None;
        }

        let prev_total = prev.map_or(0, |p| p.total_solved);
        let prev_easy = prev.map_or(0, |p| p.easy_solved);
        let prev_medium = prev.map_or(0, |p| p.medium_solved);
        let prev_hard = prev.map_or(0, |p| p.hard_solved);

        let weekly_growth = row.total_solved - prev_total;
        let weekly_easy_growth = row.easy_solved - prev_easy;
        let weekly_medium_growth = row.medium_solved - prev_medium;
        let weekly_hard_growth = row.hard_solved - prev_hard;

        // max(total, 1) denominator keeps a zero-total week at ratio 0
        // rather than NaN, and balance_score at 0 rather than 1.
        let denom = f64::from(row.total_solved.max(1));
        let easy_ratio = f64::from(row.easy_solved) / denom;
        let medium_ratio = f64::from(row.medium_solved) / denom;
        let hard_ratio = f64::from(row.hard_solved) / denom;
        let balance_score = easy_ratio + medium_ratio + hard_ratio;

        growth_history.push(weekly_growth);
        let window = trailing_window(&growth_history, 3);
        let (rolling_growth_3week, consistency_score) = match window {
            Some(values) => (rolling_mean(values), rolling_std(values)),
            None => (0.0, 0.0),
        };

        out.push(FeatureRow {
            subject_id: row.subject_id,
            handle: row.handle.clone(),
            week_number: row.week_number,
            week_start_date: row.week_start_date,
            calendar_date: row.calendar_date,
            easy_solved: row.easy_solved,
            medium_solved: row.medium_solved,
            hard_solved: row.hard_solved,
            total_solved: row.total_solved,
            prev_total,
            prev_easy,
            prev_medium,
            prev_hard,
            weekly_growth,
            weekly_easy_growth,
            weekly_medium_growth,
            weekly_hard_growth,
            easy_ratio,
            medium_ratio,
            hard_ratio,
            balance_score,
            consistency_score,
            hard_problem_density: hard_ratio,
            rolling_growth_3week,
            prev_weekly_growth: 0,
            inactive_weeks: 0,
            sudden_drop: false,
            declining_trend: false,
            drift_flag: false,
            drift_reason: None,
        });

        prev = Some(row);
    }

    out
}

/// Last `size` samples, or None while the history is still shorter.
fn trailing_window(history: &[i32], size: usize) -> Option<&[i32]> {
    if history.len() < size {
        None
    } else {
        Some(&history[history.len() - size..])
    }
}

fn rolling_mean(values: &[i32]) -> f64 {
    let sum: i64 = values.iter().map(|&v| i64::from(v)).sum();
    sum as f64 / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator), matching the rolling
/// std the rest of the pipeline was tuned against.
fn rolling_std(values: &[i32]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = rolling_mean(values);
    let sum_sq: f64 = values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use uuid::Uuid;

    fn weekly_snapshots(
        subject_id: Uuid,
        handle: &str,
        counts: &[(i32, i32, i32)],
    ) -> Vec<SnapshotRow> {
        let start = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        counts
            .iter()
            .enumerate()
            .map(|(i, &(easy, medium, hard))| {
                let day = start + Duration::days(7 * i as i64);
                SnapshotRow {
                    subject_id,
                    handle: handle.to_string(),
                    week_number: i as i32 + 1,
                    week_start_date: day,
                    calendar_date: day,
                    easy_solved: easy,
                    medium_solved: medium,
                    hard_solved: hard,
                    total_solved: easy + medium + hard,
                }
            })
            .collect()
    }

    #[test]
    fn first_week_lags_are_zero_and_growth_equals_total() {
        let rows = weekly_snapshots(Uuid::new_v4(), "avery", &[(5, 3, 2)]);
        let features = engineer(&rows);
        let first = &features[0];
        assert_eq!(first.prev_total, 0);
        assert_eq!(first.prev_easy, 0);
        assert_eq!(first.prev_medium, 0);
        assert_eq!(first.prev_hard, 0);
        assert_eq!(first.weekly_growth, 10);
    }

    #[test]
    fn growth_tracks_lag_per_difficulty() {
        let rows = weekly_snapshots(Uuid::new_v4(), "avery", &[(5, 3, 2), (8, 4, 3)]);
        let features = engineer(&rows);
        let second = &features[1];
        assert_eq!(second.prev_total, 10);
        assert_eq!(second.weekly_growth, 5);
        assert_eq!(second.weekly_easy_growth, 3);
        assert_eq!(second.weekly_medium_growth, 1);
        assert_eq!(second.weekly_hard_growth, 1);
    }

    #[test]
    fn zero_total_week_keeps_ratios_at_zero() {
        let rows = weekly_snapshots(Uuid::new_v4(), "avery", &[(0, 0, 0)]);
        let features = engineer(&rows);
        let row = &features[0];
        assert_eq!(row.easy_ratio, 0.0);
        assert_eq!(row.medium_ratio, 0.0);
        assert_eq!(row.hard_ratio, 0.0);
        assert_eq!(row.balance_score, 0.0);
        assert_eq!(row.hard_problem_density, 0.0);
    }

    #[test]
    fn balance_score_is_one_for_positive_totals() {
        let rows = weekly_snapshots(Uuid::new_v4(), "avery", &[(6, 3, 1)]);
        let features = engineer(&rows);
        assert!((features[0].balance_score - 1.0).abs() < 1e-9);
        assert_eq!(features[0].hard_problem_density, features[0].hard_ratio);
    }

    #[test]
    fn rolling_stats_are_zero_before_three_samples() {
        let rows = weekly_snapshots(Uuid::new_v4(), "avery", &[(10, 0, 0), (20, 0, 0)]);
        let features = engineer(&rows);
        for row in &features {
            assert_eq!(row.rolling_growth_3week, 0.0);
            assert_eq!(row.consistency_score, 0.0);
        }
    }

    #[test]
    fn rolling_stats_match_trailing_three_growths() {
        // totals 10, 20, 40 -> growths 10, 10, 20
        let rows = weekly_snapshots(Uuid::new_v4(), "avery", &[(10, 0, 0), (20, 0, 0), (40, 0, 0)]);
        let features = engineer(&rows);
        let third = &features[2];
        let mean = (10.0 + 10.0 + 20.0) / 3.0;
        assert!((third.rolling_growth_3week - mean).abs() < 1e-9);
        let var = ((10.0 - mean).powi(2) * 2.0 + (20.0 - mean).powi(2)) / 2.0;
        assert!((third.consistency_score - var.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn windows_never_cross_subject_boundaries() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut rows = weekly_snapshots(a, "avery", &[(10, 0, 0), (20, 0, 0), (30, 0, 0)]);
        rows.extend(weekly_snapshots(b, "jules", &[(100, 0, 0)]));
        let features = engineer(&rows);
        let first_b = &features[3];
        assert_eq!(first_b.prev_total, 0);
        assert_eq!(first_b.weekly_growth, 100);
        assert_eq!(first_b.rolling_growth_3week, 0.0);
        assert_eq!(first_b.consistency_score, 0.0);
    }

    #[test]
    fn rerun_over_identical_input_is_identical() {
        let rows = weekly_snapshots(
            Uuid::new_v4(),
            "avery",
            &[(10, 5, 1), (12, 7, 2), (12, 7, 2), (20, 9, 4)],
        );
        let first = engineer(&rows);
        let second = engineer(&rows);
        assert_eq!(first, second);
    }

    #[test]
    fn steady_grower_has_constant_growth() {
        let rows = weekly_snapshots(
            Uuid::new_v4(),
            "avery",
            &[(10, 0, 0), (20, 0, 0), (30, 0, 0), (40, 0, 0), (50, 0, 0)],
        );
        let features = engineer(&rows);
        for row in &features[1..] {
            assert_eq!(row.weekly_growth, 10);
        }
        assert!((features[4].rolling_growth_3week - 10.0).abs() < 1e-9);
        assert_eq!(features[4].consistency_score, 0.0);
    }
}
