use chrono::NaiveDate;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Subject {
    pub id: Uuid,
    pub handle: String,
    pub platform: String,
    pub display_name: String,
}

/// One raw daily observation of solve counts for a subject, already
/// bucketed onto its elastic week.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub subject_id: Uuid,
    pub handle: String,
    pub week_number: i32,
    pub week_start_date: NaiveDate,
    pub calendar_date: NaiveDate,
    pub easy_solved: i32,
    pub medium_solved: i32,
    pub hard_solved: i32,
    pub total_solved: i32,
}

/// Derived weekly feature row. Regenerated in full on every pipeline run;
/// never patched incrementally.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub subject_id: Uuid,
    pub handle: String,
    pub week_number: i32,
    pub week_start_date: NaiveDate,
    pub calendar_date: NaiveDate,
    pub easy_solved: i32,
    pub medium_solved: i32,
    pub hard_solved: i32,
    pub total_solved: i32,
    pub prev_total: i32,
    pub prev_easy: i32,
    pub prev_medium: i32,
    pub prev_hard: i32,
    pub weekly_growth: i32,
    pub weekly_easy_growth: i32,
    pub weekly_medium_growth: i32,
    pub weekly_hard_growth: i32,
    pub easy_ratio: f64,
    pub medium_ratio: f64,
    pub hard_ratio: f64,
    pub balance_score: f64,
    pub consistency_score: f64,
    pub hard_problem_density: f64,
    pub rolling_growth_3week: f64,
    pub prev_weekly_growth: i32,
    pub inactive_weeks: i32,
    pub sudden_drop: bool,
    pub declining_trend: bool,
    pub drift_flag: bool,
    pub drift_reason: Option<String>,
}

/// Raw counts reported by a platform for one handle. Platforms without a
/// difficulty breakdown report `None` for the tier fields.
#[derive(Debug, Clone, Default)]
pub struct PlatformStats {
    pub easy_solved: Option<i32>,
    pub medium_solved: Option<i32>,
    pub hard_solved: Option<i32>,
    pub total_solved: Option<i32>,
}

impl PlatformStats {
    /// True when the platform produced nothing usable at all.
    pub fn is_empty(&self) -> bool {
        self.total_solved.is_none()
            && self.easy_solved.is_none()
            && self.medium_solved.is_none()
            && self.hard_solved.is_none()
    }
}
