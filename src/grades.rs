use serde::Serialize;

/// A weighted, markable unit of assessment: coursework within a module, or a
/// module itself when rolling up to program level (with `max_marks` = 100 and
/// the module's current average standing in for `achieved_marks`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradedItem {
    pub weighting: f64,
    pub max_marks: f64,
    pub achieved_marks: Option<f64>,
}

impl GradedItem {
    pub fn graded(weighting: f64, max_marks: f64, achieved_marks: f64) -> Self {
        Self {
            weighting,
            max_marks,
            achieved_marks: Some(achieved_marks),
        }
    }

    pub fn pending(weighting: f64, max_marks: f64) -> Self {
        Self {
            weighting,
            max_marks,
            achieved_marks: None,
        }
    }

    pub fn is_graded(&self) -> bool {
        self.achieved_marks.is_some()
    }

    /// Percentage score, defined only once graded. The input layer rejects
    /// non-positive `max_marks` before anything is stored; the engine stays
    /// total and reads that case as 0 rather than dividing by it.
    pub fn percentage(&self) -> Option<f64> {
        let achieved = self.achieved_marks?;
        if self.max_marks > 0.0 {
            Some(100.0 * achieved / self.max_marks)
        } else {
            Some(0.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedAverage {
    pub current_average: Option<f64>,
    pub completed_weighting: f64,
    pub remaining_weighting: f64,
    pub graded_count: usize,
    pub remaining_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeProjection {
    pub best_case: f64,
    pub worst_case: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetProjection {
    pub target_grade: f64,
    pub current_average: Option<f64>,
    /// `None` means there is no remaining weighting: the outcome is already
    /// fixed and no score on future work can move it.
    pub required_average_on_remaining: Option<f64>,
    pub achievable: bool,
    pub margin: Option<f64>,
}

/// Grade-points already secured toward the final mark: sum of
/// `percentage * weighting` over graded items, on a 0..100 scale.
fn earned_points(items: &[GradedItem]) -> f64 {
    items
        .iter()
        .filter_map(|item| Some(item.percentage()? * item.weighting))
        .sum::<f64>()
        / 100.0
}

fn completed_weighting(items: &[GradedItem]) -> f64 {
    items
        .iter()
        .filter(|item| item.is_graded())
        .map(|item| item.weighting)
        .sum()
}

/// Weighting not yet graded, out of the full 100: covers both pending items
/// and weighting not allocated to any item yet. Floored at zero so
/// over-allocated snapshots cannot produce negative headroom.
fn ungraded_headroom(items: &[GradedItem]) -> f64 {
    (100.0 - completed_weighting(items)).max(0.0)
}

pub fn weighted_average(items: &[GradedItem]) -> WeightedAverage {
    let mut weighted_sum = 0.0_f64;
    let mut completed_weighting = 0.0_f64;
    let mut remaining_weighting = 0.0_f64;
    let mut graded_count: usize = 0;
    let mut remaining_count: usize = 0;

    for item in items {
        match item.percentage() {
            Some(pct) => {
                graded_count += 1;
                completed_weighting += item.weighting;
                weighted_sum += pct * item.weighting;
            }
            None => {
                remaining_count += 1;
                remaining_weighting += item.weighting;
            }
        }
    }

    // The running average is relative to weighting graded so far, not the
    // full 100: a single 20%-weighted item scored at 80% reads as 80, not 16.
    // "Nothing graded yet" stays None; it is not the same thing as 0%.
    let current_average = if graded_count > 0 && completed_weighting > 0.0 {
        Some(weighted_sum / completed_weighting)
    } else {
        None
    };

    WeightedAverage {
        current_average,
        completed_weighting,
        remaining_weighting,
        graded_count,
        remaining_count,
    }
}

/// Best and worst final grades, projected across the whole 100%-weighted set.
/// Unlike the running average these divide by 100, and every point of
/// weighting not yet graded (pending or unallocated) counts as headroom:
/// full marks on it for the best case, zero for the worst.
pub fn project_grades(items: &[GradedItem]) -> GradeProjection {
    let earned = earned_points(items);
    GradeProjection {
        best_case: earned + ungraded_headroom(items),
        worst_case: earned,
    }
}

pub fn required_average_on_remaining(items: &[GradedItem], target_grade: f64) -> TargetProjection {
    let summary = weighted_average(items);
    let earned = earned_points(items);
    let headroom = ungraded_headroom(items);

    if headroom <= 0.0 {
        // Everything is graded; the target is met or it is not.
        let achievable = summary
            .current_average
            .map(|avg| avg >= target_grade)
            .unwrap_or(false);
        return TargetProjection {
            target_grade,
            current_average: summary.current_average,
            required_average_on_remaining: None,
            achievable,
            margin: None,
        };
    }

    let required = (target_grade - earned) / headroom * 100.0;
    TargetProjection {
        target_grade,
        current_average: summary.current_average,
        required_average_on_remaining: Some(required),
        // A negative requirement means the target is already exceeded:
        // trivially achievable, not an error.
        achievable: required <= 100.0,
        margin: Some(100.0 - required),
    }
}
