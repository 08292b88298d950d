//! Total derivation and standard competition ranking.

/// Total of a result, kept to hundredths so equal marks compare equal.
/// No bounds checks: request validation owns the policy.
pub fn compute_total(ca_score: f64, exam_score: f64) -> f64 {
    round_hundredths(ca_score + exam_score)
}

pub fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Positions for totals already sorted in descending order.
///
/// Equal totals share a position and the next distinct total takes
/// `index + 1`, so `[90, 80, 80, 70]` ranks as `[1, 2, 2, 4]`.
pub fn competition_positions(totals_desc: &[f64]) -> Vec<u32> {
    let mut positions = Vec::with_capacity(totals_desc.len());
    let mut last_total: Option<f64> = None;
    let mut last_position = 0u32;

    for (index, total) in totals_desc.iter().enumerate() {
        let position = match last_total {
            Some(previous) if previous == *total => last_position,
            _ => index as u32 + 1,
        };
        positions.push(position);
        last_total = Some(*total);
        last_position = position;
    }

    positions
}

/// Letter grade for a total out of 100
pub fn grade_for(total: f64) -> &'static str {
    if total >= 70.0 {
        "A"
    } else if total >= 60.0 {
        "B"
    } else if total >= 50.0 {
        "C"
    } else if total >= 45.0 {
        "D"
    } else if total >= 40.0 {
        "E"
    } else {
        "F"
    }
}
