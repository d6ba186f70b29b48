use ndarray::prelude::*;

const MERGE_THRESHOLD: f32 = 0.01;
const MERGE_MIN_RANGE: usize = 64;
const MERGE_FADE_SIZE: usize = 32;

/// Merge fragmentary mask artifacts.
///
/// Time ranges where the instrumental mask stays above a small threshold in
/// every channel and bin for long enough are treated as purely instrumental
/// passages: the mask is blended toward 1 across the range, with linear fades
/// at the edges so the blend doesn't introduce new discontinuities. This is a
/// perceptual cleanup and intentionally gives up exact energy conservation.
pub fn merge_artifacts(mask: Array3<f32>) -> Array3<f32> {
    merge_with(mask, MERGE_THRESHOLD, MERGE_MIN_RANGE, MERGE_FADE_SIZE)
}

fn merge_with(mut mask: Array3<f32>, thres: f32, min_range: usize, fade_size: usize) -> Array3<f32> {
    debug_assert!(min_range >= fade_size * 2);

    let n_frames = mask.shape()[2];
    if n_frames == 0 {
        return mask;
    }

    let mins: Vec<f32> = (0..n_frames)
        .map(|t| {
            mask.slice(s![.., .., t])
                .fold(f32::INFINITY, |acc, &v| acc.min(v))
        })
        .collect();

    let mut ranges = active_ranges(&mins, thres);
    coalesce_ranges(&mut ranges, fade_size);
    ranges.retain(|&(start, end)| end - start > min_range);

    let mut weight = vec![0.0f32; n_frames];
    for &(start, end) in &ranges {
        let fade_in_end = if start > 0 { start + fade_size } else { start };
        let fade_out_start = if end < n_frames { end - fade_size } else { end };

        if start > 0 {
            for i in 0..fade_size {
                weight[start + i] = i as f32 / (fade_size - 1) as f32;
            }
        }
        if end < n_frames {
            for i in 0..fade_size {
                weight[end - fade_size + i] = 1.0 - i as f32 / (fade_size - 1) as f32;
            }
        }
        for w in &mut weight[fade_in_end..fade_out_start] {
            *w = 1.0;
        }
    }

    for (t, &w) in weight.iter().enumerate() {
        if w > 0.0 {
            mask.slice_mut(s![.., .., t])
                .mapv_inplace(|m| m + w * (1.0 - m));
        }
    }

    mask
}

/// Maximal half-open ranges where the per-frame minimum exceeds `thres`.
fn active_ranges(mins: &[f32], thres: f32) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = None;
    for (t, &m) in mins.iter().enumerate() {
        match (start, m > thres) {
            (None, true) => start = Some(t),
            (Some(s), false) => {
                ranges.push((s, t));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        ranges.push((s, mins.len()));
    }
    ranges
}

fn coalesce_ranges(ranges: &mut Vec<(usize, usize)>, max_gap: usize) {
    let mut i = 0;
    while i + 1 < ranges.len() {
        if ranges[i + 1].0 - ranges[i].1 < max_gap {
            ranges[i].1 = ranges[i + 1].1;
            ranges.remove(i + 1);
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn mask_from_profile(profile: &[f32]) -> Array3<f32> {
        Array3::from_shape_fn((2, 3, profile.len()), |(_, _, t)| profile[t])
    }

    #[test]
    fn sustained_range_is_pushed_to_one() {
        let mut profile = vec![0.0f32; 100];
        for v in &mut profile[20..60] {
            *v = 0.4;
        }
        let merged = merge_with(mask_from_profile(&profile), 0.01, 16, 4);

        // Interior of the range saturates
        assert_abs_diff_eq!(merged[[0, 0, 40]], 1.0, epsilon = 1e-6);
        // Outside untouched
        assert_abs_diff_eq!(merged[[0, 0, 10]], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(merged[[1, 2, 80]], 0.0, epsilon = 1e-6);
        // Fade edges sit between the original value and 1
        assert!(merged[[0, 0, 21]] > 0.4 && merged[[0, 0, 21]] < 1.0);
    }

    #[test]
    fn short_range_is_ignored() {
        let mut profile = vec![0.0f32; 100];
        for v in &mut profile[20..30] {
            *v = 0.9;
        }
        let merged = merge_with(mask_from_profile(&profile), 0.01, 16, 4);
        assert_abs_diff_eq!(merged[[0, 0, 25]], 0.9, epsilon = 1e-6);
    }

    #[test]
    fn nearby_ranges_are_joined() {
        let mut profile = vec![0.0f32; 100];
        for v in &mut profile[10..40] {
            *v = 0.5;
        }
        for v in &mut profile[42..70] {
            *v = 0.5;
        }
        // Each piece alone exceeds min_range; the 2-frame gap joins them.
        let merged = merge_with(mask_from_profile(&profile), 0.01, 16, 4);
        assert_abs_diff_eq!(merged[[0, 0, 41]], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn range_touching_edges_has_no_edge_fade() {
        let profile = vec![0.3f32; 80];
        let merged = merge_with(mask_from_profile(&profile), 0.01, 16, 4);
        assert_abs_diff_eq!(merged[[0, 0, 0]], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(merged[[0, 0, 79]], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn empty_mask_is_returned_unchanged() {
        let mask = Array3::<f32>::zeros((2, 3, 0));
        let merged = merge_artifacts(mask);
        assert_eq!(merged.shape(), &[2, 3, 0]);
    }
}
