use rayon::prelude::*;

/// Minimum accumulated cost over all monotone, contiguous alignment paths,
/// using absolute-difference local cost and the standard three-predecessor
/// recurrence (§4.2). No Sakoe-Chiba band is applied (§9 resolution):
/// the full `|query| x |template|` cost matrix is computed.
pub fn dtw_distance(query: &[f32], template: &[f32]) -> f32 {
    if query.is_empty() || template.is_empty() {
        return 0.0;
    }
    let n = query.len();
    let m = template.len();

    // Rolling two-row DP to avoid an O(n*m) allocation.
    let mut prev = vec![f32::INFINITY; m + 1];
    let mut curr = vec![f32::INFINITY; m + 1];
    prev[0] = 0.0;

    for i in 1..=n {
        curr[0] = f32::INFINITY;
        for j in 1..=m {
            let cost = (query[i - 1] - template[j - 1]).abs();
            let best_pred = prev[j].min(curr[j - 1]).min(prev[j - 1]);
            curr[j] = cost + best_pred;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[m]
}

/// Per-template DTW feature triple: normalized distance, warping-path length
/// ratio (approximated from the sequence-length delta, §9), and alignment
/// score `1 / (1 + normalized_distance)` (§4.2).
fn dtw_feature_triple(query: &[f32], template: &[f32]) -> [f32; 3] {
    let raw = dtw_distance(query, template);
    let denom = (query.len().max(template.len())) as f32;
    let normalized = raw / denom.max(1.0);

    let len_delta = (query.len() as f32 - template.len() as f32).abs();
    let path_ratio = if denom > 0.0 { len_delta / denom } else { 0.0 };

    let alignment_score = 1.0 / (1.0 + normalized);

    [normalized, path_ratio, alignment_score]
}

/// Compute the 3*T DTW features across `templates`. `T=0` yields the
/// documented default triple `([0], [1], [1])` flattened to `[0.0, 1.0,
/// 1.0]` (§4.2).
pub fn dtw_features(query: &[f32], templates: &[Vec<f32>]) -> Vec<f32> {
    if templates.is_empty() {
        return vec![0.0, 1.0, 1.0];
    }

    templates
        .par_iter()
        .map(|t| dtw_feature_triple(query, t))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_sequences_have_zero_distance() {
        let s = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(dtw_distance(&s, &s), 0.0);
    }

    #[test]
    fn zero_templates_yields_documented_default() {
        let f = dtw_features(&[1.0, 2.0, 3.0], &[]);
        assert_eq!(f, vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn feature_length_matches_template_count() {
        let templates = vec![vec![1.0; 10], vec![2.0; 10]];
        let f = dtw_features(&[1.0; 10], &templates);
        assert_eq!(f.len(), 6);
    }

    #[test]
    fn spike_pattern_is_closer_to_spike_template_than_flat() {
        let flat_template = vec![1.0; 10];
        let spike_template = vec![1.0, 1.0, 1.0, 5.0, 5.0, 5.0, 1.0, 1.0, 1.0, 1.0];
        let query = vec![1.0, 1.0, 2.0, 5.0, 5.0, 4.0, 1.0, 1.0, 1.0, 1.0];

        let d_flat = dtw_distance(&query, &flat_template);
        let d_spike = dtw_distance(&query, &spike_template);
        assert!(d_spike < d_flat);
    }
}
