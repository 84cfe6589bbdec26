//! Cross-page candidate selection.

use crate::features::ExtractionCandidate;

/// The candidate with the strictly greatest mean quality.
///
/// Ties keep the earliest candidate, so page order decides. Returns `None`
/// only for an empty slice.
pub fn select_best(candidates: &[ExtractionCandidate]) -> Option<&ExtractionCandidate> {
    let mut best: Option<(&ExtractionCandidate, f64)> = None;
    for candidate in candidates {
        let mean = candidate.mean_quality();
        match best {
            Some((_, best_mean)) if mean <= best_mean => {}
            _ => best = Some((candidate, mean)),
        }
    }
    best.map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{Feature, FeatureKey};

    fn sender(value: &str, quality: f64) -> ExtractionCandidate {
        ExtractionCandidate::new(vec![Feature::new(FeatureKey::Sender, value, quality)])
    }

    #[test]
    fn empty_input_selects_nothing() {
        assert!(select_best(&[]).is_none());
    }

    #[test]
    fn highest_mean_wins() {
        let candidates = [sender("a", 0.3), sender("b", 0.9), sender("c", 0.5)];
        let best = select_best(&candidates).unwrap();
        assert_eq!(best.get(FeatureKey::Sender).unwrap().value.as_deref(), Some("b"));
    }

    #[test]
    fn ties_keep_first() {
        let candidates = [sender("first", 0.5), sender("second", 0.5)];
        let best = select_best(&candidates).unwrap();
        assert_eq!(best.get(FeatureKey::Sender).unwrap().value.as_deref(), Some("first"));
    }

    #[test]
    fn all_zero_quality_still_selects() {
        let candidates = [ExtractionCandidate::default(), sender("x", 0.0)];
        assert!(std::ptr::eq(select_best(&candidates).unwrap(), &candidates[0]));
    }

    #[test]
    fn missing_keys_lower_the_mean() {
        let full = ExtractionCandidate::new(
            FeatureKey::ALL.iter().map(|&k| Feature::new(k, "v", 0.5)).collect(),
        );
        let partial = sender("only", 1.0);
        let candidates = [partial, full];
        let best = select_best(&candidates).unwrap();
        assert_eq!(best.features.len(), 4);
    }
}
