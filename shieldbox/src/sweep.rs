use rand::Rng;

/// Decides whether this write should trigger an opportunistic sweep.
///
/// `probability` is clamped to `0.0..=1.0`; non-finite values never sweep.
pub(crate) fn should_sweep(probability: f64) -> bool {
    if !probability.is_finite() || probability <= 0.0 {
        return false;
    }
    rand::thread_rng().gen_bool(probability.min(1.0))
}
