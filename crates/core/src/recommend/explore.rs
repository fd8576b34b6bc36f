//! Explore/exploit decision per request.

use rand::Rng;

/// Exploration probability that decays with history size toward a floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExplorePolicy {
    pub initial_rate: f64,
    pub floor: f64,
    /// Interactions over which the rate falls by `decay`.
    pub decay_span: f64,
    pub decay: f64,
}

impl Default for ExplorePolicy {
    fn default() -> Self {
        Self { initial_rate: 0.3, floor: 0.1, decay_span: 1_000.0, decay: 0.2 }
    }
}

impl ExplorePolicy {
    pub fn rate(&self, interaction_count: usize) -> f64 {
        let decayed = self.initial_rate - (interaction_count as f64 / self.decay_span) * self.decay;
        decayed.max(self.floor).clamp(0.0, 1.0)
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R, interaction_count: usize) -> bool {
        rng.gen_bool(self.rate(interaction_count))
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::ExplorePolicy;

    #[test]
    fn rate_decays_toward_floor() {
        let policy = ExplorePolicy::default();
        assert!((policy.rate(0) - 0.3).abs() < 1e-12);
        assert!((policy.rate(500) - 0.2).abs() < 1e-12);
        assert!((policy.rate(1_000) - 0.1).abs() < 1e-12);
        assert!((policy.rate(50_000) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn draw_frequency_tracks_rate() {
        let policy = ExplorePolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        let hits = (0..10_000).filter(|_| policy.draw(&mut rng, 0)).count();
        assert!((2_500..3_500).contains(&hits), "hits = {hits}");
    }

    #[test]
    fn zero_rate_never_explores() {
        let policy = ExplorePolicy { initial_rate: 0.0, floor: 0.0, ..ExplorePolicy::default() };
        let mut rng = StdRng::seed_from_u64(1);
        assert!((0..100).all(|_| !policy.draw(&mut rng, 10)));
    }
}
