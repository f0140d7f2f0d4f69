use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest generator position a peer may ask us to fast-forward to
///
/// Positions are reached by replaying draws one at a time, and a game uses a
/// handful of draws per round.
pub const MAX_ITERATION: u64 = 1 << 20;

/// Four 32-bit words derived from a seed string
type SeedWords = [u32; 4];

/// Hash a seed string into four 32-bit words (cyrb128)
///
/// Operates on UTF-16 code units so that the same seed string produces the
/// same words on every peer regardless of how it was typed or transported.
fn cyrb128(seed: &str) -> SeedWords {
    let mut h1: u32 = 1779033703;
    let mut h2: u32 = 3144134277;
    let mut h3: u32 = 1013904242;
    let mut h4: u32 = 2773480762;

    for unit in seed.encode_utf16() {
        let k = unit as u32;
        h1 = h2 ^ (h1 ^ k).wrapping_mul(597399067);
        h2 = h3 ^ (h2 ^ k).wrapping_mul(2869860233);
        h3 = h4 ^ (h3 ^ k).wrapping_mul(951274213);
        h4 = h1 ^ (h4 ^ k).wrapping_mul(2716044179);
    }

    h1 = (h3 ^ (h1 >> 18)).wrapping_mul(597399067);
    h2 = (h4 ^ (h2 >> 22)).wrapping_mul(2869860233);
    h3 = (h1 ^ (h3 >> 17)).wrapping_mul(951274213);
    h4 = (h2 ^ (h4 >> 19)).wrapping_mul(2716044179);

    h1 ^= h2 ^ h3 ^ h4;
    h2 ^= h1;
    h3 ^= h1;
    h4 ^= h1;

    [h1, h2, h3, h4]
}

/// Small fast counter generator (sfc32), 128 bits of state
#[derive(Debug, Clone, PartialEq, Eq)]
struct Sfc32 {
    a: u32,
    b: u32,
    c: u32,
    d: u32,
}

impl Sfc32 {
    fn new([a, b, c, d]: SeedWords) -> Self {
        Self { a, b, c, d }
    }

    fn next_u32(&mut self) -> u32 {
        let mut t = self.a.wrapping_add(self.b);
        self.a = self.b ^ (self.b >> 9);
        self.b = self.c.wrapping_add(self.c << 3);
        self.c = self.c.rotate_left(21);
        self.d = self.d.wrapping_add(1);
        t = t.wrapping_add(self.d);
        self.c = self.c.wrapping_add(t);
        t
    }
}

/// Seeded, replayable pseudo-random source shared by both peers
///
/// Two instances built from the same seed yield the same infinite sequence.
/// `with_iteration(seed, n)` lands exactly where `new(seed)` would be after
/// `n` draws, which lets a peer catch up to another peer's position knowing
/// only `(seed, iteration)`. Not suitable for anything security related.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    seed: String,
    generator: Sfc32,
    iteration: u64,
}

impl SeededRandom {
    /// Create a generator from `seed`, or from a freshly generated seed
    pub fn new(seed: Option<&str>) -> Self {
        let seed = match seed {
            Some(seed) => seed.to_string(),
            None => generate_seed(),
        };
        let generator = Sfc32::new(cyrb128(&seed));
        Self {
            seed,
            generator,
            iteration: 0,
        }
    }

    /// Create a generator positioned after `iteration` draws from `seed`
    ///
    /// Cost is linear in `iteration`; callers holding peer input check it
    /// against [`MAX_ITERATION`] first.
    pub fn with_iteration(seed: &str, iteration: u64) -> Self {
        let mut rng = Self::new(Some(seed));
        for _ in 0..iteration {
            rng.next();
        }
        rng
    }

    /// The seed string this generator was built from
    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Number of draws consumed so far
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Next value in `[0, 1)`
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> f64 {
        self.iteration += 1;
        self.generator.next_u32() as f64 / 4294967296.0
    }

    /// Next value in `[0, max)`
    pub fn next_max(&mut self, max: f64) -> f64 {
        self.next() * max
    }

    /// Next value between `a` and `b`, in whichever order they are given
    pub fn next_range(&mut self, a: f64, b: f64) -> f64 {
        let max = a.max(b);
        let min = a.min(b);
        self.next() * (max - min) + min
    }

    /// Serializable `(seed, iteration)` position of this generator
    pub fn position(&self) -> RandomPosition {
        RandomPosition {
            seed: self.seed.clone(),
            iteration: self.iteration,
        }
    }
}

impl From<&RandomPosition> for SeededRandom {
    fn from(position: &RandomPosition) -> Self {
        SeededRandom::with_iteration(&position.seed, position.iteration)
    }
}

/// Everything a peer needs to rebuild a generator at an exact position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomPosition {
    pub seed: String,
    pub iteration: u64,
}

impl fmt::Display for RandomPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.seed, self.iteration)
    }
}

/// Fresh random seed string (hex)
fn generate_seed() -> String {
    let value: u64 = rand::thread_rng().gen();
    format!("{:x}", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_sequence_for_abc() {
        let mut rng = SeededRandom::new(Some("abc"));
        assert_eq!(rng.next(), 0.843533635372296);
        assert_eq!(rng.next(), 0.8750259443186224);
        assert_eq!(rng.next(), 0.47709502349607646);
        assert_eq!(rng.iteration(), 3);
    }

    #[test]
    fn test_seed_words_for_empty_seed() {
        assert_eq!(
            cyrb128(""),
            [41608494, 3485963809, 1435736333, 1262568316]
        );
    }

    #[test]
    fn test_generated_seed_is_kept() {
        let rng = SeededRandom::new(None);
        assert!(!rng.seed().is_empty());
        assert_eq!(rng.iteration(), 0);

        let mut copy = SeededRandom::new(Some(rng.seed()));
        let mut original = rng.clone();
        assert_eq!(copy.next(), original.next());
    }

    #[test]
    fn test_ranges() {
        let mut rng = SeededRandom::new(Some("ranges"));
        for _ in 0..200 {
            let v = rng.next_max(10.0);
            assert!((0.0..10.0).contains(&v));
            let r = rng.next_range(7.0, 3.0);
            assert!((3.0..7.0).contains(&r));
        }
    }

    #[test]
    fn test_position_round_trip() {
        let mut rng = SeededRandom::new(Some("position"));
        rng.next();
        rng.next();
        let position = rng.position();
        assert_eq!(position.to_string(), "position@2");

        let mut rebuilt = SeededRandom::from(&position);
        assert_eq!(rebuilt.iteration(), 2);
        assert_eq!(rebuilt.next(), rng.next());
    }

    #[test]
    fn test_complementary_symbol_draws() {
        for seed in ["abc", "", "host", "ultimate", "42"] {
            let host_draw = SeededRandom::new(Some(seed)).next();
            let guest_draw = SeededRandom::with_iteration(seed, 0).next();
            assert_eq!(host_draw, guest_draw);
            let host_is_o = host_draw > 0.5;
            let guest_is_x = guest_draw > 0.5;
            assert_eq!(host_is_o, guest_is_x);
        }
    }

    proptest! {
        #[test]
        fn prop_fast_forward_matches_discarding(seed in ".{0,24}", n in 0u64..200) {
            let mut skipped = SeededRandom::new(Some(&seed));
            for _ in 0..n {
                skipped.next();
            }
            let mut forwarded = SeededRandom::with_iteration(&seed, n);
            prop_assert_eq!(forwarded.iteration(), skipped.iteration());
            for _ in 0..16 {
                prop_assert_eq!(forwarded.next(), skipped.next());
            }
        }

        #[test]
        fn prop_same_seed_same_stream(seed in "[a-z0-9]{1,16}") {
            let mut a = SeededRandom::new(Some(&seed));
            let mut b = SeededRandom::new(Some(&seed));
            for _ in 0..32 {
                let (x, y) = (a.next(), b.next());
                prop_assert_eq!(x, y);
                prop_assert!((0.0..1.0).contains(&x));
            }
        }
    }
}
