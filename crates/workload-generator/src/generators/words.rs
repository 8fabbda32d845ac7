//! Built-in word pools for text generators.

use rand::seq::SliceRandom;
use rand::Rng;

pub const WORDS: &[&str] = &[
    "alpha", "amber", "anchor", "apple", "arch", "arrow", "aspen", "atlas", "autumn", "badge",
    "bamboo", "banner", "basin", "beacon", "birch", "blaze", "bloom", "border", "breeze", "bridge",
    "bronze", "canyon", "carbon", "cedar", "chalk", "cipher", "circle", "cliff", "cloud", "coast",
    "comet", "copper", "coral", "crane", "crest", "crystal", "delta", "desert", "dome", "dune",
    "eagle", "echo", "ember", "engine", "falcon", "feather", "field", "flint", "forest", "frost",
    "galaxy", "garden", "glacier", "granite", "harbor", "hazel", "horizon", "island", "ivory",
    "jade", "jasper", "kernel", "lagoon", "lantern", "laser", "lemon", "light", "lotus", "lunar",
    "maple", "marble", "meadow", "meteor", "mirror", "mist", "mosaic", "nebula", "nectar", "north",
    "oak", "oasis", "ocean", "onyx", "orbit", "orchid", "pearl", "pebble", "pepper", "pilot",
    "pine", "pixel", "planet", "plaza", "polar", "prism", "quartz", "radar", "rain", "raven",
    "reef", "ridge", "river", "rocket", "ruby", "sage", "salt", "shadow", "signal", "silver",
    "sky", "slate", "solar", "spark", "spruce", "stone", "storm", "summit", "sunset", "thunder",
    "tide", "timber", "topaz", "torch", "tower", "trail", "tulip", "tundra", "valley", "vapor",
    "velvet", "violet", "vista", "willow", "winter", "wolf", "zenith", "zephyr",
];

pub const FIRST_NAMES: &[&str] = &[
    "Ada", "Alan", "Amara", "Ben", "Carla", "Chen", "Daniel", "Diego", "Elena", "Emma", "Farah",
    "Felix", "Grace", "Hana", "Hugo", "Ines", "Ivan", "Jana", "Jonas", "Kai", "Lara", "Leo",
    "Maya", "Miguel", "Nina", "Noah", "Olga", "Omar", "Priya", "Quinn", "Rosa", "Sam", "Sofia",
    "Tariq", "Uma", "Victor", "Wen", "Yara", "Yusuf", "Zoe",
];

pub const LAST_NAMES: &[&str] = &[
    "Adams", "Bauer", "Costa", "Dubois", "Evans", "Fischer", "Garcia", "Hansen", "Ito", "Jensen",
    "Kowalski", "Lopez", "Martin", "Nakamura", "Novak", "Okafor", "Petrov", "Quinn", "Rossi",
    "Silva", "Schmidt", "Tanaka", "Usman", "Varga", "Walker", "Xu", "Young", "Zhang",
];

pub const CITIES: &[&str] = &[
    "Amsterdam", "Athens", "Austin", "Berlin", "Bogota", "Boston", "Cairo", "Chicago", "Denver",
    "Dublin", "Lisbon", "London", "Madrid", "Miami", "Montreal", "Nairobi", "Osaka", "Oslo",
    "Paris", "Prague", "Rome", "Santiago", "Seattle", "Seoul", "Sydney", "Tokyo", "Toronto",
    "Vienna", "Warsaw", "Zurich",
];

pub const COUNTRIES: &[&str] = &[
    "Argentina", "Australia", "Brazil", "Canada", "Chile", "Egypt", "France", "Germany", "Greece",
    "India", "Ireland", "Italy", "Japan", "Kenya", "Mexico", "Norway", "Poland", "Portugal",
    "Spain", "Sweden", "United Kingdom", "United States",
];

pub const STREET_SUFFIXES: &[&str] = &["Street", "Avenue", "Road", "Lane", "Drive", "Way"];

pub const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net", "mail.test"];

/// Pick one entry. Pools are non-empty constants, so this never yields `""`
/// in practice.
pub fn pick<R: Rng + ?Sized>(rng: &mut R, pool: &[&'static str]) -> &'static str {
    pool.choose(rng).copied().unwrap_or("")
}

/// A random lowercase word.
pub fn word<R: Rng + ?Sized>(rng: &mut R) -> String {
    pick(rng, WORDS).to_string()
}

/// Between `min` and `max` (inclusive) random words.
pub fn words<R: Rng + ?Sized>(rng: &mut R, min: usize, max: usize) -> Vec<String> {
    let count = rng.gen_range(min..=max);
    (0..count).map(|_| word(rng)).collect()
}

/// A capitalised sentence of 4 to 10 words ending in a period.
pub fn sentence<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut text = words(rng, 4, 10).join(" ");
    if let Some(first) = text.get(..1) {
        let upper = first.to_ascii_uppercase();
        text.replace_range(..1, &upper);
    }
    text.push('.');
    text
}

pub fn full_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{} {}", pick(rng, FIRST_NAMES), pick(rng, LAST_NAMES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_words_length_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let w = words(&mut rng, 1, 5);
            assert!((1..=5).contains(&w.len()));
            assert!(w.iter().all(|s| WORDS.contains(&s.as_str())));
        }
    }

    #[test]
    fn test_sentence_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let s = sentence(&mut rng);
        assert!(s.ends_with('.'));
        assert!(s.chars().next().unwrap().is_ascii_uppercase());
        assert!(s.split(' ').count() >= 4);
    }
}
