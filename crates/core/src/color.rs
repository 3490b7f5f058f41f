use std::hash::Hasher;

use rustc_hash::FxHasher;

/// Number of distinct color buckets.
pub const BUCKET_COUNT: usize = 256;

/// Palette slot for a frame key.
///
/// Stable across runs and platforms: FxHash is unseeded, and the finalizer
/// spreads its low-entropy output before the top byte is taken.
pub fn color_bucket_for_key(key: &str) -> u8 {
    let mut hasher = FxHasher::default();
    hasher.write(key.as_bytes());
    (mix64(hasher.finish()) >> 56) as u8
}

/// splitmix64 finalizer.
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Position of a bucket on the unit interval, for palette lookups.
pub fn bucket_fraction(bucket: u8) -> f32 {
    f32::from(bucket) / BUCKET_COUNT as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_bucket() {
        let keys = ["main::", "parse:src/parse.rs:10:", "", "a much longer frame key"];
        for key in keys {
            assert_eq!(color_bucket_for_key(key), color_bucket_for_key(&key.to_string()));
        }
    }

    #[test]
    fn distinct_keys_spread_over_buckets() {
        let mut seen = [0u32; BUCKET_COUNT];
        for i in 0..4096 {
            seen[color_bucket_for_key(&format!("frame_{i}")) as usize] += 1;
        }
        let used = seen.iter().filter(|&&n| n > 0).count();
        assert!(used > 200, "only {used} buckets used");
        assert!(seen.iter().all(|&n| n < 64));
    }

    #[test]
    fn fraction_stays_in_unit_interval() {
        assert_eq!(bucket_fraction(0), 0.0);
        assert!(bucket_fraction(255) < 1.0);
    }
}
