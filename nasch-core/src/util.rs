use rand::rngs::StdRng;
use rand::SeedableRng;

/// Creates one random number generator per worker.
///
/// With a base seed each generator is seeded with `seed + index`, making
/// runs reproducible for a fixed seed and worker count.
pub(crate) fn worker_rngs(seed: Option<u64>, count: usize) -> Vec<StdRng> {
    (0..count)
        .map(|index| worker_rng(seed, index))
        .collect()
}

pub(crate) fn worker_rng(seed: Option<u64>, index: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
        None => StdRng::from_entropy(),
    }
}
