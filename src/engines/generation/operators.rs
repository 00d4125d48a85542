use crate::engines::generation::genome::Genome;
use crate::error::{EvoError, Result};
use rand::Rng;

/// Uniform crossover: each byte position picks its parent by a coin flip.
///
/// Children have the length of the shorter parent. The same RNG state always
/// yields the same pair of children.
pub fn crossover<R: Rng + ?Sized>(parent1: &Genome, parent2: &Genome, rng: &mut R) -> (Genome, Genome) {
    let a = parent1.as_bytes();
    let b = parent2.as_bytes();
    let len = a.len().min(b.len());

    let mut child1 = Vec::with_capacity(len);
    let mut child2 = Vec::with_capacity(len);
    for i in 0..len {
        if rng.gen::<bool>() {
            child1.push(a[i]);
            child2.push(b[i]);
        } else {
            child1.push(b[i]);
            child2.push(a[i]);
        }
    }

    (Genome::from_bytes(&child1), Genome::from_bytes(&child2))
}

/// Mutation: each byte is replaced with probability `rate`.
///
/// A mutated byte is XORed with a non-zero random mask, so it always changes.
/// Returns the number of bytes mutated.
pub fn mutate<R: Rng + ?Sized>(genome: &mut Genome, rate: f64, rng: &mut R) -> Result<usize> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(EvoError::invalid(format!("mutation rate {} outside [0, 1]", rate)));
    }
    if rate == 0.0 {
        return Ok(0);
    }

    let mut mutated = 0;
    for byte in genome.as_bytes_mut() {
        if rng.gen_bool(rate) {
            *byte ^= rng.gen_range(1..=u8::MAX);
            mutated += 1;
        }
    }
    Ok(mutated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_crossover_is_reproducible() {
        let p1 = Genome::from_bytes(&[0; 32]);
        let p2 = Genome::from_bytes(&[255; 32]);

        let first = crossover(&p1, &p2, &mut StdRng::seed_from_u64(42));
        let second = crossover(&p1, &p2, &mut StdRng::seed_from_u64(42));
        assert_eq!(first, second);

        // every position comes from exactly one parent
        for (x, y) in first.0.as_bytes().iter().zip(first.1.as_bytes()) {
            assert_eq!(x ^ y, 255);
        }
    }

    #[test]
    fn test_crossover_uses_shorter_length() {
        let p1 = Genome::from_bytes(&[1, 2, 3, 4]);
        let p2 = Genome::from_bytes(&[5, 6]);
        let (c1, c2) = crossover(&p1, &p2, &mut StdRng::seed_from_u64(1));
        assert_eq!(c1.size(), 2);
        assert_eq!(c2.size(), 2);
    }

    #[test]
    fn test_mutate_zero_rate_is_noop() {
        let mut g = Genome::from_bytes(&[10, 20, 30]);
        let n = mutate(&mut g, 0.0, &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(n, 0);
        assert_eq!(g.as_bytes(), &[10, 20, 30]);
    }

    #[test]
    fn test_mutate_full_rate_changes_every_byte() {
        let before = Genome::from_bytes(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let mut g = before.clone();
        let n = mutate(&mut g, 1.0, &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(n, 8);
        for (a, b) in before.as_bytes().iter().zip(g.as_bytes()) {
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_mutate_rejects_bad_rate() {
        let mut g = Genome::from_bytes(&[1]);
        assert!(mutate(&mut g, 1.5, &mut StdRng::seed_from_u64(0)).is_err());
    }
}
