use crate::engines::generation::genome::{byte_similarity, Genome};
use crate::engines::generation::operators;
use crate::error::{EvoError, Result};
use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Problem-specific genome operations and fitness.
///
/// Every method except `name`, `genome_size` and `fitness` has a default
/// built on the raw byte operators, so a domain with no representation
/// constraints only supplies a fitness function.
pub trait Domain: Send + Sync {
    /// Unique name, checked when restoring persisted populations
    fn name(&self) -> &str;

    /// Version string of the genome encoding
    fn version(&self) -> &str {
        "1.0"
    }

    /// Genome length in bytes
    fn genome_size(&self) -> usize;

    /// Fill `genome` with a random valid candidate
    fn random_init(&self, genome: &mut Genome, rng: &mut dyn RngCore) {
        genome.randomize(rng);
    }

    /// Perturb `genome` in place; returns the number of units changed
    fn mutate(&self, genome: &mut Genome, rate: f64, rng: &mut dyn RngCore) -> Result<usize> {
        operators::mutate(genome, rate, rng)
    }

    /// Produce two children from two parents
    fn crossover(&self, parent1: &Genome, parent2: &Genome, rng: &mut dyn RngCore) -> (Genome, Genome) {
        operators::crossover(parent1, parent2, rng)
    }

    /// Dissimilarity of two genomes in `[0, 1]`
    fn diversity(&self, a: &Genome, b: &Genome) -> f64 {
        1.0 - byte_similarity(a.as_bytes(), b.as_bytes())
    }

    /// Score a genome; higher is better
    fn fitness(&self, genome: &Genome) -> f64;

    /// Text encoding of a genome
    fn serialize(&self, genome: &Genome) -> String {
        to_hex(genome.as_bytes())
    }

    fn deserialize(&self, text: &str) -> Result<Genome> {
        let bytes = from_hex(text)?;
        if bytes.len() != self.genome_size() {
            return Err(EvoError::GenomeInvalid(format!(
                "expected {} bytes for domain '{}', got {}",
                self.genome_size(),
                self.name(),
                bytes.len()
            )));
        }
        Ok(Genome::from_bytes(&bytes))
    }
}

/// A byte-string domain whose fitness is a closure.
pub struct ByteDomain<F> {
    name: String,
    genome_size: usize,
    fitness_fn: F,
}

impl<F> ByteDomain<F>
where
    F: Fn(&[u8]) -> f64 + Send + Sync,
{
    pub fn new(name: impl Into<String>, genome_size: usize, fitness_fn: F) -> Self {
        Self {
            name: name.into(),
            genome_size,
            fitness_fn,
        }
    }
}

impl<F> Domain for ByteDomain<F>
where
    F: Fn(&[u8]) -> f64 + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn genome_size(&self) -> usize {
        self.genome_size
    }

    fn fitness(&self, genome: &Genome) -> f64 {
        (self.fitness_fn)(genome.as_bytes())
    }
}

impl<F> fmt::Debug for ByteDomain<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteDomain")
            .field("name", &self.name)
            .field("genome_size", &self.genome_size)
            .finish()
    }
}

/// Name-indexed set of domains.
#[derive(Default)]
pub struct DomainRegistry {
    domains: HashMap<String, Arc<dyn Domain>>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails if a domain with the same name is already registered.
    pub fn register(&mut self, domain: Arc<dyn Domain>) -> Result<()> {
        let name = domain.name().to_string();
        if self.domains.contains_key(&name) {
            return Err(EvoError::invalid(format!("domain '{}' already registered", name)));
        }
        self.domains.insert(name, domain);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Domain>> {
        self.domains.get(name).cloned()
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Domain>> {
        self.domains.remove(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.domains.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub(crate) fn from_hex(text: &str) -> Result<Vec<u8>> {
    let text = text.trim();
    if text.len() % 2 != 0 {
        return Err(EvoError::GenomeInvalid("odd-length hex string".to_string()));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| EvoError::GenomeInvalid(format!("invalid hex at offset {}", i)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ones_domain() -> ByteDomain<impl Fn(&[u8]) -> f64 + Send + Sync> {
        ByteDomain::new("ones", 8, |bytes: &[u8]| {
            bytes.iter().map(|b| b.count_ones() as f64).sum::<f64>()
        })
    }

    #[test]
    fn test_default_operations() {
        let domain = ones_domain();
        let mut rng = StdRng::seed_from_u64(3);
        let mut g = Genome::with_capacity(domain.genome_size()).unwrap();
        domain.random_init(&mut g, &mut rng);
        assert_eq!(g.size(), 8);

        assert_eq!(domain.diversity(&g, &g), 0.0);
        let full = Genome::from_bytes(&[255; 8]);
        assert_eq!(domain.fitness(&full), 64.0);
    }

    #[test]
    fn test_serialize_roundtrip_and_validation() {
        let domain = ones_domain();
        let g = Genome::from_bytes(&[0, 1, 2, 0xab, 0xcd, 0xef, 0x10, 0xff]);
        let text = domain.serialize(&g);
        assert_eq!(text, "000102abcdef10ff");
        assert_eq!(domain.deserialize(&text).unwrap(), g);

        assert!(domain.deserialize("0001").is_err());
        assert!(domain.deserialize("zz").is_err());
        assert!(domain.deserialize("abc").is_err());
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = DomainRegistry::new();
        registry.register(Arc::new(ones_domain())).unwrap();
        assert!(registry.register(Arc::new(ones_domain())).is_err());
        assert!(registry.get("ones").is_some());
        assert_eq!(registry.names(), vec!["ones"]);
        assert!(registry.unregister("ones").is_some());
        assert!(registry.is_empty());
    }
}
