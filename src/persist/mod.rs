//! Save and load for genomes, populations, meta-populations and checkpoints.
//!
//! Two formats are supported: pretty JSON, and a bincode payload inside a
//! little-endian frame carrying a CRC-32 of that payload. Loading detects the format from the
//! leading magic bytes, so callers never have to say which one a file uses.

pub mod checkpoint;
pub mod codec;
pub mod manager;

pub use checkpoint::Checkpoint;
pub use manager::CheckpointManager;

use crate::engines::generation::domain::Domain;
use crate::engines::generation::genome::Genome;
use crate::engines::generation::population::Population;
use crate::error::{EvoError, Result};
use crate::meta::MetaPopulation;
use bincode::config;
use codec::{decode_frame, encode_frame, RecordKind, MAGIC};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Json,
    Binary,
}

impl Format {
    /// Binary when the bytes start with the frame magic, JSON otherwise.
    pub fn detect(bytes: &[u8]) -> Format {
        if bytes.starts_with(&MAGIC) {
            Format::Binary
        } else {
            Format::Json
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Binary => "bin",
        }
    }

    pub fn from_path(path: &Path) -> Option<Format> {
        match path.extension()?.to_str()? {
            "json" => Some(Format::Json),
            "bin" => Some(Format::Binary),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = EvoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "bin" | "binary" => Ok(Format::Binary),
            other => Err(EvoError::invalid(format!("unknown persistence format '{}'", other))),
        }
    }
}

pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => EvoError::FileNotFound(path.to_path_buf()),
        _ => EvoError::FileRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })
}

pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).map_err(|e| EvoError::FileWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub(crate) fn encode<T: Serialize>(value: &T, kind: RecordKind, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => Ok(serde_json::to_vec_pretty(value)?),
        Format::Binary => {
            let payload = bincode::serde::encode_to_vec(value, config::standard())?;
            Ok(encode_frame(kind, &payload))
        }
    }
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8], kind: RecordKind) -> Result<T> {
    match Format::detect(bytes) {
        Format::Json => Ok(serde_json::from_slice(bytes)?),
        Format::Binary => {
            let payload = decode_frame(bytes, kind)?;
            let (value, read): (T, usize) = bincode::serde::decode_from_slice(payload, config::standard())?;
            if read != payload.len() {
                return Err(EvoError::Corrupt(format!("{} trailing bytes", payload.len() - read)));
            }
            Ok(value)
        }
    }
}

fn check_domain(saved: &str, domain: &dyn Domain) -> Result<()> {
    if saved != domain.name() {
        return Err(EvoError::invalid(format!(
            "data was saved for domain '{}', not '{}'",
            saved,
            domain.name()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Genome

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GenomeDoc {
    domain: String,
    genome: String,
}

pub fn encode_genome(genome: &Genome, domain: &dyn Domain, format: Format) -> Result<Vec<u8>> {
    let doc = GenomeDoc {
        domain: domain.name().to_string(),
        genome: domain.serialize(genome),
    };
    encode(&doc, RecordKind::Genome, format)
}

pub fn decode_genome(bytes: &[u8], domain: &dyn Domain) -> Result<Genome> {
    let doc: GenomeDoc = decode(bytes, RecordKind::Genome)?;
    check_domain(&doc.domain, domain)?;
    domain.deserialize(&doc.genome)
}

pub fn save_genome(genome: &Genome, domain: &dyn Domain, path: &Path, format: Format) -> Result<()> {
    write_file(path, &encode_genome(genome, domain, format)?)
}

pub fn load_genome(path: &Path, domain: &dyn Domain) -> Result<Genome> {
    decode_genome(&read_file(path)?, domain)
}

// ---------------------------------------------------------------------------
// Population

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualRecord {
    /// Domain text form of the genome.
    pub genome: String,
    pub fitness: Option<f64>,
}

/// Domain-tagged, text-encoded copy of a population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub domain: String,
    pub domain_version: String,
    pub generation: usize,
    pub capacity: usize,
    pub individuals: Vec<IndividualRecord>,
}

impl PopulationSnapshot {
    pub fn capture(population: &Population, domain: &dyn Domain) -> Self {
        Self {
            domain: domain.name().to_string(),
            domain_version: domain.version().to_string(),
            generation: population.generation(),
            capacity: population.capacity(),
            individuals: population
                .iter()
                .map(|ind| IndividualRecord {
                    genome: domain.serialize(&ind.genome),
                    fitness: ind.fitness,
                })
                .collect(),
        }
    }

    /// Rebuilds the population, refusing snapshots of another domain.
    pub fn restore(&self, domain: &dyn Domain) -> Result<Population> {
        check_domain(&self.domain, domain)?;
        let mut population = Population::new(self.capacity)?;
        population.set_generation(self.generation);
        for record in &self.individuals {
            let genome = domain.deserialize(&record.genome)?;
            population.add(&genome, record.fitness)?;
        }
        Ok(population)
    }
}

pub fn encode_population(population: &Population, domain: &dyn Domain, format: Format) -> Result<Vec<u8>> {
    let snapshot = PopulationSnapshot::capture(population, domain);
    encode(&snapshot, RecordKind::Population, format)
}

pub fn decode_population(bytes: &[u8], domain: &dyn Domain) -> Result<Population> {
    let snapshot: PopulationSnapshot = decode(bytes, RecordKind::Population)?;
    snapshot.restore(domain)
}

pub fn save_population(population: &Population, domain: &dyn Domain, path: &Path, format: Format) -> Result<()> {
    write_file(path, &encode_population(population, domain, format)?)
}

pub fn load_population(path: &Path, domain: &dyn Domain) -> Result<Population> {
    decode_population(&read_file(path)?, domain)
}

// ---------------------------------------------------------------------------
// MetaPopulation

pub fn encode_meta_population(meta: &MetaPopulation, format: Format) -> Result<Vec<u8>> {
    encode(meta, RecordKind::MetaPopulation, format)
}

pub fn decode_meta_population(bytes: &[u8]) -> Result<MetaPopulation> {
    let meta: MetaPopulation = decode(bytes, RecordKind::MetaPopulation)?;
    if meta.is_empty() {
        return Err(EvoError::Corrupt("meta-population has no individuals".to_string()));
    }
    Ok(meta)
}

pub fn save_meta_population(meta: &MetaPopulation, path: &Path, format: Format) -> Result<()> {
    write_file(path, &encode_meta_population(meta, format)?)
}

pub fn load_meta_population(path: &Path) -> Result<MetaPopulation> {
    decode_meta_population(&read_file(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::domain::ByteDomain;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn domain(name: &str) -> ByteDomain<impl Fn(&[u8]) -> f64 + Send + Sync> {
        ByteDomain::new(name, 4, |bytes: &[u8]| bytes.iter().map(|&b| b as f64).sum::<f64>())
    }

    fn sample_population() -> Population {
        let mut pop = Population::new(5).unwrap();
        pop.set_generation(7);
        pop.add(&Genome::from_bytes(&[1, 2, 3, 4]), Some(10.0)).unwrap();
        pop.add(&Genome::from_bytes(&[9, 9, 9, 9]), None).unwrap();
        pop
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(Format::detect(b"AEVO\x01\x00"), Format::Binary);
        assert_eq!(Format::detect(b"{\"domain\":1}"), Format::Json);
        assert_eq!(Format::from_path(Path::new("a/checkpoint_00000001.bin")), Some(Format::Binary));
        assert_eq!(Format::from_path(Path::new("notes.txt")), None);
        assert_eq!("binary".parse::<Format>().unwrap(), Format::Binary);
    }

    #[test]
    fn test_population_in_both_formats() {
        let d = domain("bytes");
        let pop = sample_population();
        for format in [Format::Json, Format::Binary] {
            let bytes = encode_population(&pop, &d, format).unwrap();
            let back = decode_population(&bytes, &d).unwrap();
            assert_eq!(back.generation(), 7);
            assert_eq!(back.capacity(), 5);
            assert_eq!(back.individuals(), pop.individuals());
        }
    }

    #[test]
    fn test_population_wrong_domain() {
        let bytes = encode_population(&sample_population(), &domain("bytes"), Format::Binary).unwrap();
        assert!(matches!(
            decode_population(&bytes, &domain("other")),
            Err(EvoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_corrupt_binary_population() {
        let d = domain("bytes");
        let mut bytes = encode_population(&sample_population(), &d, Format::Binary).unwrap();
        let mid = codec::HEADER_LEN + 3;
        bytes[mid] ^= 0xFF;
        assert!(matches!(decode_population(&bytes, &d), Err(EvoError::Corrupt(_))));
    }

    #[test]
    fn test_binary_payload_with_trailing_bytes() {
        let doc = GenomeDoc {
            domain: "bytes".to_string(),
            genome: "01020304".to_string(),
        };
        let mut payload = bincode::serde::encode_to_vec(&doc, config::standard()).unwrap();
        payload.extend_from_slice(&[0, 0]);
        let framed = encode_frame(RecordKind::Genome, &payload);
        assert!(matches!(decode_genome(&framed, &domain("bytes")), Err(EvoError::Corrupt(_))));
    }

    #[test]
    fn test_meta_population_binary_keeps_history() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut meta = MetaPopulation::new(4, &mut rng).unwrap();
        meta.record_fitness(1, 3.5).unwrap();
        meta.record_fitness(1, 4.5).unwrap();
        meta.evolve(&mut rng, Some(true)).unwrap();

        let bytes = encode_meta_population(&meta, Format::Binary).unwrap();
        let back = decode_meta_population(&bytes).unwrap();
        assert_eq!(back.generation(), meta.generation());
        assert_eq!(back.best_meta_fitness(), Some(4.5));
        assert_eq!(back.best_params(), meta.best_params());
        assert_eq!(back.individuals(), meta.individuals());
        assert!(back.individuals().iter().any(|i| i.history_len() == 2));
    }

    #[test]
    fn test_genome_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let d = domain("bytes");
        let missing = dir.path().join("missing.json");
        assert!(matches!(load_genome(&missing, &d), Err(EvoError::FileNotFound(_))));

        let path = dir.path().join("g.bin");
        save_genome(&Genome::from_bytes(&[5, 6, 7, 8]), &d, &path, Format::Binary).unwrap();
        assert_eq!(load_genome(&path, &d).unwrap().as_bytes(), &[5, 6, 7, 8]);

        let bad_dir = dir.path().join("no_such_dir").join("g.json");
        assert!(matches!(
            save_genome(&Genome::from_bytes(&[1, 2, 3, 4]), &d, &bad_dir, Format::Json),
            Err(EvoError::FileWrite { .. })
        ));
    }
}
