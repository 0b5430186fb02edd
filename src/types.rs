// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are
// used in one file.

use indexmap::IndexMap;
use itertools::Itertools;
use std::fmt;

/// Normalizes a chromosome label so that the same chromosome spelled differently in
/// different input files still compares equal: a leading `chr` prefix is stripped and
/// the sex/mitochondrial labels are upper-cased. Anything else (including contig names
/// like `6_cox_hap2`) is kept verbatim.
pub fn normalize_chrom_label(label: &str) -> String {
    let mut trimmed = label.trim();

    if trimmed.len() >= 3 && trimmed[..3].eq_ignore_ascii_case("chr") {
        trimmed = &trimmed[3..];
    }

    if trimmed.eq_ignore_ascii_case("X") {
        return "X".to_string();
    }
    if trimmed.eq_ignore_ascii_case("Y") {
        return "Y".to_string();
    }
    if trimmed.eq_ignore_ascii_case("MT") {
        return "MT".to_string();
    }

    trimmed.to_string()
}

/// The anchor of a locus identity: a genomic site when chromosome and position are
/// known, or a bare variant name (e.g. an rsID) when the weights file identifies loci
/// by name only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocusId {
    Site { chrom: String, pos: u32 },
    Name(String),
}

impl fmt::Display for LocusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocusId::Site { chrom, pos } => write!(f, "{chrom}:{pos}"),
            LocusId::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Identity of one weighted allele. Two keys are equal iff anchor and allele symbol
/// both match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlleleKey {
    pub locus: LocusId,
    pub allele: String,
}

impl AlleleKey {
    pub fn new(locus: LocusId, allele: &str) -> Self {
        Self {
            locus,
            allele: allele.to_string(),
        }
    }
}

impl fmt::Display for AlleleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.locus, self.allele)
    }
}

/// Identity of one genotype call. The allele symbols are stored sorted so that the
/// unphased calls `A:T` and `T:A` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenotypeKey {
    pub locus: LocusId,
    alleles: Vec<String>,
}

impl GenotypeKey {
    pub fn new(locus: LocusId, mut alleles: Vec<String>) -> Self {
        alleles.sort();
        Self { locus, alleles }
    }

    pub fn alleles(&self) -> &[String] {
        &self.alleles
    }
}

impl fmt::Display for GenotypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.locus, self.alleles.iter().join(":"))
    }
}

/// A key in the multi-locus weight tree. The Sharp-style tree mixes genotype-keyed
/// and allele-keyed chains in one structure, so the node mapping is keyed by this
/// discriminated type rather than by either identity alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocusKey {
    Allele(AlleleKey),
    Genotype(GenotypeKey),
}

impl fmt::Display for LocusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocusKey::Allele(key) => write!(f, "{key}"),
            LocusKey::Genotype(key) => write!(f, "{key}"),
        }
    }
}

/// One canonical weight entry: a fully resolved allele identity and its effect size.
#[derive(Debug, Clone)]
pub struct RiskEntry {
    pub key: AlleleKey,
    pub beta: f64,
}

/// One observed genotype for one subject at one variant.
///
/// `dosages` carries the expected dosage of each distinct allele symbol (fractional
/// for imputed data); `call` is the hard genotype call used for genotype-identity
/// matching, with one entry per chromosome copy.
#[derive(Debug, Clone)]
pub struct Genotype {
    pub id: String,
    pub chrom: String,
    pub pos: u32,
    call: Vec<String>,
    dosages: Vec<(String, f64)>,
}

impl Genotype {
    /// Builds a genotype from a hard call. Each allele's dosage is its count in the
    /// call, so `A/A` yields a single `A` entry with dosage 2.
    pub fn from_call(id: String, chrom: String, pos: u32, call: Vec<String>) -> Self {
        let mut dosages: IndexMap<String, f64> = IndexMap::new();
        for symbol in &call {
            *dosages.entry(symbol.clone()).or_insert(0.0) += 1.0;
        }
        let mut call = call;
        call.sort();
        Self {
            id,
            chrom,
            pos,
            call,
            dosages: dosages.into_iter().collect(),
        }
    }

    /// Builds a genotype from per-allele expected dosages. The hard call is derived
    /// by rounding each dosage to its nearest copy count.
    pub fn from_dosages(id: String, chrom: String, pos: u32, dosages: Vec<(String, f64)>) -> Self {
        let mut call = Vec::new();
        for (symbol, dosage) in &dosages {
            for _ in 0..dosage.round().max(0.0) as usize {
                call.push(symbol.clone());
            }
        }
        call.sort();
        Self {
            id,
            chrom,
            pos,
            call,
            dosages,
        }
    }

    pub fn call(&self) -> &[String] {
        &self.call
    }

    pub fn dosages(&self) -> impl Iterator<Item = (&str, f64)> {
        self.dosages
            .iter()
            .map(|(symbol, dosage)| (symbol.as_str(), *dosage))
    }

    fn site(&self) -> LocusId {
        LocusId::Site {
            chrom: self.chrom.clone(),
            pos: self.pos,
        }
    }

    /// The genotype identities this observation can satisfy. Weights files anchor
    /// loci either by genomic site or by variant name, so both forms are offered;
    /// they refer to the same underlying variant and are excluded together during
    /// tree matching.
    pub fn genotype_keys(&self) -> [GenotypeKey; 2] {
        [
            GenotypeKey::new(self.site(), self.call.clone()),
            GenotypeKey::new(LocusId::Name(self.id.clone()), self.call.clone()),
        ]
    }

    /// Every allele identity observed here with its dosage, in both anchor forms.
    pub fn allele_keys(&self) -> Vec<(AlleleKey, f64)> {
        let mut keys = Vec::with_capacity(self.dosages.len() * 2);
        for (symbol, dosage) in &self.dosages {
            keys.push((AlleleKey::new(self.site(), symbol), *dosage));
            keys.push((AlleleKey::new(LocusId::Name(self.id.clone()), symbol), *dosage));
        }
        keys
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.id, self.call.iter().join("/"))
    }
}

/// All genotypes observed for one subject, keyed by variant identifier in input
/// order.
pub type SubjectGenotypes = IndexMap<String, Genotype>;

/// A scored population: subject identifier to that subject's genotypes, in input
/// order so that output order is reproducible.
#[derive(Debug, Default)]
pub struct Cohort {
    pub subjects: IndexMap<String, SubjectGenotypes>,
}

impl Cohort {
    /// Every allele identity observed anywhere in the cohort. Used to warn about
    /// weight entries that cannot possibly match the subject data.
    pub fn known_alleles(&self) -> ahash::AHashSet<AlleleKey> {
        let mut known = ahash::AHashSet::new();
        for genotypes in self.subjects.values() {
            for genotype in genotypes.values() {
                for (key, _) in genotype.allele_keys() {
                    known.insert(key);
                }
            }
        }
        known
    }
}
