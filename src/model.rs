// ========================================================================================
//
//                       Risk Score Models and Scoring Policies
//
// ========================================================================================
//
// A risk score model is compiled once from its weights file(s) and is read-only from
// then on; scoring one subject is a pure function of (model, subject data), so a cohort
// can be scored in parallel with nothing but shared read access.

use crate::data::{IngestionError, RawRecord, read_risk_entries};
use crate::tree::WeightTree;
use crate::types::{AlleleKey, LocusKey, RiskEntry, SubjectGenotypes};
use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;
use log::{debug, warn};

/// The published scoring method a model follows. The method owns the two points
/// where the published models differ: the denominator transform applied at
/// construction and the tree-matching combination rule applied per subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Plain nested lookup; the denominator is left untouched.
    Generic,
    /// Oram et al. 2016 (doi:10.2337/dc15-1111): the denominator becomes
    /// 2 * (N + 1); matching takes the single highest-ranked chain.
    Oram2016,
    /// Sharp et al. 2019 (doi:10.2337/dc18-1785): the denominator is fixed at
    /// 1; matching sums at most the first two collected chain weights when no
    /// full genotype chain matches.
    Sharp2019,
}

impl Method {
    fn effective_denominator(self, n: f64) -> f64 {
        match self {
            Method::Generic => n,
            Method::Oram2016 => 2.0 * (n + 1.0),
            Method::Sharp2019 => 1.0,
        }
    }

    fn uses_allele_chains(self) -> bool {
        matches!(self, Method::Sharp2019)
    }
}

/// The flat single-locus model: a weighted sum over allele dosages divided by a
/// denominator.
#[derive(Debug)]
pub struct RiskScore {
    risks: Vec<RiskEntry>,
    beta: IndexMap<AlleleKey, f64>,
    n: f64,
}

impl RiskScore {
    /// Builds the model from raw weight records. The denominator defaults to
    /// the number of weight entries; an explicit override replaces it and must
    /// be positive. When `known_loci` is given, every entry absent from it is
    /// reported as a warning; mismatched input files are worth flagging but
    /// not worth aborting a run over.
    pub fn from_records(
        records: &[RawRecord],
        n_override: Option<f64>,
        known_loci: Option<&AHashSet<AlleleKey>>,
    ) -> Result<Self, IngestionError> {
        Self::new(read_risk_entries(records)?, n_override, known_loci)
    }

    pub fn new(
        risks: Vec<RiskEntry>,
        n_override: Option<f64>,
        known_loci: Option<&AHashSet<AlleleKey>>,
    ) -> Result<Self, IngestionError> {
        let n = n_override.unwrap_or(risks.len() as f64);
        if n <= 0.0 {
            return Err(IngestionError::InvalidDenominator { value: n });
        }
        debug!("RiskScore: setting N={n}");

        // Duplicate identities collapse, last-in-file wins; insertion order is
        // kept so scoring sums in a reproducible order.
        let mut beta = IndexMap::with_capacity(risks.len());
        for risk in &risks {
            beta.insert(risk.key.clone(), risk.beta);
        }

        if let Some(known) = known_loci {
            for risk in &risks {
                if !known.contains(&risk.key) {
                    warn!(
                        "Weighted allele '{}' not found in subject data. Did you provide the correct subject variants?",
                        risk.key
                    );
                }
            }
        }

        Ok(Self { risks, beta, n })
    }

    pub fn risks(&self) -> &[RiskEntry] {
        &self.risks
    }

    pub fn denominator(&self) -> f64 {
        self.n
    }

    /// The weighted sum of the subject's dosages over every weighted allele,
    /// divided by the denominator. Loci the subject does not carry contribute
    /// nothing. Pure: repeated calls with the same input give the same result.
    pub fn calc(&self, subject: &SubjectGenotypes) -> f64 {
        let dosages = allele_dosages(subject);
        let mut wsum = 0.0;
        for (key, weight) in &self.beta {
            if let Some(dosage) = dosages.get(key) {
                wsum += weight * dosage;
                debug!("calc: '{key}' found; weight = {weight}, dosage = {dosage}");
            }
        }
        wsum / self.n
    }
}

/// A model with a multi-locus component on top of the flat sum.
#[derive(Debug)]
pub struct MultiRiskScore {
    linear: RiskScore,
    tree: WeightTree,
    method: Method,
}

impl MultiRiskScore {
    pub fn from_records(
        risks: &[RawRecord],
        multirisks: &[RawRecord],
        method: Method,
        n_override: Option<f64>,
        known_loci: Option<&AHashSet<AlleleKey>>,
    ) -> Result<Self, IngestionError> {
        let mut linear = RiskScore::from_records(risks, n_override, known_loci)?;
        linear.n = method.effective_denominator(linear.n);
        let mut tree = WeightTree::from_genotype_records(multirisks)?;
        if method.uses_allele_chains() {
            tree.overlay_allele_records(multirisks)?;
        }
        Ok(Self {
            linear,
            tree,
            method,
        })
    }

    pub fn linear(&self) -> &RiskScore {
        &self.linear
    }

    /// Total score: the linear part plus the multi-locus contribution, both
    /// over the method's effective denominator. A subject matching no defined
    /// combination simply receives no multi-locus contribution.
    pub fn calc(&self, subject: &SubjectGenotypes) -> f64 {
        let wsum = self.linear.calc(subject);
        let candidates = genotype_candidates(subject);
        let multi = match self.method {
            Method::Generic | Method::Oram2016 => self.tree.find(&candidates).unwrap_or(0.0),
            Method::Sharp2019 => {
                // Interaction weight when a haplotype pair matches jointly,
                // otherwise the two independent single-haplotype weights.
                let alleles = subject_alleles(subject);
                self.tree
                    .collect(&candidates, &alleles)
                    .iter()
                    .take(2)
                    .sum::<f64>()
            }
        };
        debug!("multi-locus contribution = {multi}");
        wsum + multi / self.linear.n
    }
}

/// Flattens a subject's genotypes into a dosage per observed allele identity.
/// Collisions from different genotypes referencing the same identity are not
/// expected; the last-seen value wins.
pub(crate) fn allele_dosages(subject: &SubjectGenotypes) -> AHashMap<AlleleKey, f64> {
    let mut dosages = AHashMap::new();
    for genotype in subject.values() {
        for (key, dosage) in genotype.allele_keys() {
            dosages.insert(key, dosage);
        }
    }
    dosages
}

/// The subject's full set of genotype identities, each mapped to the ordinal of
/// the variant it came from so tree matching can exclude a consumed variant.
pub(crate) fn genotype_candidates(subject: &SubjectGenotypes) -> AHashMap<LocusKey, usize> {
    let mut candidates = AHashMap::new();
    for (ordinal, genotype) in subject.values().enumerate() {
        for key in genotype.genotype_keys() {
            candidates.insert(LocusKey::Genotype(key), ordinal);
        }
    }
    candidates
}

/// The subject's full set of allele identities, for the allele-keyed walk.
pub(crate) fn subject_alleles(subject: &SubjectGenotypes) -> AHashSet<AlleleKey> {
    let mut alleles = AHashSet::new();
    for genotype in subject.values() {
        for (key, _) in genotype.allele_keys() {
            alleles.insert(key);
        }
    }
    alleles
}
