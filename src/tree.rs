// ========================================================================================
//
//                       The Multi-Locus Weight Tree
//
// ========================================================================================
//
// Published multi-locus risk models list their haplotype/diplotype combinations in
// priority order with a fallback default, so the weight table is really a decision
// list. This module encodes it as a prefix tree over locus keys: every record folds
// into a chain `key_1 -> key_2 -> ... -> weight`, a shared prefix reuses the existing
// sub-node, and sibling order is exactly record order. That ordering is a load-bearing
// invariant: matching walks siblings in insertion order so that the first-defined
// combination wins whenever several could match a subject at once.

use crate::data::{IngestionError, RawRecord, resolve_beta, resolve_locus};
use crate::types::{AlleleKey, GenotypeKey, LocusKey};
use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

/// One step of reading a record's chain: either a locus key to descend with, or
/// the terminal effect size. Making this a discriminated result (rather than
/// treating a failed key construction as the terminator) keeps "no further key"
/// distinct from "malformed record", which stays a hard error.
pub(crate) enum ChainStep {
    Descend(LocusKey),
    Terminal(f64),
}

fn genotype_step(record: &RawRecord, index: usize) -> Result<ChainStep, IngestionError> {
    let Some(genotype) = record.get(&format!("GENOTYPE_{index}")) else {
        return Ok(ChainStep::Terminal(resolve_beta(record)?));
    };
    let Some(locus) = resolve_locus(record, &format!("_{index}"))? else {
        return Ok(ChainStep::Terminal(resolve_beta(record)?));
    };
    let alleles = genotype.split(':').map(str::to_string).collect();
    Ok(ChainStep::Descend(LocusKey::Genotype(GenotypeKey::new(
        locus, alleles,
    ))))
}

fn allele_step(record: &RawRecord, index: usize) -> Result<ChainStep, IngestionError> {
    let Some(allele) = record.get(&format!("ALLELE_{index}")) else {
        return Ok(ChainStep::Terminal(resolve_beta(record)?));
    };
    let Some(locus) = resolve_locus(record, &format!("_{index}"))? else {
        return Ok(ChainStep::Terminal(resolve_beta(record)?));
    };
    Ok(ChainStep::Descend(LocusKey::Allele(AlleleKey::new(
        locus, allele,
    ))))
}

#[derive(Debug, Default)]
struct Node {
    children: IndexMap<LocusKey, Node>,
    weight: Option<f64>,
}

impl Node {
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// The nested multi-locus weight structure. Built once from the multi-locus
/// weights file and read-only afterwards.
#[derive(Debug, Default)]
pub struct WeightTree {
    root: Node,
}

impl WeightTree {
    /// Builds the tree from genotype-keyed chains (`GENOTYPE_1`, `GENOTYPE_2`,
    /// ...). Records without even a first key are ignored.
    pub fn from_genotype_records(records: &[RawRecord]) -> Result<Self, IngestionError> {
        let mut tree = WeightTree::default();
        for record in records {
            tree.insert_chain(record, genotype_step)?;
        }
        Ok(tree)
    }

    /// Folds allele-keyed chains (`ALLELE_1`, `ALLELE_2`, ...) into an existing
    /// tree. The Sharp-style method reads the same weights file twice, so one
    /// tree ends up holding both key kinds.
    pub fn overlay_allele_records(&mut self, records: &[RawRecord]) -> Result<(), IngestionError> {
        for record in records {
            self.insert_chain(record, allele_step)?;
        }
        Ok(())
    }

    fn insert_chain(
        &mut self,
        record: &RawRecord,
        step: impl Fn(&RawRecord, usize) -> Result<ChainStep, IngestionError>,
    ) -> Result<(), IngestionError> {
        let ChainStep::Descend(first) = step(record, 1)? else {
            // No first-locus key: this record does not participate in this
            // keying of the tree.
            return Ok(());
        };
        let mut node = self.root.children.entry(first).or_insert_with(Node::default);
        let mut index = 2;
        loop {
            match step(record, index)? {
                ChainStep::Descend(key) => {
                    node = node.children.entry(key).or_insert_with(Node::default);
                    index += 1;
                }
                ChainStep::Terminal(beta) => {
                    // A terminal insertion replaces whatever chain previously
                    // continued below this node: last record wins.
                    node.children.clear();
                    node.weight = Some(beta);
                    return Ok(());
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_leaf()
    }

    /// Finds the weight of the highest-ranked chain fully satisfied by the
    /// candidate keys. Candidates map each key to the ordinal of the subject
    /// variant it came from; once a variant is consumed at one chain position,
    /// every key of that variant is excluded further down, so the same
    /// genotype cannot satisfy two positions. A partial prefix match earns
    /// nothing.
    pub fn find(&self, candidates: &AHashMap<LocusKey, usize>) -> Option<f64> {
        Self::find_in(&self.root, &mut candidates.clone())
    }

    fn find_in(node: &Node, candidates: &mut AHashMap<LocusKey, usize>) -> Option<f64> {
        if node.is_leaf() {
            return node.weight;
        }
        for (key, child) in &node.children {
            if let Some(&variant) = candidates.get(key) {
                candidates.retain(|_, v| *v != variant);
                return Self::find_in(child, candidates);
            }
        }
        None
    }

    /// The Sharp-style walk. A full single-chain match (via [`find`]) takes
    /// precedence and is returned alone; otherwise every allele-keyed child
    /// present in the subject's allele set is descended into, without any
    /// exclusion, and the reachable terminal weights are gathered in
    /// insertion order.
    ///
    /// [`find`]: WeightTree::find
    pub fn collect(
        &self,
        genotype_candidates: &AHashMap<LocusKey, usize>,
        alleles: &AHashSet<AlleleKey>,
    ) -> Vec<f64> {
        Self::collect_in(&self.root, genotype_candidates, alleles)
    }

    fn collect_in(
        node: &Node,
        genotype_candidates: &AHashMap<LocusKey, usize>,
        alleles: &AHashSet<AlleleKey>,
    ) -> Vec<f64> {
        if let Some(weight) = Self::find_in(node, &mut genotype_candidates.clone()) {
            return vec![weight];
        }
        if node.is_leaf() {
            return Vec::new();
        }
        let mut weights = Vec::new();
        for (key, child) in &node.children {
            if let LocusKey::Allele(allele) = key {
                if alleles.contains(allele) {
                    weights.extend(Self::collect_in(child, genotype_candidates, alleles));
                }
            }
        }
        weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LocusId;

    fn genotype_record(chain: &[(&str, &str)], beta: &str) -> RawRecord {
        let mut record = RawRecord::new("multi.txt");
        for (index, (id, genotype)) in chain.iter().enumerate() {
            record.insert(&format!("ID_{}", index + 1), id);
            record.insert(&format!("GENOTYPE_{}", index + 1), genotype);
        }
        record.insert("BETA", beta);
        record
    }

    fn allele_record(chain: &[(&str, &str)], beta: &str) -> RawRecord {
        let mut record = RawRecord::new("multi.txt");
        for (index, (id, allele)) in chain.iter().enumerate() {
            record.insert(&format!("ID_{}", index + 1), id);
            record.insert(&format!("ALLELE_{}", index + 1), allele);
        }
        record.insert("BETA", beta);
        record
    }

    fn genotype_key(id: &str, genotype: &str) -> LocusKey {
        LocusKey::Genotype(GenotypeKey::new(
            LocusId::Name(id.to_string()),
            genotype.split(':').map(str::to_string).collect(),
        ))
    }

    fn candidates(keys: &[LocusKey]) -> AHashMap<LocusKey, usize> {
        keys.iter()
            .enumerate()
            .map(|(ordinal, key)| (key.clone(), ordinal))
            .collect()
    }

    fn allele_set(pairs: &[(&str, &str)]) -> AHashSet<AlleleKey> {
        pairs
            .iter()
            .map(|(id, allele)| AlleleKey::new(LocusId::Name(id.to_string()), allele))
            .collect()
    }

    #[test]
    fn a_full_chain_match_returns_its_weight() {
        let records = vec![genotype_record(&[("rs1", "A:A"), ("rs2", "T:C")], "1.0")];
        let tree = WeightTree::from_genotype_records(&records).unwrap();

        let keys = candidates(&[genotype_key("rs1", "A:A"), genotype_key("rs2", "T:C")]);
        assert_eq!(tree.find(&keys), Some(1.0));
    }

    #[test]
    fn a_partial_prefix_match_earns_nothing() {
        let records = vec![genotype_record(&[("rs1", "A:A"), ("rs2", "T:C")], "1.0")];
        let tree = WeightTree::from_genotype_records(&records).unwrap();

        let keys = candidates(&[genotype_key("rs1", "A:A")]);
        assert_eq!(tree.find(&keys), None);
    }

    #[test]
    fn first_defined_sibling_wins() {
        let records = vec![
            genotype_record(&[("rs1", "A:A")], "1.0"),
            genotype_record(&[("rs2", "T:T")], "2.0"),
        ];
        let tree = WeightTree::from_genotype_records(&records).unwrap();

        // Both siblings match; file order decides.
        let keys = candidates(&[genotype_key("rs2", "T:T"), genotype_key("rs1", "A:A")]);
        assert_eq!(tree.find(&keys), Some(1.0));
    }

    #[test]
    fn a_matched_variant_is_excluded_deeper_down() {
        // The chain needs the same genotype twice; a single observation of it
        // must not satisfy both positions.
        let records = vec![genotype_record(&[("rs1", "A:A"), ("rs1", "A:A")], "1.0")];
        let tree = WeightTree::from_genotype_records(&records).unwrap();

        assert_eq!(tree.find(&candidates(&[genotype_key("rs1", "A:A")])), None);
    }

    #[test]
    fn no_candidate_key_means_no_match() {
        let records = vec![genotype_record(&[("rs3", "G:G")], "1.0")];
        let tree = WeightTree::from_genotype_records(&records).unwrap();

        let keys = candidates(&[genotype_key("rs1", "A:A"), genotype_key("rs2", "T:T")]);
        assert_eq!(tree.find(&keys), None);
    }

    #[test]
    fn records_without_a_first_key_are_ignored() {
        let mut record = RawRecord::new("multi.txt");
        record.insert("BETA", "1.0");
        let tree = WeightTree::from_genotype_records(&[record]).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn a_later_terminal_replaces_the_deeper_chain() {
        let records = vec![
            genotype_record(&[("rs1", "A:A"), ("rs2", "T:C")], "1.0"),
            genotype_record(&[("rs1", "A:A")], "2.0"),
        ];
        let tree = WeightTree::from_genotype_records(&records).unwrap();

        let keys = candidates(&[genotype_key("rs1", "A:A"), genotype_key("rs2", "T:C")]);
        assert_eq!(tree.find(&keys), Some(2.0));
    }

    #[test]
    fn collect_prefers_a_full_genotype_chain() {
        let mut records = vec![genotype_record(&[("hla", "DR3:DR4")], "3.0")];
        records.push(allele_record(&[("hla", "DR3")], "1.0"));
        records.push(allele_record(&[("hla", "DR4")], "2.0"));
        let mut tree = WeightTree::from_genotype_records(&records).unwrap();
        tree.overlay_allele_records(&records).unwrap();

        let keys = candidates(&[genotype_key("hla", "DR3:DR4")]);
        let alleles = allele_set(&[("hla", "DR3"), ("hla", "DR4")]);
        assert_eq!(tree.collect(&keys, &alleles), vec![3.0]);
    }

    #[test]
    fn collect_gathers_independent_allele_chains_in_order() {
        let records = vec![
            allele_record(&[("hla", "DR3")], "1.0"),
            allele_record(&[("hla", "DR4")], "2.0"),
            allele_record(&[("hla", "DR9")], "4.0"),
        ];
        let mut tree = WeightTree::from_genotype_records(&records).unwrap();
        tree.overlay_allele_records(&records).unwrap();

        let alleles = allele_set(&[("hla", "DR4"), ("hla", "DR3")]);
        assert_eq!(tree.collect(&candidates(&[]), &alleles), vec![1.0, 2.0]);
    }

    #[test]
    fn collect_descends_multi_level_allele_chains() {
        let records = vec![allele_record(&[("hla", "DR3"), ("hla2", "DQ2")], "5.0")];
        let mut tree = WeightTree::from_genotype_records(&records).unwrap();
        tree.overlay_allele_records(&records).unwrap();

        let both = allele_set(&[("hla", "DR3"), ("hla2", "DQ2")]);
        assert_eq!(tree.collect(&candidates(&[]), &both), vec![5.0]);

        // The deeper key is missing, so the chain yields nothing.
        let first_only = allele_set(&[("hla", "DR3")]);
        assert!(tree.collect(&candidates(&[]), &first_only).is_empty());
    }
}
