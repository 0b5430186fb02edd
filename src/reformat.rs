// ========================================================================================
//
//               PGS Catalog score file adaptation
//
// ========================================================================================
//
// Scoring files downloaded from the PGS Catalog (https://www.pgscatalog.org/) name
// their columns per the catalog schema. This adapter renames the relevant columns
// into the canonical weight-record shape; everything downstream of it is the
// ordinary single-locus ingestion path.

use crate::data::RawRecord;

const COLUMN_MAP: [(&str, &str); 5] = [
    ("rsID", "RSID"),
    ("chr_name", "CHROM"),
    ("chr_position", "POS"),
    ("effect_allele", "ALLELE"),
    ("effect_weight", "BETA"),
];

/// Maps catalog-format records onto canonical weight records. Field renaming
/// only; unresolvable rows are left for the normalizer to reject with a proper
/// diagnostic.
pub fn adapt_catalog_records(records: &[RawRecord]) -> Vec<RawRecord> {
    records
        .iter()
        .map(|record| {
            let mut adapted = RawRecord::new(record.source());
            for (catalog, canonical) in COLUMN_MAP {
                if let Some(value) = record.get(catalog) {
                    adapted.insert(canonical, value);
                }
            }
            adapted
        })
        .collect()
}
