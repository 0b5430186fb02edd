// ========================================================================================
//
//               Geno/Info subject genotype source
//
// ========================================================================================
//
// Reads the paired-file format produced by SNPextractor-style tooling: an info file
// describing each variant (ID, CHROM, POS and the REF/ALT alleles) and a geno matrix
// with one row per subject and one column per variant. A matrix cell is either a
// numeric ALT-allele dosage (fractional for imputed data) or a textual hard call such
// as `A:G` or `A/G`.

use crate::data::{IngestionError, read_matrix, read_table, resolve_site};
use crate::types::{Cohort, Genotype, SubjectGenotypes};
use ahash::AHashMap;
use indexmap::IndexMap;
use std::path::Path;

struct VariantInfo {
    id: String,
    chrom: String,
    pos: u32,
    reference: Option<String>,
    alternate: Option<String>,
}

fn read_variant_info(path: &Path) -> Result<AHashMap<String, VariantInfo>, IngestionError> {
    let records = read_table(path)?;
    let mut variants = AHashMap::with_capacity(records.len());
    for record in &records {
        let Some(id) = record.get("ID") else {
            return Err(IngestionError::MissingField {
                source_name: record.source().to_string(),
                field: "ID".to_string(),
            });
        };
        let Some((chrom, pos)) = resolve_site(record, "")? else {
            return Err(IngestionError::MissingField {
                source_name: record.source().to_string(),
                field: "CHROM/POS".to_string(),
            });
        };
        variants.insert(
            id.to_string(),
            VariantInfo {
                id: id.to_string(),
                chrom,
                pos,
                reference: record.get("REF").map(str::to_string),
                alternate: record.get("ALT").map(str::to_string),
            },
        );
    }
    Ok(variants)
}

fn parse_cell(variant: &VariantInfo, cell: &str) -> Result<Option<Genotype>, IngestionError> {
    if let Ok(dosage) = cell.parse::<f64>() {
        let (Some(reference), Some(alternate)) = (&variant.reference, &variant.alternate) else {
            return Err(IngestionError::MissingAlleles {
                id: variant.id.clone(),
            });
        };
        let alt = dosage.clamp(0.0, 2.0);
        return Ok(Some(Genotype::from_dosages(
            variant.id.clone(),
            variant.chrom.clone(),
            variant.pos,
            vec![(reference.clone(), 2.0 - alt), (alternate.clone(), alt)],
        )));
    }

    let symbols: Vec<String> = cell
        .split(['/', ':'])
        .filter(|part| !part.is_empty() && *part != ".")
        .map(str::to_string)
        .collect();
    if symbols.is_empty() {
        return Ok(None);
    }
    Ok(Some(Genotype::from_call(
        variant.id.clone(),
        variant.chrom.clone(),
        variant.pos,
        symbols,
    )))
}

/// Reads a geno/info file pair into a cohort. Every variant column of the geno
/// matrix must be described by the info file; an unknown column is a hard error
/// rather than a silently unscoreable variant.
pub fn read_cohort(geno: &Path, info: &Path) -> Result<Cohort, IngestionError> {
    let variants = read_variant_info(info)?;
    let (headers, rows) = read_matrix(geno)?;
    let geno_name = geno
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| geno.display().to_string());

    // The first column holds the subject identifier; every remaining column
    // must name a known variant.
    let mut columns: Vec<&VariantInfo> = Vec::with_capacity(headers.len().saturating_sub(1));
    for column in headers.iter().skip(1) {
        match variants.get(column) {
            Some(variant) => columns.push(variant),
            None => {
                return Err(IngestionError::UnknownVariant {
                    column: column.clone(),
                    source_name: geno_name,
                });
            }
        }
    }

    let mut subjects: IndexMap<String, SubjectGenotypes> = IndexMap::new();
    for row in &rows {
        let Some(subject_id) = row.first().map(|cell| cell.trim()).filter(|id| !id.is_empty())
        else {
            continue;
        };
        let mut genotypes: SubjectGenotypes = IndexMap::new();
        for (variant, cell) in columns.iter().zip(row.iter().skip(1)) {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            if let Some(genotype) = parse_cell(variant, cell)? {
                genotypes.insert(variant.id.clone(), genotype);
            }
        }
        subjects.insert(subject_id.to_string(), genotypes);
    }
    Ok(Cohort { subjects })
}
