//! # Weight Data Loading and Normalization
//!
//! This module is the exclusive entry point for user-provided weight data.
//! It reads column-based datafiles (tab-, comma-, semicolon-, or
//! space-separated; the separator is sniffed from the header line), turns each
//! row into a [`RawRecord`] keyed by column name, and normalizes records into
//! canonical [`RiskEntry`] values.
//!
//! - Leading `#` comment lines are skipped; the first remaining line is the
//!   one and only header. Any column name not recognized downstream is simply
//!   carried along and ignored.
//! - Empty cells are treated as absent fields, so `record.get("BETA")` never
//!   yields an empty string.
//! - Failures are assumed to be user-input errors: every variant of
//!   [`IngestionError`] names the offending source file.

use crate::types::{AlleleKey, LocusId, RiskEntry, normalize_chrom_label};
use ahash::AHashMap;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// A comprehensive error type for all ingestion failures. Ingestion errors are
/// fatal: a malformed weight entry is never silently skipped.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse '{path}' as a delimited table: {details}")]
    MalformedTable { path: String, details: String },
    #[error(
        "No column header found in '{path}'. Column-based datafiles must carry exactly one header line naming their columns."
    )]
    MissingHeader { path: String },
    #[error(
        "Each line of '{source_name}' must contain at least a weight value with a recognizable position and allele."
    )]
    UnresolvableLocus { source_name: String },
    #[error(
        "Weights data in '{source_name}' does not follow the expected format: field '{field}' holds '{value}', which is not a number."
    )]
    InvalidNumber {
        source_name: String,
        field: String,
        value: String,
    },
    #[error("ODDSRATIO values in '{source_name}' must be positive to take a natural log, got {value}.")]
    NonPositiveOddsRatio { source_name: String, value: f64 },
    #[error("The denominator for the arithmetic mean must be > 0, got {value}.")]
    InvalidDenominator { value: f64 },
    #[error("A row of '{source_name}' is missing a value for the required '{field}' column.")]
    MissingField { source_name: String, field: String },
    #[error("'{path}', line {line}: {details}")]
    MalformedVcf {
        path: String,
        line: usize,
        details: String,
    },
    #[error("Genotype column '{column}' in '{source_name}' has no matching variant in the info file.")]
    UnknownVariant {
        column: String,
        source_name: String,
    },
    #[error(
        "Variant '{id}' carries a numeric dosage but the info file lists no REF/ALT alleles for it."
    )]
    MissingAlleles { id: String },
}

/// One row of an input table: a mapping from column name to raw value, tagged
/// with the name of the file it came from for diagnostics.
#[derive(Debug, Clone)]
pub struct RawRecord {
    source: Arc<str>,
    values: AHashMap<String, String>,
}

impl RawRecord {
    pub fn new(source: &str) -> Self {
        Self {
            source: Arc::from(source),
            values: AHashMap::new(),
        }
    }

    /// Stores a field value. Empty and whitespace-only values are dropped so
    /// that lookups distinguish "column absent" from "column present" the same
    /// way whether or not the file materialized the cell.
    pub fn insert(&mut self, field: &str, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            self.values.insert(field.to_string(), value.to_string());
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

fn open_table(path: &Path) -> Result<Box<dyn Read>, IngestionError> {
    let file = File::open(path).map_err(|source| IngestionError::Io {
        path: path.display().to_string(),
        source,
    })?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(MultiGzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Picks the column separator by counting candidate bytes in the header line.
/// Ties keep the earlier candidate; space is tried last since it is the most
/// likely to appear incidentally.
pub(crate) fn sniff_delimiter(header: &str) -> u8 {
    let mut best = (b'\t', 0usize);
    for candidate in [b'\t', b',', b';', b' '] {
        let count = header.bytes().filter(|&b| b == candidate).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

/// Reads a delimited file into a header row plus data rows. Shared by the
/// record reader below and the geno-matrix reader, which needs the column
/// order that [`RawRecord`] does not keep.
pub(crate) fn read_matrix(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), IngestionError> {
    let reader = BufReader::new(open_table(path)?);
    let mut content = String::new();
    let mut header_seen = false;
    for line in reader.lines() {
        let line = line.map_err(|source| IngestionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if !header_seen {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            header_seen = true;
        }
        content.push_str(&line);
        content.push('\n');
    }
    if !header_seen {
        return Err(IngestionError::MissingHeader {
            path: path.display().to_string(),
        });
    }

    let delimiter = sniff_delimiter(content.lines().next().unwrap_or_default());
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| IngestionError::MalformedTable {
            path: path.display().to_string(),
            details: err.to_string(),
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    let headers = rows.remove(0);
    Ok((headers, rows))
}

/// Reads a column-based datafile into raw records, one per data row.
pub fn read_table(path: &Path) -> Result<Vec<RawRecord>, IngestionError> {
    let (headers, rows) = read_matrix(path)?;
    let name = source_name(path);
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let mut record = RawRecord::new(&name);
        for (header, value) in headers.iter().zip(&row) {
            record.insert(header, value);
        }
        records.push(record);
    }
    Ok(records)
}

pub(crate) fn parse_number(record: &RawRecord, field: &str) -> Result<Option<f64>, IngestionError> {
    match record.get(field) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<f64>()
            .map(Some)
            .map_err(|_| IngestionError::InvalidNumber {
                source_name: record.source().to_string(),
                field: field.to_string(),
                value: raw.to_string(),
            }),
    }
}

/// Resolves the effect size of a record: `BETA` is used unmodified and takes
/// precedence over `ODDSRATIO`, whose natural logarithm is used otherwise. A
/// record with neither carries no effect (ln 1 = 0).
pub fn resolve_beta(record: &RawRecord) -> Result<f64, IngestionError> {
    if let Some(beta) = parse_number(record, "BETA")? {
        return Ok(beta);
    }
    match parse_number(record, "ODDSRATIO")? {
        Some(ratio) if ratio > 0.0 => Ok(ratio.ln()),
        Some(ratio) => Err(IngestionError::NonPositiveOddsRatio {
            source_name: record.source().to_string(),
            value: ratio,
        }),
        None => Ok(0.0),
    }
}

/// Resolves chromosome and position from `CHROM{suffix}`/`POS{suffix}`, falling
/// back to splitting `POSID{suffix}`. The position component of a POSID may be
/// separated by either `:` or `_`.
pub(crate) fn resolve_site(
    record: &RawRecord,
    suffix: &str,
) -> Result<Option<(String, u32)>, IngestionError> {
    let posid = record.get(&format!("POSID{suffix}"));
    let chrom = record
        .get(&format!("CHROM{suffix}"))
        .or_else(|| posid.and_then(|p| p.split(':').next()))
        .filter(|part| !part.is_empty());
    let pos_field = format!("POS{suffix}");
    let pos = record
        .get(&pos_field)
        .or_else(|| posid.and_then(|p| p.split([':', '_']).nth(1)))
        .filter(|part| !part.is_empty());

    let (Some(chrom), Some(pos)) = (chrom, pos) else {
        return Ok(None);
    };
    let pos: u32 = pos.parse().map_err(|_| IngestionError::InvalidNumber {
        source_name: record.source().to_string(),
        field: pos_field,
        value: pos.to_string(),
    })?;
    Ok(Some((normalize_chrom_label(chrom), pos)))
}

/// Resolves a locus anchor: a genomic site when chromosome and position are
/// available, otherwise the `ID{suffix}` variant name, otherwise nothing.
pub(crate) fn resolve_locus(
    record: &RawRecord,
    suffix: &str,
) -> Result<Option<LocusId>, IngestionError> {
    if let Some((chrom, pos)) = resolve_site(record, suffix)? {
        return Ok(Some(LocusId::Site { chrom, pos }));
    }
    Ok(record
        .get(&format!("ID{suffix}"))
        .map(|id| LocusId::Name(id.to_string())))
}

/// Normalizes one single-locus weight record into a canonical risk entry.
/// Single-locus entries must resolve to a genomic site and an allele symbol;
/// anything less is a fatal ingestion error naming the source file. No
/// biological plausibility check is made on the allele symbol.
pub fn read_risk_entry(record: &RawRecord) -> Result<RiskEntry, IngestionError> {
    let Some((chrom, pos)) = resolve_site(record, "")? else {
        return Err(IngestionError::UnresolvableLocus {
            source_name: record.source().to_string(),
        });
    };
    let Some(allele) = record.get("ALLELE") else {
        return Err(IngestionError::UnresolvableLocus {
            source_name: record.source().to_string(),
        });
    };
    let beta = resolve_beta(record)?;
    Ok(RiskEntry {
        key: AlleleKey::new(LocusId::Site { chrom, pos }, allele),
        beta,
    })
}

pub fn read_risk_entries(records: &[RawRecord]) -> Result<Vec<RiskEntry>, IngestionError> {
    records.iter().map(read_risk_entry).collect()
}
