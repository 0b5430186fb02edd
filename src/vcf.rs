// ========================================================================================
//
//               VCF subject genotype source
//
// ========================================================================================
//
// Reads a VCFv4.x file (plain or gzip-compressed) into an in-memory cohort. Dosages
// come from the per-sample GT field: every called allele counts one dose, so `0/1`
// gives one dose of REF and one of ALT, and `1/1` gives two doses of ALT. The whole
// file is held in memory; pre-filter large files with `bcftools view --regions` or
// similar before scoring.

use crate::data::IngestionError;
use crate::types::{Cohort, Genotype, SubjectGenotypes, normalize_chrom_label};
use flate2::read::MultiGzDecoder;
use indexmap::IndexMap;
use log::warn;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

pub fn read_cohort(path: &Path) -> Result<Cohort, IngestionError> {
    let file = File::open(path).map_err(|source| IngestionError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    read_cohort_from(BufReader::new(reader), &path.display().to_string())
}

pub(crate) fn read_cohort_from<R: BufRead>(
    reader: R,
    path: &str,
) -> Result<Cohort, IngestionError> {
    let malformed = |line: usize, details: String| IngestionError::MalformedVcf {
        path: path.to_string(),
        line,
        details,
    };

    let mut samples: Vec<String> = Vec::new();
    let mut header_seen = false;
    let mut subjects: IndexMap<String, SubjectGenotypes> = IndexMap::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| IngestionError::Io {
            path: path.to_string(),
            source,
        })?;
        let number = number + 1;

        if line.is_empty() || line.starts_with("##") {
            continue;
        }
        if let Some(header) = line.strip_prefix('#') {
            let fields: Vec<&str> = header.split('\t').collect();
            if fields.len() > 9 {
                samples = fields[9..].iter().map(|s| s.to_string()).collect();
            }
            for sample in &samples {
                subjects.insert(sample.clone(), IndexMap::new());
            }
            header_seen = true;
            continue;
        }
        if !header_seen {
            return Err(malformed(
                number,
                "data line before the #CHROM header".to_string(),
            ));
        }
        if samples.is_empty() {
            // A site-only VCF carries no subjects to score.
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 9 + samples.len() {
            return Err(malformed(
                number,
                format!(
                    "expected {} fields for {} samples, found {}",
                    9 + samples.len(),
                    samples.len(),
                    fields.len()
                ),
            ));
        }

        let chrom = normalize_chrom_label(fields[0]);
        let pos: u32 = fields[1]
            .parse()
            .map_err(|_| malformed(number, format!("unparseable POS '{}'", fields[1])))?;
        let id = if fields[2] == "." || fields[2].is_empty() {
            format!("{chrom}:{pos}")
        } else {
            fields[2].to_string()
        };

        let mut alleles: Vec<&str> = vec![fields[3]];
        alleles.extend(fields[4].split(','));

        let Some(gt_index) = fields[8].split(':').position(|key| key == "GT") else {
            warn!("{path}, line {number}: no GT field in FORMAT; variant '{id}' skipped");
            continue;
        };

        for (sample, value) in samples.iter().zip(&fields[9..]) {
            let call = value.split(':').nth(gt_index).unwrap_or(".");
            let mut symbols: Vec<String> = Vec::new();
            for token in call.split(['/', '|']) {
                if token == "." || token.is_empty() {
                    continue;
                }
                let index: usize = token
                    .parse()
                    .map_err(|_| malformed(number, format!("unparseable GT '{call}'")))?;
                match alleles.get(index) {
                    Some(symbol) => symbols.push(symbol.to_string()),
                    None => {
                        return Err(malformed(
                            number,
                            format!("GT allele index {index} out of range for variant '{id}'"),
                        ));
                    }
                }
            }
            if symbols.is_empty() {
                // Missing call: this subject contributes no genotype here.
                continue;
            }
            let genotype = Genotype::from_call(id.clone(), chrom.clone(), pos, symbols);
            subjects
                .entry(sample.clone())
                .or_default()
                .insert(id.clone(), genotype);
        }
    }

    if !header_seen {
        return Err(IngestionError::MalformedVcf {
            path: path.to_string(),
            line: 0,
            details: "no #CHROM header found".to_string(),
        });
    }
    Ok(Cohort { subjects })
}
