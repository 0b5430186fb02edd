// ========================================================================================
//
//                               The command-line surface
//
// ========================================================================================
//
// Argument parsing, input-exclusivity checks, logging setup and output formatting live
// here; everything with scoring semantics lives in the library. One line of output per
// subject, tab-separated, in cohort input order.

#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, Parser, Subcommand};
use grs::data::read_table;
use grs::geno;
use grs::model::{Method, MultiRiskScore, RiskScore};
use grs::reformat::adapt_catalog_records;
use grs::types::{Cohort, SubjectGenotypes};
use grs::vcf;
use log::debug;
use rayon::prelude::*;
use std::error::Error;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(
    name = "grs",
    version,
    about = "Calculate a Genetic Risk Score (GRS) for a list of subjects based on predefined risk weights."
)]
struct Cli {
    /// Control logging. Valid levels: 'debug', 'info', 'warn', 'error'.
    #[arg(long, global = true, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// VCF file with subject genotypes (plain or gzip-compressed). The whole
    /// file is read into memory; reduce large files with 'bcftools view
    /// --regions' or similar first.
    #[arg(long)]
    vcf: Option<PathBuf>,

    /// Geno file of the type created by SNPextractor.
    #[arg(short = 'g', long, requires = "info")]
    geno: Option<PathBuf>,

    /// Info file of the type created by SNPextractor.
    #[arg(short = 'i', long, requires = "geno")]
    info: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Calculate an aggregated (linear) risk score from user-provided weights.
    Aggregate {
        #[command(flatten)]
        input: InputArgs,

        /// Single-locus risk weights file.
        #[arg(short = 'w', long)]
        weights: PathBuf,

        /// The denominator to use in calculating the arithmetic mean of
        /// scores. Set to '1' to disable mean calculation. Default: number of
        /// lines in the weights file minus header.
        #[arg(short = 'n', long)]
        denominator: Option<f64>,
    },

    /// Calculate the gene risk score of Oram et al. 2016 (doi:10.2337/dc15-1111).
    Oram2016 {
        #[command(flatten)]
        input: InputArgs,

        /// Single-locus risk weights file.
        #[arg(short = 'w', long)]
        weights: PathBuf,

        /// Multi-locus risk weights file.
        #[arg(short = 'm', long)]
        multilocus: PathBuf,
    },

    /// Calculate the gene risk score of Sharp et al. 2019 (doi:10.2337/dc18-1785).
    Sharp2019 {
        #[command(flatten)]
        input: InputArgs,

        /// Single-locus risk weights file.
        #[arg(short = 'w', long)]
        weights: PathBuf,

        /// Multi-locus risk weights file.
        #[arg(short = 'm', long)]
        multilocus: PathBuf,
    },

    /// Calculate a risk score from a PGS Catalog scoring file
    /// (https://www.pgscatalog.org/).
    Pgscatalog {
        /// Risk score file obtained from the PGS Catalog.
        #[arg(short = 'p', long)]
        pgs: PathBuf,

        /// VCF file with subject genotypes.
        #[arg(long)]
        vcf: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let Ok(level) = cli.log.parse::<log::LevelFilter>() else {
        eprintln!("Error: invalid log level '{}'", cli.log);
        process::exit(1);
    };
    env_logger::Builder::new().filter_level(level).init();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Aggregate {
            input,
            weights,
            denominator,
        } => {
            let cohort = load_cohort(&input)?;
            let records = read_table(&weights)?;
            let model =
                RiskScore::from_records(&records, denominator, Some(&cohort.known_alleles()))?;
            emit_scores(&cohort, |subject| model.calc(subject), false);
            Ok(())
        }
        Commands::Oram2016 {
            input,
            weights,
            multilocus,
        } => run_multi(&input, &weights, &multilocus, Method::Oram2016),
        Commands::Sharp2019 {
            input,
            weights,
            multilocus,
        } => run_multi(&input, &weights, &multilocus, Method::Sharp2019),
        Commands::Pgscatalog { pgs, vcf: vcf_path } => {
            let cohort = vcf::read_cohort(&vcf_path)?;
            let records = adapt_catalog_records(&read_table(&pgs)?);
            let model = RiskScore::from_records(&records, None, Some(&cohort.known_alleles()))?;
            emit_scores(&cohort, |subject| model.calc(subject), false);
            Ok(())
        }
    }
}

fn run_multi(
    input: &InputArgs,
    weights: &PathBuf,
    multilocus: &PathBuf,
    method: Method,
) -> Result<(), Box<dyn Error>> {
    let cohort = load_cohort(input)?;
    let risks = read_table(weights)?;
    let multirisks = read_table(multilocus)?;
    let model = MultiRiskScore::from_records(
        &risks,
        &multirisks,
        method,
        None,
        Some(&cohort.known_alleles()),
    )?;
    emit_scores(&cohort, |subject| model.calc(subject), true);
    Ok(())
}

/// Either a VCF or a geno/info pair, never both and never a half pair.
fn load_cohort(input: &InputArgs) -> Result<Cohort, Box<dyn Error>> {
    match (&input.vcf, &input.geno, &input.info) {
        (Some(vcf_path), None, None) => Ok(vcf::read_cohort(vcf_path)?),
        (None, Some(geno_path), Some(info_path)) => Ok(geno::read_cohort(geno_path, info_path)?),
        _ => Err(
            "no correct input files specified, use EITHER '--vcf' OR BOTH '--geno' and '--info'"
                .into(),
        ),
    }
}

/// Scores every subject and prints one `subject<TAB>score` line per subject.
/// The model is read-only during scoring, so subjects are dispatched to a
/// parallel iterator; the collect keeps cohort input order for the output.
fn emit_scores<F>(cohort: &Cohort, calc: F, round: bool)
where
    F: Fn(&SubjectGenotypes) -> f64 + Sync,
{
    let subjects: Vec<(&String, &SubjectGenotypes)> = cohort.subjects.iter().collect();
    let scores: Vec<f64> = subjects
        .par_iter()
        .map(|&(id, genotypes)| {
            debug!("Subject '{id}': {} variants observed", genotypes.len());
            calc(genotypes)
        })
        .collect();
    for ((id, _), score) in subjects.iter().zip(scores) {
        if round {
            println!("{id}\t{score:.4}");
        } else {
            println!("{id}\t{score}");
        }
    }
}
