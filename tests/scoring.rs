// End-to-end scoring runs: weights and subject files on disk, through ingestion,
// model construction and per-subject calculation.

use approx::assert_relative_eq;
use grs::data::read_table;
use grs::model::{Method, MultiRiskScore, RiskScore};
use grs::reformat::adapt_catalog_records;
use grs::vcf;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_file(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn aggregate_scoring_from_files() {
    // Comma-separated on purpose; the separator is sniffed per file.
    let weights = write_file(&[
        "# weights for the toy model",
        "CHROM,POS,ALLELE,BETA",
        "1,100,A,0.5",
        "2,200,G,-0.2",
    ]);
    let vcf_file = write_file(&[
        "##fileformat=VCFv4.2",
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1",
        "1\t100\trs1\tA\tT\t.\tPASS\t.\tGT\t0/1",
        "2\t200\trs2\tG\tC\t.\tPASS\t.\tGT\t1/1",
    ]);

    let cohort = vcf::read_cohort(vcf_file.path()).unwrap();
    let records = read_table(weights.path()).unwrap();
    let model = RiskScore::from_records(&records, None, Some(&cohort.known_alleles())).unwrap();

    // One dose of A, no G: (0.5 * 1 + -0.2 * 0) / 2.
    assert_relative_eq!(model.calc(&cohort.subjects["S1"]), 0.25);
}

#[test]
fn oram2016_scoring_from_files() {
    let weights = write_file(&[
        "CHROM\tPOS\tALLELE\tBETA",
        "1\t100\tT\t0.5",
        "2\t200\tG\t0.3",
    ]);
    let multilocus = write_file(&[
        "ID_1\tGENOTYPE_1\tID_2\tGENOTYPE_2\tBETA",
        "rs1\tT:T\trs2\tG:G\t2.0",
        "rs1\tA:T\t\t\t1.0",
    ]);
    let vcf_file = write_file(&[
        "##fileformat=VCFv4.2",
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2",
        "1\t100\trs1\tA\tT\t.\tPASS\t.\tGT\t0/1\t1/1",
        "2\t200\trs2\tC\tG\t.\tPASS\t.\tGT\t1/1\t1/1",
    ]);

    let cohort = vcf::read_cohort(vcf_file.path()).unwrap();
    let risks = read_table(weights.path()).unwrap();
    let multirisks = read_table(multilocus.path()).unwrap();
    let model = MultiRiskScore::from_records(
        &risks,
        &multirisks,
        Method::Oram2016,
        None,
        Some(&cohort.known_alleles()),
    )
    .unwrap();

    // N' = 2 * (2 + 1) = 6.
    assert_relative_eq!(model.linear().denominator(), 6.0);

    // S1 is A/T at rs1: the heterozygous chain, worth 1.0.
    // Linear part: T dose 1 * 0.5 + G dose 2 * 0.3 = 1.1.
    assert_relative_eq!(model.calc(&cohort.subjects["S1"]), (1.1 + 1.0) / 6.0);

    // S2 is T/T + G/G: the first-defined two-locus chain, worth 2.0.
    assert_relative_eq!(model.calc(&cohort.subjects["S2"]), (1.6 + 2.0) / 6.0);
}

#[test]
fn sharp2019_scoring_from_files() {
    let weights = write_file(&["CHROM\tPOS\tALLELE\tBETA", "6\t32100\tDR4\t0.4"]);
    // One joint diplotype weight plus two independent haplotype weights.
    let multilocus = write_file(&[
        "ID_1\tGENOTYPE_1\tALLELE_1\tBETA",
        "hla\tDR3:DR4\t\t3.0",
        "hla\t\tDR3\t1.0",
        "hla\t\tDR4\t2.0",
    ]);
    let vcf_file = write_file(&[
        "##fileformat=VCFv4.2",
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2",
        "6\t32100\thla\tDR3\tDR4\t.\tPASS\t.\tGT\t0/1\t0/0",
    ]);

    let cohort = vcf::read_cohort(vcf_file.path()).unwrap();
    let risks = read_table(weights.path()).unwrap();
    let multirisks = read_table(multilocus.path()).unwrap();
    let model = MultiRiskScore::from_records(
        &risks,
        &multirisks,
        Method::Sharp2019,
        None,
        Some(&cohort.known_alleles()),
    )
    .unwrap();

    assert_relative_eq!(model.linear().denominator(), 1.0);

    // S1 carries the DR3/DR4 pair jointly: the interaction weight wins over
    // the two singles, plus one DR4 dose in the linear part.
    assert_relative_eq!(model.calc(&cohort.subjects["S1"]), 0.4 + 3.0);

    // S2 is DR3/DR3: no joint match, one matching single-haplotype chain.
    assert_relative_eq!(model.calc(&cohort.subjects["S2"]), 1.0);
}

#[test]
fn pgscatalog_scoring_from_files() {
    let pgs = write_file(&[
        "###PGS CATALOG SCORING FILE",
        "#format_version=2.0",
        "rsID\tchr_name\tchr_position\teffect_allele\tother_allele\teffect_weight",
        "rs1\t1\t100\tT\tA\t0.6",
        "rs2\t2\t200\tC\tG\t0.2",
    ]);
    let vcf_file = write_file(&[
        "##fileformat=VCFv4.2",
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1",
        "1\t100\trs1\tA\tT\t.\tPASS\t.\tGT\t1/1",
        "2\t200\trs2\tG\tC\t.\tPASS\t.\tGT\t0/1",
    ]);

    let cohort = vcf::read_cohort(vcf_file.path()).unwrap();
    let records = adapt_catalog_records(&read_table(pgs.path()).unwrap());
    let model = RiskScore::from_records(&records, None, Some(&cohort.known_alleles())).unwrap();

    // (0.6 * 2 + 0.2 * 1) / 2.
    assert_relative_eq!(model.calc(&cohort.subjects["S1"]), 0.7);
}

#[test]
fn gzip_compressed_vcf_input() {
    let vcf_text = "##fileformat=VCFv4.2\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n\
        1\t100\trs1\tA\tT\t.\tPASS\t.\tGT\t0/1\n";
    let mut file = tempfile::Builder::new().suffix(".vcf.gz").tempfile().unwrap();
    {
        let mut encoder =
            flate2::write::GzEncoder::new(&mut file, flate2::Compression::default());
        encoder.write_all(vcf_text.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }
    file.flush().unwrap();

    let cohort = vcf::read_cohort(file.path()).unwrap();
    let genotype = &cohort.subjects["S1"]["rs1"];
    assert_eq!(genotype.dosages().collect::<Vec<_>>(), vec![("A", 1.0), ("T", 1.0)]);
}

#[test]
fn repeated_scoring_is_reproducible() {
    let weights = write_file(&["CHROM\tPOS\tALLELE\tODDSRATIO", "1\t100\tT\t2.0"]);
    let vcf_file = write_file(&[
        "##fileformat=VCFv4.2",
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1",
        "1\t100\trs1\tA\tT\t.\tPASS\t.\tGT\t0/1",
    ]);

    let cohort = vcf::read_cohort(vcf_file.path()).unwrap();
    let records = read_table(weights.path()).unwrap();
    let model = RiskScore::from_records(&records, None, None).unwrap();

    let subject = &cohort.subjects["S1"];
    let first = model.calc(subject);
    assert_relative_eq!(first, 2.0_f64.ln());
    assert_eq!(first.to_bits(), model.calc(subject).to_bits());
}
