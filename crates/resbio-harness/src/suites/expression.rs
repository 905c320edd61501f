//! Expression quantification scenarios
//!
//! Covers cufflinks, cuffmerge, cuffquant, cuffnorm, expression-bcm,
//! etc-bcm, htseq-count, index-fasta-nucl, mergeexpressions, mergeetc,
//! feature_counts and salmon-index.

use crate::error::RegistryError;
use crate::fixtures::{FixtureSpec, DICTYBASE, DICTY_BUILD, DICTY_SPECIES};
use crate::registry::ScenarioRegistry;
use crate::scenario::{InputTemplate, Scenario, Step};
use serde_json::json;

const HUMAN: &str = "Homo sapiens";
const HG19: &str = "hg19";
const ENS_90: &str = "ens_90";

/// Register the expression scenarios
///
/// # Errors
/// Fails if a scenario is invalid or its id is taken.
pub fn register(registry: &mut ScenarioRegistry) -> Result<(), RegistryError> {
    for scenario in scenarios() {
        registry.register(scenario)?;
    }
    Ok(())
}

/// All expression scenarios
#[must_use]
pub fn scenarios() -> Vec<Scenario> {
    vec![
        cufflinks(),
        cuffquant(),
        cuffnorm(),
        expression_bcm(),
        htseq_count(),
        index_fasta_nucl(),
        mergeexpressions(),
        mergeetc(),
        feature_counts(),
        salmon_index(),
    ]
}

/// Genome, reads and GFF3 annotation aligned with tophat2
fn with_aligned_reads(scenario: Scenario, annotation: FixtureSpec) -> Scenario {
    scenario
        .setup(FixtureSpec::genome().step("genome"))
        .setup(FixtureSpec::reads().step("reads"))
        .setup(annotation.step("annotation"))
        .setup(Step::run(
            "aligned_reads",
            "alignment-tophat2",
            InputTemplate::new()
                .data("genome", "genome")
                .data("reads", "reads")
                .data("annotation", "annotation")
                .literal("PE_options", json!({"library_type": "fr-unstranded"})),
        ))
}

fn dicty_descriptors(scenario: Scenario, target: &str) -> Scenario {
    scenario
        .verify(Step::assert_field(target, "species", DICTY_SPECIES))
        .verify(Step::assert_field(target, "build", DICTY_BUILD))
}

fn cufflinks() -> Scenario {
    let cufflinks_inputs = InputTemplate::new()
        .data("alignment", "aligned_reads")
        .data("annotation", "annotation")
        .data("genome", "genome");

    let scenario = with_aligned_reads(
        Scenario::new("expression::cufflinks")
            .describe("cufflinks transcripts merged with cuffmerge")
            .tag("cufflinks")
            .tag("cuffmerge"),
        FixtureSpec::annotation_gff(),
    )
    .verify(Step::run("cuff_exp", "cufflinks", cufflinks_inputs.clone()))
    .verify(Step::assert_file(
        "cuff_exp",
        "transcripts",
        "cufflinks_transcripts.gtf",
    ));
    let scenario = dicty_descriptors(scenario, "cuff_exp")
        .verify(Step::run("cuff_exp2", "cufflinks", cufflinks_inputs))
        .verify(Step::run(
            "cuff_merge",
            "cuffmerge",
            InputTemplate::new()
                .data_list("expressions", &["cuff_exp", "cuff_exp2"])
                .data("gff", "annotation")
                .data("genome", "genome"),
        ))
        .verify(Step::assert_file(
            "cuff_merge",
            "annot",
            "cuffmerge_transcripts.gtf",
        ));
    dicty_descriptors(scenario, "cuff_merge")
}

fn hg19_annotation() -> FixtureSpec {
    FixtureSpec::annotation("hg19_chr20_small.gtf.gz", "UCSC", HUMAN, HG19)
}

fn cuffquant() -> Scenario {
    Scenario::new("expression::cuffquant")
        .describe("cuffquant on an uploaded hg19 alignment")
        .tag("cuffquant")
        .setup(FixtureSpec::bam("cuffquant_mapping.bam", HUMAN, HG19).step("bam"))
        .setup(hg19_annotation().step("annotation"))
        .verify(Step::run(
            "cuffquant",
            "cuffquant",
            InputTemplate::new()
                .data("alignment", "bam")
                .data("annotation", "annotation"),
        ))
        .verify(Step::assert_field("cuffquant", "species", HUMAN))
        .verify(Step::assert_field("cuffquant", "build", HG19))
}

fn cuffnorm() -> Scenario {
    const SAMPLES: [&str; 6] = [
        "sample_1", "sample_2", "sample_3", "sample_4", "sample_5", "sample_6",
    ];

    let mut scenario = Scenario::new("expression::cuffnorm")
        .describe("cuffnorm over six cuffquant files with replicate groups")
        .tag("cuffnorm");
    for (i, binding) in SAMPLES.iter().enumerate() {
        let src = format!("cuffquant_{}.cxb", i + 1);
        scenario = scenario.setup(FixtureSpec::cxb(&src, "UCSC", HUMAN, HG19).step(binding));
    }

    scenario
        .setup(hg19_annotation().step("annotation"))
        .verify(Step::run(
            "cuffnorm",
            "cuffnorm",
            InputTemplate::new()
                .data_list("cuffquant", &SAMPLES)
                .data("annotation", "annotation")
                .literal("replicates", json!(["1", "1", "2", "2", "2", "3"])),
        ))
        .verify(Step::assert_file(
            "cuffnorm",
            "fpkm_means",
            "cuffnorm_all_fpkm_means.txt",
        ))
        .verify(Step::assert_file(
            "cuffnorm",
            "genes_fpkm",
            "cuffnorm_genes.fpkm_table",
        ))
        .verify(Step::assert_exists("cuffnorm", "raw_scatter"))
        .verify(Step::latest("exp"))
        .verify(Step::assert_file_gz(
            "exp",
            "exp",
            "cuffnorm_expression.tab.gz",
        ))
}

fn bcm_expression(scenario: Scenario) -> Scenario {
    with_aligned_reads(scenario, FixtureSpec::annotation_gff())
        .setup(FixtureSpec::mappability("purpureum_mappability_50.tab.gz").step("mappability"))
}

fn run_expression_bcm() -> Step {
    Step::run(
        "expression",
        "expression-bcm",
        InputTemplate::new()
            .data("alignment", "aligned_reads")
            .data("gff", "annotation")
            .data("mappable", "mappability"),
    )
}

fn run_etc_bcm() -> Step {
    Step::run(
        "etc",
        "etc-bcm",
        InputTemplate::new().data_list("expressions", &["expression", "expression"]),
    )
}

fn expression_bcm() -> Scenario {
    let scenario = bcm_expression(
        Scenario::new("expression::bcm")
            .describe("expression-bcm RPKM and etc-bcm time course")
            .tag("expression-bcm")
            .tag("etc-bcm"),
    )
    .verify(run_expression_bcm())
    .verify(Step::assert_file_gz(
        "expression",
        "rpkm",
        "expression_bcm_rpkm.tab.gz",
    ))
    .verify(Step::assert_field("expression", "source", DICTYBASE));

    dicty_descriptors(scenario, "expression")
        .verify(Step::assert_field("expression", "feature_type", "gene"))
        .verify(run_etc_bcm())
        .verify(Step::assert_json("etc", "etc", "", "etc.json.gz"))
}

fn htseq_count() -> Scenario {
    let scenario = with_aligned_reads(
        Scenario::new("expression::htseq_count")
            .describe("htseq-count raw counts with FPKM and TPM normalization")
            .tag("htseq-count"),
        FixtureSpec::annotation_gtf(),
    )
    .verify(Step::run(
        "expression",
        "htseq-count",
        InputTemplate::new()
            .data("alignments", "aligned_reads")
            .data("gff", "annotation")
            .literal("stranded", "no")
            .literal("id_attribute", "transcript_id"),
    ))
    .verify(Step::assert_file_gz("expression", "rc", "reads_rc.tab.gz"))
    .verify(Step::assert_file_gz("expression", "fpkm", "reads_fpkm.tab.gz"))
    .verify(Step::assert_file_gz("expression", "exp", "reads_tpm.tab.gz"))
    .verify(Step::assert_json(
        "expression",
        "exp_json",
        "",
        "expression_htseq.json.gz",
    ));

    dicty_descriptors(scenario, "expression")
        .verify(Step::assert_field("expression", "feature_type", "gene"))
}

fn index_fasta_nucl() -> Scenario {
    Scenario::new("expression::index_fasta_nucl")
        .describe("RSEM index over a chromosome 21 genome")
        .tag("index-fasta-nucl")
        .setup(FixtureSpec::fasta_nucl("HS_chr21_ensemble.fa.gz").step("genome"))
        .setup(
            FixtureSpec::annotation("HS_chr21_short.gtf.gz", "ENSEMBL", HUMAN, ENS_90)
                .step("annotation"),
        )
        .verify(Step::run(
            "index",
            "index-fasta-nucl",
            InputTemplate::new()
                .data("nucl", "genome")
                .data("annotation", "annotation"),
        ))
        .verify(Step::assert_field_masked(
            "index",
            "rsem_index",
            json!({"dir": "rsem"}),
            &["total_size"],
        ))
        .verify(Step::assert_field("index", "source", "ENSEMBL"))
        .verify(Step::assert_field("index", "species", HUMAN))
        .verify(Step::assert_field("index", "build", ENS_90))
}

fn mergeexpressions() -> Scenario {
    const GENES: [&str; 3] = ["DPU_G0067096", "DPU_G0067098", "DPU_G0067102"];

    Scenario::new("expression::mergeexpressions")
        .describe("merge expressions into a gene table; mixed types are rejected")
        .tag("mergeexpressions")
        .setup(
            FixtureSpec::expression("exp_1_rc.tab.gz", "exp_1_tpm.tab.gz", "TPM")
                .step("expression_1"),
        )
        .setup(
            FixtureSpec::expression("exp_2_rc.tab.gz", "exp_2_tpm.tab.gz", "TPM")
                .step("expression_2"),
        )
        .setup(
            FixtureSpec::expression("exp_2_rc.tab.gz", "exp_2_tpm.tab.gz", "RC")
                .step("expression_3"),
        )
        .verify(Step::run(
            "merged_subset",
            "mergeexpressions",
            InputTemplate::new()
                .data_list("exps", &["expression_1", "expression_2"])
                .literal("genes", json!(GENES)),
        ))
        .verify(Step::assert_file(
            "merged_subset",
            "expset",
            "merged_expset_subset.tab",
        ))
        .verify(Step::run(
            "merged_all",
            "mergeexpressions",
            InputTemplate::new()
                .data_list("exps", &["expression_1", "expression_2"])
                .literal("genes", json!([])),
        ))
        .verify(Step::assert_file(
            "merged_all",
            "expset",
            "merged_expset_all.tab",
        ))
        .verify(Step::run_failing(
            "mergeexpressions",
            InputTemplate::new()
                .data_list("exps", &["expression_1", "expression_2", "expression_3"])
                .literal("genes", json!(GENES)),
        ))
}

fn mergeetc() -> Scenario {
    bcm_expression(
        Scenario::new("expression::mergeetc")
            .describe("merge an etc-bcm time course into a gene table")
            .tag("mergeetc"),
    )
    .setup(run_expression_bcm())
    .setup(run_etc_bcm())
    .verify(Step::run(
        "etcmerge",
        "mergeetc",
        InputTemplate::new()
            .data_list("exps", &["etc"])
            .literal(
                "genes",
                json!(["DPU_G0067110", "DPU_G0067098", "DPU_G0067102"]),
            ),
    ))
    .verify(Step::assert_file_gz("etcmerge", "expset", "merged_etc.tab.gz"))
}

fn feature_counts() -> Scenario {
    let scenario = Scenario::new("expression::feature_counts")
        .describe("featureCounts on paired-end and single-end alignments")
        .tag("feature_counts")
        .setup(FixtureSpec::annotation_gtf().step("annotation_gtf"))
        .setup(FixtureSpec::annotation_gff().step("annotation_gff3"))
        .setup(FixtureSpec::bam("reads.bam", DICTY_SPECIES, DICTY_BUILD).step("bam_single"))
        .setup(
            FixtureSpec::bam("feature_counts_paired.bam", DICTY_SPECIES, DICTY_BUILD)
                .step("bam_paired"),
        )
        .verify(Step::run(
            "expression_paired",
            "feature_counts",
            InputTemplate::new()
                .data("alignments", "bam_paired")
                .data("annotation", "annotation_gtf")
                .literal("id_attribute", "transcript_id")
                .literal(
                    "PE_options",
                    json!({"is_paired_end": true, "require_both_ends_mapped": true}),
                ),
        ))
        .verify(Step::assert_file_gz(
            "expression_paired",
            "rc",
            "feature_counts_out_rc.tab.gz",
        ))
        .verify(Step::assert_file_gz(
            "expression_paired",
            "fpkm",
            "feature_counts_out_fpkm.tab.gz",
        ))
        .verify(Step::assert_file_gz(
            "expression_paired",
            "exp",
            "feature_counts_out_tpm.tab.gz",
        ));

    dicty_descriptors(scenario, "expression_paired")
        .verify(Step::assert_field("expression_paired", "feature_type", "gene"))
        .verify(Step::run(
            "expression_single",
            "feature_counts",
            InputTemplate::new()
                .data("alignments", "bam_single")
                .data("annotation", "annotation_gff3")
                .literal("id_attribute", "Parent"),
        ))
        .verify(Step::assert_file_gz("expression_single", "rc", "reads_rc.tab.gz"))
        .verify(Step::assert_file_gz("expression_single", "fpkm", "reads_fpkm.tab.gz"))
        .verify(Step::assert_file_gz("expression_single", "exp", "reads_tpm.tab.gz"))
        .verify(Step::assert_field("expression_single", "feature_type", "gene"))
}

fn salmon_index() -> Scenario {
    Scenario::new("expression::salmon_index")
        .describe("salmon index over coding sequences")
        .tag("salmon-index")
        .setup(FixtureSpec::fasta_nucl("salmon_cds.fa.gz").step("cds"))
        .verify(Step::run(
            "salmon_index",
            "salmon-index",
            InputTemplate::new()
                .data("nucl", "cds")
                .literal("source", "ENSEMBL")
                .literal("species", HUMAN)
                .literal("build", ENS_90),
        ))
        .verify(Step::assert_field_masked(
            "salmon_index",
            "index",
            json!({"dir": "salmon_index"}),
            &["total_size"],
        ))
        .verify(Step::assert_field("salmon_index", "source", "ENSEMBL"))
        .verify(Step::assert_field("salmon_index", "species", HUMAN))
        .verify(Step::assert_field("salmon_index", "build", ENS_90))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Action;

    #[test]
    fn all_scenarios_register() {
        let mut registry = ScenarioRegistry::new();
        register(&mut registry).unwrap();
        assert_eq!(registry.len(), 10);
        assert_eq!(
            registry.processes(),
            vec![
                "cufflinks",
                "cuffmerge",
                "cuffnorm",
                "cuffquant",
                "etc-bcm",
                "expression-bcm",
                "feature_counts",
                "htseq-count",
                "index-fasta-nucl",
                "mergeetc",
                "mergeexpressions",
                "salmon-index",
            ]
        );
    }

    #[test]
    fn cuffnorm_uses_six_samples_and_latest() {
        let scenario = cuffnorm();
        assert_eq!(scenario.setup.len(), 7);
        assert!(scenario
            .verify
            .iter()
            .any(|s| matches!(s.action, Action::Latest)));
        assert_eq!(
            scenario.upstream("cuffnorm").len(),
            7,
            "six cxb uploads plus the annotation"
        );
    }

    #[test]
    fn mergeexpressions_ends_with_expected_failure() {
        let scenario = mergeexpressions();
        let last = scenario.verify.last().unwrap();
        assert_eq!(last.to_string(), "run mergeexpressions (expecting error)");
        assert_eq!(last.dependencies().len(), 3);
    }

    #[test]
    fn mergeetc_prepares_etc_in_setup() {
        let scenario = mergeetc();
        let processes: Vec<_> = scenario.setup.iter().filter_map(Step::process).collect();
        assert_eq!(
            processes,
            vec![
                "upload-genome",
                "upload-fastq-single",
                "upload-gff3",
                "alignment-tophat2",
                "upload-mappability",
                "expression-bcm",
                "etc-bcm",
            ]
        );
        assert!(scenario.setup.iter().all(|s| !s.is_assertion()));
    }

    #[test]
    fn references_cover_compressed_and_plain() {
        let binding = feature_counts();
        let refs: Vec<&str> = binding.references().into_iter().collect();
        assert_eq!(
            refs,
            vec![
                "feature_counts_out_fpkm.tab.gz",
                "feature_counts_out_rc.tab.gz",
                "feature_counts_out_tpm.tab.gz",
                "reads_fpkm.tab.gz",
                "reads_rc.tab.gz",
                "reads_tpm.tab.gz",
            ]
        );
    }
}
