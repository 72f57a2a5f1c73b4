use adasplit::demux::{ConsoleLog, Demultiplexer, NullLog, RouteLog};
use adasplit::errors::DemuxError;
use adasplit::io::io::open_fastq;
use adasplit::progress::{print_header, ProgressTracker};
use adasplit::select::max_adaptor_similarity;
use adasplit::table::AdaptorTable;
use clap::Parser;
use colored::*;

#[derive(Parser)]
#[command(author, version, about = "Demultiplex FASTQ reads by 5' adaptor", long_about = None)]
struct Cli {
    /// Adaptor table: one '<sequence> <tag>' per line, plus a '* <trash>' line
    #[arg(short = 'a', long)]
    adaptors: String,

    /// Single-end FASTQ, or the first file of a pair (.gz supported)
    #[arg(short = 'f', long, required_unless_present = "analogy")]
    fastq1: Option<String>,

    /// Second paired-end FASTQ; its presence selects paired-end mode
    #[arg(short = 'F', long)]
    fastq2: Option<String>,

    /// Output files are named PREFIX-TAG.fastq (PREFIX-TAG_1/_2.fastq when paired)
    #[arg(short = 'p', long, default_value = "demult")]
    output_prefix: String,

    /// Demultiplex with a Levenshtein similarity threshold in [0, 1]
    /// instead of exact prefix search
    #[arg(short = 'l', long)]
    levenshtein: Option<f64>,

    /// Paired-end fuzzy mode: both mates must independently clear the
    /// threshold and agree on one adaptor
    #[arg(long, default_value_t = false)]
    all: bool,

    /// Print the maximal similarity ratio between adaptors and exit
    #[arg(long, default_value_t = false)]
    analogy: bool,

    /// Also write the per-tag counts as a TSV file
    #[arg(long)]
    counts: Option<String>,

    /// Fail when the paired input files have unequal record counts
    #[arg(long, default_value_t = false)]
    strict_pairs: bool,

    /// Per-read routing diagnostics
    #[arg(short = 'v', long, default_value_t = false)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        println!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), DemuxError> {
    print_header("adasplit");

    let table = AdaptorTable::from_path(&cli.adaptors)?;

    if cli.analogy {
        println!(
            "Maximal similarity ratio between adaptors is {:.6}",
            max_adaptor_similarity(&table)
        );
        return Ok(());
    }

    let fastq1 = cli.fastq1.as_deref().expect("clap enforces --fastq1");
    let paired = cli.fastq2.is_some();

    let mut progress = ProgressTracker::new();
    progress.step("Configuration");
    progress.substep(&format!(
        "Adaptors: {} entries + trash '{}'",
        table.len(),
        table.trash_tag()
    ));
    progress.substep(&format!(
        "Mode: {}, strategy: {}",
        if paired { "paired-end" } else { "single-end" },
        match (cli.levenshtein, cli.all) {
            (None, _) => "exact".to_string(),
            (Some(rate), false) => format!("fuzzy best-match (rate {rate})"),
            (Some(rate), true) => format!("fuzzy all-agree (rate {rate})"),
        }
    ));

    let mut demux = Demultiplexer::new(
        &table,
        cli.levenshtein,
        cli.all,
        &cli.output_prefix,
        paired,
    )?;

    let mut console_log = ConsoleLog;
    let mut null_log = NullLog;
    let log: &mut dyn RouteLog = if cli.verbose {
        &mut console_log
    } else {
        &mut null_log
    };

    progress.step("Demultiplexing");
    let summary = match &cli.fastq2 {
        Some(fastq2) => {
            let reader1 = open_fastq(fastq1)?;
            let reader2 = open_fastq(fastq2)?;
            demux.run_paired(reader1, reader2, (fastq1, fastq2), cli.strict_pairs, log)?
        }
        None => demux.run_single(open_fastq(fastq1)?, log)?,
    };

    summary.print();

    if let Some(path) = &cli.counts {
        summary.write_tsv(path)?;
        progress.substep(&format!("Counts written to {path}"));
    }

    progress.success("Demultiplexing complete");
    progress.print_elapsed();
    Ok(())
}
