use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};

use taxcons_rs::annotation::{annotated_hits_text, annotations_for_hits};
use taxcons_rs::census::{census_text, rank_census};
use taxcons_rs::consensus::{ConsensusConfig, TieBreak};
use taxcons_rs::grouping::ScaffoldBins;
use taxcons_rs::hits::{load_hits, LoadOptions, TaxType};
use taxcons_rs::levels::LevelExpander;
use taxcons_rs::taxdb::TaxDB;
use taxcons_rs::types::TaxId;
use taxcons_rs::{classify_hits, PipelineOptions};

#[derive(Parser, Debug)]
#[clap(
    version,
    about = "Consensus taxonomy of genes, scaffolds, bins and genomes from protein hits"
)]
struct Cli {
    #[clap(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Gene, scaffold, genome (and bin) taxonomy tables from a hit table
    Collect(CollectArgs),
    /// Print `taxid|superkingdom|...|species` for one taxid
    Lineage(LineageArgs),
    /// Count names at every rank across all hits
    Census(CensusArgs),
    /// Join functional annotations onto a hit table
    Annotate(AnnotateArgs),
}

/// Where the taxonomy comes from: a KrakenUniq-style taxDB or an NCBI dump.
#[derive(Args, Debug, Clone)]
struct TaxonomyArgs {
    /// `taxid\tparent\tname\trank` file
    #[clap(long, conflicts_with_all = ["nodes", "names"], required_unless_present = "nodes")]
    taxdb: Option<PathBuf>,

    /// NCBI nodes.dmp
    #[clap(long, requires = "names")]
    nodes: Option<PathBuf>,

    /// NCBI names.dmp
    #[clap(long, requires = "nodes")]
    names: Option<PathBuf>,
}

impl TaxonomyArgs {
    fn load(&self) -> Result<TaxDB, taxcons_rs::TaxError> {
        match (&self.taxdb, &self.nodes, &self.names) {
            (Some(taxdb), _, _) => TaxDB::from_taxdb(taxdb),
            (None, Some(nodes), Some(names)) => TaxDB::from_ncbi(nodes, names),
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "either --taxdb or both --nodes and --names are required",
            )
            .into()),
        }
    }
}

#[derive(Args, Debug, Clone)]
struct HitArgs {
    /// b6+ or DIAMOND hit table (.gz accepted)
    #[clap(short = 'b', long = "hits")]
    hits: PathBuf,

    /// DIAMOND target field carrying the taxid
    #[clap(long, value_enum, default_value_t = TaxTypeArg::Species)]
    tax_type: TaxTypeArg,

    /// Ignore hits scoring below this bit score
    #[clap(long)]
    min_bit_score: Option<f32>,
}

impl From<&HitArgs> for LoadOptions {
    fn from(args: &HitArgs) -> Self {
        LoadOptions {
            tax_type: args.tax_type.into(),
            format: None,
            min_bit_score: args.min_bit_score,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum TaxTypeArg {
    Species,
    Group,
}

impl From<TaxTypeArg> for TaxType {
    fn from(arg: TaxTypeArg) -> Self {
        match arg {
            TaxTypeArg::Species => TaxType::Species,
            TaxTypeArg::Group => TaxType::Group,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum TieBreakArg {
    FirstSeen,
    Lexicographic,
}

impl From<TieBreakArg> for TieBreak {
    fn from(arg: TieBreakArg) -> Self {
        match arg {
            TieBreakArg::FirstSeen => TieBreak::FirstSeen,
            TieBreakArg::Lexicographic => TieBreak::Lexicographic,
        }
    }
}

#[derive(Args, Debug)]
struct CollectArgs {
    #[clap(flatten)]
    hits: HitArgs,

    #[clap(flatten)]
    taxonomy: TaxonomyArgs,

    /// Output prefix; `_geneTaxonomy.tsv` etc. are appended
    #[clap(short, long)]
    output: String,

    /// Scaffold-to-bin table
    #[clap(long)]
    stb: Option<PathBuf>,

    /// Minimum agreement (percent) for a rank to be kept
    #[clap(long, default_value_t = 50, value_parser = clap::value_parser!(u8).range(0..=100))]
    min_percent: u8,

    #[clap(long, value_enum, default_value_t = TieBreakArg::FirstSeen)]
    tie_break: TieBreakArg,

    /// Label of the genome table row (defaults to the hit file name)
    #[clap(long)]
    genome_label: Option<String>,
}

impl From<&CollectArgs> for PipelineOptions {
    fn from(args: &CollectArgs) -> Self {
        let genome_label = args.genome_label.clone().unwrap_or_else(|| {
            args.hits
                .hits
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "genome".to_string())
        });
        PipelineOptions {
            consensus: ConsensusConfig {
                min_percent: args.min_percent,
                tie_break: args.tie_break.into(),
            },
            genome_label,
            ..Default::default()
        }
    }
}

#[derive(Args, Debug)]
struct LineageArgs {
    #[clap(long)]
    taxid: TaxId,

    #[clap(flatten)]
    taxonomy: TaxonomyArgs,
}

#[derive(Args, Debug)]
struct CensusArgs {
    #[clap(flatten)]
    hits: HitArgs,

    #[clap(flatten)]
    taxonomy: TaxonomyArgs,

    /// Census table to write
    #[clap(short, long)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct AnnotateArgs {
    #[clap(flatten)]
    hits: HitArgs,

    /// Output prefix; `_geneFunctionalAnnotation.tsv` is appended
    #[clap(short, long)]
    output: String,

    /// Gzipped `target\tannotation` table
    #[clap(short = 'd', long = "annotations")]
    annotations: PathBuf,
}

fn spinner(color: &str, msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = format!("{{spinner:.{}}} {{msg}}", color);
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template(&template)
    {
        spinner.set_style(style);
    }
    spinner.set_message(msg.to_string());
    spinner
}

fn write_output(path: impl AsRef<Path>, text: &str) -> std::io::Result<()> {
    let path = path.as_ref();
    fs::write(path, text)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

fn collect(args: &CollectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let sp = spinner("blue", "Loading taxonomy and hits...");
    let taxdb = args.taxonomy.load()?;
    let (_, hits) = load_hits(&args.hits.hits, &LoadOptions::from(&args.hits))?;
    let stb = args.stb.as_ref().map(ScaffoldBins::load).transpose()?;
    sp.finish_with_message(format!("Loaded {} taxa and {} hits.", taxdb.len(), hits.len()));

    let sp = spinner("green", "Computing consensus taxonomy...");
    let results = classify_hits(&hits, &taxdb, stb.as_ref(), &PipelineOptions::from(args))?;
    sp.finish_with_message(format!(
        "Consensus for {} scaffolds finished.",
        results.scaffold_table.len()
    ));

    let sp = spinner("yellow", "Writing output files...");
    write_output(format!("{}_geneTaxonomy.tsv", args.output), &results.get_gene_table())?;
    write_output(format!("{}_scaffoldTaxonomy.tsv", args.output), &results.get_scaffold_table())?;
    write_output(format!("{}_genomeTaxonomy.tsv", args.output), &results.get_genome_table())?;
    if let Some(text) = results.get_bin_table() {
        write_output(format!("{}_binTaxonomy.tsv", args.output), &text)?;
    }
    sp.finish_with_message("Output files created.");
    Ok(())
}

fn census(args: &CensusArgs) -> Result<(), Box<dyn std::error::Error>> {
    let sp = spinner("blue", "Counting names at every rank...");
    let taxdb = args.taxonomy.load()?;
    let (_, hits) = load_hits(&args.hits.hits, &LoadOptions::from(&args.hits))?;
    let expander = LevelExpander::new(&taxdb);
    let rows = rank_census(&expander, hits.iter().filter_map(|h| h.taxid))?;
    write_output(&args.output, &census_text(&rows))?;
    sp.finish_with_message(format!("Census of {} names written.", rows.len()));
    Ok(())
}

fn annotate(args: &AnnotateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let sp = spinner("cyan", "Annotating hits...");
    let (_, hits) = load_hits(&args.hits.hits, &LoadOptions::from(&args.hits))?;
    let map = annotations_for_hits(&args.annotations, &hits)?;
    write_output(
        format!("{}_geneFunctionalAnnotation.tsv", args.output),
        &annotated_hits_text(&hits, &map),
    )?;
    sp.finish_with_message(format!("Annotated {} hits.", hits.len()));
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match &cli.cmd {
        Commands::Collect(args) => collect(args)?,
        Commands::Lineage(args) => {
            let taxdb = args.taxonomy.load()?;
            println!("{}", taxdb.lineage_string(args.taxid));
        }
        Commands::Census(args) => census(args)?,
        Commands::Annotate(args) => annotate(args)?,
    }
    Ok(())
}
