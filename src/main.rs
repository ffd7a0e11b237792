use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use ipnetwork::Ipv4Network;

use caida_topology::shared::{parse_as_list, DEFAULT_CONTROL_NETWORK};
use caida_topology::{
    select_endpoints, ASGraph, ASGraphGenerator, AnnotateConfig, BGPAnnotator, CAIDAGraphGenerator,
    Error, ParseConfig, PruneConfig, RouterPruner, ASN,
};

#[derive(Parser)]
#[command(name = "caida-topology")]
#[command(
    about = "Build a BGP router topology from CAIDA AS links and pfx2as data",
    long_about = None
)]
struct Cli {
    /// AS-link files (aslinks, as-rel or plain pairs), optionally .bz2
    #[arg(long, required = true, num_args = 1..)]
    aslinks: Vec<PathBuf>,

    /// Prefix-to-AS files, loaded in order; later files win for equal prefixes
    #[arg(long, num_args = 1..)]
    pfx2as: Vec<PathBuf>,

    /// Prune down to the shortest paths between these ASes, e.g. 1,4
    #[arg(long, conflicts_with = "endpoints")]
    keep: Option<String>,

    /// Prune down to the shortest paths between the first N advertising ASes
    #[arg(long)]
    endpoints: Option<usize>,

    /// Worker threads for the shortest path searches
    #[arg(long)]
    workers: Option<usize>,

    /// Use link weights instead of hop count when pruning
    #[arg(long)]
    weighted: bool,

    /// Network the peer-facing interfaces are numbered from
    #[arg(long, default_value = DEFAULT_CONTROL_NETWORK)]
    control_network: Ipv4Network,

    /// Skip malformed pfx2as records instead of failing
    #[arg(long)]
    lenient_prefixes: bool,

    /// Write the resulting graph as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let template = "[{elapsed_precise}] {spinner} {msg}";
    if let Ok(style) = ProgressStyle::default_spinner().template(template) {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn must_keep(cli: &Cli, graph: &ASGraph) -> Result<Option<BTreeSet<ASN>>, Error> {
    if let Some(keep) = &cli.keep {
        let ases = parse_as_list(keep).map_err(Error::InvalidArgument)?;
        return Ok(Some(ases.into_iter().collect()));
    }
    Ok(cli.endpoints.map(|count| select_endpoints(graph, count)))
}

fn run(cli: Cli) -> Result<(), Error> {
    let pb = spinner();

    pb.set_message("parsing topology");
    let generator = CAIDAGraphGenerator {
        aslinks: cli.aslinks.clone(),
        pfx2as: cli.pfx2as.clone(),
        config: ParseConfig::new().with_lenient_prefixes(cli.lenient_prefixes),
    };
    let parsed = generator.generate()?;
    let mut graph = parsed.graph;
    let mut warnings = parsed.warnings.len();

    pb.set_message("annotating BGP");
    let config = AnnotateConfig::new().with_control_network(cli.control_network);
    let annotator = BGPAnnotator::new(config);
    let annotation = annotator.annotate(&mut graph);
    warnings += annotation.warnings.len();

    if let Some(keep) = must_keep(&cli, &graph)? {
        pb.set_message(format!("pruning to {} endpoints", keep.len()));
        let mut config = PruneConfig::new().with_link_weights(cli.weighted);
        if let Some(workers) = cli.workers {
            config = config.with_workers(workers);
        }
        let summary = RouterPruner::new(config).prune(&mut graph, &keep)?;
        warnings += summary.warnings.len();
        log::info!(
            "Kept {} vertices, removed {} routers and {} switches",
            summary.kept.len(),
            summary.routers_removed,
            summary.switches_removed
        );
    }

    if let Some(path) = &cli.output {
        pb.set_message("writing graph");
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &graph)?;
        writer.flush()?;
    }

    pb.finish_and_clear();

    println!(
        "{} routers, {} switches, {} links, {} prefixes, {} BGP neighbors, {} warnings",
        graph.routers().count(),
        graph.switches().count(),
        graph.link_count(),
        graph.prefixes.len(),
        graph.iter().map(|node| node.bgp_neighbor_count()).sum::<usize>(),
        warnings
    );
    Ok(())
}

fn main() {
    pretty_env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
