use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::time::MissedTickBehavior;
use tracing::info;
use tracing_subscriber::EnvFilter;

use smoothgraph::buffer::PositionBuffer;
use smoothgraph::config::{LayoutConfig, SimulationParameters};
use smoothgraph::graph::{self, GraphData, NodePosition};
use smoothgraph::host::{SimulationHost, SimulationWorker};
use smoothgraph::render::{JsonLinesSink, RenderCoordinator};

/// Real-time force-directed graph layout.
#[derive(Parser)]
#[command(name = "smoothgraph")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the graph and its configuration come from
#[derive(Args, Debug)]
struct GraphSource {
    /// Graph file (.json, .yaml, .yml); a random graph is used when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Node count of the random graph
    #[arg(long, default_value = "1000")]
    nodes: usize,

    /// Link count of the random graph
    #[arg(long, default_value = "1000")]
    links: usize,

    /// Layout configuration (.yaml, .yml, .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for the random graph and the simulation
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the threaded simulation and renderer, one JSON line per frame
    Run {
        #[command(flatten)]
        source: GraphSource,

        /// Number of frames to render
        #[arg(short, long, default_value = "600")]
        frames: u64,

        /// Output file for frames
        #[arg(short, long, default_value = "frames.jsonl")]
        output: PathBuf,
    },
    /// Tick the simulation a fixed number of times and write final positions
    Layout {
        #[command(flatten)]
        source: GraphSource,

        /// Number of ticks
        #[arg(short, long, default_value = "300")]
        ticks: usize,

        /// Output file (.json or .bin)
        #[arg(short, long, default_value = "positions.json")]
        output: PathBuf,
    },
    /// Write a random graph
    Generate {
        /// Number of nodes
        #[arg(long, default_value = "1000")]
        nodes: usize,

        /// Number of links
        #[arg(long, default_value = "1000")]
        links: usize,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Output file (JSON)
        #[arg(short, long, default_value = "graph.json")]
        output: PathBuf,
    },
}

fn load(source: &GraphSource) -> anyhow::Result<(GraphData, LayoutConfig)> {
    let mut config = match &source.config {
        Some(path) => LayoutConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => LayoutConfig::default(),
    };
    if let Some(seed) = source.seed {
        config.simulation.seed = seed;
    }

    let graph = match &source.input {
        Some(path) => graph::read_graph(path)
            .with_context(|| format!("failed to read graph {}", path.display()))?,
        None => {
            let mut rng = StdRng::seed_from_u64(config.simulation.seed);
            graph::random_graph(source.nodes, source.links, &mut rng)
        }
    };
    Ok((graph, config))
}

async fn run(graph: GraphData, config: LayoutConfig, frames: u64, output: &Path) -> anyhow::Result<()> {
    let file = File::create(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let mut sink = JsonLinesSink::new(BufWriter::new(file));

    let worker = SimulationWorker::spawn(SimulationHost::new(config.repulsion.clone()))?;
    let mut coordinator = RenderCoordinator::new(graph, &config, worker.client())?;

    let period = coordinator
        .scheduler()
        .target_interval()
        .max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last = Instant::now();
    for _ in 0..frames {
        ticker.tick().await;
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f32();
        last = now;
        coordinator.frame(now, dt, &mut sink)?;
    }

    let written = sink.frames();
    sink.finish()?;
    drop(coordinator);
    worker.shutdown();

    println!("Wrote {written} frames to {}", output.display());
    Ok(())
}

fn layout(graph: GraphData, config: LayoutConfig, ticks: usize, output: &Path) -> anyhow::Result<()> {
    let params = SimulationParameters {
        iterations: ticks,
        ..config.simulation
    };
    let capacity = graph.nodes.len();
    let mut host = SimulationHost::new(config.repulsion);
    let buffer = host.create_simulation(graph, &params, PositionBuffer::with_capacity(capacity));
    info!(ticks, nodes = buffer.node_count(), "layout finished");

    write_positions(&buffer, output)?;
    println!(
        "Wrote {} positions to {}",
        buffer.node_count(),
        output.display()
    );
    Ok(())
}

fn write_positions(buffer: &PositionBuffer, output: &Path) -> anyhow::Result<()> {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "bin" => fs::write(output, buffer.as_bytes())?,
        "json" => {
            let positions: Vec<NodePosition> = buffer
                .iter()
                .map(|(id, x, y)| NodePosition::new(id, x, y))
                .collect();
            let mut writer = BufWriter::new(File::create(output)?);
            serde_json::to_writer_pretty(&mut writer, &positions)?;
            writer.flush()?;
        }
        other => bail!("unsupported output format: {other:?}"),
    }
    Ok(())
}

fn generate(nodes: usize, links: usize, seed: u64, output: &Path) -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let graph = graph::random_graph(nodes, links, &mut rng);
    graph::write_graph(&graph, output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "Generated graph with {} nodes and {} links in {}",
        graph.nodes.len(),
        graph.links.len(),
        output.display()
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            source,
            frames,
            output,
        } => {
            let (graph, config) = load(&source)?;
            run(graph, config, frames, &output).await?;
        }
        Commands::Layout {
            source,
            ticks,
            output,
        } => {
            let (graph, config) = load(&source)?;
            layout(graph, config, ticks, &output)?;
        }
        Commands::Generate {
            nodes,
            links,
            seed,
            output,
        } => {
            generate(nodes, links, seed, &output)?;
        }
    }

    Ok(())
}
