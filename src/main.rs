//! hexai command line.
//!
//! ## Usage
//!
//! - `hexai sample` - Parallel MCTS run that prints feature samples as CSV;
//!   type `q` to stop early
//! - `hexai ab` - Pick one move with alpha-beta
//! - `hexai play` - Play MCTS (or the hybrid player) against alpha-beta

use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::{bounded, Receiver};
use log::info;

use hexai::agent::{play_game, Agent, AlphaBetaAgent, HybridAgent, MctsAgent};
use hexai::alphabeta::{AbNodeValue, AlphaBeta, Deadline};
use hexai::board::{Board, Color, Move};
use hexai::connectivity::Mode;
use hexai::constants::{PATTERN_FILE, SAMPLE_THRESHOLD, TIME_BUDGET_MS, WORKERS};
use hexai::features::{FeatureVector, ScoreWeights};
use hexai::mcts::{Mcts, MctsConfig};
use hexai::parallel::{Coordinator, CoordinatorConfig};
use hexai::patterns::{Catalogue, PatternEvaluator};
use hexai::tree::TreeNode;

/// hexai: MCTS and alpha-beta engines for Hex
#[derive(Parser)]
#[command(name = "hexai")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Common {
    /// Board size
    #[arg(short, long, default_value_t = 6)]
    size: usize,

    /// Pattern catalogue
    #[arg(short, long, default_value = PATTERN_FILE)]
    patterns: PathBuf,

    /// Time budget per search, in milliseconds
    #[arg(short, long, default_value_t = TIME_BUDGET_MS)]
    budget_ms: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Run parallel MCTS and print one CSV line per well-visited node
    Sample {
        #[command(flatten)]
        common: Common,

        /// Worker threads
        #[arg(short, long, default_value_t = WORKERS)]
        workers: usize,

        /// Visits a node needs to be sampled
        #[arg(short, long, default_value_t = SAMPLE_THRESHOLD)]
        threshold: u32,

        /// Stop after this many sub-searches
        #[arg(long)]
        max_tasks: Option<usize>,

        /// Score wins by how early they happen
        #[arg(long)]
        length_weighted: bool,

        /// End playouts once a side holds a virtual connection
        #[arg(long)]
        virtual_terminal: bool,
    },
    /// Search one position with alpha-beta
    Ab {
        #[command(flatten)]
        common: Common,

        /// Moves leading to the position, as x,y, alternating from red
        moves: Vec<String>,

        /// Print the search tree of the deepest round
        #[arg(long)]
        tree: bool,
    },
    /// Play MCTS or the hybrid player (red) against alpha-beta (blue)
    Play {
        #[command(flatten)]
        common: Common,

        /// Seed for the MCTS player
        #[arg(long)]
        seed: Option<u64>,

        /// Let red open with alpha-beta and switch to MCTS at this many
        /// stones
        #[arg(long)]
        hybrid_at: Option<usize>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sample {
            common,
            workers,
            threshold,
            max_tasks,
            length_weighted,
            virtual_terminal,
        } => {
            let mcts = MctsConfig {
                length_weighted,
                terminal: if virtual_terminal { Mode::Virtual } else { Mode::Strict },
                ..MctsConfig::default()
            };
            let config = CoordinatorConfig {
                workers,
                time_budget: Duration::from_millis(common.budget_ms),
                sample_threshold: threshold,
                max_tasks,
            };
            run_sample(&common, mcts, config)
        }
        Commands::Ab { common, moves, tree } => run_alpha_beta(&common, &moves, tree),
        Commands::Play {
            common,
            seed,
            hybrid_at,
        } => run_play(&common, seed, hybrid_at),
    }
}

fn load_catalogue(common: &Common) -> Result<Arc<Catalogue>> {
    let catalogue = Catalogue::load(&common.patterns)
        .with_context(|| format!("loading patterns for a {0}x{0} board", common.size))?;
    info!("{} patterns loaded from {}", catalogue.len(), common.patterns.display());
    Ok(Arc::new(catalogue))
}

/// Stop channel fed by `q` or `quit` on stdin. End of input leaves the run
/// going.
fn stdin_stop() -> Receiver<()> {
    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                return;
            };
            if matches!(line.trim(), "q" | "quit") {
                let _ = tx.send(());
                return;
            }
        }
    });
    rx
}

fn run_sample(common: &Common, mcts: MctsConfig, config: CoordinatorConfig) -> Result<()> {
    let catalogue = load_catalogue(common)?;
    let patterns = catalogue.len();
    let board = Board::try_new(common.size, Color::Red)?;

    info!("sampling with {} workers, type q to stop", config.workers);
    let coordinator = Coordinator::new(config, catalogue);
    let summary = coordinator
        .run(Mcts::new(board, mcts), stdin_stop())
        .context("parallel search failed")?;

    let mut out = BufWriter::new(io::stdout().lock());
    writeln!(out, "q,{}", FeatureVector::header(patterns).join(","))?;
    for sample in &summary.samples {
        writeln!(out, "{sample}")?;
    }
    out.flush()?;

    info!(
        "{} tasks, {} iterations, {} samples, {} candidates left{}",
        summary.tasks_finished,
        summary.iterations,
        summary.samples.len(),
        summary.remaining,
        if summary.stopped { " (stopped)" } else { "" }
    );
    Ok(())
}

fn parse_position(size: usize, moves: &[String]) -> Result<Board> {
    let mut board = Board::try_new(size, Color::Red)?;
    for text in moves {
        let Some((x, y)) = text.split_once(',') else {
            bail!("move '{text}' is not of the form x,y");
        };
        let x: usize = x.trim().parse().with_context(|| format!("bad column in '{text}'"))?;
        let y: usize = y.trim().parse().with_context(|| format!("bad row in '{text}'"))?;
        board = board
            .try_play(Move::new(x, y, board.to_move()))
            .with_context(|| format!("cannot play '{text}'"))?;
    }
    Ok(board)
}

fn print_tree(tree: &TreeNode<AbNodeValue>) {
    tree.walk(&mut |node, depth| {
        println!("{:indent$}{}", "", node.value, indent = 2 * depth);
    });
}

fn run_alpha_beta(common: &Common, moves: &[String], tree: bool) -> Result<()> {
    let board = parse_position(common.size, moves)?;
    let catalogue = load_catalogue(common)?;
    let weights = ScoreWeights::for_patterns(catalogue.len());
    let mut evaluator = PatternEvaluator::spawn(catalogue);
    println!("{board}");

    let deadline = Deadline::after(Duration::from_millis(common.budget_ms));
    let outcome = AlphaBeta::new(&mut evaluator, weights)
        .search(&board, &deadline, tree)
        .context("alpha-beta search failed")?;
    evaluator.shutdown();

    if let Some(tree) = &outcome.tree {
        print_tree(tree);
    }
    match outcome.best_move {
        Some(mv) => println!(
            "best {mv}, value {:.3}, depth {}, {} nodes",
            outcome.value, outcome.depth, outcome.nodes
        ),
        None => println!("no move found within {} ms", common.budget_ms),
    }
    Ok(())
}

fn run_play(common: &Common, seed: Option<u64>, hybrid_at: Option<usize>) -> Result<()> {
    let catalogue = load_catalogue(common)?;
    let weights = ScoreWeights::for_patterns(catalogue.len());
    let budget = Duration::from_millis(common.budget_ms);

    let mut mcts = MctsAgent::new(MctsConfig::default(), budget);
    if let Some(seed) = seed {
        mcts = mcts.with_seed(seed);
    }
    let mut red: Box<dyn Agent> = match hybrid_at {
        Some(stones) => {
            let opening = AlphaBetaAgent::new(Arc::clone(&catalogue), weights.clone(), budget);
            Box::new(HybridAgent::new(opening, mcts, stones))
        }
        None => Box::new(mcts),
    };
    let mut blue = AlphaBetaAgent::new(catalogue, weights, budget);
    info!("{} (red) against {} (blue)", red.name(), blue.name());

    let record = play_game(red.as_mut(), &mut blue, common.size).context("game aborted")?;
    for mv in &record.moves {
        println!("{mv}");
    }
    match record.winner {
        Some(winner) => println!("{winner} wins in {} moves", record.moves.len()),
        None => println!("no winner after {} moves", record.moves.len()),
    }
    Ok(())
}
