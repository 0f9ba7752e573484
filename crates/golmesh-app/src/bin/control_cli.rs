use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use golmesh_app::servers::{
    ALIVE_ROUTE, END_ROUTE, PAUSE_ROUTE, QUIT_ROUTE, START_ROUTE, STATUS_ROUTE, WORLD_ROUTE,
};
use golmesh_app::{
    AliveReport, PauseOutcome, RunOutcome, RunSnapshot, StartRequest, StatusReport, WorldReport,
};
use golmesh_core::World;
use owo_colors::OwoColorize;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use reqwest::Client;
use serde::de::DeserializeOwned;

#[derive(Parser, Debug)]
#[command(
    name = "golmesh-control",
    version,
    about = "Drive a golmesh broker through its REST control API"
)]
struct Cli {
    /// Base URL of the broker's control API.
    #[arg(
        long,
        env = "GOLMESH_BROKER_URL",
        default_value = "http://127.0.0.1:12345"
    )]
    broker_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a run and wait for it to finish.
    Start {
        /// Life plaintext file with the initial pattern.
        #[arg(long, conflicts_with = "random", required_unless_present = "random")]
        pattern: Option<PathBuf>,
        /// Random soup with the given alive probability (0.0 to 1.0).
        #[arg(long)]
        random: Option<f64>,
        /// World width; a pattern is centred in a world of this size.
        #[arg(long)]
        width: Option<usize>,
        /// World height; a pattern is centred in a world of this size.
        #[arg(long)]
        height: Option<usize>,
        /// Seed for `--random`.
        #[arg(long)]
        seed: Option<u64>,
        /// Generations to compute.
        #[arg(long, default_value_t = 100)]
        turns: u64,
        /// Workers to split rows across.
        #[arg(long, default_value_t = 4)]
        workers: usize,
        /// Print the final world.
        #[arg(long)]
        show: bool,
    },
    /// Report the alive count of the last committed turn.
    Alive,
    /// Fetch the last committed world.
    World {
        /// Print only the plaintext grid.
        #[arg(long)]
        plain: bool,
    },
    /// Pause a running run, or resume a paused one.
    Pause,
    /// End the active run after its in-flight turn.
    End,
    /// Stop the broker and terminate its workers.
    Quit,
    /// Show the broker's run state.
    Status,
}

const DEFAULT_RANDOM_SIZE: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let base_url = cli.broker_url.as_str();

    match cli.command {
        Command::Start {
            pattern,
            random,
            width,
            height,
            seed,
            turns,
            workers,
            show,
        } => {
            let world = match (pattern, random) {
                (Some(path), _) => pattern_world(&path, width, height)?,
                (None, Some(density)) => random_world(density, width, height, seed)?,
                (None, None) => bail!("provide either --pattern or --random"),
            };
            start_command(&client, base_url, world, turns, workers, show).await?
        }
        Command::Alive => alive_command(&client, base_url).await?,
        Command::World { plain } => world_command(&client, base_url, plain).await?,
        Command::Pause => pause_command(&client, base_url).await?,
        Command::End => {
            let snapshot: RunSnapshot = post(&client, base_url, END_ROUTE).await?;
            print_snapshot("ended", &snapshot);
        }
        Command::Quit => {
            let snapshot: RunSnapshot = post(&client, base_url, QUIT_ROUTE).await?;
            print_snapshot("quit", &snapshot);
        }
        Command::Status => status_command(&client, base_url).await?,
    }

    Ok(())
}

fn pattern_world(path: &Path, width: Option<usize>, height: Option<usize>) -> Result<World> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read pattern file {}", path.display()))?;
    let pattern = World::from_plaintext(&text)
        .with_context(|| format!("pattern file {} is not valid Life plaintext", path.display()))?;
    let width = width.unwrap_or(pattern.width()).max(pattern.width());
    let height = height.unwrap_or(pattern.height()).max(pattern.height());
    let mut world = World::new(width, height)?;
    world.place(
        &pattern,
        (height - pattern.height()) / 2,
        (width - pattern.width()) / 2,
    );
    Ok(world)
}

fn random_world(
    density: f64,
    width: Option<usize>,
    height: Option<usize>,
    seed: Option<u64>,
) -> Result<World> {
    if !(0.0..=1.0).contains(&density) {
        bail!("--random expects a density between 0.0 and 1.0, got {density}");
    }
    let mut rng = SmallRng::seed_from_u64(seed.unwrap_or_else(rand::random));
    let world = World::random(
        width.unwrap_or(DEFAULT_RANDOM_SIZE),
        height.unwrap_or(DEFAULT_RANDOM_SIZE),
        density,
        &mut rng,
    )?;
    Ok(world)
}

async fn start_command(
    client: &Client,
    base_url: &str,
    world: World,
    turns: u64,
    workers: usize,
    show: bool,
) -> Result<()> {
    println!(
        "{} {}x{} world, {} alive, {} turns on {} workers",
        "starting".cyan().bold(),
        world.width(),
        world.height(),
        world.alive_count(),
        turns,
        workers
    );
    let request = StartRequest {
        world,
        turns,
        workers,
    };
    let response = client
        .post(join_url(base_url, START_ROUTE))
        .json(&request)
        .send()
        .await
        .context("failed to start run")?;
    let outcome: RunOutcome = parse_response(response).await?;
    println!(
        "{} turn {} with {} alive ({})",
        "finished".green().bold(),
        outcome.turn,
        outcome.alive,
        outcome.reason.italic()
    );
    if show {
        println!("{}", outcome.world.to_plaintext());
    }
    Ok(())
}

async fn alive_command(client: &Client, base_url: &str) -> Result<()> {
    let report: AliveReport = get(client, base_url, ALIVE_ROUTE).await?;
    println!(
        "{} {} {} {}",
        "turn".bold().cyan(),
        report.turn,
        "alive".bold().cyan(),
        report.alive
    );
    Ok(())
}

async fn world_command(client: &Client, base_url: &str, plain: bool) -> Result<()> {
    let report: WorldReport = get(client, base_url, WORLD_ROUTE).await?;
    let Some(world) = report.world else {
        println!("{}", "no run has started".yellow());
        return Ok(());
    };
    if !plain {
        println!(
            "{} {} {} {}x{} {} {}",
            "turn".bold().cyan(),
            report.turn,
            "size".bold().cyan(),
            world.width(),
            world.height(),
            "alive".bold().cyan(),
            world.alive_count()
        );
    }
    println!("{}", world.to_plaintext());
    Ok(())
}

async fn pause_command(client: &Client, base_url: &str) -> Result<()> {
    let outcome: PauseOutcome = post(client, base_url, PAUSE_ROUTE).await?;
    if outcome.paused {
        println!(
            "{} before turn {}",
            "paused".yellow().bold(),
            outcome.next_turn
        );
    } else {
        println!(
            "{} at turn {}",
            "resumed".green().bold(),
            outcome.next_turn
        );
    }
    Ok(())
}

async fn status_command(client: &Client, base_url: &str) -> Result<()> {
    let status: StatusReport = get(client, base_url, STATUS_ROUTE).await?;
    let size = match (status.width, status.height) {
        (Some(width), Some(height)) => format!("{width}x{height}"),
        _ => "-".to_string(),
    };
    println!("{:<12} {}", "STATE".bold().cyan(), status.state);
    println!("{}", "-".repeat(32).dimmed());
    println!("{:<12} {} / {}", "turn".bold(), status.turn, status.budget);
    println!("{:<12} {}", "alive".bold(), status.alive);
    println!("{:<12} {}", "workers".bold(), status.workers);
    println!("{:<12} {}", "world".bold(), size);
    if let Some(error) = status.last_error {
        println!("{:<12} {}", "last error".bold(), error.red());
    }
    Ok(())
}

fn print_snapshot(label: &str, snapshot: &RunSnapshot) {
    println!(
        "{} at turn {} with {} alive",
        label.green().bold(),
        snapshot.turn,
        snapshot.alive
    );
}

async fn get<T: DeserializeOwned>(client: &Client, base_url: &str, route: &str) -> Result<T> {
    let response = client
        .get(join_url(base_url, route))
        .send()
        .await
        .with_context(|| format!("failed to reach broker at {base_url}"))?;
    parse_response(response).await
}

async fn post<T: DeserializeOwned>(client: &Client, base_url: &str, route: &str) -> Result<T> {
    let response = client
        .post(join_url(base_url, route))
        .send()
        .await
        .with_context(|| format!("failed to reach broker at {base_url}"))?;
    parse_response(response).await
}

async fn parse_response<T>(response: reqwest::Response) -> Result<T>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if status.is_success() {
        response
            .json::<T>()
            .await
            .context("failed to deserialize control API response")
    } else {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unavailable>".to_string());
        let message = serde_json::from_str::<golmesh_core::ErrorBody>(&body)
            .map(|body| body.error)
            .unwrap_or(body);
        bail!("control API request failed ({status}): {message}");
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
