use anyhow::{Context, Result};
use clap::Parser;
use setgrid_execution::{
    ChannelSink, DisplaySink, FanoutSink, FeatureRule, Game, MatchRule, Selector, TracingSink,
};
use setgrid_types::{ActorId, Card, DisplayEvent, GameConfig, Slot};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

/// Quiet period after the last grid change before the board is redrawn.
const BOARD_SETTLE: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs one setgrid table", long_about = None)]
struct Args {
    /// YAML game configuration (defaults apply to omitted fields).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of stdin-driven players (overrides config).
    #[arg(long)]
    humans: Option<usize>,

    /// Number of computer players (overrides config).
    #[arg(long)]
    computers: Option<usize>,

    /// Round timeout in milliseconds: >0 countdown, 0 elapsed, <0 untimed.
    #[arg(long, allow_negative_numbers = true)]
    turn_timeout_ms: Option<i64>,

    /// Deck shuffle and computer player seed (overrides config).
    #[arg(long)]
    seed: Option<u64>,

    /// Log every legal group after each deal.
    #[arg(long, default_value_t = false)]
    hints: bool,

    /// Print the resolved configuration and exit.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// File, then `SETGRID_*` environment (resolved through `lookup`), then
/// command line.
fn build_config(args: &Args, lookup: impl Fn(&str) -> Option<String>) -> Result<GameConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read config file {}", path.display()))?;
            serde_yaml::from_str(&raw).context("Could not parse config file")?
        }
        None => GameConfig::default(),
    };
    config::apply_overrides(&mut config, lookup);

    if let Some(humans) = args.humans {
        config.human_players = humans;
    }
    if let Some(computers) = args.computers {
        config.computer_players = computers;
    }
    if let Some(timeout) = args.turn_timeout_ms {
        config.turn_timeout_ms = timeout;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.hints {
        config.hints = true;
    }
    config.validate().context("invalid game config")?;
    Ok(config)
}

/// Parses `"<player> <slot>"`, or just `"<slot>"` when there is one human.
fn parse_selection(line: &str, humans: usize) -> Option<(ActorId, Slot)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        [slot] if humans == 1 => Some((ActorId(0), Slot(slot.parse().ok()?))),
        [actor, slot] => {
            let actor: usize = actor.parse().ok()?;
            (actor < humans).then_some(())?;
            Some((ActorId(actor), Slot(slot.parse().ok()?)))
        }
        _ => None,
    }
}

/// Feeds stdin selections to the human players until stdin closes.
async fn read_selections(selectors: Vec<Selector>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(?err, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let Some((actor, slot)) = parse_selection(&line, selectors.len()) else {
            warn!(%line, "expected \"<player> <slot>\"");
            continue;
        };
        if !selectors[actor.0].select(slot) {
            info!(player = actor.0, slot = slot.0, "selection refused");
        }
    }
}

/// Local view of the table rebuilt from display events.
#[derive(Default)]
struct Board {
    cards: BTreeMap<Slot, Card>,
    scores: BTreeMap<ActorId, u32>,
}

impl Board {
    /// Returns true if the event changed what the board shows.
    fn apply(&mut self, event: &DisplayEvent) -> bool {
        match event {
            DisplayEvent::CardPlaced { card, slot } => {
                self.cards.insert(*slot, *card);
                true
            }
            DisplayEvent::CardRemoved { slot } => self.cards.remove(slot).is_some(),
            DisplayEvent::ScoreChanged { actor, score } => {
                self.scores.insert(*actor, *score);
                true
            }
            _ => false,
        }
    }

    fn render(&self, rule: &dyn MatchRule) -> String {
        let mut out = String::new();
        for (slot, card) in &self.cards {
            out.push_str(&format!("  [{:>2}] {}\n", slot.0, rule.describe(*card)));
        }
        let scores: Vec<String> = self
            .scores
            .iter()
            .map(|(actor, score)| format!("{actor}={score}"))
            .collect();
        out.push_str(&format!("  scores: {}\n", scores.join(" ")));
        out
    }
}

/// Redraws the board on stdout once the grid settles.
async fn draw_board(mut events: broadcast::Receiver<DisplayEvent>, rule: Arc<dyn MatchRule>) {
    let mut board = Board::default();
    let mut dirty = false;
    loop {
        let next = if dirty {
            match tokio::time::timeout(BOARD_SETTLE, events.recv()).await {
                Ok(next) => next,
                Err(_) => {
                    println!("{}", board.render(rule.as_ref()));
                    dirty = false;
                    continue;
                }
            }
        } else {
            events.recv().await
        };
        match next {
            Ok(DisplayEvent::WinnersAnnounced { winners }) => {
                println!("{}", board.render(rule.as_ref()));
                let winners: Vec<String> = winners.iter().map(ToString::to_string).collect();
                println!("winners: {}", winners.join(", "));
                break;
            }
            Ok(event) => dirty |= board.apply(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "board fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;
    let config = build_config(&args, |key| std::env::var(key).ok())?;

    if args.dry_run {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let rule: Arc<dyn MatchRule> = Arc::new(FeatureRule::new(config.layout(), config.hand_size));
    let channel = Arc::new(ChannelSink::new(1024));
    let board = tokio::spawn(draw_board(channel.subscribe(), rule.clone()));
    let display: Arc<dyn DisplaySink> = Arc::new(FanoutSink::new(vec![
        Arc::new(TracingSink) as Arc<dyn DisplaySink>,
        channel,
    ]));

    let game = Game::new(&config, rule, display).context("could not set up the table")?;
    let token = game.cancel_token();
    if config.human_players > 0 {
        let selectors: Vec<Selector> = (0..config.human_players)
            .filter_map(|seat| game.selector(ActorId(seat)))
            .collect();
        info!(humans = selectors.len(), "reading selections from stdin");
        tokio::spawn(read_selections(selectors));
    }
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted; ending game");
            token.cancel();
        }
    });

    let outcome = game.run().await;
    if let Err(err) = board.await {
        warn!(?err, "board task failed");
    }
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
