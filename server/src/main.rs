use clap::{Parser, ValueEnum};
use log::{error, info};

use server::network::{Server, ServerConfig};
use server::round::{StartCondition, WinCondition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StartMode {
    /// Round starts as soon as one player joins.
    Immediate,
    /// First player arms a countdown.
    Countdown,
    /// Round starts once enough players are present.
    MinPlayers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum WinMode {
    /// Endless round.
    None,
    /// Round ends after a fixed duration; most kills wins.
    Timed,
    /// First player to the kill target wins.
    Score,
    /// Last player with lives remaining wins.
    Survivor,
}

#[derive(Parser, Debug)]
#[command(version, about = "Authoritative tank battle server")]
struct Args {
    /// Address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Simulation ticks per second
    #[arg(long, default_value_t = 30)]
    tick_rate: u32,

    /// Map width in tiles
    #[arg(long, default_value_t = 48)]
    map_width: u32,

    /// Map height in tiles
    #[arg(long, default_value_t = 36)]
    map_height: u32,

    /// Terrain seed; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Maximum simultaneous players
    #[arg(long, default_value_t = 32)]
    max_clients: usize,

    /// How rounds start
    #[arg(long, value_enum, default_value_t = StartMode::Countdown)]
    start: StartMode,

    /// Countdown length for --start countdown
    #[arg(long, default_value_t = 5)]
    countdown_secs: u64,

    /// Player threshold for --start min-players
    #[arg(long, default_value_t = 2)]
    min_players: usize,

    /// How rounds end
    #[arg(long, value_enum, default_value_t = WinMode::Survivor)]
    win: WinMode,

    /// Round length for --win timed
    #[arg(long, default_value_t = 300)]
    round_secs: u64,

    /// Kill target for --win score
    #[arg(long, default_value_t = 10)]
    score_limit: u32,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let start_condition = match args.start {
        StartMode::Immediate => StartCondition::Immediate,
        StartMode::Countdown => StartCondition::Countdown(args.countdown_secs * 1000),
        StartMode::MinPlayers => StartCondition::MinPlayers(args.min_players),
    };
    let win_condition = match args.win {
        WinMode::None => WinCondition::None,
        WinMode::Timed => WinCondition::Timed(args.round_secs * 1000),
        WinMode::Score => WinCondition::FirstToScore(args.score_limit),
        WinMode::Survivor => WinCondition::LastSurvivor,
    };
    let seed = args.seed.unwrap_or_else(rand::random);
    info!("Terrain seed: {}", seed);

    let config = ServerConfig {
        addr: format!("{}:{}", args.host, args.port),
        tick_rate: args.tick_rate,
        map_width: args.map_width,
        map_height: args.map_height,
        seed,
        max_clients: args.max_clients,
        start_condition,
        win_condition,
    };

    let server = match Server::new(config).await {
        Ok(server) => server,
        Err(err) => {
            error!("Failed to start server: {}", err);
            std::process::exit(1);
        }
    };

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }
}
