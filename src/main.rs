use clap::Parser;

use city_traffic::simulation::{SimEngine, UserRole, TICK_INTERVAL_MS};

#[derive(Parser)]
#[command(name = "city_traffic")]
#[command(about = "Smart-city traffic simulation, headless")]
struct Cli {
    /// Number of simulation ticks to run
    #[arg(long, default_value = "2000")]
    ticks: u64,

    /// Wall-clock milliseconds per tick; 0 runs as fast as possible
    #[arg(long, default_value = "0")]
    tick_ms: u64,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Log in as a bus driver and start the bus routes
    #[arg(long)]
    bus_driver: bool,

    /// Ticks between state summaries
    #[arg(long, default_value = "400")]
    report_every: u64,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut engine = match cli.seed {
        Some(seed) => SimEngine::create_city_with_seed(seed),
        None => SimEngine::create_city(),
    };

    engine.initialize_traffic();
    if cli.bus_driver {
        engine.set_current_user(UserRole::BusDriver, "busdriver1@example.com");
    }

    println!("Running city traffic simulation...");
    println!(
        "Ticks: {}, one tick = {} ms of simulated time",
        cli.ticks, TICK_INTERVAL_MS
    );
    println!();
    engine.print_summary();
    println!();

    for _ in 0..cli.ticks {
        engine.tick();

        if cli.report_every > 0 && engine.tick_count() % cli.report_every == 0 {
            println!(
                "--- tick {} ({:.1}s simulated time) ---",
                engine.tick_count(),
                engine.tick_count() as f64 * TICK_INTERVAL_MS as f64 / 1000.0
            );
            engine.print_summary();
            println!();
        }

        if cli.tick_ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(cli.tick_ms));
        }
    }

    println!("=== Final State ===");
    engine.print_summary();
}
