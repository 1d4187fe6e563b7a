//! Motorcade command-line entry point.

mod world;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use motorcade_bridge::client::BridgeClient;
use motorcade_bridge::protocol::ControlCommand;
use motorcade_bridge::server::{BridgeServer, SessionOptions};
use motorcade_core::config::EpisodeSettings;

use crate::world::DemoWorld;

const DEFAULT_DEMO_TICKS: u64 = 40;

/// Session bridge between a simulation host and external clients.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve episodes from the built-in demo world over TCP.
    Serve {
        /// Address to listen on.
        #[arg(short, long, default_value = "127.0.0.1:2000")]
        address: String,

        /// Blocking-operation timeout in milliseconds.
        #[arg(short, long, default_value_t = 10_000)]
        timeout_ms: u64,

        /// Episode settings file (TOML).
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Drive one loopback episode and print the measurements.
    Demo {
        /// Ticks to exchange before hanging up.
        #[arg(short = 'n', long, default_value_t = DEFAULT_DEMO_TICKS)]
        ticks: u64,
    },

    /// Print workspace crate versions.
    Info,
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Serve {
            address,
            timeout_ms,
            config,
        }) => run_serve(&address, timeout_ms, config),
        Some(Commands::Demo { ticks }) => run_demo(ticks),
        Some(Commands::Info) => run_info(),
        None => run_demo(DEFAULT_DEMO_TICKS),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Ignore error if already set (e.g., during tests).
    let _ = fmt().with_env_filter(env_filter).try_init();
}

fn run_serve(address: &str, timeout_ms: u64, config: Option<PathBuf>) {
    let mut world = match config {
        Some(path) => {
            let settings = EpisodeSettings::from_file(&path).expect("failed to load settings file");
            DemoWorld::with_settings(settings)
        }
        None => DemoWorld::new(),
    };

    let server = BridgeServer::bind(address, Duration::from_millis(timeout_ms))
        .expect("failed to bind server");
    let addr = server.local_addr().expect("failed to read local address");
    println!("motorcade bridge listening on {addr}");

    loop {
        println!("waiting for client...");
        match server.serve_episode(&mut world) {
            Ok(summary) => println!("episode over: {summary}"),
            Err(e) => eprintln!("client error: {e}"),
        }
    }
}

fn run_demo(ticks: u64) {
    let timeout = Duration::from_secs(10);
    let options = SessionOptions {
        max_ticks: Some(ticks),
    };
    let server = BridgeServer::bind_with_options("127.0.0.1:0", timeout, options)
        .expect("failed to bind loopback server");
    let addr = server.local_addr().expect("failed to read local address");

    let host = std::thread::spawn(move || {
        let mut world = DemoWorld::new();
        server.serve_episode(&mut world)
    });

    let mut client = BridgeClient::dial(addr, timeout).expect("failed to reach loopback server");
    client.request_episode("").expect("episode request failed");
    let scene = client.scene_description().expect("no scene description");
    println!("scene offers {} spawn points", scene.spawn_points.len());
    client.select_spawn(0).expect("spawn selection failed");
    client.await_ready().expect("episode never became ready");

    let command = ControlCommand {
        autopilot: true,
        ..ControlCommand::default()
    };
    for _ in 0..ticks {
        client.send_control(&command).expect("control send failed");
        let snapshot = client.measurements().expect("measurements read failed");
        let location = &snapshot.player.transform.location;
        println!(
            "t={:>6} ms  pos=({:>7.0}, {:>7.0}) cm  speed={:>5.1} km/h  agents={}  frames={}",
            snapshot.game_timestamp,
            location.x,
            location.y,
            snapshot.player.forward_speed,
            snapshot.agents.len(),
            snapshot.images.len(),
        );
    }
    drop(client);

    match host.join().expect("server thread panicked") {
        Ok(summary) => println!("episode over: {summary}"),
        Err(e) => eprintln!("session failed: {e}"),
    }
}

fn run_info() {
    println!("motorcade {}", env!("CARGO_PKG_VERSION"));
    println!("workspace crates:");
    println!("  motorcade-core        {}", env!("CARGO_PKG_VERSION"));
    println!("  motorcade-bridge      {}", env!("CARGO_PKG_VERSION"));
    println!("  motorcade-test-utils  {}", env!("CARGO_PKG_VERSION"));
    println!("  motorcade-app         {}", env!("CARGO_PKG_VERSION"));
    println!("edition: 2024");
}
