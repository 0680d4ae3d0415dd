use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "squelch")]
#[command(about = "Operator console for the squelch push-to-talk server")]
struct Cli {
    /// Server base URL.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Uptime, client list and current floor holder.
    Status {
        #[arg(long, env = "DASH_PASSWORD")]
        password: String,
    },

    /// Force-release the floor (relay off, recording finalized).
    Release {
        #[arg(long, env = "DASH_PASSWORD")]
        password: String,
    },

    /// Claim or drop the floor on behalf of the external VOX gateway.
    Vox {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },

    /// Cycle the USB relay directly, bypassing the server. Useful on the
    /// bench when wiring up the transmitter.
    RelayTest {
        #[arg(long, default_value = "/dev/ttyUSB0")]
        port: String,

        #[arg(long, default_value_t = 9_600)]
        baud: u32,

        #[arg(long, default_value_t = 3)]
        cycles: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Status { password } => status(&cli.server, &password),
        Commands::Release { password } => release(&cli.server, &password),
        Commands::Vox { state } => vox(&cli.server, &state),
        Commands::RelayTest { port, baud, cycles } => relay_test(&port, baud, cycles),
    }
}

fn http() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("build http client")
}

fn login(client: &reqwest::blocking::Client, server: &str, password: &str) -> Result<String> {
    let body: Value = client
        .post(format!("{server}/api/dash/login"))
        .json(&json!({ "password": password }))
        .send()
        .context("login request")?
        .json()
        .context("login response")?;
    body["token"]
        .as_str()
        .map(str::to_string)
        .context("login rejected")
}

fn status(server: &str, password: &str) -> Result<()> {
    let client = http()?;
    let token = login(&client, server, password)?;

    let status: Value = client
        .get(format!("{server}/api/dash/status"))
        .bearer_auth(&token)
        .send()?
        .json()?;
    let clients: Value = client
        .get(format!("{server}/api/dash/clients"))
        .bearer_auth(&token)
        .send()?
        .json()?;
    let ptt: Value = client
        .get(format!("{server}/api/dash/ptt"))
        .bearer_auth(&token)
        .send()?
        .json()?;

    println!("{}", "squelch server".green().bold());
    println!(
        "   uptime: {}s   clients: {}   p2p: {}   rss: {} kB",
        status["uptimeSeconds"],
        status["clients"],
        status["p2pConnections"],
        status["memory"]["rssKb"]
    );

    match ptt["active"].as_bool() {
        Some(true) => println!(
            "   floor:  {} ({}) for {} ms",
            ptt["speakerName"].as_str().unwrap_or("?").yellow(),
            ptt["speaker"].as_str().unwrap_or("?"),
            ptt["heldMs"]
        ),
        _ => println!("   floor:  {}", "idle".cyan()),
    }

    if let Some(rows) = clients["clients"].as_array() {
        for row in rows {
            println!(
                "   - {} {:16} p2p={}",
                row["clientId"].as_str().unwrap_or("?"),
                row["displayName"].as_str().unwrap_or("?"),
                row["p2pState"].as_str().unwrap_or("?")
            );
        }
    }
    Ok(())
}

fn release(server: &str, password: &str) -> Result<()> {
    let client = http()?;
    let token = login(&client, server, password)?;
    let body: Value = client
        .post(format!("{server}/api/dash/ptt/release"))
        .bearer_auth(&token)
        .send()?
        .json()?;
    if body["success"] == true {
        println!("{}", "floor released".green());
    } else {
        anyhow::bail!("release failed: {body}");
    }
    Ok(())
}

fn vox(server: &str, state: &str) -> Result<()> {
    let client = http()?;
    let body: Value = client
        .post(format!("{server}/api/vox/{state}"))
        .send()?
        .json()?;
    if body["success"] == true {
        println!("{}", format!("vox {state}").green());
    } else {
        println!(
            "{} {} ({})",
            "busy:".red(),
            body["speakerName"].as_str().unwrap_or("?"),
            body["speaker"].as_str().unwrap_or("?")
        );
    }
    Ok(())
}

fn relay_test(port: &str, baud: u32, cycles: u32) -> Result<()> {
    let mut serial = serialport::new(port, baud)
        .timeout(Duration::from_secs(1))
        .open()
        .with_context(|| format!("open {port}"))?;
    println!("connected to {port} at {baud} baud");

    std::thread::sleep(Duration::from_millis(500));
    for n in 1..=cycles {
        println!("--- cycle {n} ---");
        serial.write_all(b"A1")?;
        serial.flush()?;
        println!("{}", "relay A ON".yellow());
        std::thread::sleep(Duration::from_secs(2));

        serial.write_all(b"A0")?;
        serial.flush()?;
        println!("relay A OFF");
        std::thread::sleep(Duration::from_secs(2));
    }
    println!("{}", "done".green());
    Ok(())
}
