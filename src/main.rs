// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use serlink::app::{receive_file, send_file, AppError};
use serlink::link::{DEFAULT_RETRIES, DEFAULT_TIMEOUT};
use serlink::protocol::{MAX_PAYLOAD_LIMIT, MAX_PAYLOAD_SIZE};

const MAX_TIMEOUT_SECS: u64 = 3600;
use serlink::{llclose, llopen, Connection, LinkConfig, Role};

#[derive(Parser)]
#[command(name = "serlink")]
#[command(about = "Stop-and-wait link layer for file transfer over RS-232", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyS0 or COM1)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "9600")]
    baud: u32,

    /// Transmission attempts per frame before giving up
    #[arg(short, long, default_value_t = DEFAULT_RETRIES)]
    retries: u32,

    /// Seconds to wait for each reply
    #[arg(short, long, default_value_t = DEFAULT_TIMEOUT.as_secs(), value_name = "SECS",
          value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS))]
    timeout: u64,

    /// Largest payload carried by one information frame
    #[arg(long, default_value_t = MAX_PAYLOAD_SIZE as u64, value_name = "BYTES",
          value_parser = clap::value_parser!(u64).range(4..=MAX_PAYLOAD_LIMIT as u64))]
    max_payload: u64,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file as the initiator
    Send {
        /// File to send
        file: PathBuf,
    },
    /// Receive a file as the responder
    Receive {
        /// Directory to save the received file
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.debug { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    let role = match cli.command {
        Commands::Send { .. } => Role::Initiator,
        Commands::Receive { .. } => Role::Responder,
    };
    let config = LinkConfig::new(&cli.port, cli.baud, role)
        .with_retries(cli.retries)
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_max_payload(cli.max_payload as usize);

    match &cli.command {
        Commands::Send { file } if !file.is_file() => {
            eprintln!("Error: File not found: {}", file.display());
            std::process::exit(1);
        }
        Commands::Receive { output_dir } if !output_dir.is_dir() => {
            eprintln!("Error: Output directory not found: {}", output_dir.display());
            std::process::exit(1);
        }
        _ => {}
    }

    let mut conn = match llopen(config) {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("Failed to open link on {}: {}", cli.port, e);
            std::process::exit(1);
        }
    };

    let transfer = run(&mut conn, &cli.command);
    let closed = llclose(&mut conn);

    println!("\n{}", conn.statistics());

    if let Err(e) = transfer {
        eprintln!("Transfer failed: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = closed {
        eprintln!("Close failed: {}", e);
        std::process::exit(1);
    }
}

fn run(conn: &mut Connection, command: &Commands) -> Result<(), AppError> {
    match command {
        Commands::Send { file } => {
            let sent = send_file(conn, file)?;
            println!("\nFile sent successfully! ({} bytes)", sent);
        }
        Commands::Receive { output_dir } => {
            let path = receive_file(conn, output_dir)?;
            println!("\nFile received successfully: {}", path.display());
        }
    }
    Ok(())
}
