//! Basic example: fetch the running configuration over NETCONF
//!
//! Connects without credentials first (the device is only required to be
//! reachable), then logs in explicitly and runs `<get-config>`.
//!
//! # Prerequisites
//!
//! - NETCONF-over-SSH enabled on the device (port 830)
//! - Valid credentials (username/password or SSH key)
//!
//! # Usage
//!
//! ```bash
//! cargo run --example get_config -- --host 192.168.1.1 --user admin --password secret
//! cargo run --example get_config -- --host 192.168.1.1 --user admin --key ~/.ssh/id_ed25519
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use ferrisconf::{Account, HostKeyVerification, Protocol, SessionBuilder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut account = Account::new(&args.user);
    if let Some(password) = &args.password {
        account = account.with_password(password);
    } else if let Some(key_path) = &args.key {
        account = account.with_key(std::fs::read_to_string(key_path)?);
    } else {
        eprintln!("Error: Must provide either --password or --key");
        std::process::exit(1);
    }

    let mut session = SessionBuilder::new(&args.host)
        .port(args.port)
        .timeout(Duration::from_secs(args.timeout))
        .host_key_verification(HostKeyVerification::AcceptNew)
        .subscribe(|line| print!("<<< {line}"))
        .build()?;

    println!("Connecting to {}:{}...", args.host, args.port);
    session.open().await?;
    println!("Reachable (state: {})", session.state());

    session.login(Arc::new(account)).await?;
    println!("Logged in as {}", args.user);

    if let Some(handle) = session.handle() {
        println!(
            "Session id {:?}, framing {:?}, {} server capabilities",
            handle.session_id(),
            handle.framing(),
            handle.server_capabilities().len()
        );
    }

    let (status, reply) = session
        .execute("<get-config><source><running/></source></get-config>")
        .await?;
    println!("{}", "-".repeat(50));
    println!("status {status}, {} bytes of configuration", reply.len());

    session.close(false).await?;
    println!("Closed");

    Ok(())
}

struct Args {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    key: Option<String>,
    timeout: u64,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();

        let mut host = "localhost".to_string();
        let mut port = 830;
        let mut user = env::var("USER").unwrap_or_else(|_| "admin".to_string());
        let mut password = None;
        let mut key = None;
        let mut timeout = 30;

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).cloned();
            match args[i].as_str() {
                "--host" | "-h" => host = value.unwrap_or(host),
                "--port" | "-p" => port = value.and_then(|v| v.parse().ok()).unwrap_or(830),
                "--user" | "-u" => user = value.unwrap_or(user),
                "--password" | "-P" => password = value,
                "--key" | "-k" => key = value,
                "--timeout" | "-t" => timeout = value.and_then(|v| v.parse().ok()).unwrap_or(30),
                "--help" => {
                    println!(
                        "USAGE: get_config [--host HOST] [--port PORT] [--user USER] \
                         [--password PASS | --key PATH] [--timeout SECS]"
                    );
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    i += 1;
                    continue;
                }
            }
            i += 2;
        }

        Self {
            host,
            port,
            user,
            password,
            key,
            timeout,
        }
    }
}
