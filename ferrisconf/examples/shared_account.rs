//! Shared account example: many devices, one login identity
//!
//! Several tasks poll different devices but must all log in as the same
//! account. The account pool makes sure only one task drives that identity
//! at a time; the others wait their turn in FIFO order.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example shared_account -- 10.0.0.1 10.0.0.2 10.0.0.3
//! ```
//!
//! Credentials are read from `NETCONF_USER` and `NETCONF_PASSWORD`.

use std::env;
use std::sync::Arc;

use ferrisconf::{Account, AccountManager, Protocol, SessionBuilder};
use log::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let user = env::var("NETCONF_USER").unwrap_or_else(|_| "oper".to_string());
    let password = env::var("NETCONF_PASSWORD").unwrap_or_default();
    let hosts: Vec<String> = env::args().skip(1).collect();

    let pool = Arc::new(AccountManager::from_accounts([
        Account::new(&user).with_password(password),
    ])?);

    let mut tasks = Vec::new();
    for host in hosts {
        let pool = pool.clone();
        let user = user.clone();
        tasks.push(tokio::spawn(async move {
            let mut session = SessionBuilder::new(&host).account_manager(pool).build()?;

            session.open().await?;
            session.login_with_manager(&user).await?;
            info!("{}: logged in as {}", host, user);

            let (_, reply) = session.execute("<get><filter type=\"subtree\"><system-state/></filter></get>").await?;
            info!("{}: {} bytes of state", host, reply.len());

            // Releases the pool account for the next waiting task
            session.close(false).await?;
            Ok::<_, ferrisconf::Error>(())
        }));
    }

    for task in tasks {
        if let Err(e) = task.await? {
            error!("device task failed: {}", e);
        }
    }

    Ok(())
}
