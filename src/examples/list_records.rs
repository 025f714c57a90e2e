//! List Records Example
//!
//! Builds an encoded query and lists matching incidents.
//!
//! Reads connection settings from `snowtable.json`:
//! `{"instance": "https://dev12345.service-now.com", "username": "admin", "password": "..."}`
//!
//! Run with: cargo run --example list_records

use chrono::{Duration, Utc};
use snowtable_rs::{Client, ClientConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("snowtable_rs=debug,snowtable_core=debug"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()?;

    let config = ClientConfig::load("snowtable.json")?;
    tracing::info!("Connecting to {}", config.instance);
    let client = Client::new(config);

    let mut query = client.query();
    query
        .field("active")
        .equals("true")?
        .and()
        .field("priority")
        .equals(vec![1, 2])?
        .and()
        .field("opened_at")
        .greater_than(Utc::now() - Duration::days(7))?
        .and()
        .field("opened_at")
        .order_descending()?;

    println!("Query: {}\n", query.build()?);

    let total = client.count_records("incident", Some(&query)).await?;
    println!("Matching incidents: {}", total);

    let body = client.get_records("incident", Some(&query)).await?;
    let parsed: serde_json::Value = serde_json::from_str(&body)?;
    if let Some(records) = parsed["result"].as_array() {
        for record in records.iter().take(10) {
            println!(
                "  {} {}",
                record["number"].as_str().unwrap_or("?"),
                record["short_description"].as_str().unwrap_or("")
            );
        }
    }

    Ok(())
}
