//! Record Lifecycle Example
//!
//! Creates, reads, updates and deletes a single incident.
//!
//! Run with: cargo run --example record_lifecycle

use snowtable_rs::{Client, ClientConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    let config = ClientConfig::load("snowtable.json")?;
    let client = Client::new(config);
    let table = "incident";

    let sys_id = client
        .create_record(
            table,
            &serde_json::json!({
                "short_description": "Created by snowtable",
                "urgency": "3",
            }),
        )
        .await?;
    println!("Created {}", sys_id);

    let body = client.get_single_record(table, &sys_id).await?;
    println!("Fetched {} bytes", body.len());

    let updated = client
        .update_single_record(table, &serde_json::json!({"urgency": "2"}), &sys_id)
        .await?;
    println!("Updated {}", updated);

    if client.delete_single_record(table, &sys_id).await? {
        println!("Deleted {}", sys_id);
    } else {
        println!("Delete of {} was not confirmed", sys_id);
    }

    Ok(())
}
