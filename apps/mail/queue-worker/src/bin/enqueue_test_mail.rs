//! Push a single mail job onto a queue for local testing.
//!
//! ```text
//! cargo run --bin enqueue_test_mail -- t1 no@x.com a@b.com --data '{"name":"Ann"}'
//! ```

use clap::Parser;
use core_config::{FromEnv, redis::RedisConfig};
use eyre::{Result, WrapErr, eyre};
use serde_json::{Map, Value, json};
use stream_worker::StreamProducer;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "enqueue_test_mail")]
#[command(about = "Enqueue one mail job for the queue worker")]
struct Args {
    /// Template identifier
    template: String,

    /// Provider identifier (the sending address)
    provider: String,

    /// Recipients. One address is sent as `to`, several as `tos`.
    #[arg(required = true, num_args = 1..)]
    to: Vec<String>,

    /// Queue (stream) to push onto
    #[arg(short, long, default_value = "mail:default")]
    queue: String,

    /// Template data as a JSON object
    #[arg(short, long, default_value = "{}")]
    data: String,
}

impl Args {
    fn payload(&self) -> Result<Value> {
        let data: Map<String, Value> =
            serde_json::from_str(&self.data).wrap_err("--data must be a JSON object")?;

        let mut payload = json!({
            "provider": self.provider,
            "template": self.template,
            "data": data,
        });
        match self.to.as_slice() {
            [single] => payload["to"] = json!(single),
            many => payload["tos"] = json!(many),
        }

        Ok(payload)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    core_config::tracing::install_color_eyre();

    let args = Args::parse();
    let payload = args.payload()?;

    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    let client = redis::Client::open(redis_config.url.as_str()).wrap_err("Invalid Redis URL")?;
    let redis = client
        .get_connection_manager()
        .await
        .wrap_err("Failed to connect to Redis")?;

    let job_id = Uuid::new_v4().to_string();
    let entry_id = StreamProducer::new(redis)
        .enqueue(&args.queue, &job_id, &payload.to_string())
        .await
        .map_err(|e| eyre!("{}", e))?;

    println!("enqueued job {} on {} as {}", job_id, args.queue, entry_id);
    Ok(())
}
