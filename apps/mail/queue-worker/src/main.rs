//! Mail Queue Worker - Entry Point

#[tokio::main]
async fn main() -> eyre::Result<()> {
    core_config::tracing::install_color_eyre();
    mail_queue_worker::run().await
}
