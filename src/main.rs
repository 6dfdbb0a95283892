#[tokio::main]
async fn main() -> anyhow::Result<()> {
    overstim::run().await
}
