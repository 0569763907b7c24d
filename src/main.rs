use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    guru::run().await
}
