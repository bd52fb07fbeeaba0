#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dearmykids::server::run().await
}
