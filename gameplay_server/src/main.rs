#[tokio::main]
async fn main() -> std::io::Result<()> {
    gameplay_server::run_with_config().await
}
