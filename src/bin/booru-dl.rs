#[tokio::main]
async fn main() -> booru_dl::Result<()> {
    env_logger::init();
    booru_dl::cli::run().await
}
