use attache::cli;
use attache::utils::logging;

#[tokio::main]
async fn main() {
    logging::init_tracing();
    std::process::exit(cli::run().await);
}
