use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = hubscoutctl::Cli::parse();
    hubscoutctl::init_tracing(cli.log_level.as_deref());
    if let Err(err) = hubscoutctl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
