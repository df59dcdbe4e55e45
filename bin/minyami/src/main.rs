use clap::Parser;
use minyami_cli::MinyamiArgs;

#[tokio::main]
async fn main() {
    let args = MinyamiArgs::parse();
    pretty_env_logger::formatted_builder()
        .filter_level(args.log_level())
        .parse_default_env()
        .init();

    if let Err(e) = args.run().await {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}
