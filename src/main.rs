use std::path::PathBuf;
use talk_uploader_lib::config::DEFAULT_CONFIG_FILE;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    talk_uploader_lib::init_logging();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if let Err(e) = talk_uploader_lib::run(&config_path).await {
        log::error!("Upload run aborted: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
