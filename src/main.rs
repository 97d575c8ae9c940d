use clap::Parser;
use std::process::ExitCode;

use fnirs_qr_lib::cli::Args;
use fnirs_qr_lib::{QualityConfig, SnirfLoader};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = QualityConfig::from(Args::parse());

    match fnirs_qr_lib::run(&config, &SnirfLoader) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
