//! `canopy` command-line entry point

use canopy_core::cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let matches = cli::command().get_matches();

    let settings = match cli::settings(&matches) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {:#}", anyhow::Error::from(err));
            return ExitCode::FAILURE;
        }
    };
    cli::init_tracing(&settings.log_filter);

    let mut stdout = std::io::stdout().lock();
    match cli::execute(&matches, &settings, &mut stdout) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
