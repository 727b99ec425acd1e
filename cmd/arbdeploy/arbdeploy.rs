use std::process::ExitCode;

use arbdeploy::{
    cli::CLI,
    commands::EXIT_FAILURE,
};
use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let CLI { opts, command } = CLI::parse();

    match command.run(&opts).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
