extern crate pvfs_cli;

use std::path::Path;

use pvfs_cli::error::{Error, Result};

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let (name, cmd) = matches.subcommand();
    let cmd = cmd.ok_or_else(|| {
        Error::CliInputError("No command specified. Use --help for available commands.".to_string())
    })?;

    pvfs_cli::utils::initialize_tracing_from_args(cmd);
    let vfs = pvfs_cli::utils::mount_from_args(cmd)?;

    match name {
        "ls" => pvfs_cli::tree::list(&vfs, cmd.value_of("PATH")),
        "tree" => pvfs_cli::tree::show(&vfs, cmd.value_of("PATH")),
        "cat" => {
            let path = cmd
                .value_of("PATH")
                .ok_or_else(|| Error::CliInputError("PATH is required.".to_string()))?;
            pvfs_cli::extract::cat(&vfs, path)
        }
        "extract" => {
            let path = cmd
                .value_of("PATH")
                .ok_or_else(|| Error::CliInputError("PATH is required.".to_string()))?;
            let destination = cmd
                .value_of("destination")
                .ok_or_else(|| Error::CliInputError("--destination is required.".to_string()))?;
            pvfs_cli::extract::extract(&vfs, path, Path::new(destination)).map(|_| ())
        }
        "info" => pvfs_cli::info::show(&vfs),
        other => Err(Error::CliInputError(format!(
            "Unknown command '{}'. Use --help for available commands.",
            other
        ))),
    }
}

fn main() {
    let matches = pvfs_cli::cli::parse_flags();
    if let Err(e) = run(&matches) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
