use clap;

pub fn parse_flags<'a>() -> clap::ArgMatches<'a> {
    app().get_matches()
}

pub fn app<'a, 'b>() -> clap::App<'a, 'b> {
    clap::App::new("pvfs-cli")
        .version(clap::crate_version!())
        .about("Browse and extract packfile archives as one virtual file system")
        .setting(clap::AppSettings::SubcommandRequiredElseHelp)
        .arg(clap::Arg::from_usage("-d --debug 'Enable debug output'").global(true))
        .arg(
            clap::Arg::from_usage("-p, --path [path] 'Folder holding the archives to mount'")
                .global(true),
        )
        .arg(
            clap::Arg::from_usage("--prefix [prefix] 'Mount prefix (defaults to the configured one)'")
                .global(true),
        )
        .arg(
            clap::Arg::from_usage("-c, --config [config] 'JSON file with mount settings'")
                .global(true),
        )
        .subcommand(
            clap::SubCommand::with_name("ls")
                .about("List a directory in archive order")
                .arg(clap::Arg::from_usage("[PATH] 'Directory to list (defaults to the mount root)'")),
        )
        .subcommand(
            clap::SubCommand::with_name("tree")
                .about("Show every entry under a directory")
                .arg(clap::Arg::from_usage("[PATH] 'Directory to show (defaults to the mount root)'")),
        )
        .subcommand(
            clap::SubCommand::with_name("cat")
                .about("Write a file's bytes to stdout")
                .arg(clap::Arg::from_usage("<PATH> 'File to print'")),
        )
        .subcommand(
            clap::SubCommand::with_name("extract")
                .about("Write a file, or every file under a directory, to disk")
                .arg(clap::Arg::from_usage("<PATH> 'File or directory to extract'"))
                .arg(
                    clap::Arg::from_usage("--destination <output_folder> 'Folder to extract into'")
                        .required(true),
                ),
        )
        .subcommand(
            clap::SubCommand::with_name("info").about("Show what was mounted and what is cached"),
        )
}
