use clap::Parser;
use chronovault::cli::commands;
use chronovault::cli::{init_tracing, output, Cli, Commands};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init => commands::init::execute(&cli),
        Commands::Verify => commands::verify::execute(&cli),
        Commands::Status { refresh } => commands::status::execute(&cli, refresh),
        Commands::Info => commands::info::execute(&cli),
        Commands::RefreshTime => commands::refresh_time::execute(&cli),
        Commands::Add {
            ref file,
            ref unlock_at,
            ref name,
            rename,
        } => commands::add::execute(&cli, file, unlock_at, name.as_deref(), rename),
        Commands::Unlock { ref name, ref out } => commands::unlock::execute(&cli, name, out),
        Commands::UnlockAll { ref out } => commands::unlock_all::execute(&cli, out),
        #[cfg(feature = "audit-log")]
        Commands::Audit { last, ref since } => {
            commands::audit_cmd::execute(&cli, last, since.as_deref())
        }
        Commands::Completions { ref shell } => commands::completions::execute(shell),
    };

    if let Err(e) = result {
        output::error(&e.to_string());
        std::process::exit(1);
    }
}
