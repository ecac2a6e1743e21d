// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Identity, Init, Invite, Key, Phrase, Request, Version};

command_enum! {
    (Identity, Identity),
    (Init, Init),
    (Invite, Invite),
    (Key, Key),
    (Phrase, Phrase),
    (Request, Request),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let ctx = match cli::op::OpContext::new(args.config_path) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    hearth_cli::logging::init_logging(&ctx.config.log_level);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
