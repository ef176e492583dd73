use anyhow::Result;
use lox_scope::Lox;
use structopt::StructOpt;

/// Run a lox script, or start a prompt when no script is given.
#[derive(StructOpt)]
struct Cli {
    /// Path to a lox file.
    #[structopt(parse(from_os_str))]
    script: Option<std::path::PathBuf>,

    /// Print the parsed program before running it.
    #[structopt(long)]
    dump_ast: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Cli::from_args();
    let mut lox = Lox::new().dump_ast(args.dump_ast);

    match args.script {
        Some(path) => lox.run_file(path).map(|_| ()),
        None => lox.run_prompt(),
    }
}
