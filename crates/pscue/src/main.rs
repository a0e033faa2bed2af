use clap::Parser;
use clap::error::ErrorKind;

mod command;

#[tokio::main]
async fn main() {
    let cli = match command::Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    if let Err(err) = command::run(cli).await {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}
