use clap::Parser;

fn main() {
    let cli = recsyncctl::Cli::parse();
    if let Err(err) = recsyncctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
