use std::path::PathBuf;

use yt_sentiment::RunOptions;

const USAGE: &str = "yt-sentiment - Inspect YouTube comment sentiment from the terminal.

Usage: yt-sentiment [OPTIONS] [URL]

  --config <path>      Read settings from this YAML file
  --demo               Use built-in sample comments instead of the API
  --version, -V        Show version and exit
  --help,    -h        Show this help message";

enum Cli {
    Exit,
    Run(RunOptions),
}

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Cli::Exit) => return,
        Ok(Cli::Run(options)) => options,
        Err(message) => {
            eprintln!("error: {message}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    if let Err(err) = yt_sentiment::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Cli, String> {
    let mut options = RunOptions::default();
    let mut args = args.peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("yt-sentiment {}", yt_sentiment::VERSION);
                return Ok(Cli::Exit);
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                if let Some(path) = yt_sentiment::config::default_path() {
                    println!("\nDefault config file: {}", path.display());
                }
                return Ok(Cli::Exit);
            }
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| "--config needs a path".to_string())?;
                options.config_file = Some(PathBuf::from(path));
            }
            "--demo" => options.demo = true,
            flag if flag.starts_with('-') => return Err(format!("unknown flag {flag}")),
            url => {
                if options.url.is_some() {
                    return Err("only one URL may be given".to_string());
                }
                options.url = Some(url.to_string());
            }
        }
    }
    Ok(Cli::Run(options))
}
