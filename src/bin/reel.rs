use std::env;
use std::path::PathBuf;

fn print_usage() {
    eprintln!("Usage: reel [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --host <HOST>   Bind address (default: 127.0.0.1, env: HOST)");
    eprintln!("  --port <PORT>   Bind port (default: 8000, env: PORT)");
    eprintln!("  --dir <DIR>     Download directory (default: downloads, env: DOWNLOAD_DIR)");
    eprintln!("  -h, --help      Show this help");
    eprintln!();
    eprintln!("The shared secret is read from the AUTH_CODE environment variable.");
}

fn value_for(args: &[String], i: &mut usize, flag: &str) -> String {
    *i += 1;
    args.get(*i).cloned().unwrap_or_else(|| {
        eprintln!("Error: {flag} requires a value");
        std::process::exit(1);
    })
}

#[tokio::main]
async fn main() -> reel_dl::Result<()> {
    env_logger::init();

    let mut config = reel_dl::AppConfig::from_env()?;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "--host" => config.api.host = value_for(&args, &mut i, "--host"),
            "--port" => {
                let value = value_for(&args, &mut i, "--port");
                match value.parse() {
                    Ok(port) => config.api.port = port,
                    Err(_) => {
                        eprintln!("Error: invalid port '{value}'");
                        std::process::exit(1);
                    }
                }
            }
            "--dir" => config.download_dir = PathBuf::from(value_for(&args, &mut i, "--dir")),
            other => {
                eprintln!("Error: unknown option '{other}'");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    if config.access_code == reel_dl::config::DEFAULT_ACCESS_CODE {
        log::warn!("AUTH_CODE is the development default; override it before exposing this service");
    } else if config.access_code.is_empty() {
        log::warn!("AUTH_CODE is empty; the access-code header check is disabled");
    }

    let extractor = reel_dl::Extractor::new(&config)?;
    match extractor.check_engine().await {
        Ok(path) => log::info!("extraction engine: {}", path.display()),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }

    reel_dl::api::run_server(config, extractor).await
}
