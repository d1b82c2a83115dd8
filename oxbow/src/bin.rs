use oxbow_base::SystemParams;
use std::process::exit;

fn usage() -> ! {
    eprintln!("usage: oxbow <server-name> [params.yaml]");
    exit(2);
}

fn load_params(path: &str) -> Result<SystemParams, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path, e))?;
    serde_yaml::from_str(&text).map_err(|e| format!("{}: {}", path, e))
}

fn main() {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let name = match args.next() {
        Some(name) => name,
        None => usage(),
    };
    let params = match args.next() {
        Some(path) => match load_params(&path) {
            Ok(params) => params,
            Err(e) => {
                eprintln!("oxbow: cannot load parameters: {}", e);
                exit(2);
            }
        },
        None => SystemParams::default(),
    };

    exit(oxbow::server_start(&name, params));
}
