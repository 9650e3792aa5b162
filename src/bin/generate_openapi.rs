//! Dumps the compiled OpenAPI spec as pretty JSON.
//!
//! Usage:
//!   cargo run --bin generate_openapi > openapi.json
//!   cargo run --bin generate_openapi -- --output openapi.json

use std::{env, fs, io, io::Write, process};

use thermocloud_service::api::handlers::ApiDoc;
use utoipa::OpenApi;

fn main() {
    let json = ApiDoc::openapi()
        .to_pretty_json()
        .expect("OpenAPI spec must serialise");

    let args: Vec<String> = env::args().collect();
    let output = args
        .windows(2)
        .find(|w| w[0] == "--output")
        .map(|w| w[1].clone());

    match output {
        Some(path) => {
            if let Err(e) = fs::write(&path, &json) {
                eprintln!("error writing {path}: {e}");
                process::exit(1);
            }
            eprintln!("OpenAPI spec written to {path}");
        }
        None => {
            io::stdout()
                .write_all(json.as_bytes())
                .expect("stdout write failed");
        }
    }
}
