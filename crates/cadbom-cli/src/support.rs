use crate::cli::ScopeArgs;
use cadbom_core::{BomError, Config, Scope};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

/// Exit status for a refused circular link.
pub const EXIT_CIRCULAR_LINK: i32 = 2;

pub fn load_config_or_exit(path: &str, store_override: Option<&str>) -> Config {
    let mut config = Config::load_optional(path).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    });
    if let Some(store) = store_override {
        config.store_dir = PathBuf::from(store);
    }
    config
}

pub fn scope_or_exit(args: &ScopeArgs) -> Scope {
    Scope::new(&args.project_number, &args.project_name).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    })
}

/// Part codes on the command line go through the same normalizer as JSON
/// payloads.
pub fn part_arg(raw: &str) -> Value {
    Value::String(raw.to_string())
}

pub fn exit_code(err: &BomError) -> i32 {
    match err {
        BomError::CircularLink { .. } => EXIT_CIRCULAR_LINK,
        _ => 1,
    }
}

pub fn fail(action: &str, err: BomError) -> ! {
    eprintln!("error: {action}: {err}");
    std::process::exit(exit_code(&err));
}

pub fn print_json<T: Serialize>(value: &T) {
    let text = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| fail("serialize output", BomError::Storage(e.to_string())));
    println!("{text}");
}
