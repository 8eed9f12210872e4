use crate::cli::ScopeArgs;
use crate::support::{fail, part_arg, print_json, scope_or_exit};
use cadbom_core::Config;
use serde_json::json;

pub fn run(config: &Config, scope: ScopeArgs, root: String, json_output: bool) {
    let scope = scope_or_exit(&scope);
    let engine = config.open_engine();
    let rows = engine
        .explode(&scope, &part_arg(&root))
        .unwrap_or_else(|e| fail("explode failed", e));

    if json_output {
        print_json(&json!({ "rows": rows }));
        return;
    }

    println!("cadbom explode\n  Scope: {scope}\n  Root: {root}\n  Parts: {}", rows.len());
    for row in &rows {
        match &row.description {
            Some(description) => println!("    {:<8} {:>6}  {description}", row.code.key(), row.qty),
            None => println!("    {:<8} {:>6}", row.code.key(), row.qty),
        }
    }
}
