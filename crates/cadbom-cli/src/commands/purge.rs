use crate::cli::ScopeArgs;
use crate::support::{fail, part_arg, print_json, scope_or_exit};
use cadbom_core::Config;

pub fn run(config: &Config, scope: ScopeArgs, part: String, json_output: bool) {
    let scope = scope_or_exit(&scope);
    let engine = config.open_engine();
    let report = engine
        .remove_all_references(&scope, &part_arg(&part))
        .unwrap_or_else(|e| fail("purge failed", e));

    if json_output {
        print_json(&report);
    } else {
        println!(
            "cadbom purge\n  Scope: {scope}\n  Part: {part}\n  Removed edges: {}",
            report.removed
        );
    }
}
