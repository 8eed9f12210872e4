use crate::cli::ScopeArgs;
use crate::support::{fail, print_json, scope_or_exit};
use cadbom_core::Config;

pub fn run(config: &Config, scope: ScopeArgs, json_output: bool) {
    let scope = scope_or_exit(&scope);
    let engine = config.open_engine();
    let summary = engine
        .summary(&scope)
        .unwrap_or_else(|e| fail("summary failed", e));

    if json_output {
        print_json(&summary);
        return;
    }

    println!(
        "cadbom summary\n  Scope: {scope}\n  Nodes: {}\n  Edges: {}",
        summary.node_count, summary.edge_count
    );
    for edge in &summary.edges {
        if edge.note.is_empty() {
            println!("    {} -> {} x{}", edge.parent, edge.child, edge.qty);
        } else {
            println!("    {} -> {} x{}  [{}]", edge.parent, edge.child, edge.qty, edge.note);
        }
    }
}
