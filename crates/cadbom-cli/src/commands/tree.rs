use crate::cli::ScopeArgs;
use crate::support::{fail, part_arg, print_json, scope_or_exit};
use cadbom_core::{Config, TreeNode};
use serde_json::json;

pub fn run(config: &Config, scope: ScopeArgs, root: String, json_output: bool) {
    let scope = scope_or_exit(&scope);
    let engine = config.open_engine();
    let tree = engine
        .build_tree(&scope, &part_arg(&root))
        .unwrap_or_else(|e| fail("tree failed", e));

    if json_output {
        print_json(&json!({ "tree": tree }));
        return;
    }

    println!("cadbom tree\n  Scope: {scope}");
    let mut lines = Vec::new();
    render(&tree, 1, &mut lines);
    for line in lines {
        println!("{line}");
    }
}

fn render(node: &TreeNode, indent: usize, out: &mut Vec<String>) {
    let mut line = format!("{}{}", "  ".repeat(indent), node.code);
    if let Some(edge_qty) = node.edge_qty {
        line.push_str(&format!(" x{edge_qty} (total {})", node.qty));
    }
    if let Some(description) = &node.description {
        line.push_str(&format!("  {description}"));
    }
    out.push(line);
    for child in &node.children {
        render(child, indent + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadbom_core::PartCode;

    fn node(code: &str, qty: u64, edge_qty: Option<u32>, children: Vec<TreeNode>) -> TreeNode {
        TreeNode {
            code: code.to_string(),
            part: PartCode::parse(code).expect("fixture code"),
            qty,
            edge_qty,
            description: None,
            children,
        }
    }

    #[test]
    fn render_indents_by_depth() {
        let tree = node(
            "A-001",
            1,
            None,
            vec![node("B-002", 2, Some(2), vec![node("C-003", 6, Some(3), vec![])])],
        );
        let mut lines = Vec::new();
        render(&tree, 1, &mut lines);
        assert_eq!(
            lines,
            vec![
                "  A-001".to_string(),
                "    B-002 x2 (total 2)".to_string(),
                "      C-003 x3 (total 6)".to_string(),
            ]
        );
    }
}
