use crate::cli::ScopeArgs;
use crate::support::{fail, part_arg, print_json, scope_or_exit};
use cadbom_core::{AssemblyListing, Config, Scope};
use serde_json::{Value, json};

/// Edge mutation requested on the command line.
pub enum EdgeAction {
    Link { qty: String },
    Unlink,
    UpdateQty { qty: String },
    Note { note: String },
}

impl EdgeAction {
    fn label(&self) -> &'static str {
        match self {
            Self::Link { .. } => "link",
            Self::Unlink => "unlink",
            Self::UpdateQty { .. } => "update-qty",
            Self::Note { .. } => "note",
        }
    }
}

pub fn run_list(config: &Config, scope: ScopeArgs, part: String, json_output: bool) {
    let scope = scope_or_exit(&scope);
    let engine = config.open_engine();
    let listing = engine
        .list_assembly(&scope, &part_arg(&part))
        .unwrap_or_else(|e| fail("list failed", e));
    render("list", &scope, &listing, json_output);
}

pub fn run_edge(
    config: &Config,
    scope: ScopeArgs,
    parent: String,
    child: String,
    action: EdgeAction,
    json_output: bool,
) {
    let scope = scope_or_exit(&scope);
    let engine = config.open_engine();
    let parent = part_arg(&parent);
    let child = part_arg(&child);

    let result = match &action {
        EdgeAction::Link { qty } => {
            engine.link(&scope, &parent, &child, &Value::String(qty.clone()))
        }
        EdgeAction::Unlink => engine.unlink(&scope, &parent, &child),
        EdgeAction::UpdateQty { qty } => {
            engine.update_quantity(&scope, &parent, &child, &Value::String(qty.clone()))
        }
        EdgeAction::Note { note } => engine.set_note(&scope, &parent, &child, note),
    };
    let listing = result.unwrap_or_else(|e| fail(&format!("{} failed", action.label()), e));
    render(action.label(), &scope, &listing, json_output);
}

pub fn run_set_children(
    config: &Config,
    scope: ScopeArgs,
    parent: String,
    children: Vec<String>,
    json_output: bool,
) {
    let scope = scope_or_exit(&scope);
    let engine = config.open_engine();
    let items = Value::Array(children.iter().map(String::as_str).map(child_item).collect());
    let listing = engine
        .replace_children(&scope, &part_arg(&parent), &items)
        .unwrap_or_else(|e| fail("set-children failed", e));
    render("set-children", &scope, &listing, json_output);
}

/// `B-002` or `B-002=3` as an item row.
fn child_item(raw: &str) -> Value {
    match raw.split_once('=') {
        Some((child, qty)) => json!({ "child": child, "qty": qty }),
        None => json!({ "child": raw }),
    }
}

fn render(label: &str, scope: &Scope, listing: &AssemblyListing, json_output: bool) {
    if json_output {
        print_json(listing);
        return;
    }

    println!("cadbom {label}");
    println!("  Scope: {scope}");
    println!("  Part: {}", listing.parent);
    if listing.children.is_empty() {
        println!("  Children: (none)");
    } else {
        println!("  Children:");
        for row in &listing.children {
            let mut line = format!("    {} x{}", row.code, row.qty);
            if let Some(description) = &row.description {
                line.push_str(&format!("  {description}"));
            }
            if !row.note.is_empty() {
                line.push_str(&format!("  [{}]", row.note));
            }
            println!("{line}");
        }
    }
    if listing.used_in.is_empty() {
        println!("  Used in: (none)");
    } else {
        println!("  Used in:");
        for used in &listing.used_in {
            println!("    {} x{}", used.parent, used.qty);
        }
    }
}
