//! Link, unlink, quantity/note updates and cascade removal.

use super::{AssemblyListing, BomEngine, PurgeReport};
use crate::error::BomError;
use crate::graph::{BomEdge, EdgeUpsert};
use crate::part::{PartCode, normalize_part, normalize_quantity};
use crate::scope::Scope;
use crate::store::ScopeStore;
use serde_json::Value;
use tracing::{info, warn};

impl<S: ScopeStore> BomEngine<S> {
    /// Add `parent → child` with `qty`, or overwrite the quantity of the
    /// existing edge.
    ///
    /// Refused with [`BomError::CircularLink`] when `parent` is already
    /// reachable from `child` (including `parent == child`); nothing is
    /// written in that case.
    pub fn link(
        &self,
        scope: &Scope,
        parent: &Value,
        child: &Value,
        qty: &Value,
    ) -> Result<AssemblyListing, BomError> {
        let parent = normalize_part(parent)?;
        let child = normalize_part(child)?;
        let qty = normalize_quantity(qty)?;
        if parent == child {
            return Err(BomError::CircularLink {
                parent: parent.key(),
                child: child.key(),
            });
        }
        self.policy.check(&parent, &child)?;

        let (outcome, graph) = self.mutate_scope(scope, |graph| {
            if graph.reaches(&child, &parent) {
                warn!(scope = %scope, %parent, %child, "refused circular link");
                return Err(BomError::CircularLink {
                    parent: parent.key(),
                    child: child.key(),
                });
            }
            let outcome = graph.upsert_edge(parent, child, qty);
            let changed = outcome != EdgeUpsert::Updated { previous_qty: qty };
            Ok((outcome, changed))
        })?;

        match outcome {
            EdgeUpsert::Inserted => info!(scope = %scope, %parent, %child, qty, "linked"),
            EdgeUpsert::Updated { previous_qty } => {
                info!(scope = %scope, %parent, %child, previous_qty, qty, "relinked")
            }
        }
        Ok(self.listing(scope, &graph, parent))
    }

    /// Remove `parent → child`. Absent parents or edges are not errors.
    pub fn unlink(
        &self,
        scope: &Scope,
        parent: &Value,
        child: &Value,
    ) -> Result<AssemblyListing, BomError> {
        let parent = normalize_part(parent)?;
        let child = normalize_part(child)?;

        let (removed, graph) = self.mutate_scope(scope, |graph| {
            let removed = graph.remove_edge(&parent, &child);
            Ok((removed, removed))
        })?;

        if removed {
            info!(scope = %scope, %parent, %child, "unlinked");
        }
        Ok(self.listing(scope, &graph, parent))
    }

    /// Overwrite the quantity of an existing edge.
    pub fn update_quantity(
        &self,
        scope: &Scope,
        parent: &Value,
        child: &Value,
        qty: &Value,
    ) -> Result<AssemblyListing, BomError> {
        let parent = normalize_part(parent)?;
        let child = normalize_part(child)?;
        let qty = normalize_quantity(qty)?;

        let (previous_qty, graph) = self.mutate_scope(scope, |graph| {
            let edge = graph.edge_mut(&parent, &child)?;
            let previous_qty = edge.qty;
            edge.qty = qty;
            Ok((previous_qty, previous_qty != qty))
        })?;

        info!(scope = %scope, %parent, %child, previous_qty, qty, "quantity updated");
        Ok(self.listing(scope, &graph, parent))
    }

    /// Replace the free-text note on an existing edge.
    pub fn set_note(
        &self,
        scope: &Scope,
        parent: &Value,
        child: &Value,
        note: &str,
    ) -> Result<AssemblyListing, BomError> {
        let parent = normalize_part(parent)?;
        let child = normalize_part(child)?;
        let note = note.trim().to_string();

        let (_, graph) = self.mutate_scope(scope, |graph| {
            let edge = graph.edge_mut(&parent, &child)?;
            let changed = edge.note != note;
            edge.note = note;
            Ok(((), changed))
        })?;

        info!(scope = %scope, %parent, %child, "note updated");
        Ok(self.listing(scope, &graph, parent))
    }

    /// Replace every child edge of `parent` in one write.
    ///
    /// `items` is an array of `{ "child": <part>, "qty": <n>, "note": <text> }`
    /// rows; a bare part reference is accepted as a row too. `qty` defaults to
    /// 1. A child listed twice keeps its last row. Every row is validated and
    /// the resulting graph is cycle-checked before anything is written; any
    /// failure leaves the stored document untouched.
    pub fn replace_children(
        &self,
        scope: &Scope,
        parent: &Value,
        items: &Value,
    ) -> Result<AssemblyListing, BomError> {
        let parent = normalize_part(parent)?;
        let children = normalize_items(&parent, items)?;
        for edge in &children {
            self.policy.check(&parent, &edge.child)?;
        }

        let (count, graph) = self.mutate_scope(scope, |graph| {
            let previous = graph.replace_children(parent, children.clone());
            if let Some(edge) = children.iter().find(|edge| graph.reaches(&edge.child, &parent)) {
                warn!(scope = %scope, %parent, child = %edge.child, "refused circular child list");
                return Err(BomError::CircularLink {
                    parent: parent.key(),
                    child: edge.child.key(),
                });
            }
            Ok((children.len(), previous != children))
        })?;

        info!(scope = %scope, %parent, children = count, "replaced child list");
        Ok(self.listing(scope, &graph, parent))
    }

    /// Drop every edge where `part` is parent or child, and its own node.
    ///
    /// Called by the part-deletion workflow so the graph keeps no dangling
    /// references.
    pub fn remove_all_references(
        &self,
        scope: &Scope,
        part: &Value,
    ) -> Result<PurgeReport, BomError> {
        let part = normalize_part(part)?;

        let (outcome, _) = self.mutate_scope(scope, |graph| {
            let outcome = graph.purge(&part);
            Ok((outcome, outcome.changed()))
        })?;

        if outcome.changed() {
            info!(scope = %scope, %part, removed = outcome.edges_removed, "purged part references");
        }
        Ok(PurgeReport {
            removed: outcome.edges_removed,
        })
    }
}

fn normalize_items(parent: &PartCode, items: &Value) -> Result<Vec<BomEdge>, BomError> {
    let rows = items.as_array().ok_or_else(|| {
        BomError::InvalidRequest("`items` must be an array of child rows".to_string())
    })?;

    let mut children: Vec<BomEdge> = Vec::with_capacity(rows.len());
    for row in rows {
        let child = normalize_part(row.get("child").unwrap_or(row))?;
        let qty = match row.get("qty") {
            None | Some(Value::Null) => 1,
            Some(raw) => normalize_quantity(raw)?,
        };
        let note = row
            .get("note")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if child == *parent {
            return Err(BomError::CircularLink {
                parent: parent.key(),
                child: child.key(),
            });
        }

        let edge = BomEdge { child, qty, note };
        match children.iter_mut().find(|existing| existing.child == child) {
            Some(existing) => *existing = edge,
            None => children.push(edge),
        }
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::LinkPolicy;
    use crate::store::MemoryScopeStore;
    use serde_json::json;

    fn engine() -> BomEngine<MemoryScopeStore> {
        BomEngine::new(MemoryScopeStore::new())
    }

    fn scope() -> Scope {
        Scope::new("P001", "TestProject").expect("scope")
    }

    fn code(raw: &str) -> PartCode {
        PartCode::parse(raw).expect("fixture code should parse")
    }

    #[test]
    fn link_upserts_instead_of_appending() {
        let engine = engine();
        engine
            .link(&scope(), &json!("A-001"), &json!("B-002"), &json!(2))
            .expect("first link");
        let listing = engine
            .link(&scope(), &json!({ "code": "A1" }), &json!("B2"), &json!(7))
            .expect("relink");

        assert_eq!(listing.children.len(), 1);
        assert_eq!(listing.children[0].code, code("B-002"));
        assert_eq!(listing.children[0].qty, 7);
    }

    #[test]
    fn self_link_is_circular() {
        let engine = engine();
        let err = engine
            .link(&scope(), &json!("A-001"), &json!("A-001"), &json!(1))
            .expect_err("self link must fail");
        assert!(matches!(err, BomError::CircularLink { .. }));
        assert!(engine.store().raw_document(&scope()).is_none());
    }

    #[test]
    fn refused_link_leaves_document_byte_identical() {
        let engine = engine();
        engine
            .link(&scope(), &json!("A-001"), &json!("B-002"), &json!(2))
            .expect("link");
        engine
            .link(&scope(), &json!("B-002"), &json!("C-003"), &json!(3))
            .expect("link");
        let before = engine.store().raw_document(&scope()).expect("document");

        let err = engine
            .link(&scope(), &json!("C-003"), &json!("A-001"), &json!(1))
            .expect_err("cycle must fail");
        assert!(matches!(err, BomError::CircularLink { .. }));
        assert_eq!(engine.store().raw_document(&scope()), Some(before));
    }

    #[test]
    fn invalid_input_fails_before_store_access() {
        let engine = engine();
        assert!(matches!(
            engine.link(&scope(), &json!("A-001"), &json!("B-002"), &json!(0)),
            Err(BomError::InvalidQuantity(_))
        ));
        assert!(matches!(
            engine.link(&scope(), &json!({ "typePrefix": "AA" }), &json!("B-002"), &json!(1)),
            Err(BomError::InvalidPartReference(_))
        ));
        assert!(engine.store().raw_document(&scope()).is_none());
    }

    #[test]
    fn unlink_is_tolerant_and_idempotent() {
        let engine = engine();
        let listing = engine
            .unlink(&scope(), &json!("A-001"), &json!("B-002"))
            .expect("unlink on empty scope");
        assert!(listing.children.is_empty());
        assert!(engine.store().raw_document(&scope()).is_none());

        engine
            .link(&scope(), &json!("A-001"), &json!("B-002"), &json!(2))
            .expect("link");
        let once = engine
            .unlink(&scope(), &json!("A-001"), &json!("B-002"))
            .expect("unlink");
        let twice = engine
            .unlink(&scope(), &json!("A-001"), &json!("B-002"))
            .expect("unlink again");
        assert_eq!(once, twice);
        assert!(twice.children.is_empty());
    }

    #[test]
    fn update_quantity_requires_existing_edge() {
        let engine = engine();
        assert!(matches!(
            engine.update_quantity(&scope(), &json!("A-001"), &json!("B-002"), &json!(3)),
            Err(BomError::ParentNotFound(_))
        ));

        engine
            .link(&scope(), &json!("A-001"), &json!("B-002"), &json!(2))
            .expect("link");
        assert!(matches!(
            engine.update_quantity(&scope(), &json!("A-001"), &json!("C-003"), &json!(3)),
            Err(BomError::ChildLinkNotFound { .. })
        ));

        let listing = engine
            .update_quantity(&scope(), &json!("A-001"), &json!("B-002"), &json!("4"))
            .expect("update");
        assert_eq!(listing.children[0].qty, 4);
    }

    #[test]
    fn note_survives_relink() {
        let engine = engine();
        engine
            .link(&scope(), &json!("A-001"), &json!("B-002"), &json!(2))
            .expect("link");
        engine
            .set_note(&scope(), &json!("A-001"), &json!("B-002"), "  torque to 5 Nm ")
            .expect("note");
        let listing = engine
            .link(&scope(), &json!("A-001"), &json!("B-002"), &json!(3))
            .expect("relink");
        assert_eq!(listing.children[0].note, "torque to 5 Nm");
        assert_eq!(listing.children[0].qty, 3);
    }

    #[test]
    fn assembly_only_policy_rejects_part_parents() {
        let engine = engine().with_policy(LinkPolicy::AssemblyOnly);
        let err = engine
            .link(&scope(), &json!("P-001"), &json!("H-002"), &json!(1))
            .expect_err("part parent must fail");
        assert!(matches!(err, BomError::PolicyViolation(_)));
    }

    #[test]
    fn replace_children_swaps_the_child_list() {
        let engine = engine();
        engine
            .link(&scope(), &json!("A-001"), &json!("B-002"), &json!(2))
            .expect("link");
        engine
            .link(&scope(), &json!("S-010"), &json!("B-002"), &json!(1))
            .expect("link");

        let listing = engine
            .replace_children(
                &scope(),
                &json!("A-001"),
                &json!([
                    { "child": "C-003", "qty": 3, "note": " left " },
                    { "child": { "typePrefix": "D", "partNumber": "4" } },
                    { "child": "C3", "qty": "5" }
                ]),
            )
            .expect("replace");

        let got: Vec<(String, u32, &str)> = listing
            .children
            .iter()
            .map(|row| (row.code.key(), row.qty, row.note.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![("C-003".to_string(), 5, ""), ("D-004".to_string(), 1, "")]
        );
        let summary = engine.summary(&scope()).expect("summary");
        assert_eq!(summary.edge_count, 3);
        assert!(summary.edges.iter().any(|e| e.parent == code("S-010")));
    }

    #[test]
    fn replace_children_with_empty_list_clears_parent() {
        let engine = engine();
        engine
            .link(&scope(), &json!("A-001"), &json!("B-002"), &json!(2))
            .expect("link");
        let listing = engine
            .replace_children(&scope(), &json!("A-001"), &json!([]))
            .expect("replace");
        assert!(listing.children.is_empty());
        assert_eq!(engine.summary(&scope()).expect("summary").edge_count, 0);
    }

    #[test]
    fn replace_children_refuses_cycles_without_writing() {
        let engine = engine();
        engine
            .link(&scope(), &json!("A-001"), &json!("B-002"), &json!(2))
            .expect("link");
        engine
            .link(&scope(), &json!("B-002"), &json!("C-003"), &json!(3))
            .expect("link");
        let before = engine.store().raw_document(&scope()).expect("document");

        let err = engine
            .replace_children(
                &scope(),
                &json!("C-003"),
                &json!([{ "child": "H-009" }, { "child": "A-001", "qty": 1 }]),
            )
            .expect_err("cycle must fail");
        assert!(matches!(err, BomError::CircularLink { ref child, .. } if child == "A-001"));
        assert_eq!(engine.store().raw_document(&scope()), Some(before.clone()));

        let err = engine
            .replace_children(&scope(), &json!("B-002"), &json!([{ "child": "B-002" }]))
            .expect_err("self containment must fail");
        assert!(matches!(err, BomError::CircularLink { .. }));

        for bad in [json!({ "child": "C-003" }), json!([{ "child": "C-003", "qty": 0 }])] {
            assert!(
                engine
                    .replace_children(&scope(), &json!("B-002"), &bad)
                    .expect_err("invalid items")
                    .is_validation()
            );
        }
        assert_eq!(engine.store().raw_document(&scope()), Some(before));
    }

    #[test]
    fn remove_all_references_counts_edges() {
        let engine = engine();
        for (parent, child) in [("A-001", "B-002"), ("B-002", "C-003"), ("S-004", "B-002")] {
            engine
                .link(&scope(), &json!(parent), &json!(child), &json!(1))
                .expect("link");
        }

        let report = engine
            .remove_all_references(&scope(), &json!({ "code": "B2" }))
            .expect("purge");
        assert_eq!(report.removed, 3);

        let again = engine
            .remove_all_references(&scope(), &json!("B-002"))
            .expect("purge again");
        assert_eq!(again.removed, 0);
    }
}
