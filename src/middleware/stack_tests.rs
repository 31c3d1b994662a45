use crate::error::{Result, StackError};
use crate::middleware::{Flow, Handler, Middleware, MiddlewareStack, Pivot, RequestContext};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

struct NoopHandler;

#[async_trait]
impl Handler for NoopHandler {
    async fn handle(&self, _ctx: &mut RequestContext) -> Result<Flow> {
        Ok(Flow::Continue)
    }
}

fn noop_factory(_params: &Value) -> Result<Arc<dyn Handler>> {
    Ok(Arc::new(NoopHandler))
}

fn item(id: &str) -> Middleware {
    Middleware::new(id, Arc::new(noop_factory))
}

fn abc_stack() -> MiddlewareStack {
    MiddlewareStack::with_items([item("a"), item("b"), item("c")]).unwrap()
}

#[test]
fn test_insert_after_positions_new_item() {
    let mut stack = abc_stack();
    stack.insert_after("a", vec![item("x")]).unwrap();

    assert_eq!(stack.ids(), vec!["a", "x", "b", "c"]);
    assert!(stack.find("x").is_some());
}

#[test]
fn test_insert_before_shifts_pivot_and_followers() {
    let mut stack = abc_stack();
    stack.insert_before("b", vec![item("x")]).unwrap();

    assert_eq!(stack.ids(), vec!["a", "x", "b", "c"]);
}

#[test]
fn test_bare_pivot_means_insert_after() {
    let mut stack = abc_stack();
    stack.insert(&Pivot::id("b"), vec![item("x")]).unwrap();

    assert_eq!(stack.ids(), vec!["a", "b", "x", "c"]);
}

#[test]
fn test_batch_insert_preserves_relative_order() {
    let mut stack = abc_stack();
    stack
        .insert(&Pivot::before("c"), vec![item("x"), item("y")])
        .unwrap();

    assert_eq!(stack.ids(), vec!["a", "b", "x", "y", "c"]);
}

#[test]
fn test_remove_shrinks_stack_and_forgets_id() {
    let mut stack = abc_stack();
    let removed = stack.remove("b").unwrap();

    assert_eq!(removed.id, "b");
    assert_eq!(stack.len(), 2);
    assert!(stack.find("b").is_none());
    assert_eq!(stack.ids(), vec!["a", "c"]);
}

#[test]
fn test_move_after_is_remove_then_insert_after() {
    let mut stack = abc_stack();
    stack.move_to("a", &Pivot::after("c")).unwrap();

    assert_eq!(stack.ids(), vec!["b", "c", "a"]);

    // Same membership before and after.
    let mut ids = stack.ids();
    ids.sort_unstable();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn test_move_matches_source_example() {
    // [a,b,c]; insert_after(a, x) -> [a,x,b,c]; move c before x -> [a,c,x,b]
    let mut stack = abc_stack();
    stack.insert_after("a", vec![item("x")]).unwrap();
    assert_eq!(stack.ids(), vec!["a", "x", "b", "c"]);

    stack.move_before("c", "x").unwrap();
    assert_eq!(stack.ids(), vec!["a", "c", "x", "b"]);
}

#[test]
fn test_config_preserves_position_and_length() {
    let mut stack = abc_stack();
    stack
        .config("b", |mw| mw.with_params(json!({ "limit": 42 })))
        .unwrap();

    assert_eq!(stack.len(), 3);
    assert_eq!(stack.ids(), vec!["a", "b", "c"]);
    assert_eq!(stack.find("b").unwrap().params, json!({ "limit": 42 }));
}

#[test]
fn test_config_rejects_id_collision() {
    let mut stack = abc_stack();
    let err = stack
        .config("b", |mut mw| {
            mw.id = "c".to_string();
            mw
        })
        .unwrap_err();

    assert_eq!(err, StackError::DuplicateItem("c".to_string()));
    assert_eq!(stack.ids(), vec!["a", "b", "c"]);
}

#[test]
fn test_missing_ids_fail_with_not_found() {
    let mut stack = abc_stack();

    assert_eq!(
        stack.insert_after("nope", vec![item("x")]).unwrap_err(),
        StackError::ItemNotFound("nope".to_string())
    );
    assert_eq!(
        stack.remove("nope").unwrap_err(),
        StackError::ItemNotFound("nope".to_string())
    );
    assert_eq!(
        stack.move_to("nope", &Pivot::after("a")).unwrap_err(),
        StackError::ItemNotFound("nope".to_string())
    );
    assert_eq!(
        stack.config("nope", |mw| mw).unwrap_err(),
        StackError::ItemNotFound("nope".to_string())
    );

    // Failed operations leave the stack untouched.
    assert_eq!(stack.ids(), vec!["a", "b", "c"]);
}

#[test]
fn test_move_with_bare_pivot_is_invalid() {
    let mut stack = abc_stack();
    let err = stack.move_to("a", &Pivot::id("b")).unwrap_err();

    assert!(matches!(err, StackError::InvalidPivot(_)));
    assert_eq!(stack.ids(), vec!["a", "b", "c"]);
}

#[test]
fn test_move_relative_to_itself_fails_without_mutation() {
    let mut stack = abc_stack();
    let err = stack.move_to("b", &Pivot::after("b")).unwrap_err();

    assert_eq!(err, StackError::ItemNotFound("b".to_string()));
    assert_eq!(stack.ids(), vec!["a", "b", "c"]);
}

#[test]
fn test_move_with_unknown_pivot_leaves_stack_unchanged() {
    let mut stack = abc_stack();
    let err = stack.move_to("a", &Pivot::before("nope")).unwrap_err();

    assert_eq!(err, StackError::ItemNotFound("nope".to_string()));
    assert_eq!(stack.ids(), vec!["a", "b", "c"]);
}

#[test]
fn test_duplicate_ids_rejected_eagerly() {
    let mut stack = abc_stack();

    let err = stack.insert_after("a", vec![item("b")]).unwrap_err();
    assert_eq!(err, StackError::DuplicateItem("b".to_string()));

    // Duplicates within a single batch are rejected too.
    let err = stack
        .insert_after("a", vec![item("x"), item("x")])
        .unwrap_err();
    assert_eq!(err, StackError::DuplicateItem("x".to_string()));

    assert_eq!(stack.ids(), vec!["a", "b", "c"]);
}

#[test]
fn test_with_items_rejects_duplicates() {
    let err = MiddlewareStack::with_items([item("a"), item("a")]).unwrap_err();
    assert_eq!(err, StackError::DuplicateItem("a".to_string()));
}

#[test]
fn test_filter_and_reject_do_not_mutate() {
    let mut stack = abc_stack();
    stack.config("b", |mw| mw.disabled()).unwrap();

    let enabled = stack.filter(|mw| mw.enabled);
    let disabled = stack.reject(|mw| mw.enabled);

    assert_eq!(
        enabled.iter().map(|mw| mw.id.as_str()).collect::<Vec<_>>(),
        vec!["a", "c"]
    );
    assert_eq!(
        disabled.iter().map(|mw| mw.id.as_str()).collect::<Vec<_>>(),
        vec!["b"]
    );
    assert_eq!(stack.len(), 3);
}

#[test]
fn test_operations_chain() {
    let mut stack = abc_stack();
    stack
        .insert(&Pivot::after("a"), vec![item("x")])
        .unwrap()
        .insert_before("c", vec![item("y")])
        .unwrap()
        .move_after("x", "y")
        .unwrap();

    assert_eq!(stack.ids(), vec!["a", "b", "y", "x", "c"]);
}
