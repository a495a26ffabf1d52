
use std::{cell::Cell, rc::Rc};

use futures::executor::LocalPool;
use isomut::*;

use self::test_utils::*;

fn contains(store: &RenderStore<Todo>, value: &str) -> bool {
    store.state().iter().any(|s| s == value)
}

#[test]
fn sync_actions_resolve_after_first_render() {
    let mut pool = LocalPool::new();
    let store = RenderStore::new(todo(), Vec::new());
    let passes = Rc::new(Cell::new(0));
    let render = {
        let store = store.clone();
        let passes = passes.clone();
        move |name: &String| -> Result<String, Error> {
            passes.set(passes.get() + 1);
            if !contains(&store, "greeted") {
                store.dispatch("greeted".into())?;
            }
            Ok(format!("<p>hello {name}</p>"))
        }
    };
    let html = pool
        .run_until(store.render_to_string(render, "world".to_string()))
        .unwrap();
    assert_eq!(html, "<p>hello world</p>");
    assert_eq!(passes.get(), 2);
    assert_eq!(store.pending(), 0);
}

#[test]
fn deferred_action_chain_renders_final_state() {
    let mut pool = LocalPool::new();
    let backend = Backend::new(
        pool.spawner(),
        [("user", Ok("alice")), ("posts", Ok("hello from alice"))],
    );
    let store = RenderStore::new(todo(), vec![backend.middleware()]);
    let render = {
        let store = store.clone();
        move |_: &()| -> Result<String, Error> {
            if store.state().is_empty() {
                store.dispatch("loading".into())?;
                store.dispatch("fetch user".into())?;
            }
            if contains(&store, "alice") && !contains(&store, "hello from alice") {
                let requested = store.state().len() > 2;
                if !requested {
                    store.dispatch("fetch posts".into())?;
                }
            }
            Ok(store.state().join("|"))
        }
    };
    let html = pool.run_until(store.render_to_string(render, ())).unwrap();
    assert_eq!(html, "loading|alice|hello from alice");
    assert_eq!(backend.requests(), ["user", "posts"]);
}

#[test]
fn waits_for_all_outstanding_requests() {
    let mut pool = LocalPool::new();
    let backend = Backend::new(
        pool.spawner(),
        [("a", Ok("A")), ("b", Ok("B")), ("c", Ok("C"))],
    );
    let store = RenderStore::new(todo(), vec![backend.middleware()]);
    let started = Rc::new(Cell::new(false));
    let render = {
        let store = store.clone();
        move |_: &()| -> Result<String, Error> {
            if !started.replace(true) {
                for name in ["a", "b", "c"] {
                    store.dispatch(format!("fetch {name}"))?;
                }
            }
            Ok(store.state().len().to_string())
        }
    };
    let html = pool.run_until(store.render_to_string(render, ())).unwrap();
    assert_eq!(html, "3");
    let mut state = store.state().clone();
    state.sort();
    assert_eq!(state, ["A", "B", "C"]);
}

#[test]
fn unhandled_rejection_fails_render() {
    let mut pool = LocalPool::new();
    let backend = Backend::new(pool.spawner(), [("user", Err("not found"))]);
    let store = RenderStore::new(todo(), vec![backend.middleware()]);
    let render = {
        let store = store.clone();
        move |_: &()| -> Result<String, Error> {
            if backend.requests().is_empty() {
                store.dispatch("fetch user".into())?;
            }
            Ok(String::new())
        }
    };
    match pool.run_until(store.render_to_string(render, ())) {
        Err(RenderError::Rejected(e)) => assert_eq!(e.to_string(), "not found"),
        r => panic!("unexpected result: {r:?}"),
    }
}

#[test]
fn handled_rejection_resolves() {
    let mut pool = LocalPool::new();
    let backend = Backend::new(pool.spawner(), [("user", Err("not found"))]);
    let store = RenderStore::new(todo(), vec![backend.middleware()]);
    let render = {
        let store = store.clone();
        move |_: &()| -> Result<String, Error> {
            if backend.requests().is_empty() {
                let op = store.dispatch("fetch user".into())?;
                if let Some(op) = op.into_operation() {
                    let fallback = store.clone();
                    op.on_settled(move |outcome| {
                        if outcome.is_err() {
                            let _ = fallback.dispatch("anonymous".into());
                        }
                    });
                }
            }
            Ok(store.state().join("|"))
        }
    };
    let html = pool.run_until(store.render_to_string(render, ())).unwrap();
    // the handler runs after the counter drained, so its change is not rendered
    assert_eq!(html, "");
    assert_eq!(*store.state(), ["anonymous"]);
}

#[test]
fn render_failure_is_reported_at_once() {
    let mut pool = LocalPool::new();
    let store = RenderStore::new(todo(), Vec::new());
    let result = pool.run_until(
        store.render_to_string(|_: &()| Err(Error::msg("template missing")), ()),
    );
    match result {
        Err(RenderError::Render(e)) => assert_eq!(e.to_string(), "template missing"),
        r => panic!("unexpected result: {r:?}"),
    }
}

#[test]
fn endless_state_changes_are_unstable() {
    let mut pool = LocalPool::new();
    let store = render_enhancer(Vec::new())
        .options(RenderOptions::new().with_max_passes(10))
        .apply(todo());
    let render = {
        let store = store.clone();
        move |_: &()| -> Result<String, Error> {
            store.dispatch("tick".into())?;
            Ok(String::new())
        }
    };
    match pool.run_until(store.render_to_string(render, ())) {
        Err(RenderError::Unstable(10)) => {}
        r => panic!("unexpected result: {r:?}"),
    }
    assert_eq!(store.state().len(), 10);
}

#[test]
fn options_from_json() {
    let options: RenderOptions =
        serde_json::from_str(r#"{ "max_passes": 2, "settle_ticks": 0 }"#).unwrap();
    let store = render_enhancer(Vec::new()).options(options).apply(todo());
    assert_eq!(store.options().max_passes, Some(2));
    assert_eq!(store.options().settle_ticks, 0);
}
