use assert_call::{call, CallRecorder};

use super::*;
use crate::Operation;

fn record_events() -> RejectionHook {
    on_rejection(|e| match e {
        RejectionEvent::Unhandled { reason, .. } => call!("unhandled {reason}"),
        RejectionEvent::Handled { .. } => call!("handled"),
    })
}

#[test]
fn hook_receives_events() {
    let mut cr = CallRecorder::new();
    let _hook = record_events();
    let op = Operation::<()>::rejected(Error::msg("e"));
    cr.verify("unhandled e");
    op.on_settled(|_| {});
    cr.verify("handled");
    op.on_settled(|_| {});
    cr.verify(());
}

#[test]
fn removed_hook_receives_nothing() {
    let mut cr = CallRecorder::new();
    let mut hook = record_events();
    assert!(hook.is_active());
    hook.remove();
    assert!(!hook.is_active());
    let _op = Operation::<()>::rejected(Error::msg("e"));
    cr.verify(());
}

#[test]
fn remove_is_idempotent() {
    let mut cr = CallRecorder::new();
    let mut hook0 = record_events();
    hook0.remove();
    let _hook1 = record_events();
    hook0.remove();
    drop(hook0);

    let _op = Operation::<()>::rejected(Error::msg("e"));
    cr.verify("unhandled e");
}

#[test]
fn hooks_are_independent() {
    let r0 = RejectionReconciler::install();
    let mut r1 = RejectionReconciler::install();
    r1.release();
    assert!(!r1.is_observing());
    assert!(r0.is_observing());

    let _op = Operation::<()>::rejected(Error::msg("e"));
    assert!(!r0.is_clean());
    assert!(r1.is_clean());
}

#[test]
fn reconcile_without_error() {
    let mut r = RejectionReconciler::install();
    let _op = Operation::<()>::rejected(Error::msg("e"));
    assert!(r.reconcile(None).is_ok());
    assert!(!r.is_observing());
}

#[test]
fn reconcile_clean() {
    let mut r = RejectionReconciler::install();
    let op = Operation::<()>::rejected(Error::msg("e"));
    op.on_settled(|_| {});
    assert!(r.reconcile(Some(Error::msg("first"))).is_ok());
}

#[test]
fn reconcile_unhandled_returns_first_error() {
    let mut r = RejectionReconciler::install();
    let first = Error::msg("first");
    let _op = Operation::<()>::rejected(Error::msg("second"));
    let e = r.reconcile(Some(first.clone())).unwrap_err();
    assert!(e.ptr_eq(&first));
}

#[test]
fn events_after_release_are_ignored() {
    let mut r = RejectionReconciler::install();
    r.release();
    let _op = Operation::<()>::rejected(Error::msg("late"));
    assert!(r.is_clean());
}

#[test]
fn event_id() {
    let op = Operation::<()>::resolved(());
    let e = RejectionEvent::Handled { id: op.id() };
    assert_eq!(e.id(), op.id());
}
