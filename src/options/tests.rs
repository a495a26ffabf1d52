use super::*;

#[test]
fn default_values() {
    let o = RenderOptions::default();
    assert_eq!(o.max_passes, None);
    assert_eq!(o.settle_ticks, 1);
}

#[test]
fn builders() {
    let o = RenderOptions::new().with_max_passes(4).with_settle_ticks(0);
    assert_eq!(o.max_passes, Some(4));
    assert_eq!(o.settle_ticks, 0);
}

#[test]
fn deserialize_partial() {
    let o: RenderOptions = serde_json::from_str(r#"{ "max_passes": 8 }"#).unwrap();
    assert_eq!(o, RenderOptions::new().with_max_passes(8));
}

#[test]
fn deserialize_empty() {
    let o: RenderOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(o, RenderOptions::default());
}

#[test]
fn serialize() {
    let json = serde_json::to_value(RenderOptions::new().with_settle_ticks(2)).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "max_passes": null, "settle_ticks": 2 })
    );
}
