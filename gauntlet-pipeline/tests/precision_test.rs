use serde_json::json;

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
struct Inner {
    coefficient_of_variation: f64,
    std_dev: f64,
}

#[test]
fn nested_roundtrip() {
    let inner = Inner {
        coefficient_of_variation: 0.23689244878905305,
        std_dev: 3.861346915261565,
    };
    let v = json!({ "analysis": { "numerics": { "RSI_Period": inner } } });
    let s = serde_json::to_string_pretty(&v).unwrap();
    let v2: serde_json::Value = serde_json::from_str(&s).unwrap();
    assert_eq!(v, v2, "s={}", s);
}
