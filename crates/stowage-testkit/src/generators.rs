//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{json, Value};

use stowage::{Key, Record};

/// A field value covering every truthiness class.
pub fn field_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-2i64..=2).prop_map(Value::from),
        Just(json!(0.0)),
        "[a-z]{0,3}".prop_map(Value::from),
        Just(json!([])),
        Just(json!({})),
    ]
}

/// A keyless record with an optional `done` flag and a title.
pub fn record() -> impl Strategy<Value = Record> {
    (proptest::option::of(field_value()), "[a-z ]{0,12}").prop_map(|(done, title)| {
        let mut record = Record::new();
        record.insert("title".to_string(), Value::from(title));
        if let Some(done) = done {
            record.insert("done".to_string(), done);
        }
        record
    })
}

/// Up to `max_len` keyless records.
pub fn records(max_len: usize) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(record(), 0..=max_len)
}

/// Any key, including the ones scans never reach.
pub fn key() -> impl Strategy<Value = Key> {
    prop_oneof![
        4 => (-5i64..=40).prop_map(Key::Number),
        1 => "[a-z]{1,4}".prop_map(Key::Text),
    ]
}

/// A store name accepted by schema validation.
pub fn store_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,11}".prop_map(String::from)
}

/// One mutation applied to a store.
#[derive(Debug, Clone)]
pub enum Op {
    /// Insert with a generated key.
    Add(Record),
    /// Full-replace the record under `key`.
    Update(i64, Record),
    /// Delete by key.
    Remove(Key),
    /// Delete every record whose `done` field has this truthiness.
    RemoveWhere(bool),
}

impl Arbitrary for Op {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            5 => record().prop_map(Op::Add),
            2 => (1i64..=30, record()).prop_map(|(key, record)| Op::Update(key, record)),
            2 => key().prop_map(Op::Remove),
            1 => any::<bool>().prop_map(Op::RemoveWhere),
        ]
        .boxed()
    }
}

/// A sequence of up to `max_len` mutations.
pub fn ops(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(any::<Op>(), 0..=max_len)
}
