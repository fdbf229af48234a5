//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Value};

use provenance_core::{Digest, Transaction};

/// Generate a random digest.
pub fn digest() -> impl Strategy<Value = Digest> {
    any::<[u8; 32]>().prop_map(Digest::from_bytes)
}

/// Generate a lowercase hex digest string.
pub fn digest_hex() -> impl Strategy<Value = String> {
    digest().prop_map(|d| d.to_hex())
}

/// Generate a plausible Unix timestamp in seconds.
pub fn timestamp() -> impl Strategy<Value = f64> {
    (0u32..=4_000_000_000, 0u32..1000).prop_map(|(secs, millis)| secs as f64 + millis as f64 / 1000.0)
}

/// Generate a field name that is not one of the well-known keys.
pub fn field_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,11}".prop_filter("well-known key", |name| {
        !provenance_core::transaction::keys::ALL.contains(&name.as_str())
    })
}

/// Generate a JSON scalar or a small nested value.
pub fn field_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        (-1.0e12f64..1.0e12).prop_map(Value::from),
        "[ -~\u{e9}\u{4e2d}]{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(2, 8, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(field_name(), inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Parameters for generating a transaction.
#[derive(Debug, Clone)]
pub struct TransactionParams {
    pub image_hash: Option<String>,
    pub source_hash: Option<String>,
    pub fields: Vec<(String, Value)>,
}

impl Arbitrary for TransactionParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            prop::option::of(digest_hex()),
            prop::option::of(digest_hex()),
            prop::collection::vec((field_name(), field_value()), 0..6),
        )
            .prop_map(|(image_hash, source_hash, fields)| TransactionParams {
                image_hash,
                source_hash,
                fields,
            })
            .boxed()
    }
}

/// Build a transaction from generated parameters.
pub fn transaction_from_params(params: &TransactionParams) -> Transaction {
    let mut map: Map<String, Value> = params.fields.iter().cloned().collect();
    if let Some(hash) = &params.image_hash {
        map.insert("image_hash".into(), Value::String(hash.clone()));
    }
    if let Some(hash) = &params.source_hash {
        map.insert("source_hash".into(), Value::String(hash.clone()));
    }
    Transaction::from_map(map).expect("generated fields are well-formed")
}

/// Generate a random unsigned transaction.
pub fn transaction() -> impl Strategy<Value = Transaction> {
    any::<TransactionParams>().prop_map(|p| transaction_from_params(&p))
}

/// Generate a list of up to `max` transactions.
pub fn transactions(max: usize) -> impl Strategy<Value = Vec<Transaction>> {
    prop::collection::vec(transaction(), 0..=max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenance_core::canonical_json;

    proptest! {
        #[test]
        fn test_transaction_json_roundtrip(tx in transaction()) {
            let reparsed = Transaction::from_json(tx.to_json()).unwrap();
            prop_assert_eq!(&reparsed, &tx);
            prop_assert_eq!(reparsed.leaf_hash(), tx.leaf_hash());
        }

        #[test]
        fn test_canonical_json_is_ascii(tx in transaction()) {
            prop_assert!(canonical_json(&tx.to_json()).is_ascii());
        }

        #[test]
        fn test_references_generated_hashes(params in any::<TransactionParams>()) {
            let tx = transaction_from_params(&params);
            if let Some(hash) = &params.image_hash {
                prop_assert!(tx.references(hash));
            }
            if let Some(hash) = &params.source_hash {
                prop_assert!(tx.references(hash));
            }
        }
    }
}
