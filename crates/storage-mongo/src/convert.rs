//! BSON <-> JSON document conversion.
//!
//! Field values travel through relaxed extended JSON, so BSON-only types
//! (ObjectId, Decimal128, binary...) survive a read followed by a write.
//! `Int64` is the one type relaxed JSON would narrow, so it is kept in
//! canonical form (`{"$numberLong": ...}`) at any depth. Dates other than
//! the top-level `fecha` stay `{"$date": ...}`; `fecha` is read as RFC 3339
//! text and written back as a native BSON date.

use bson::oid::ObjectId;
use bson::Bson;
use chrono::{DateTime, Utc};

use bienestar_core::documents::{Document, DocumentId, Fields, ID_FIELD, TIMESTAMP_FIELD};

use crate::errors::{MongoStoreError, Result};

/// Identifier text for a BSON `_id`. ObjectIds use their hex form.
pub fn id_from_bson(value: &Bson) -> DocumentId {
    match value {
        Bson::ObjectId(oid) => DocumentId::new(oid.to_hex()),
        Bson::String(s) => DocumentId::new(s.clone()),
        other => DocumentId::new(other.clone().into_relaxed_extjson().to_string()),
    }
}

fn id_to_bson(id: &DocumentId) -> Bson {
    match ObjectId::parse_str(id.as_str()) {
        Ok(oid) => Bson::ObjectId(oid),
        Err(_) => Bson::String(id.to_string()),
    }
}

fn extjson_from_bson(value: Bson) -> serde_json::Value {
    match value {
        Bson::Int64(_) => value.into_canonical_extjson(),
        Bson::Document(doc) => serde_json::Value::Object(
            doc.into_iter()
                .map(|(key, value)| (key, extjson_from_bson(value)))
                .collect(),
        ),
        Bson::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(extjson_from_bson).collect())
        }
        other => other.into_relaxed_extjson(),
    }
}

fn value_from_bson(key: &str, value: Bson) -> serde_json::Value {
    match value {
        Bson::DateTime(dt) if key == TIMESTAMP_FIELD => match dt.try_to_rfc3339_string() {
            Ok(text) => serde_json::Value::String(text),
            Err(_) => Bson::DateTime(dt).into_relaxed_extjson(),
        },
        other => extjson_from_bson(other),
    }
}

pub(crate) fn value_to_bson(key: &str, value: serde_json::Value) -> Result<Bson> {
    if key == TIMESTAMP_FIELD {
        if let serde_json::Value::String(text) = &value {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Ok(Bson::DateTime(bson::DateTime::from_chrono(
                    parsed.with_timezone(&Utc),
                )));
            }
        }
    }
    Bson::try_from(value)
        .map_err(|e| MongoStoreError::Conversion(format!("field '{}': {}", key, e)))
}

pub fn from_bson_document(mut raw: bson::Document) -> Document {
    let id = raw.remove(ID_FIELD).map(|v| id_from_bson(&v));
    let fields: Fields = raw
        .into_iter()
        .map(|(key, value)| {
            let value = value_from_bson(&key, value);
            (key, value)
        })
        .collect();
    Document { id, fields }
}

pub fn to_bson_document(document: Document) -> Result<bson::Document> {
    let mut out = bson::Document::new();
    if let Some(id) = &document.id {
        out.insert(ID_FIELD, id_to_bson(id));
    }
    for (key, value) in document.fields {
        if key == ID_FIELD {
            return Err(MongoStoreError::Conversion(format!(
                "'{}' is reserved for the document identifier",
                ID_FIELD
            )));
        }
        let converted = value_to_bson(&key, value)?;
        out.insert(key, converted);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;

    #[test]
    fn object_id_becomes_hex_identifier() {
        let oid = ObjectId::new();
        let doc = from_bson_document(doc! { "_id": oid, "pregunta1": 3 });
        assert_eq!(doc.id, Some(DocumentId::new(oid.to_hex())));
        assert_eq!(doc.get("pregunta1"), Some(&json!(3)));
        assert!(doc.get("_id").is_none());
    }

    #[test]
    fn fecha_round_trips_as_bson_date() {
        let fields: Fields =
            serde_json::from_value(json!({ "fecha": "2026-03-01T10:20:30.123Z", "x": null }))
                .expect("object");
        let bson_doc = to_bson_document(Document::new(fields)).expect("convert");
        assert!(matches!(bson_doc.get("fecha"), Some(Bson::DateTime(_))));
        assert_eq!(bson_doc.get("x"), Some(&Bson::Null));

        let back = from_bson_document(bson_doc);
        let text = back
            .get("fecha")
            .and_then(|v| v.as_str())
            .expect("fecha as text");
        let parsed = DateTime::parse_from_rfc3339(text).expect("rfc3339");
        assert_eq!(parsed.timestamp_millis(), 1_772_360_430_123);
    }

    #[test]
    fn fecha_that_is_not_a_timestamp_stays_text() {
        let fields: Fields =
            serde_json::from_value(json!({ "fecha": "ayer" })).expect("object");
        let bson_doc = to_bson_document(Document::new(fields)).expect("convert");
        assert_eq!(bson_doc.get("fecha"), Some(&Bson::String("ayer".into())));
    }

    #[test]
    fn nested_object_ids_survive_extended_json() {
        let oid = ObjectId::new();
        let doc = from_bson_document(doc! { "ref": oid, "tags": ["a", "b"] });
        let back = to_bson_document(doc).expect("convert");
        assert_eq!(back.get("ref"), Some(&Bson::ObjectId(oid)));
        assert_eq!(
            back.get("tags"),
            Some(&Bson::Array(vec![Bson::String("a".into()), Bson::String("b".into())]))
        );
    }

    #[test]
    fn explicit_hex_id_is_written_as_object_id() {
        let oid = ObjectId::new();
        let doc = Document::with_id(DocumentId::new(oid.to_hex()), Fields::new());
        let bson_doc = to_bson_document(doc).expect("convert");
        assert_eq!(bson_doc.get("_id"), Some(&Bson::ObjectId(oid)));
    }

    #[test]
    fn other_dates_and_int64_keep_their_types() {
        let created = bson::DateTime::from_millis(1_772_360_430_123);
        let doc = from_bson_document(doc! {
            "creado": created,
            "total": 5_i64,
            "pregunta1": 4,
            "detalle": { "visitas": 7_i64, "historial": [created, 2_i64] },
        });
        assert_eq!(doc.get("total"), Some(&json!({ "$numberLong": "5" })));
        assert_eq!(doc.get("pregunta1"), Some(&json!(4)));

        let back = to_bson_document(doc).expect("convert");
        let detalle = back.get_document("detalle").expect("subdocument");
        assert_eq!(detalle.get("visitas"), Some(&Bson::Int64(7)));
        assert_eq!(
            detalle.get("historial"),
            Some(&Bson::Array(vec![Bson::DateTime(created), Bson::Int64(2)]))
        );
        assert_eq!(back.get("creado"), Some(&Bson::DateTime(created)));
        assert_eq!(back.get("total"), Some(&Bson::Int64(5)));
        assert_eq!(back.get("pregunta1"), Some(&Bson::Int32(4)));
    }

    #[test]
    fn id_among_fields_is_rejected() {
        let fields: Fields = serde_json::from_value(json!({ "_id": "x", "pregunta1": 1 }))
            .expect("object");
        let err = to_bson_document(Document::new(fields)).expect_err("reserved key");
        assert!(matches!(err, MongoStoreError::Conversion(_)));
    }
}
