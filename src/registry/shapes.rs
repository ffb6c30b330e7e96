//! Discriminators for the registry's polymorphic response bodies

use serde_json::Value;

/// The three ways the detail endpoint answers, plus anything else
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetailShape<'a> {
    /// Bare record: an object with neither `content` nor `itemCount`
    Record(&'a Value),
    /// Search-style wrapper: `{content: [record, ...]}`
    Wrapped(&'a [Value]),
    /// Bare list of records
    List(&'a [Value]),
    Unknown,
}

impl<'a> DetailShape<'a> {
    pub fn classify(raw: &'a Value) -> Self {
        match raw {
            Value::Object(map) if !map.contains_key("content") && !map.contains_key("itemCount") => {
                DetailShape::Record(raw)
            }
            Value::Object(map) => match map.get("content") {
                Some(Value::Array(items)) => DetailShape::Wrapped(items),
                Some(_) => DetailShape::Wrapped(&[]),
                None => DetailShape::Unknown,
            },
            Value::Array(items) => DetailShape::List(items),
            _ => DetailShape::Unknown,
        }
    }

    /// The usable record, if this shape carries a non-empty one
    pub fn record(self) -> Option<&'a Value> {
        let candidate = match self {
            DetailShape::Record(record) => Some(record),
            DetailShape::Wrapped(items) | DetailShape::List(items) => items.first(),
            DetailShape::Unknown => None,
        };
        candidate.filter(|record| !is_blank(record))
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// First usable record of a detail response
pub fn detail_record(raw: &Value) -> Option<&Value> {
    DetailShape::classify(raw).record()
}

/// Records of a beneficiaries response: `{content: [...]}` or a bare list
pub fn beneficiary_records(raw: &Value) -> Option<&[Value]> {
    match raw {
        Value::Object(map) => map.get("content").and_then(Value::as_array).map(Vec::as_slice),
        Value::Array(items) => Some(items),
        _ => None,
    }
}

/// Fiscal year of a beneficiary record (`ejercicio` on the wire)
pub fn fiscal_year(record: &Value) -> Option<i32> {
    let field = record.get("ejercicio").or_else(|| record.get("fiscalYear"))?;
    match field {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Render an id-like JSON value as a plain string (no quotes for strings)
pub fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_three_detail_shapes_yield_the_same_record() {
        let record = json!({"id": 123456, "descripcion": "Ayudas"});
        let bare = record.clone();
        let wrapped = json!({"content": [record.clone()], "totalElements": 1});
        let list = json!([record.clone()]);

        assert!(matches!(DetailShape::classify(&bare), DetailShape::Record(_)));
        assert!(matches!(DetailShape::classify(&wrapped), DetailShape::Wrapped(_)));
        assert!(matches!(DetailShape::classify(&list), DetailShape::List(_)));

        assert_eq!(detail_record(&bare), Some(&record));
        assert_eq!(detail_record(&wrapped), Some(&record));
        assert_eq!(detail_record(&list), Some(&record));
    }

    #[test]
    fn test_detail_without_usable_record() {
        assert_eq!(detail_record(&json!({"content": []})), None);
        assert_eq!(detail_record(&json!({"itemCount": 0})), None);
        assert_eq!(detail_record(&json!([])), None);
        assert_eq!(detail_record(&json!({})), None);
        assert_eq!(detail_record(&json!("not found")), None);
        assert_eq!(detail_record(&json!({"content": "oops"})), None);
    }

    #[test]
    fn test_fiscal_year_parsing() {
        assert_eq!(fiscal_year(&json!({"ejercicio": 2022})), Some(2022));
        assert_eq!(fiscal_year(&json!({"ejercicio": " 2023 "})), Some(2023));
        assert_eq!(fiscal_year(&json!({"fiscalYear": 2021})), Some(2021));
        assert_eq!(fiscal_year(&json!({"ejercicio": "dos mil"})), None);
        assert_eq!(fiscal_year(&json!({"nombre": "x"})), None);
    }

    #[test]
    fn test_beneficiary_records() {
        let wrapped = json!({"content": [{"ejercicio": 2022}]});
        assert_eq!(beneficiary_records(&wrapped).map(<[Value]>::len), Some(1));
        assert_eq!(beneficiary_records(&json!([])).map(<[Value]>::len), Some(0));
        assert!(beneficiary_records(&json!({"content": {}})).is_none());
        assert!(beneficiary_records(&json!(42)).is_none());
    }

    #[test]
    fn test_id_string() {
        assert_eq!(id_string(&json!("ABC-1")), "ABC-1");
        assert_eq!(id_string(&json!(778899)), "778899");
    }
}
