//! Row codec: positional mapping between a header list and a document

use crate::core::{Document, FieldValue};

/// Zip headers with row cells. Headers past the end of the row map to the
/// empty string; cells past the last header are ignored. No type coercion.
pub fn decode(headers: &[String], row: &[String]) -> Document {
    headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let cell = row.get(i).map(String::as_str).unwrap_or("");
            (header.clone(), FieldValue::from_cell(cell))
        })
        .collect()
}

/// Render a document in header order. Missing fields become empty cells.
///
/// Fields the document has but the headers lack are dropped. Callers that must
/// keep every field grow the headers first (see
/// [`SchemaRegistry::grow_headers`](crate::storage::SchemaRegistry::grow_headers)).
pub fn encode(headers: &[String], document: &Document) -> Vec<String> {
    headers
        .iter()
        .map(|header| document.get(header).map(FieldValue::to_cell).unwrap_or_default())
        .collect()
}

/// Fields of `document` not yet present in `headers`, in first-seen order
pub fn missing_fields(headers: &[String], document: &Document) -> Vec<String> {
    document
        .keys()
        .filter(|key| !headers.iter().any(|h| h == key))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn decode_pads_short_rows() {
        let headers = strings(&["name", "email", "phone"]);
        let doc = decode(&headers, &strings(&["Alice", "a@x.com"]));

        assert_eq!(doc.get_str("name"), Some("Alice"));
        assert_eq!(doc.get_str("phone"), Some(""));
        assert_eq!(doc.len(), 3);
    }

    #[test]
    fn decode_ignores_cells_without_header() {
        let doc = decode(&strings(&["name"]), &strings(&["Alice", "stray"]));
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn encode_follows_header_order_and_drops_unknown_fields() {
        let headers = strings(&["email", "name", "fee"]);
        let doc: Document = [
            ("name", FieldValue::from("Bob")),
            ("fee", FieldValue::from(150)),
            ("extra", FieldValue::from("dropped")),
        ]
        .into_iter()
        .collect();

        assert_eq!(encode(&headers, &doc), strings(&["", "Bob", "150"]));
        assert_eq!(missing_fields(&headers, &doc), strings(&["extra"]));
    }

    #[test]
    fn decode_of_encode_round_trips_strings() {
        let headers = strings(&["a", "b"]);
        let doc: Document = [("a", "1"), ("b", "two")].into_iter().collect();
        assert_eq!(decode(&headers, &encode(&headers, &doc)), doc);
    }
}
