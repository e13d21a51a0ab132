//! Row-to-document transformation.
//!
//! Maps one raw CSV row to a normalized document: column renaming, numeric
//! and boolean coercion, composite flight identifier synthesis, and
//! enrichment injection from the lookup tables. Absent values are carried
//! as JSON nulls until the partition router has consumed the timestamp,
//! then pruned with [`prune_nulls`].

use serde_json::Value;

use crate::lookup::{AirportLookup, CancellationLookup};
use crate::source::RawRow;

/// A normalized output document. Field order follows the declaration order
/// below (`serde_json` is built with `preserve_order`).
pub type Document = serde_json::Map<String, Value>;

/// Temporal key field; also the partition router's input.
pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// Fallback source column for the temporal key.
const FLIGHT_DATE_FIELD: &str = "FlightDate";

/// Separator used by the composite flight identifier.
const FLIGHT_ID_SEPARATOR: &str = "_";

/// How a source column's value is coerced into the document.
#[derive(Debug, Clone, Copy)]
enum Coerce {
    Text,
    Integer,
    Boolean,
}

/// Declarative source-column → document-field map, applied in order after
/// the timestamp and identifier fields.
const FIELD_MAP: &[(&str, &str, Coerce)] = &[
    ("Reporting_Airline", "Reporting_Airline", Coerce::Text),
    ("Tail_Number", "Tail_Number", Coerce::Text),
    ("Flight_Number_Reporting_Airline", "Flight_Number", Coerce::Text),
    ("Origin", "Origin", Coerce::Text),
    ("Dest", "Dest", Coerce::Text),
    ("CRSDepTime", "CRSDepTimeLocal", Coerce::Integer),
    ("DepDelay", "DepDelayMin", Coerce::Integer),
    ("TaxiOut", "TaxiOutMin", Coerce::Integer),
    ("TaxiIn", "TaxiInMin", Coerce::Integer),
    ("CRSArrTime", "CRSArrTimeLocal", Coerce::Integer),
    ("ArrDelay", "ArrDelayMin", Coerce::Integer),
    ("Cancelled", "Cancelled", Coerce::Boolean),
    ("Diverted", "Diverted", Coerce::Boolean),
    ("CancellationCode", "CancellationCode", Coerce::Text),
    ("ActualElapsedTime", "ActualElapsedTimeMin", Coerce::Integer),
    ("AirTime", "AirTimeMin", Coerce::Integer),
    ("Flights", "Flights", Coerce::Integer),
    ("Distance", "DistanceMiles", Coerce::Integer),
    ("CarrierDelay", "CarrierDelayMin", Coerce::Integer),
    ("WeatherDelay", "WeatherDelayMin", Coerce::Integer),
    ("NASDelay", "NASDelayMin", Coerce::Integer),
    ("SecurityDelay", "SecurityDelayMin", Coerce::Integer),
    ("LateAircraftDelay", "LateAircraftDelayMin", Coerce::Integer),
];

/// Treat a value as absent if it is missing or blank after trimming.
pub fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn to_float(value: Option<&str>) -> Option<f64> {
    present(value)?.parse::<f64>().ok()
}

/// Parse as floating point and round to the nearest integer (half away
/// from zero). Unparsable values become absent, never zero.
pub fn to_integer(value: Option<&str>) -> Option<i64> {
    to_float(value).map(|number| number.round() as i64)
}

/// Case-insensitive true/false word match, falling back to numeric `> 0`.
/// Anything else is absent.
pub fn to_boolean(value: Option<&str>) -> Option<bool> {
    let text = present(value)?;
    match text.to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" => Some(true),
        "false" | "f" | "no" | "n" => Some(false),
        _ => text.parse::<f64>().ok().map(|number| number > 0.0),
    }
}

/// Drop every field still carrying the absence sentinel. Called once the
/// partition router has consumed the timestamp.
pub fn prune_nulls(doc: &mut Document) {
    doc.retain(|_, value| !value.is_null());
}

/// Stateless per-row transformer holding the run's enrichment tables.
pub struct Transformer {
    airports: AirportLookup,
    cancellations: CancellationLookup,
}

impl Transformer {
    pub fn new(airports: AirportLookup, cancellations: CancellationLookup) -> Self {
        Self {
            airports,
            cancellations,
        }
    }

    /// Transform one raw row into a document.
    ///
    /// Rows are never dropped here; missing fields merely stay null and the
    /// consumer decides skip logic from the partition router.
    pub fn transform(&self, row: &RawRow<'_>) -> Document {
        let mut doc = Document::new();

        // Prefer a pre-formatted timestamp column, else the flight date.
        let timestamp = present(row.get(TIMESTAMP_FIELD))
            .or_else(|| present(row.get(FLIGHT_DATE_FIELD)));
        doc.insert(TIMESTAMP_FIELD.to_string(), text_value(timestamp));

        // Composite identifier, only when every part is present.
        let airline = present(row.get("Reporting_Airline"));
        let flight_number = present(row.get("Flight_Number_Reporting_Airline"));
        let origin = present(row.get("Origin"));
        let dest = present(row.get("Dest"));
        if let (Some(date), Some(airline), Some(number), Some(origin), Some(dest)) =
            (timestamp, airline, flight_number, origin, dest)
        {
            let id = [date, airline, number, origin, dest].join(FLIGHT_ID_SEPARATOR);
            doc.insert("FlightID".to_string(), Value::String(id));
        }

        for (source, target, coercion) in FIELD_MAP {
            let value = match coercion {
                Coerce::Text => text_value(present(row.get(source))),
                Coerce::Integer => to_integer(row.get(source))
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                Coerce::Boolean => to_boolean(row.get(source))
                    .map(Value::from)
                    .unwrap_or(Value::Null),
            };
            doc.insert(target.to_string(), value);
        }

        // Enrichment: only inserted when the lookup finds a value.
        if let Some(code) = present(row.get("CancellationCode")) {
            if let Some(reason) = self.cancellations.reason(code) {
                doc.insert(
                    "CancellationReason".to_string(),
                    Value::String(reason.to_string()),
                );
            }
        }
        if let Some(origin) = origin {
            if let Some(location) = self.airports.coordinates(origin) {
                doc.insert("OriginLocation".to_string(), Value::String(location));
            }
        }
        if let Some(dest) = dest {
            if let Some(location) = self.airports.coordinates(dest) {
                doc.insert("DestLocation".to_string(), Value::String(location));
            }
        }

        doc
    }
}

fn text_value(value: Option<&str>) -> Value {
    value
        .map(|v| Value::String(v.to_string()))
        .unwrap_or(Value::Null)
}
