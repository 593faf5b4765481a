//! Inbound "package dispatch created" message parsing and validation.

use application::CreatePackage;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use common::{DriverId, PackageId, PatientId};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Phone recorded when the upstream message carries none.
pub const DEFAULT_PATIENT_PHONE: &str = "N/A";

/// The body could not be turned into a dispatch payload at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed dispatch message: {0}")]
pub struct MalformedPayload(pub String);

/// A parsed payload broke one of the acceptance rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PayloadViolation {
    #[error("id is required")]
    MissingId,
    #[error("number is required")]
    MissingNumber,
    #[error("patientId is required")]
    MissingPatientId,
    #[error("patientName is required")]
    MissingPatientName,
    #[error("deliveryAddress is required")]
    MissingDeliveryAddress,
    #[error("deliveryLatitude out of range")]
    LatitudeOutOfRange,
    #[error("deliveryLongitude out of range")]
    LongitudeOutOfRange,
    #[error("deliveryDate is required")]
    MissingDeliveryDate,
    #[error("deliveryDate cannot be in the past")]
    DeliveryDateInPast,
}

/// Fields of a dispatch message as received. Keys are matched without
/// regard to case.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DispatchPayload {
    pub id: Option<Uuid>,
    pub number: Option<String>,
    #[serde(rename = "patientid")]
    pub patient_id: Option<Uuid>,
    #[serde(rename = "patientname")]
    pub patient_name: Option<String>,
    #[serde(rename = "patientphone")]
    pub patient_phone: Option<String>,
    #[serde(rename = "deliveryaddress")]
    pub delivery_address: Option<String>,
    #[serde(rename = "deliverylatitude")]
    pub delivery_latitude: Option<f64>,
    #[serde(rename = "deliverylongitude")]
    pub delivery_longitude: Option<f64>,
    #[serde(rename = "deliverydate", default, deserialize_with = "delivery_date")]
    pub delivery_date: Option<NaiveDate>,
}

/// A payload that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDispatch {
    pub id: PackageId,
    pub number: String,
    pub patient_id: PatientId,
    pub patient_name: String,
    pub patient_phone: String,
    pub delivery_address: String,
    pub delivery_latitude: f64,
    pub delivery_longitude: f64,
    pub delivery_date: NaiveDate,
}

impl DispatchPayload {
    /// Parses a message body that is either the payload itself or an
    /// envelope carrying it under a `payload` key.
    pub fn parse(body: &[u8]) -> Result<Self, MalformedPayload> {
        let root: Value =
            serde_json::from_slice(body).map_err(|e| MalformedPayload(e.to_string()))?;
        let Value::Object(root) = root else {
            return Err(MalformedPayload("body is not a JSON object".to_string()));
        };

        let envelope = root
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("payload"))
            .map(|(_, value)| value.clone());
        let fields = match envelope {
            Some(Value::Object(inner)) => inner,
            Some(_) => return Err(MalformedPayload("payload is not an object".to_string())),
            None => root,
        };

        serde_json::from_value(Value::Object(lowercase_keys(fields)))
            .map_err(|e| MalformedPayload(e.to_string()))
    }

    /// Checks the acceptance rules in a fixed order; the first violation wins.
    pub fn validate(self, today: NaiveDate) -> Result<PackageDispatch, PayloadViolation> {
        let id = self
            .id
            .filter(|id| !id.is_nil())
            .ok_or(PayloadViolation::MissingId)?;
        let number = non_blank(self.number).ok_or(PayloadViolation::MissingNumber)?;
        let patient_id = self
            .patient_id
            .filter(|id| !id.is_nil())
            .ok_or(PayloadViolation::MissingPatientId)?;
        let patient_name =
            non_blank(self.patient_name).ok_or(PayloadViolation::MissingPatientName)?;
        let delivery_address =
            non_blank(self.delivery_address).ok_or(PayloadViolation::MissingDeliveryAddress)?;
        let delivery_latitude = self
            .delivery_latitude
            .filter(|lat| (-90.0..=90.0).contains(lat))
            .ok_or(PayloadViolation::LatitudeOutOfRange)?;
        let delivery_longitude = self
            .delivery_longitude
            .filter(|lon| (-180.0..=180.0).contains(lon))
            .ok_or(PayloadViolation::LongitudeOutOfRange)?;
        let delivery_date = self
            .delivery_date
            .ok_or(PayloadViolation::MissingDeliveryDate)?;
        if delivery_date < today {
            return Err(PayloadViolation::DeliveryDateInPast);
        }

        Ok(PackageDispatch {
            id: PackageId::from_uuid(id),
            number,
            patient_id: PatientId::from_uuid(patient_id),
            patient_name,
            patient_phone: non_blank(self.patient_phone)
                .unwrap_or_else(|| DEFAULT_PATIENT_PHONE.to_string()),
            delivery_address,
            delivery_latitude,
            delivery_longitude,
            delivery_date,
        })
    }
}

impl PackageDispatch {
    /// Builds the creation command for the selected driver.
    pub fn into_command(self, driver_id: DriverId) -> CreatePackage {
        CreatePackage {
            id: self.id,
            number: self.number,
            patient_id: self.patient_id,
            patient_name: self.patient_name,
            patient_phone: self.patient_phone,
            delivery_address: self.delivery_address,
            delivery_latitude: self.delivery_latitude,
            delivery_longitude: self.delivery_longitude,
            delivery_date: self.delivery_date,
            driver_id,
        }
    }
}

fn lowercase_keys(fields: Map<String, Value>) -> Map<String, Value> {
    fields
        .into_iter()
        .map(|(key, value)| (key.to_ascii_lowercase(), value))
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Accepts `YYYY-MM-DD`, a naive `YYYY-MM-DDTHH:MM:SS` or an RFC 3339
/// timestamp; only the date part is kept.
fn delivery_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid deliveryDate: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn body() -> Value {
        json!({
            "id": Uuid::new_v4(),
            "number": "PKG-7",
            "patientId": Uuid::new_v4(),
            "patientName": "Rosa Diaz",
            "deliveryAddress": "Calle 5 #12",
            "deliveryLatitude": -16.5,
            "deliveryLongitude": -68.15,
            "deliveryDate": "2025-03-10"
        })
    }

    fn parse(value: Value) -> DispatchPayload {
        DispatchPayload::parse(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_bare_and_enveloped_payloads_match() {
        let bare = body();
        let wrapped = json!({ "eventName": "x", "PayLoad": bare.clone() });

        assert_eq!(parse(bare), parse(wrapped));
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let payload = parse(json!({
            "ID": Uuid::new_v4(),
            "NUMBER": "A-1",
            "patientid": Uuid::new_v4(),
        }));
        assert!(payload.id.is_some());
        assert_eq!(payload.number.as_deref(), Some("A-1"));
        assert!(payload.patient_id.is_some());
    }

    #[test]
    fn test_malformed_bodies() {
        assert!(DispatchPayload::parse(b"not json").is_err());
        assert!(DispatchPayload::parse(b"[1, 2]").is_err());
        assert!(DispatchPayload::parse(br#"{"payload": "text"}"#).is_err());
        assert!(DispatchPayload::parse(br#"{"id": "not-a-uuid"}"#).is_err());
        assert!(DispatchPayload::parse(br#"{"deliveryDate": "tomorrow"}"#).is_err());
    }

    #[test]
    fn test_valid_payload_defaults_phone() {
        let dispatch = parse(body()).validate(today()).unwrap();
        assert_eq!(dispatch.patient_phone, DEFAULT_PATIENT_PHONE);
        assert_eq!(dispatch.delivery_date, today());

        let mut with_phone = body();
        with_phone["patientPhone"] = json!("+591 700 00000");
        let dispatch = parse(with_phone).validate(today()).unwrap();
        assert_eq!(dispatch.patient_phone, "+591 700 00000");

        let driver_id = DriverId::new();
        let cmd = dispatch.clone().into_command(driver_id);
        assert_eq!(cmd.driver_id, driver_id);
        assert_eq!(cmd.id, dispatch.id);
    }

    #[test]
    fn test_rfc3339_delivery_date_uses_date_part() {
        let mut value = body();
        value["deliveryDate"] = json!("2025-03-11T08:30:00Z");
        assert_eq!(
            parse(value).delivery_date,
            NaiveDate::from_ymd_opt(2025, 3, 11)
        );
    }

    #[test]
    fn test_violations() {
        let cases: Vec<(&str, Value, PayloadViolation)> = vec![
            ("id", json!(Uuid::nil()), PayloadViolation::MissingId),
            ("number", json!("  "), PayloadViolation::MissingNumber),
            ("patientId", json!(Uuid::nil()), PayloadViolation::MissingPatientId),
            ("patientName", json!(""), PayloadViolation::MissingPatientName),
            ("deliveryAddress", Value::Null, PayloadViolation::MissingDeliveryAddress),
            ("deliveryLatitude", json!(95.0), PayloadViolation::LatitudeOutOfRange),
            ("deliveryLongitude", json!(-180.5), PayloadViolation::LongitudeOutOfRange),
            ("deliveryDate", Value::Null, PayloadViolation::MissingDeliveryDate),
            (
                "deliveryDate",
                json!((today() - Duration::days(1)).to_string()),
                PayloadViolation::DeliveryDateInPast,
            ),
        ];

        for (field, value, expected) in cases {
            let mut payload = body();
            payload[field] = value;
            assert_eq!(
                parse(payload).validate(today()),
                Err(expected),
                "field {field}"
            );
        }
    }

    #[test]
    fn test_first_violation_wins() {
        let mut payload = body();
        payload["number"] = json!("");
        payload["deliveryLatitude"] = json!(120.0);
        assert_eq!(
            parse(payload).validate(today()),
            Err(PayloadViolation::MissingNumber)
        );
    }

    #[test]
    fn test_boundary_coordinates_are_accepted() {
        let mut payload = body();
        payload["deliveryLatitude"] = json!(-90.0);
        payload["deliveryLongitude"] = json!(180.0);
        assert!(parse(payload).validate(today()).is_ok());
    }
}
