use chrono::{TimeZone, Utc};
use commonlib_localtime::{set_local_time_zone, Date, DateTime, NorwegianDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    date: Date,
    datetime: DateTime,
    norwegian_date_time: NorwegianDateTime,
    #[serde(default)]
    cancelled: Option<DateTime>,
}

fn setup() {
    set_local_time_zone("Europe/Oslo").unwrap();
}

#[test]
fn test_struct_fields_deserialize() {
    setup();
    let record: Record = serde_json::from_str(
        r#"{"date": "2020-02-01", "datetime": "2020-02-01T13:34:56+02:00", "norwegianDateTime": "01.02.2020 12:34:56", "cancelled": null}"#,
    )
    .unwrap();

    let expected = Utc.with_ymd_and_hms(2020, 2, 1, 11, 34, 56).unwrap();
    assert_eq!(record.date.to_string(), "2020-02-01");
    assert_eq!(record.datetime.0, expected);
    assert_eq!(record.norwegian_date_time.0, expected);
    assert_eq!(record.cancelled, None);
}

#[test]
fn test_struct_fields_serialize_in_local_zone() {
    setup();
    let instant = Utc.with_ymd_and_hms(2020, 2, 1, 11, 34, 56).unwrap();
    let record = Record {
        date: "2020-02-01".parse().unwrap(),
        datetime: DateTime(instant),
        norwegian_date_time: NorwegianDateTime(instant),
        cancelled: None,
    };

    assert_eq!(
        serde_json::to_string(&record).unwrap(),
        r#"{"date":"2020-02-01","datetime":"2020-02-01T12:34:56+01:00","norwegianDateTime":"01.02.2020 12:34:56","cancelled":null}"#
    );
}

#[test]
fn test_serialize_then_parse_gives_same_text() {
    setup();
    let text = r#""2020-02-01T12:34:56+01:00""#;
    let t: DateTime = serde_json::from_str(text).unwrap();
    assert_eq!(serde_json::to_string(&t).unwrap(), text);
}

#[test]
fn test_non_string_is_rejected() {
    setup();
    let err = serde_json::from_str::<DateTime>("1580556896").unwrap_err();
    assert!(err.to_string().contains("RFC 3339"));
}
