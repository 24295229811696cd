//! The only place that understands the gateway's positional text format.
//! Rows are `$`-separated, fields `|`-separated; schemas name the positions
//! so the rest of the crate never indexes into raw splits.

pub mod couriers;
pub mod lifecycle;
pub mod orders;

use chrono::{Local, NaiveDateTime};

use crate::error::AppError;

pub const ROW_SEPARATOR: char = '$';
pub const FIELD_SEPARATOR: char = '|';

/// Input formats the gateway emits for date-time values, tried in order.
pub const WIRE_DATE_FORMATS: [&str; 2] = ["%m/%d/%Y %I:%M:%S %p", "%Y-%m-%d %H:%M"];

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub index: usize,
}

impl Field {
    pub const fn at(name: &'static str, index: usize) -> Self {
        Self { name, index }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RowSchema {
    pub name: &'static str,
    /// Rows shorter than this are malformed and dropped; fields at or past
    /// this length are optional and fall back to their defaults.
    pub min_fields: usize,
    pub fields: &'static [Field],
}

impl RowSchema {
    pub fn decode<'a>(&'static self, row: &'a str) -> Result<DecodedRow<'a>, AppError> {
        let values: Vec<&str> = row.split(FIELD_SEPARATOR).collect();
        if values.len() < self.min_fields {
            return Err(AppError::Wire(format!(
                "{} row has {} fields, expected at least {}",
                self.name,
                values.len(),
                self.min_fields
            )));
        }
        Ok(DecodedRow { schema: self, values })
    }
}

pub struct DecodedRow<'a> {
    schema: &'static RowSchema,
    values: Vec<&'a str>,
}

impl DecodedRow<'_> {
    fn raw(&self, name: &str) -> Option<&str> {
        let field = self
            .schema
            .fields
            .iter()
            .find(|field| field.name == name)
            .unwrap_or_else(|| panic!("field {name} not in {} schema", self.schema.name));
        self.values.get(field.index).copied()
    }

    pub fn str_at(&self, name: &str) -> String {
        self.raw(name).unwrap_or_default().to_string()
    }

    /// None when the field is absent or blank, for nullable URLs and such.
    pub fn opt_at(&self, name: &str) -> Option<String> {
        self.raw(name)
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string)
    }

    pub fn i64_at(&self, name: &str) -> i64 {
        self.raw(name)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn f64_at(&self, name: &str) -> f64 {
        self.raw(name)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0.0)
    }
}

pub fn parse_wire_date(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    WIRE_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
}

/// Formats a raw gateway timestamp for display: `HH:mm` today,
/// `Tomorrow HH:mm` tomorrow, `Mon 04-03 19:30` otherwise. Unparseable
/// input collapses to an empty string rather than leaking wire text.
pub fn format_display_time(raw: &str) -> String {
    format_display_time_at(raw, Local::now().naive_local())
}

pub fn format_display_time_at(raw: &str, now: NaiveDateTime) -> String {
    let Some(date) = parse_wire_date(raw) else {
        return String::new();
    };
    let today = now.date();
    if date.date() == today {
        date.format("%H:%M").to_string()
    } else if Some(date.date()) == today.succ_opt() {
        format!("Tomorrow {}", date.format("%H:%M"))
    } else {
        date.format("%a %d-%m %H:%M").to_string()
    }
}

/// The feed escapes customer-entered text as HTML. Only the common named
/// and numeric entities ever appear, so a small decoder suffices.
pub fn decode_html_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find(';').filter(|end| *end <= 8) {
            Some(end) => {
                let entity = &tail[1..end];
                match decode_entity(entity) {
                    Some(decoded) => out.push(decoded),
                    None => out.push_str(&tail[..=end]),
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        "pound" => Some('£'),
        _ => {
            let digits = entity.strip_prefix('#')?;
            let code = digits.parse::<u32>().ok()?;
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{decode_html_entities, format_display_time_at, Field, RowSchema};

    static TEST_SCHEMA: RowSchema = RowSchema {
        name: "test",
        min_fields: 2,
        fields: &[
            Field::at("first", 0),
            Field::at("second", 1),
            Field::at("far", 9),
        ],
    };

    #[test]
    fn short_rows_are_rejected() {
        assert!(TEST_SCHEMA.decode("only-one-field").is_err());
        assert!(TEST_SCHEMA.decode("a|b").is_ok());
    }

    #[test]
    fn fields_past_row_length_fall_back_to_defaults() {
        let row = TEST_SCHEMA.decode("a|7").expect("decode");
        assert_eq!(row.str_at("first"), "a");
        assert_eq!(row.i64_at("second"), 7);
        assert_eq!(row.str_at("far"), "");
        assert_eq!(row.i64_at("far"), 0);
        assert!(row.opt_at("far").is_none());
    }

    #[test]
    fn unparseable_numerics_default_to_zero() {
        let row = TEST_SCHEMA.decode("x|not-a-number").expect("decode");
        assert_eq!(row.i64_at("second"), 0);
        assert_eq!(row.f64_at("second"), 0.0);
    }

    #[test]
    fn display_time_buckets_today_tomorrow_and_later() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        assert_eq!(format_display_time_at("3/1/2024 10:30:00 AM", now), "10:30");
        assert_eq!(
            format_display_time_at("2024-03-02 10:30", now),
            "Tomorrow 10:30"
        );
        assert_eq!(format_display_time_at("2024-03-05 10:30", now), "Tue 05-03 10:30");
        assert_eq!(format_display_time_at("not a date", now), "");
    }

    #[test]
    fn html_entities_decode() {
        assert_eq!(decode_html_entities("Fish &amp; Chips"), "Fish & Chips");
        assert_eq!(decode_html_entities("&#163; off"), "£ off");
        assert_eq!(decode_html_entities("no entities"), "no entities");
        assert_eq!(decode_html_entities("dangling & ampersand"), "dangling & ampersand");
    }
}
