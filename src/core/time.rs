use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Current instant as a naive UTC timestamp, the form every exam column stores.
pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn to_primitive_utc(value: OffsetDateTime) -> PrimitiveDateTime {
    let utc = value.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

pub(crate) fn format_optional(value: Option<PrimitiveDateTime>) -> Option<String> {
    value.map(format_primitive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Date, Time, UtcOffset};

    #[test]
    fn format_primitive_outputs_utc_z() {
        let date = Date::from_calendar_date(2025, time::Month::January, 2).unwrap();
        let time = Time::from_hms(10, 20, 30).unwrap();
        let value = PrimitiveDateTime::new(date, time);
        assert_eq!(format_primitive(value), "2025-01-02T10:20:30Z");
    }

    #[test]
    fn offset_inputs_are_normalized_to_utc() {
        let date = Date::from_calendar_date(2025, time::Month::March, 9).unwrap();
        let local = PrimitiveDateTime::new(date, Time::from_hms(14, 0, 0).unwrap())
            .assume_offset(UtcOffset::from_hms(7, 0, 0).unwrap());
        let stored = to_primitive_utc(local);
        assert_eq!(format_primitive(stored), "2025-03-09T07:00:00Z");
    }

    #[test]
    fn format_optional_passes_none_through() {
        assert_eq!(format_optional(None), None);
    }
}
