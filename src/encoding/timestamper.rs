use crate::{
    error::{Error, Result},
    interfaces::Timestamper,
};
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};

/// Wall clock rendering RFC 3339 timestamps in UTC with sub-second precision.
#[derive(Clone, Copy, Debug, Default)]
pub struct Rfc3339Timestamper;

impl Timestamper for Rfc3339Timestamper {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn format(&self, when: OffsetDateTime) -> String {
        format_rfc3339(when)
    }

    fn parse(&self, value: &str) -> Result<OffsetDateTime> {
        parse_rfc3339(value)
    }
}

#[must_use]
pub fn format_rfc3339(when: OffsetDateTime) -> String {
    let utc = when.to_offset(UtcOffset::UTC);
    // Rfc3339 only rejects four-digit-year overflow; fall back to Display there.
    utc.format(&Rfc3339).unwrap_or_else(|_| utc.to_string())
}

/// # Errors
/// Returns [`Error::InvalidEncoding`] for anything that is not RFC 3339.
pub fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|err| Error::encoding("timestamp", err))
}
