use anyhow::Result;
use time::format_description::{self, OwnedFormatItem};
use time::Date;

pub const SIGNUP_DATE_FORMATS: [&str; 4] = [
    "[year]-[month padding:none]-[day padding:none]",
    "[day padding:none]/[month padding:none]/[year]",
    "[day padding:none].[month padding:none].[year]",
    "[month padding:none]/[day padding:none]/[year]",
];

pub const RIDE_DATE_FORMATS: [&str; 4] = [
    "[year]-[month padding:none]-[day padding:none]",
    "[day padding:none]/[month padding:none]/[year]",
    "[day padding:none].[month padding:none].[year]",
    "[month padding:none]-[day padding:none]-[year]",
];

/// Tries a list of date formats in order; the first match wins.
pub struct DateParser {
    formats: Vec<OwnedFormatItem>,
}

impl DateParser {
    pub fn new(formats: &[&str]) -> Result<Self> {
        let formats = formats
            .iter()
            .map(|f| format_description::parse_owned::<2>(f))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { formats })
    }

    pub fn signup() -> Result<Self> {
        Self::new(&SIGNUP_DATE_FORMATS)
    }

    pub fn ride() -> Result<Self> {
        Self::new(&RIDE_DATE_FORMATS)
    }

    pub fn parse(&self, text: Option<&str>) -> Option<Date> {
        let s = text?.trim();
        self.formats.iter().find_map(|f| Date::parse(s, f).ok())
    }
}
