use time::{
    format_description::BorrowedFormatItem, macros::format_description, Date, OffsetDateTime,
    PrimitiveDateTime, Time, UtcOffset,
};

const DATE_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[day padding:none]/[month padding:none]/[year]"),
    format_description!("[day padding:none]-[month padding:none]-[year]"),
    format_description!("[day padding:none].[month padding:none].[year]"),
    format_description!("[day padding:none]-[month repr:short case_sensitive:false]-[year]"),
    format_description!("[year]-[month]-[day]"),
];

const TIME_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[hour padding:none]:[minute]:[second]"),
    format_description!("[hour padding:none]:[minute]"),
];

fn parse_date(s: &str) -> Option<Date> {
    DATE_FORMATS.iter().find_map(|f| Date::parse(s, f).ok())
}

fn parse_time(s: &str) -> Option<Time> {
    TIME_FORMATS.iter().find_map(|f| Time::parse(s, f).ok())
}

/// Combine day-first date and wall-clock time cells into a site-local
/// timestamp at the fixed site offset.
pub fn parse_local(date: &str, clock: &str, offset: UtcOffset) -> Result<OffsetDateTime, String> {
    let d = parse_date(date.trim()).ok_or_else(|| format!("invalid date '{date}'"))?;
    let t = parse_time(clock.trim()).ok_or_else(|| format!("invalid time '{clock}'"))?;
    Ok(PrimitiveDateTime::new(d, t).assume_offset(offset))
}
