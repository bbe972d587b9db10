//! # Bikram Sambat calendar
//!
//! Converts Gregorian (AD) dates to the Nepali Bikram Sambat (BS) calendar and
//! back. The conversion counts days from a fixed anchor,
//! **2000-04-14 AD = 2057-01-01 BS**, and walks month by month using a table of
//! month lengths.
//!
//! Only BS 2081–2083 have published month lengths in [`TABULATED`]. Every other
//! year uses the fixed pattern in [`DEFAULT_MONTH_DAYS`], so results outside the
//! table are approximate. [`ad_to_bs`] reports which case applied through
//! [`Accuracy`] instead of failing.
//!
//! [`bs_to_ad`] is the exact inverse of [`ad_to_bs`] under the same table, and
//! rejects dates whose day falls outside the month.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Month lengths used for years missing from [`TABULATED`].
pub const DEFAULT_MONTH_DAYS: [u8; 12] = [31, 31, 32, 32, 31, 30, 30, 29, 30, 29, 30, 30];

/// Published month lengths per BS year.
pub const TABULATED: [(i32, [u8; 12]); 3] = [
    (2081, [31, 31, 32, 32, 31, 30, 30, 29, 30, 29, 30, 30]),
    (2082, [31, 31, 32, 32, 31, 30, 30, 29, 30, 29, 30, 30]),
    (2083, [31, 32, 31, 32, 31, 30, 30, 30, 29, 29, 30, 30]),
];

const ANCHOR_BS: BsDate = BsDate {
    year: 2057,
    month: 1,
    day: 1,
};

const MONTH_NAMES: [&str; 12] = [
    "बैशाख", "जेठ", "आषाढ", "श्रावण", "भदौ", "आश्विन",
    "कार्तिक", "मंसिर", "पुष", "माघ", "फाल्गुन", "चैत्र",
];

const MONTH_NAMES_EN: [&str; 12] = [
    "Baisakh", "Jestha", "Asar", "Shrawan", "Bhadra", "Asoj",
    "Kartik", "Mangsir", "Poush", "Magh", "Falgun", "Chaitra",
];

const WEEKDAY_NAMES: [&str; 7] = [
    "आइतवार", "सोमवार", "मंगलवार", "बुधवार", "बिहिवार", "शुक्रवार", "शनिवार",
];

fn anchor_ad() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 4, 14).unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarError {
    #[error("month {0} is outside 1..=12")]
    InvalidMonth(u8),
    #[error("day {day} is outside month {year}/{month:02}")]
    InvalidDay { year: i32, month: u8, day: u8 },
    #[error("date is outside the supported range")]
    OutOfRange,
    #[error("cannot parse BS date {0:?}, expected YYYY/MM/DD")]
    Parse(String),
}

/// A Bikram Sambat date. Months and days are 1-based.
///
/// Deserialising goes through [`BsDate::new`], so a decoded date is always valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawBsDate")]
pub struct BsDate {
    pub year: i32,
    pub month: u8,
    pub day: u8,
}

#[derive(Deserialize)]
struct RawBsDate {
    year: i32,
    month: u8,
    day: u8,
}

impl TryFrom<RawBsDate> for BsDate {
    type Error = CalendarError;

    fn try_from(raw: RawBsDate) -> Result<Self, Self::Error> {
        BsDate::new(raw.year, raw.month, raw.day)
    }
}

fn month_index(month: u8) -> usize {
    usize::from(month).wrapping_sub(1)
}

impl BsDate {
    /// Build a date, checking month and day against the month table.
    pub fn new(year: i32, month: u8, day: u8) -> Result<Self, CalendarError> {
        let days = days_in_month(year, month).ok_or(CalendarError::InvalidMonth(month))?;
        if day == 0 || day > days {
            return Err(CalendarError::InvalidDay { year, month, day });
        }
        Ok(Self { year, month, day })
    }

    /// Nepali month name.
    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES.get(month_index(self.month)).copied().unwrap_or("?")
    }

    /// Romanised month name.
    pub fn month_name_en(&self) -> &'static str {
        MONTH_NAMES_EN.get(month_index(self.month)).copied().unwrap_or("?")
    }

    /// `"<day> <month name> <year>"`, e.g. `"1 बैशाख 2082"`.
    pub fn format_with_month(&self) -> String {
        format!("{} {} {}", self.day, self.month_name(), self.year)
    }
}

impl fmt::Display for BsDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:02}/{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for BsDate {
    type Err = CalendarError;

    /// Accepts `YYYY/MM/DD` or `YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = || CalendarError::Parse(s.to_string());
        let parts: Vec<&str> = s.trim().split(['/', '-']).collect();
        let [y, m, d] = parts.as_slice() else {
            return Err(parse_err());
        };
        let year = y.parse().map_err(|_| parse_err())?;
        let month = m.parse().map_err(|_| parse_err())?;
        let day = d.parse().map_err(|_| parse_err())?;
        BsDate::new(year, month, day)
    }
}

/// Whether a conversion landed in a year with published month lengths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Accuracy {
    Tabulated,
    Approximate,
}

/// Result of [`ad_to_bs`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Conversion {
    pub date: BsDate,
    pub accuracy: Accuracy,
}

fn table_for(year: i32) -> Option<&'static [u8; 12]> {
    TABULATED
        .iter()
        .find(|(y, _)| *y == year)
        .map(|(_, days)| days)
}

/// Whether `year` has published month lengths.
pub fn is_tabulated(year: i32) -> bool {
    table_for(year).is_some()
}

/// Days in a BS month, or `None` when `month` is outside 1..=12.
pub fn days_in_month(year: i32, month: u8) -> Option<u8> {
    if !(1..=12).contains(&month) {
        return None;
    }
    let days = table_for(year).unwrap_or(&DEFAULT_MONTH_DAYS);
    days.get(month_index(month)).copied()
}

fn month_len(year: i32, month: u8) -> i64 {
    i64::from(days_in_month(year, month).unwrap_or(30))
}

/// Days in a BS year.
pub fn days_in_year(year: i32) -> i64 {
    (1..=12).map(|m| month_len(year, m)).sum()
}

/// Convert a Gregorian date to Bikram Sambat.
pub fn ad_to_bs(date: NaiveDate) -> Conversion {
    let offset = date.signed_duration_since(anchor_ad()).num_days();
    let bs = if offset >= 0 {
        walk_forward(offset)
    } else {
        walk_backward(-offset)
    };
    let accuracy = if is_tabulated(bs.year) {
        Accuracy::Tabulated
    } else {
        Accuracy::Approximate
    };
    Conversion { date: bs, accuracy }
}

fn walk_forward(mut remaining: i64) -> BsDate {
    let BsDate {
        mut year,
        mut month,
        mut day,
    } = ANCHOR_BS;

    loop {
        if month == 1 && day == 1 {
            let year_len = days_in_year(year);
            if remaining >= year_len {
                remaining -= year_len;
                year += 1;
                continue;
            }
        }

        let left_in_month = month_len(year, month) - i64::from(day) + 1;
        if remaining >= left_in_month {
            remaining -= left_in_month;
            day = 1;
            month += 1;
            if month > 12 {
                month = 1;
                year += 1;
            }
        } else {
            // remaining < left_in_month <= 32
            day += remaining as u8;
            return BsDate { year, month, day };
        }
    }
}

fn walk_backward(mut remaining: i64) -> BsDate {
    let BsDate {
        mut year,
        mut month,
        mut day,
    } = ANCHOR_BS;

    loop {
        if month == 12 && i64::from(day) == month_len(year, 12) {
            let year_len = days_in_year(year);
            if remaining >= year_len {
                remaining -= year_len;
                year -= 1;
                day = month_len(year, 12) as u8;
                continue;
            }
        }

        if remaining < i64::from(day) {
            day -= remaining as u8;
            return BsDate { year, month, day };
        }

        // Step back to the last day of the previous month.
        remaining -= i64::from(day);
        month -= 1;
        if month == 0 {
            month = 12;
            year -= 1;
        }
        day = month_len(year, month) as u8;
    }
}

/// Days from 1 Baisakh of `from` to 1 Baisakh of `to`, for `from <= to`.
fn days_between_years(from: i32, to: i32) -> i64 {
    let untabulated_len: i64 = DEFAULT_MONTH_DAYS.iter().copied().map(i64::from).sum();
    let tabulated_extra: i64 = TABULATED
        .iter()
        .filter(|(year, _)| (from..to).contains(year))
        .map(|(year, _)| days_in_year(*year) - untabulated_len)
        .sum();
    untabulated_len * (i64::from(to) - i64::from(from)) + tabulated_extra
}

/// Days from the start of the BS year to `date` (0 for the first day).
fn day_of_year(date: &BsDate) -> i64 {
    (1..date.month).map(|m| month_len(date.year, m)).sum::<i64>() + i64::from(date.day) - 1
}

/// Convert a Bikram Sambat date back to Gregorian.
pub fn bs_to_ad(date: BsDate) -> Result<NaiveDate, CalendarError> {
    let date = BsDate::new(date.year, date.month, date.day)?;

    let offset = if date.year >= ANCHOR_BS.year {
        days_between_years(ANCHOR_BS.year, date.year) + day_of_year(&date)
    } else {
        day_of_year(&date) - days_between_years(date.year, ANCHOR_BS.year)
    };

    anchor_ad()
        .checked_add_signed(Duration::days(offset))
        .ok_or(CalendarError::OutOfRange)
}

/// Today's BS date on the local clock.
pub fn today() -> Conversion {
    ad_to_bs(chrono::Local::now().date_naive())
}

/// Nepali weekday name.
pub fn weekday_name(weekday: Weekday) -> &'static str {
    WEEKDAY_NAMES[weekday.num_days_from_sunday() as usize]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HolidayKind {
    Festival,
    National,
    Religious,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Holiday {
    pub date: BsDate,
    pub name: &'static str,
    pub description: &'static str,
    pub kind: HolidayKind,
}

const fn holiday_on(
    (year, month, day): (i32, u8, u8),
    name: &'static str,
    description: &'static str,
    kind: HolidayKind,
) -> Holiday {
    Holiday {
        date: BsDate { year, month, day },
        name,
        description,
        kind,
    }
}

/// Major holidays of BS 2082.
pub const HOLIDAYS: [Holiday; 14] = [
    holiday_on((2082, 1, 1), "नयाँ वर्ष", "Nepali New Year", HolidayKind::National),
    holiday_on((2082, 1, 18), "लोकतन्त्र दिवस", "Democracy Day", HolidayKind::National),
    holiday_on((2082, 3, 5), "कुशे औंसी", "Gokarna Aunsi (Father's Day)", HolidayKind::Festival),
    holiday_on((2082, 4, 3), "जनै पूर्णिमा", "Janai Purnima", HolidayKind::Religious),
    holiday_on((2082, 4, 8), "गाईजात्रा", "Gai Jatra", HolidayKind::Festival),
    holiday_on((2082, 5, 15), "कृष्ण जन्माष्टमी", "Krishna Janmashtami", HolidayKind::Religious),
    holiday_on((2082, 6, 2), "तीज", "Haritalika Teej", HolidayKind::Festival),
    holiday_on((2082, 6, 10), "इन्द्र जात्रा", "Indra Jatra Festival", HolidayKind::Festival),
    holiday_on((2082, 6, 17), "दशैं", "Dashain Festival Begins", HolidayKind::Festival),
    holiday_on((2082, 7, 11), "तिहार", "Deepawali/Tihar", HolidayKind::Festival),
    holiday_on((2082, 8, 30), "संविधान दिवस", "Constitution Day", HolidayKind::National),
    holiday_on((2082, 10, 1), "प्रजातन्त्र दिवस", "International Democracy Day", HolidayKind::National),
    holiday_on((2082, 10, 16), "शिव रात्री", "Maha Shivaratri", HolidayKind::Religious),
    holiday_on((2082, 12, 8), "होली", "Holi Festival", HolidayKind::Festival),
];

pub fn holiday(date: &BsDate) -> Option<&'static Holiday> {
    HOLIDAYS.iter().find(|h| h.date == *date)
}

/// Everything the calendar widget shows for one day.
#[derive(Clone, Debug, PartialEq)]
pub struct PatroDay {
    pub ad: NaiveDate,
    pub bs: BsDate,
    pub accuracy: Accuracy,
    pub weekday: &'static str,
    pub holiday: Option<&'static Holiday>,
}

impl PatroDay {
    pub fn for_date(ad: NaiveDate, with_holidays: bool) -> Self {
        let Conversion { date, accuracy } = ad_to_bs(ad);
        Self {
            ad,
            bs: date,
            accuracy,
            weekday: weekday_name(ad.weekday()),
            holiday: if with_holidays { holiday(&date) } else { None },
        }
    }
}
