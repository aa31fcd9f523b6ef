//! Sort keys for name-valued time intervals.
//!
//! Month, day-of-week and quarter names sort alphabetically in the warehouse.
//! Ordering by them goes through a `CASE` that maps each name to its
//! position instead.

use crate::query::WeekDay;
use crate::semantic::explore::TimeInterval;
use crate::sql::SqlDialect;

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Monday first.
const DAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

const QUARTERS: [&str; 4] = ["Q1", "Q2", "Q3", "Q4"];

/// The expression to order `column` by, when its interval produces names.
///
/// Returns `None` for intervals that already sort correctly.
pub fn sort_expression(
    dialect: &dyn SqlDialect,
    interval: TimeInterval,
    column: &str,
    start_of_week: WeekDay,
) -> Option<String> {
    let positions: Vec<(&str, usize)> = match interval {
        TimeInterval::MonthName => MONTHS.iter().copied().zip(1..).collect(),
        TimeInterval::QuarterName => QUARTERS.iter().copied().zip(1..).collect(),
        TimeInterval::DayOfWeekName => {
            let start = start_of_week.index_from_monday();
            (0..DAYS.len())
                .map(|i| {
                    let day = DAYS[(start + i) % DAYS.len()];
                    (day, i + 1)
                })
                .collect()
        }
        _ => return None,
    };

    let mut sql = String::from("CASE\n");
    for (name, position) in positions {
        sql.push_str(&format!(
            "    WHEN {} = {} THEN {}\n",
            column,
            dialect.quote_string(name),
            position
        ));
    }
    sql.push_str("    ELSE 0\n  END");
    Some(sql)
}
