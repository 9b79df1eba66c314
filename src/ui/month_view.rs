use chrono::{Datelike, Days, NaiveDate, Weekday};

use crate::calendar::{Event, Legend, YearMonth};
use crate::input::{Highlight, SelectionMachine};
use crate::sync::EventStore;

const MIN_WEEKS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct MonthLayout {
    pub month: YearMonth,
    pub weeks: Vec<Week>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Week {
    pub days: Vec<DayCell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayCell {
    pub date: NaiveDate,
    pub is_today: bool,
    pub is_current_month: bool,
    pub highlight: Highlight,
    pub occupants: Vec<(Event, Legend)>,
}

impl DayCell {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            is_today: false,
            is_current_month: true,
            highlight: Highlight::None,
            occupants: Vec::new(),
        }
    }

    pub fn with_today(mut self, today: bool) -> Self {
        self.is_today = today;
        self
    }

    pub fn with_current_month(mut self, current_month: bool) -> Self {
        self.is_current_month = current_month;
        self
    }

    pub fn with_highlight(mut self, highlight: Highlight) -> Self {
        self.highlight = highlight;
        self
    }

    pub fn with_occupants(mut self, occupants: Vec<(Event, Legend)>) -> Self {
        self.occupants = occupants;
        self
    }

    pub fn has_events(&self) -> bool {
        !self.occupants.is_empty()
    }
}

/// Week-aligned grid for `month`: 35 or 42 cells, padded with days from the
/// neighbouring months.
pub fn calculate_layout(
    month: YearMonth,
    first_weekday: Weekday,
    events: &EventStore,
    selection: &SelectionMachine,
    today: NaiveDate,
) -> MonthLayout {
    let first_day = month.first_day();
    let days_before = first_day.weekday().days_since(first_weekday) as usize;
    let filled = days_before + month.days_in_month() as usize;
    let week_count = filled.div_ceil(7).max(MIN_WEEKS);

    let Some(grid_start) = first_day.checked_sub_days(Days::new(days_before as u64)) else {
        return MonthLayout { month, weeks: Vec::new() };
    };

    let mut weeks = Vec::with_capacity(week_count);
    let mut current_date = grid_start;
    for _ in 0..week_count {
        let mut week = Week { days: Vec::with_capacity(7) };
        for _ in 0..7 {
            let cell = DayCell::new(current_date)
                .with_today(current_date == today)
                .with_current_month(month.contains(current_date))
                .with_highlight(selection.highlight(current_date))
                .with_occupants(events.occupancy(current_date));
            week.days.push(cell);

            let Some(next) = current_date.succ_opt() else {
                weeks.push(week);
                return MonthLayout { month, weeks };
            };
            current_date = next;
        }
        weeks.push(week);
    }

    MonthLayout { month, weeks }
}
