pub mod calendar_type;
pub mod day;
pub mod event;
pub mod legend;

pub use calendar_type::{AllowedUser, CalendarInfo, Role, create_calendar, provision_own_calendar};
pub use day::{YearMonth, normalize_day};
pub use event::{DateRangeUpdate, Event};
pub use legend::{DEFAULT_LEGEND_COLOR, Legend};
