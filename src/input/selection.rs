use chrono::NaiveDate;

use crate::calendar::Event;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionState {
    Idle,
    AwaitingEnd { start: NaiveDate },
    AwaitingLegend { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditMode {
    Off,
    Moving(Event),
}

/// What the session should do after a gesture step.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionIntent {
    PromptLegend {
        start: NaiveDate,
        end: NaiveDate,
    },
    Create {
        start: NaiveDate,
        end: NaiveDate,
        legend_id: String,
    },
    Reposition {
        event_id: String,
        start: NaiveDate,
        end: NaiveDate,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Highlight {
    None,
    Anchor,
    InRange,
}

/// Two-click date-range gesture, shared by event creation and repositioning.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionMachine {
    state: SelectionState,
    edit: EditMode,
}

impl Default for SelectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionMachine {
    pub fn new() -> Self {
        Self {
            state: SelectionState::Idle,
            edit: EditMode::Off,
        }
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn edit_mode(&self) -> &EditMode {
        &self.edit
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.edit, EditMode::Moving(_))
    }

    pub fn activate(&mut self, day: NaiveDate) -> Option<SelectionIntent> {
        match self.state {
            SelectionState::Idle => {
                self.state = SelectionState::AwaitingEnd { start: day };
                None
            }
            SelectionState::AwaitingEnd { start } => {
                let (start, end) = if day < start { (day, start) } else { (start, day) };
                match std::mem::replace(&mut self.edit, EditMode::Off) {
                    EditMode::Moving(event) => {
                        self.state = SelectionState::Idle;
                        Some(SelectionIntent::Reposition {
                            event_id: event.id,
                            start,
                            end,
                        })
                    }
                    EditMode::Off => {
                        self.state = SelectionState::AwaitingLegend { start, end };
                        Some(SelectionIntent::PromptLegend { start, end })
                    }
                }
            }
            // A complete range is still showing; a new click starts over.
            SelectionState::AwaitingLegend { .. } => {
                self.state = SelectionState::AwaitingEnd { start: day };
                None
            }
        }
    }

    pub fn choose_legend(&mut self, legend_id: &str) -> Option<SelectionIntent> {
        let SelectionState::AwaitingLegend { start, end } = self.state else {
            tracing::debug!("Legend chosen with no complete range; ignoring");
            return None;
        };
        self.state = SelectionState::Idle;
        Some(SelectionIntent::Create {
            start,
            end,
            legend_id: legend_id.to_string(),
        })
    }

    /// Closing the legend prompt without a choice drops the range.
    pub fn dismiss_legend_prompt(&mut self) {
        if matches!(self.state, SelectionState::AwaitingLegend { .. }) {
            self.state = SelectionState::Idle;
        }
    }

    pub fn cancel(&mut self) {
        self.state = SelectionState::Idle;
        self.edit = EditMode::Off;
    }

    pub fn start_edit(&mut self, event: Event) {
        tracing::debug!("Repositioning event {}", event.id);
        self.state = SelectionState::Idle;
        self.edit = EditMode::Moving(event);
    }

    pub fn range(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        match self.state {
            SelectionState::Idle => (None, None),
            SelectionState::AwaitingEnd { start } => (Some(start), None),
            SelectionState::AwaitingLegend { start, end } => (Some(start), Some(end)),
        }
    }

    pub fn highlight(&self, day: NaiveDate) -> Highlight {
        match self.state {
            SelectionState::AwaitingEnd { start } if start == day => Highlight::Anchor,
            SelectionState::AwaitingLegend { start, end } if start <= day && day <= end => {
                Highlight::InRange
            }
            _ => Highlight::None,
        }
    }
}
